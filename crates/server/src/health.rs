use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use haggle_db::DbPool;
use serde::Serialize;

use crate::api::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: &'static str,
    pub readiness: Readiness,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub readiness: Readiness,
    pub components: Vec<Component>,
    pub live_sessions: usize,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
impl HealthReport {
    fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|component| component.name == name)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Degraded (503) as soon as any component is.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let components = vec![call_store(state.db_pool.as_ref()).await];
    let readiness = if components.iter().all(|c| c.readiness == Readiness::Ready) {
        Readiness::Ready
    } else {
        Readiness::Degraded
    };

    let report = HealthReport {
        readiness,
        components,
        live_sessions: state.orchestrator.store().len().await,
        checked_at: Utc::now(),
    };
    let status = match readiness {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

async fn call_store(pool: Option<&DbPool>) -> Component {
    let Some(pool) = pool else {
        return Component {
            name: "call_store",
            readiness: Readiness::Ready,
            detail: "in-memory".to_string(),
        };
    };
    let (readiness, detail) = match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => (Readiness::Ready, "sqlite reachable".to_string()),
        Err(error) => (Readiness::Degraded, format!("sqlite unreachable: {error}")),
    };
    Component { name: "call_store", readiness, detail }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use haggle_db::connect_with_settings;

    use super::{health, Readiness};
    use crate::api::tests::state;

    #[tokio::test]
    async fn in_memory_call_store_is_always_ready() {
        let (status, Json(report)) = health(State(state())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.live_sessions, 0);
        assert_eq!(report.component("call_store").map(|c| c.detail.as_str()), Some("in-memory"));
    }

    #[tokio::test]
    async fn closed_pool_degrades_the_report() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        let mut app = state();
        app.db_pool = Some(pool.clone());

        let (status, Json(report)) = health(State(app.clone())).await;
        assert_eq!(status, StatusCode::OK);

        pool.close().await;
        let (status, Json(report_after)) = health(State(app)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report_after.readiness, Readiness::Degraded);
        let store = report_after.component("call_store").expect("call store component");
        assert!(store.detail.starts_with("sqlite unreachable"));
        assert!(report_after.checked_at >= report.checked_at);
    }
}
