use std::sync::Arc;

use haggle_agent::{
    Catalog, CatalogDirectory, HttpLlmClient, LlmReasoningService, SimulatedContactService,
};
use haggle_core::config::{AppConfig, ConfigError, LoadOptions};
use haggle_core::domain::research::PriceBand;
use haggle_core::ports::{BusinessDirectory, CallRecordStore, Collaborators, CollaboratorError};
use haggle_core::{
    EventStreamGateway, NegotiationWorkflow, SessionOrchestrator, SessionStore, WorkflowSettings,
};
use haggle_db::{
    connect_with_settings, migrations, DbPool, InMemoryCallRecordRepository,
    SqlCallRecordRepository,
};
use thiserror::Error;
use tracing::{info, warn};

/// Status polls the simulated vendor spends "in progress" before answering.
const SIMULATED_RINGS: u32 = 1;

pub struct Application {
    pub config: AppConfig,
    /// `None` when call records are kept in memory (`database.url = ":memory:"`).
    pub db_pool: Option<DbPool>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub gateway: Arc<EventStreamGateway>,
    pub call_records: Arc<dyn CallRecordStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("business catalog could not be loaded: {0}")]
    Catalog(#[source] CollaboratorError),
    #[error("llm client could not be built: {0:#}")]
    Llm(anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let (db_pool, call_records) = call_record_store(&config).await?;

    let directory: Arc<dyn BusinessDirectory> = match &config.directory.catalog_path {
        Some(path) => {
            Arc::new(CatalogDirectory::load(path).await.map_err(BootstrapError::Catalog)?)
        }
        None => {
            warn!(
                event_name = "system.bootstrap.empty_catalog",
                correlation_id = "bootstrap",
                "no directory.catalog_path configured; searches will find no vendors"
            );
            Arc::new(CatalogDirectory::new(Catalog::default()))
        }
    };

    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let fallback_band =
        PriceBand::new(config.workflow.fallback_price_low, config.workflow.fallback_price_high);

    let collaborators = Collaborators {
        directory,
        contact: Arc::new(SimulatedContactService::new(fallback_band, SIMULATED_RINGS)),
        reasoning: Arc::new(LlmReasoningService::new(Arc::new(llm))),
        call_records: call_records.clone(),
    };

    let store = Arc::new(SessionStore::new(config.stream.channel_capacity));
    let workflow =
        NegotiationWorkflow::new(collaborators, WorkflowSettings::from(&config.workflow));
    let orchestrator = Arc::new(SessionOrchestrator::new(store.clone(), workflow));
    let gateway = Arc::new(EventStreamGateway::new(store, &config.stream));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        persistent_call_records = db_pool.is_some(),
        "application bootstrap complete"
    );

    Ok(Application { config, db_pool, orchestrator, gateway, call_records })
}

async fn call_record_store(
    config: &AppConfig,
) -> Result<(Option<DbPool>, Arc<dyn CallRecordStore>), BootstrapError> {
    if config.database.url.trim() == ":memory:" {
        info!(
            event_name = "system.bootstrap.memory_call_records",
            correlation_id = "bootstrap",
            "call records are kept in memory"
        );
        return Ok((None, Arc::new(InMemoryCallRecordRepository::default())));
    }

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok((Some(db_pool.clone()), Arc::new(SqlCallRecordRepository::new(db_pool))))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use haggle_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn load_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_provider: Some(LlmProvider::Ollama),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstraps_against_sqlite_and_applies_migrations() {
        let app = bootstrap(load_options("sqlite::memory:")).await.expect("bootstrap");
        let pool = app.db_pool.clone().expect("sqlite pool");

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'call_record'",
        )
        .fetch_one(&pool)
        .await
        .expect("query");
        assert_eq!(tables, 1);
        assert!(app.call_records.list_recent(5).await.expect("list").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn memory_database_skips_the_pool() {
        let app = bootstrap(load_options(":memory:")).await.expect("bootstrap");
        assert!(app.db_pool.is_none());
        assert!(app.orchestrator.store().is_empty().await);
    }

    #[tokio::test]
    async fn hosted_llm_without_a_key_fails_fast() {
        let mut options = load_options(":memory:");
        options.overrides.llm_provider = Some(LlmProvider::OpenAi);
        let result = bootstrap(options).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn loads_the_configured_catalog() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{\"places\": [], \"businesses\": []}").expect("write");
        let mut options = load_options(":memory:");
        options.overrides.catalog_path = Some(file.path().to_path_buf());
        assert!(bootstrap(options).await.is_ok());

        let mut missing = load_options(":memory:");
        missing.overrides.catalog_path = Some("/definitely/not/here.json".into());
        assert!(matches!(bootstrap(missing).await, Err(BootstrapError::Catalog(_))));
    }
}
