//! JSON and SSE routes for driving negotiation sessions.
//!
//! - `POST   /api/sessions/{id}/actions` - apply an action, advancing when it asks to
//! - `GET    /api/sessions/{id}`         - full state plus recent events
//! - `DELETE /api/sessions/{id}`         - drop the session and end its streams
//! - `GET    /api/sessions/{id}/events`  - server-sent event stream
//! - `GET    /api/calls?limit=`          - most recent call records
//! - `GET    /api/calls/{call_id}`       - one call record
//! - `DELETE /api/calls/{call_id}`       - remove a call record

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{BoxStream, StreamExt};
use haggle_core::errors::{ApplicationError, ErrorKind, InterfaceError};
use haggle_core::{
    CallRecord, CallRecordStore, EventStreamGateway, InputError, SessionAction,
    SessionOrchestrator, SessionSnapshot, StatusSummary, StreamMessage,
};
use haggle_db::DbPool;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";
const DEFAULT_CALL_LIMIT: usize = 20;
const MAX_CALL_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub gateway: Arc<EventStreamGateway>,
    pub call_records: Arc<dyn CallRecordStore>,
    pub db_pool: Option<DbPool>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        let error = error.into().into_interface(correlation_id);
        if error.kind.is_server_fault() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %error,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "request rejected"
            );
        }
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let InterfaceError { kind, message, correlation_id } = self.0;
        let status = match kind {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody { error: kind.user_message(), detail: message, correlation_id };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CallsQuery {
    pub limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions/{id}/actions", post(submit_action))
        .route("/api/sessions/{id}", get(session_snapshot).delete(delete_session))
        .route("/api/sessions/{id}/events", get(session_events))
        .route("/api/calls", get(list_calls))
        .route("/api/calls/{call_id}", get(get_call).delete(delete_call))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// The body is parsed here rather than through `Json` so unknown actions come
/// back as a typed bad request.
async fn submit_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<StatusSummary>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let action = SessionAction::from_json(&body).map_err(|e| ApiError::new(e, &correlation_id))?;

    info!(
        event_name = "api.session.action",
        correlation_id = %correlation_id,
        session_id = %id,
        action = action.name(),
        "session action received"
    );
    let summary = state
        .orchestrator
        .submit(&id, action)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;
    Ok(Json(summary))
}

async fn session_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let snapshot =
        state.orchestrator.snapshot(&id).await.map_err(|e| ApiError::new(e, &correlation_id))?;
    Ok(Json(snapshot))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id(&headers);
    let removed =
        state.orchestrator.delete(&id).await.map_err(|e| ApiError::new(e, &correlation_id))?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(InputError::SessionNotFound(id), &correlation_id))
    }
}

async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<BoxStream<'static, Result<Event, Infallible>>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let messages =
        state.gateway.subscribe(&id).await.map_err(|e| ApiError::new(e, &correlation_id))?;

    let events = messages
        .filter_map(|message| async move { sse_event(&message).map(Ok::<_, Infallible>) })
        .boxed();
    Ok(Sse::new(events))
}

fn sse_event(message: &StreamMessage) -> Option<Event> {
    match Event::default().event(message.name()).json_data(message) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(
                event_name = "api.stream.encode_failed",
                kind = message.name(),
                error = %error,
                "dropping stream message that could not be encoded"
            );
            None
        }
    }
}

async fn list_calls(
    State(state): State<AppState>,
    Query(query): Query<CallsQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<CallRecord>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let limit = query.limit.unwrap_or(DEFAULT_CALL_LIMIT).clamp(1, MAX_CALL_LIMIT);
    let records = state
        .call_records
        .list_recent(limit)
        .await
        .map_err(|e| ApiError::new(e, &correlation_id))?;
    Ok(Json(records))
}

async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CallRecord>, ApiError> {
    let correlation_id = correlation_id(&headers);
    match state.call_records.get(&call_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::new(ApplicationError::CallNotFound(call_id), &correlation_id)),
        Err(e) => Err(ApiError::new(e, &correlation_id)),
    }
}

async fn delete_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id(&headers);
    match state.call_records.delete(&call_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::new(ApplicationError::CallNotFound(call_id), &correlation_id)),
        Err(e) => Err(ApiError::new(e, &correlation_id)),
    }
}
