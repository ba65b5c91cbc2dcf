//! Session registry and the driver-facing orchestrator.

pub mod orchestrator;
pub mod store;

pub use orchestrator::{SessionOrchestrator, SessionSnapshot, StatusSummary, SNAPSHOT_EVENTS};
pub use store::{validate_session_id, Session, SessionGuard, SessionHandle, SessionStore};
