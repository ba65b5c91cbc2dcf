pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod flows;
pub mod ports;
pub mod ranking;
pub mod session;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::business::{Business, GeoPoint};
pub use domain::call_record::{CallRecord, CallRecordPatch, CallState};
pub use domain::negotiation::{CallOutcome, CallResultKind, Deal, DecisionChoice};
pub use domain::requirements::ServiceRequirements;
pub use errors::{ApplicationError, ErrorKind, InputError, InterfaceError, WorkflowError};
pub use events::{AgentEvent, EventKind};
pub use flows::{NegotiationWorkflow, SessionAction, SessionStatus, WorkflowSettings, WorkflowStage};
pub use ports::{
    BusinessDirectory, CallRecordStore, Collaborators, CollaboratorError, ContactService,
    ReasoningService,
};
pub use ranking::VendorRankingEngine;
pub use session::{SessionOrchestrator, SessionSnapshot, SessionStore, StatusSummary};
pub use stream::{EventStreamGateway, StreamMessage};
