use thiserror::Error;

use crate::flows::WorkflowStage;
use crate::ports::CollaboratorError;

/// Rejected before any state mutation happens.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("invalid session id `{0}`: expected 1-128 characters of [A-Za-z0-9_-]")]
    InvalidSessionId(String),
    #[error("session `{0}` was not found")]
    SessionNotFound(String),
    #[error("malformed action: {0}")]
    MalformedAction(String),
    #[error("action `{action}` is not valid in stage {stage:?}: {reason}")]
    InvalidState { action: &'static str, stage: WorkflowStage, reason: String },
    #[error("session `{0}` failed and must be reset before it accepts further actions")]
    SessionFailed(String),
}

/// Invariant violations raised inside a workflow step. These end the session in `error`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("contact loop entered without a vendor ranking")]
    MissingRanking,
    #[error("verification entered without a best deal")]
    MissingBestDeal,
    #[error("advance did not settle after {0} steps")]
    Runaway(usize),
    #[error("workflow invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("call record `{0}` was not found")]
    CallNotFound(String),
}

/// HTTP-facing error class. Each kind owns one status code and one user-facing sentence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::BadRequest => "The action could not be read. Check the payload and try again.",
            Self::NotFound => "No session or call record exists under that id.",
            Self::Conflict => "The session cannot take that action right now.",
            Self::Unavailable => "A dependency is not responding. Retry in a moment.",
            Self::Internal => "The negotiation hit an unexpected error.",
        }
    }

    /// Failures the caller did not cause; logged at error level.
    pub fn is_server_fault(self) -> bool {
        matches!(self, Self::Unavailable | Self::Internal)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct InterfaceError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, correlation_id: &str) -> Self {
        Self { kind, message: message.into(), correlation_id: correlation_id.to_string() }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl ApplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(InputError::SessionNotFound(_)) | Self::CallNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Input(InputError::InvalidState { .. } | InputError::SessionFailed(_)) => {
                ErrorKind::Conflict
            }
            Self::Input(InputError::InvalidSessionId(_) | InputError::MalformedAction(_)) => {
                ErrorKind::BadRequest
            }
            Self::Workflow(_) => ErrorKind::Internal,
            Self::Collaborator(_) => ErrorKind::Unavailable,
        }
    }

    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        InterfaceError::new(self.kind(), self.to_string(), correlation_id)
    }
}
