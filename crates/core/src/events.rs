use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Names recorded in `WorkflowState::current_agent` and on every event.
pub mod agents {
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const INTAKE: &str = "intake_agent";
    pub const SEARCH: &str = "search_agent";
    pub const RESEARCH: &str = "research_agent";
    pub const RANKING: &str = "ranking_agent";
    pub const CALLING: &str = "calling_agent";
    pub const HUMAN: &str = "human_interrupt";
    pub const DECISION: &str = "decision_agent";
    pub const LEARNING: &str = "learning_agent";
    pub const VERIFICATION: &str = "verification_agent";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RequirementsUpdated,
    RequirementsIncomplete,
    SearchRequested,
    SettingsUpdated,
    StageCompleted,
    SearchCompleted,
    ResearchCompleted,
    RankingCompleted,
    CallStarted,
    CallCompleted,
    CallFailed,
    HumanInterrupt,
    HumanResponseReceived,
    CallDecisionRequired,
    DecisionRecorded,
    VendorsExhausted,
    LearningCompleted,
    VerificationCompleted,
    VerificationSkipped,
    WorkflowCompleted,
    RecoverableError,
    AgentError,
    SessionReset,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequirementsUpdated => "requirements_updated",
            Self::RequirementsIncomplete => "requirements_incomplete",
            Self::SearchRequested => "search_requested",
            Self::SettingsUpdated => "settings_updated",
            Self::StageCompleted => "stage_completed",
            Self::SearchCompleted => "search_completed",
            Self::ResearchCompleted => "research_completed",
            Self::RankingCompleted => "ranking_completed",
            Self::CallStarted => "call_started",
            Self::CallCompleted => "call_completed",
            Self::CallFailed => "call_failed",
            Self::HumanInterrupt => "human_interrupt",
            Self::HumanResponseReceived => "human_response_received",
            Self::CallDecisionRequired => "call_decision_required",
            Self::DecisionRecorded => "decision_recorded",
            Self::VendorsExhausted => "vendors_exhausted",
            Self::LearningCompleted => "learning_completed",
            Self::VerificationCompleted => "verification_completed",
            Self::VerificationSkipped => "verification_skipped",
            Self::WorkflowCompleted => "workflow_completed",
            Self::RecoverableError => "recoverable_error",
            Self::AgentError => "agent_error",
            Self::SessionReset => "session_reset",
        }
    }
}

/// Append-only record of something the workflow did. Serves both as the audit
/// trail and as the replay buffer for stream subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub agent: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.into(),
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn recoverable(agent: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(EventKind::RecoverableError, agent, message.clone())
            .with_payload(serde_json::json!({ "recoverable": true, "error": message }))
    }
}
