use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::business::Business;
use crate::domain::negotiation::{CallDecision, Deal, HumanInterrupt, NegotiationState};
use crate::domain::requirements::ServiceRequirements;
use crate::domain::research::ResearchSummary;
use crate::events::{agents, AgentEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Intake,
    Search,
    Research,
    Ranking,
    ContactLoop,
    HumanInterrupt,
    CallDecision,
    Learning,
    Verification,
    Completed,
    Error,
}

impl WorkflowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Search => "search",
            Self::Research => "research",
            Self::Ranking => "ranking",
            Self::ContactLoop => "contact_loop",
            Self::HumanInterrupt => "human_interrupt",
            Self::CallDecision => "call_decision",
            Self::Learning => "learning",
            Self::Verification => "verification",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: WorkflowStage,
    pub message: String,
    pub recoverable: bool,
    pub at: DateTime<Utc>,
}

/// The complete negotiation context for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub stage: WorkflowStage,
    pub requirements: ServiceRequirements,
    pub businesses: Vec<Business>,
    pub research: ResearchSummary,
    pub negotiation: NegotiationState,
    pub human_interrupt: HumanInterrupt,
    pub call_decision: CallDecision,
    pub best_deal: Option<Deal>,
    pub current_agent: String,
    pub previous_agents: Vec<String>,
    pub should_continue: bool,
    pub skip_verification: bool,
    pub errors: Vec<StageError>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::initial()
    }
}

impl WorkflowState {
    pub fn initial() -> Self {
        Self {
            stage: WorkflowStage::Intake,
            requirements: ServiceRequirements::default(),
            businesses: Vec::new(),
            research: ResearchSummary::default(),
            negotiation: NegotiationState::default(),
            human_interrupt: HumanInterrupt::default(),
            call_decision: CallDecision::default(),
            best_deal: None,
            current_agent: agents::ORCHESTRATOR.to_string(),
            previous_agents: Vec::new(),
            should_continue: true,
            skip_verification: false,
            errors: Vec::new(),
        }
    }

    /// True while the workflow waits on the requester; advancing is then a no-op.
    pub fn awaiting_input(&self) -> bool {
        self.human_interrupt.active || self.call_decision.awaiting_decision
    }

    pub fn hand_off(&mut self, agent: &str) {
        if self.current_agent != agent {
            let previous = std::mem::replace(&mut self.current_agent, agent.to_string());
            self.previous_agents.push(previous);
        }
    }

    /// Records a degraded-but-survivable failure and returns the event announcing it.
    pub fn record_recoverable(&mut self, agent: &str, message: impl Into<String>) -> AgentEvent {
        let message = message.into();
        self.errors.push(StageError {
            stage: self.stage,
            message: message.clone(),
            recoverable: true,
            at: Utc::now(),
        });
        AgentEvent::recoverable(agent, message)
    }

    pub fn record_fatal(&mut self, message: impl Into<String>) {
        self.errors.push(StageError {
            stage: self.stage,
            message: message.into(),
            recoverable: false,
            at: Utc::now(),
        });
        self.stage = WorkflowStage::Error;
        self.should_continue = false;
    }

    /// Drops everything derived from the requirements so search reruns from scratch.
    pub fn clear_downstream(&mut self) {
        self.businesses.clear();
        self.research = ResearchSummary::default();
        self.negotiation = NegotiationState::default();
        self.human_interrupt = HumanInterrupt::default();
        self.call_decision = CallDecision::default();
        self.best_deal = None;
    }

    pub fn vendor_count(&self) -> usize {
        self.research.ranking.as_ref().map_or(0, |ranking| ranking.vendors.len())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepControl {
    Continue,
    Pause,
    Finish,
}

/// One committed unit of workflow progress.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub state: WorkflowState,
    pub events: Vec<AgentEvent>,
    pub control: StepControl,
}

impl StepOutcome {
    pub fn status(&self) -> SessionStatus {
        match self.control {
            StepControl::Continue => SessionStatus::Running,
            StepControl::Pause => SessionStatus::Paused,
            StepControl::Finish if self.state.stage == WorkflowStage::Error => SessionStatus::Error,
            StepControl::Finish => SessionStatus::Completed,
        }
    }
}
