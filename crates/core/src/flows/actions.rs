use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::negotiation::DecisionChoice;
use crate::domain::requirements::ServiceRequirements;
use crate::errors::InputError;
use crate::events::{agents, AgentEvent, EventKind};
use crate::flows::states::{WorkflowStage, WorkflowState};

/// Everything a driver can ask a session to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionAction {
    UpdateRequirements { requirements: ServiceRequirements },
    SearchBusinesses,
    HumanResponse { response: String },
    CallDecision { decision: DecisionChoice },
    SkipVerification,
    Run,
    Reset,
}

impl SessionAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateRequirements { .. } => "update_requirements",
            Self::SearchBusinesses => "search_businesses",
            Self::HumanResponse { .. } => "human_response",
            Self::CallDecision { .. } => "call_decision",
            Self::SkipVerification => "skip_verification",
            Self::Run => "run",
            Self::Reset => "reset",
        }
    }

    pub fn from_value(value: Value) -> Result<Self, InputError> {
        serde_json::from_value(value)
            .map_err(|error| InputError::MalformedAction(error.to_string()))
    }

    pub fn from_json(body: &str) -> Result<Self, InputError> {
        serde_json::from_str(body).map_err(|error| InputError::MalformedAction(error.to_string()))
    }
}

/// The state an accepted action leaves behind, before any advancing.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedAction {
    pub state: WorkflowState,
    pub events: Vec<AgentEvent>,
    pub advance: bool,
}

/// Validates `action` against `current` and returns the resulting state.
/// Rejections leave `current` untouched.
pub fn apply_action(
    current: &WorkflowState,
    action: &SessionAction,
) -> Result<AppliedAction, InputError> {
    let mut state = current.clone();
    let mut events = Vec::new();

    let advance = match action {
        SessionAction::UpdateRequirements { requirements } => {
            state.requirements.merge(requirements.clone());
            state.clear_downstream();
            state.stage = WorkflowStage::Intake;
            state.should_continue = true;
            state.hand_off(agents::INTAKE);
            events.push(
                AgentEvent::new(
                    EventKind::RequirementsUpdated,
                    agents::INTAKE,
                    format!("Requirements updated: {}", state.requirements.describe()),
                )
                .with_payload(json!({
                    "requirements": state.requirements,
                    "missing_fields": state.requirements.missing_fields(),
                })),
            );
            true
        }
        SessionAction::SearchBusinesses => {
            state.clear_downstream();
            state.stage = WorkflowStage::Intake;
            state.should_continue = true;
            state.hand_off(agents::ORCHESTRATOR);
            events.push(AgentEvent::new(
                EventKind::SearchRequested,
                agents::ORCHESTRATOR,
                "Vendor search requested",
            ));
            true
        }
        SessionAction::HumanResponse { response } => {
            if !state.human_interrupt.active {
                return Err(InputError::InvalidState {
                    action: action.name(),
                    stage: state.stage,
                    reason: "no human input is pending".to_string(),
                });
            }
            let response = response.trim();
            if response.is_empty() {
                return Err(InputError::MalformedAction("response must not be empty".to_string()));
            }

            let interrupt = &mut state.human_interrupt;
            interrupt.active = false;
            interrupt.response = Some(response.to_string());
            interrupt.responded_at = Some(Utc::now());
            let vendor = interrupt.vendor_name.clone().unwrap_or_else(|| "the vendor".to_string());

            state.negotiation.human_guidance = Some(response.to_string());
            state.stage = WorkflowStage::ContactLoop;
            state.should_continue = true;
            state.hand_off(agents::HUMAN);
            events.push(
                AgentEvent::new(
                    EventKind::HumanResponseReceived,
                    agents::HUMAN,
                    format!("Answer received; calling {vendor} again"),
                )
                .with_payload(json!({ "response": response })),
            );
            true
        }
        SessionAction::CallDecision { decision } => {
            if !state.call_decision.awaiting_decision {
                return Err(InputError::InvalidState {
                    action: action.name(),
                    stage: state.stage,
                    reason: "no call decision is pending".to_string(),
                });
            }
            state.call_decision.awaiting_decision = false;
            state.call_decision.decision = Some(*decision);

            let message = match decision {
                DecisionChoice::Continue => {
                    state.negotiation.current_vendor_index += 1;
                    if state.negotiation.current_vendor_index >= state.vendor_count() {
                        state.stage = WorkflowStage::Learning;
                        "Continue requested but no vendors remain; wrapping up"
                    } else {
                        state.stage = WorkflowStage::ContactLoop;
                        "Continuing with the next vendor"
                    }
                }
                DecisionChoice::Stop => {
                    state.stage = WorkflowStage::Learning;
                    "Stopping negotiations with the best deal so far"
                }
            };
            state.should_continue = true;
            state.hand_off(agents::DECISION);
            let payload = json!({
                "decision": decision,
                "next_vendor_index": state.negotiation.current_vendor_index,
            });
            events.push(
                AgentEvent::new(EventKind::DecisionRecorded, agents::DECISION, message)
                    .with_payload(payload),
            );
            true
        }
        SessionAction::SkipVerification => {
            state.skip_verification = true;
            events.push(AgentEvent::new(
                EventKind::SettingsUpdated,
                agents::ORCHESTRATOR,
                "Deal verification will be skipped",
            ));
            false
        }
        SessionAction::Run => {
            if !state.stage.is_terminal() {
                state.should_continue = !state.awaiting_input();
            }
            true
        }
        SessionAction::Reset => {
            state = WorkflowState::initial();
            events.push(AgentEvent::new(
                EventKind::SessionReset,
                agents::ORCHESTRATOR,
                "Session reset",
            ));
            false
        }
    };

    Ok(AppliedAction { state, events, advance })
}
