pub mod actions;
pub mod engine;
pub mod interpret;
pub mod states;

pub use actions::{apply_action, AppliedAction, SessionAction};
pub use engine::{NegotiationWorkflow, WorkflowSettings};
pub use interpret::{extract_amounts, CallInterpretation, CallInterpreter};
pub use states::{
    SessionStatus, StageError, StepControl, StepOutcome, WorkflowStage, WorkflowState,
};
