use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::domain::negotiation::{CallDecision, Deal, HumanInterrupt};
use crate::errors::{InputError, WorkflowError};
use crate::events::{agents, AgentEvent, EventKind};
use crate::flows::{
    apply_action, NegotiationWorkflow, SessionAction, SessionStatus, StepControl, WorkflowStage,
    WorkflowState,
};
use crate::session::store::{Session, SessionGuard, SessionStore};

pub const SNAPSHOT_EVENTS: usize = 50;
const MAX_STEPS_PER_ADVANCE: usize = 256;

/// Compact view returned to drivers after every action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub stage: WorkflowStage,
    pub event_count: usize,
    pub business_count: usize,
    pub best_deal: Option<Deal>,
    pub pending_interrupt: Option<HumanInterrupt>,
    pub pending_decision: Option<CallDecision>,
    pub current_agent: String,
    pub last_updated: DateTime<Utc>,
}

impl From<&Session> for StatusSummary {
    fn from(session: &Session) -> Self {
        let state = &session.state;
        Self {
            session_id: session.id.clone(),
            status: session.status,
            stage: state.stage,
            event_count: session.events.len(),
            business_count: state.businesses.len(),
            best_deal: state.best_deal.clone(),
            pending_interrupt: state
                .human_interrupt
                .active
                .then(|| state.human_interrupt.clone()),
            pending_decision: state
                .call_decision
                .awaiting_decision
                .then(|| state.call_decision.clone()),
            current_agent: state.current_agent.clone(),
            last_updated: session.last_updated,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub state: WorkflowState,
    pub event_count: usize,
    pub recent_events: Vec<AgentEvent>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Driver-facing entry point. Applies actions and pulls workflow steps while
/// holding the session's advance lock.
pub struct SessionOrchestrator {
    store: Arc<SessionStore>,
    workflow: NegotiationWorkflow,
    snapshot_events: usize,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<SessionStore>, workflow: NegotiationWorkflow) -> Self {
        Self { store, workflow, snapshot_events: SNAPSHOT_EVENTS }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub async fn submit(
        &self,
        session_id: &str,
        action: SessionAction,
    ) -> Result<StatusSummary, InputError> {
        loop {
            let handle = self.store.get_or_create(session_id).await?;
            let guard = handle.lock().await;
            // deleted or evicted while we waited; the next lookup starts a new session
            if guard.is_closed() {
                continue;
            }
            return self.apply_locked(session_id, &guard, &action).await;
        }
    }

    async fn apply_locked(
        &self,
        session_id: &str,
        guard: &SessionGuard<'_>,
        action: &SessionAction,
    ) -> Result<StatusSummary, InputError> {
        let current = guard.snapshot();

        let is_reset = matches!(action, SessionAction::Reset);
        if current.status == SessionStatus::Error && !is_reset && *action != SessionAction::Run {
            return Err(InputError::SessionFailed(session_id.to_string()));
        }

        let applied = apply_action(&current.state, action)?;
        info!(
            event_name = "session.action.applied",
            session_id = %session_id,
            action = action.name(),
            stage = applied.state.stage.as_str(),
            advance = applied.advance,
            "session action applied"
        );

        if is_reset {
            let session = guard.reset(applied.events);
            return Ok(StatusSummary::from(session.as_ref()));
        }

        let session = if applied.state == current.state && applied.events.is_empty() {
            current
        } else {
            guard.commit(applied.state, applied.events, current.status)
        };

        let session = if applied.advance {
            self.drive(session_id, guard, session).await
        } else {
            session
        };
        Ok(StatusSummary::from(session.as_ref()))
    }

    /// Resumes the workflow. Idempotent while the session awaits input.
    pub async fn advance(&self, session_id: &str) -> Result<StatusSummary, InputError> {
        self.submit(session_id, SessionAction::Run).await
    }

    /// Reads the committed record without waiting on an in-flight advance.
    pub async fn status(&self, session_id: &str) -> Result<StatusSummary, InputError> {
        let session = self.store.get(session_id).await?.snapshot();
        Ok(StatusSummary::from(session.as_ref()))
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, InputError> {
        let session = self.store.get(session_id).await?.snapshot();
        Ok(SessionSnapshot {
            session_id: session.id.clone(),
            status: session.status,
            state: session.state.clone(),
            event_count: session.events.len(),
            recent_events: session.recent_events(self.snapshot_events).to_vec(),
            created_at: session.created_at,
            last_updated: session.last_updated,
        })
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool, InputError> {
        self.store.delete(session_id).await
    }

    async fn drive(
        &self,
        session_id: &str,
        guard: &SessionGuard<'_>,
        mut session: Arc<Session>,
    ) -> Arc<Session> {
        for _ in 0..MAX_STEPS_PER_ADVANCE {
            let state = &session.state;
            if !state.should_continue || state.awaiting_input() || state.stage.is_terminal() {
                if session.status == SessionStatus::Running {
                    let status = settled_status(state);
                    session = guard.commit(state.clone(), Vec::new(), status);
                }
                return session;
            }

            if session.status != SessionStatus::Running {
                session = guard.commit(session.state.clone(), Vec::new(), SessionStatus::Running);
            }

            match self.workflow.step(session_id, &session.state).await {
                Ok(outcome) => {
                    let status = outcome.status();
                    let control = outcome.control;
                    session = guard.commit(outcome.state, outcome.events, status);
                    if control != StepControl::Continue {
                        return session;
                    }
                }
                Err(failure) => return fail(session_id, guard, &session.state, failure),
            }
        }

        let state = session.state.clone();
        fail(session_id, guard, &state, WorkflowError::Runaway(MAX_STEPS_PER_ADVANCE))
    }
}

fn settled_status(state: &WorkflowState) -> SessionStatus {
    match state.stage {
        WorkflowStage::Completed => SessionStatus::Completed,
        WorkflowStage::Error => SessionStatus::Error,
        _ => SessionStatus::Paused,
    }
}

fn fail(
    session_id: &str,
    guard: &SessionGuard<'_>,
    state: &WorkflowState,
    failure: WorkflowError,
) -> Arc<Session> {
    error!(
        event_name = "session.advance.failed",
        session_id = %session_id,
        stage = state.stage.as_str(),
        error = %failure,
        "workflow step failed; session is now in error"
    );
    let failed_stage = state.stage;
    let mut state = state.clone();
    let message = failure.to_string();
    state.record_fatal(message.clone());
    let event = AgentEvent::new(EventKind::AgentError, agents::ORCHESTRATOR, message)
        .with_payload(json!({ "recoverable": false, "stage": failed_stage }));
    guard.commit(state, vec![event], SessionStatus::Error)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::SessionOrchestrator;
    use crate::domain::call_record::CallState;
    use crate::domain::negotiation::DecisionChoice;
    use crate::errors::InputError;
    use crate::events::EventKind;
    use crate::flows::{SessionAction, SessionStatus, WorkflowStage};
    use crate::ports::CallStatusReport;
    use crate::session::store::SessionStore;
    use crate::testing::{business, cab_request, harness, FakeDirectory, Harness, ScriptedContact};

    const QUOTE: &str = "Vendor: it will be ₹1200. Me: that is high. Vendor: okay, final ₹1000.";

    fn orchestrator(harness: &Harness) -> SessionOrchestrator {
        SessionOrchestrator::new(Arc::new(SessionStore::default()), harness.workflow.clone())
    }

    fn two_vendors() -> Arc<FakeDirectory> {
        FakeDirectory::with(vec![business("b1", 0.8, 4.8, 200), business("b2", 8.0, 3.5, 10)])
    }

    fn request() -> SessionAction {
        SessionAction::UpdateRequirements { requirements: cab_request() }
    }

    #[tokio::test]
    async fn zero_search_results_pause_at_research_with_recoverable_error() {
        let h = harness(FakeDirectory::with(Vec::new()), ScriptedContact::new());
        let orchestrator = orchestrator(&h);

        let summary = orchestrator.submit("scenario-a", request()).await.expect("accepted");

        assert_eq!(summary.status, SessionStatus::Paused);
        assert_eq!(summary.stage, WorkflowStage::Research);
        assert_eq!(summary.business_count, 0);

        let snapshot = orchestrator.snapshot("scenario-a").await.expect("snapshot");
        assert!(!snapshot.state.should_continue);
        assert!(snapshot.state.errors.iter().any(|error| error.recoverable));
        assert!(snapshot
            .recent_events
            .iter()
            .any(|event| event.kind == EventKind::RecoverableError));
        assert!(h.contact.briefs().is_empty());
    }

    #[tokio::test]
    async fn incomplete_requirements_pause_in_intake() {
        let h = harness(two_vendors(), ScriptedContact::new());
        let orchestrator = orchestrator(&h);
        let partial =
            serde_json::from_value(serde_json::json!({ "service": "cab" })).expect("parse");

        let summary = orchestrator
            .submit("partial", SessionAction::UpdateRequirements { requirements: partial })
            .await
            .expect("accepted");

        assert_eq!(summary.status, SessionStatus::Paused);
        assert_eq!(summary.stage, WorkflowStage::Intake);
        let snapshot = orchestrator.snapshot("partial").await.expect("snapshot");
        assert_eq!(
            snapshot.recent_events.last().map(|event| event.kind),
            Some(EventKind::RequirementsIncomplete)
        );
    }

    #[tokio::test]
    async fn quote_pauses_for_decision_and_stop_completes_with_verified_deal() {
        let contact = ScriptedContact { confirm: Some(true), ..ScriptedContact::default() }
            .quote("b1", QUOTE);
        let h = harness(two_vendors(), contact);
        let orchestrator = orchestrator(&h);

        let paused = orchestrator.submit("happy", request()).await.expect("accepted");
        assert_eq!(paused.status, SessionStatus::Paused);
        assert_eq!(paused.stage, WorkflowStage::CallDecision);
        let decision = paused.pending_decision.expect("decision pending");
        assert_eq!(decision.vendors_remaining, 1);
        assert_eq!(decision.current_best_price, Some(Decimal::new(1_000, 0)));
        assert!(paused.pending_interrupt.is_none());

        let done = orchestrator
            .submit("happy", SessionAction::CallDecision { decision: DecisionChoice::Stop })
            .await
            .expect("accepted");

        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.stage, WorkflowStage::Completed);
        let deal = done.best_deal.expect("best deal");
        assert_eq!(deal.vendor_name, "b1 Cabs");
        assert_eq!(deal.price, Decimal::new(1_000, 0));
        assert!(deal.verified);

        let records = h.records.records.lock().expect("records lock");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, "happy");
        assert_eq!(records[0].negotiated_price, Some(Decimal::new(1_000, 0)));
    }

    #[tokio::test]
    async fn advancing_while_awaiting_a_decision_is_a_no_op() {
        let h = harness(two_vendors(), ScriptedContact::new().quote("b1", QUOTE));
        let orchestrator = orchestrator(&h);
        orchestrator.submit("idle", request()).await.expect("accepted");
        let before = orchestrator.snapshot("idle").await.expect("snapshot");

        let summary = orchestrator.advance("idle").await.expect("accepted");
        let after = orchestrator.snapshot("idle").await.expect("snapshot");

        assert_eq!(summary.status, SessionStatus::Paused);
        assert_eq!(after.event_count, before.event_count);
        assert_eq!(after.state, before.state);
        assert_eq!(after.last_updated, before.last_updated);
        assert_eq!(h.contact.briefs().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn continue_moves_to_next_vendor_and_reports_running_mid_call() {
        let contact = ScriptedContact { hold: Some("b2".into()), ..ScriptedContact::default() }
            .quote("b1", QUOTE);
        let h = harness(two_vendors(), contact);
        let started = h.contact.started.clone();
        let release = h.contact.release.clone();
        let orchestrator = Arc::new(orchestrator(&h));

        let paused = orchestrator.submit("scenario-c", request()).await.expect("accepted");
        assert_eq!(paused.stage, WorkflowStage::CallDecision);

        let driver = orchestrator.clone();
        let pending = tokio::spawn(async move {
            let action = SessionAction::CallDecision { decision: DecisionChoice::Continue };
            driver.submit("scenario-c", action).await
        });

        started.notified().await;
        let mid_call = orchestrator.snapshot("scenario-c").await.expect("snapshot");
        assert_eq!(mid_call.status, SessionStatus::Running);
        assert_eq!(mid_call.state.stage, WorkflowStage::ContactLoop);
        assert_eq!(mid_call.state.negotiation.current_vendor_index, 1);
        assert!(mid_call.state.should_continue);

        release.notify_one();
        let done = pending.await.expect("join").expect("accepted");

        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.best_deal.map(|deal| deal.vendor_name), Some("b1 Cabs".to_string()));
        assert_eq!(h.contact.briefs().len(), 2);
        // unconfirmed when the confirmation call cannot be placed
        let snapshot = orchestrator.snapshot("scenario-c").await.expect("snapshot");
        assert!(!snapshot.state.best_deal.expect("deal").verified);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_submits_on_one_session_place_a_single_call() {
        let contact = ScriptedContact { hold: Some("b1".into()), ..ScriptedContact::default() }
            .quote("b1", QUOTE);
        let h = harness(two_vendors(), contact);
        let (started, release) = (h.contact.started.clone(), h.contact.release.clone());
        let orchestrator = Arc::new(orchestrator(&h));

        let racers: Vec<_> = [request(), SessionAction::Run]
            .into_iter()
            .map(|action| {
                let driver = orchestrator.clone();
                tokio::spawn(async move { driver.submit("twin", action).await })
            })
            .collect();

        started.notified().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.contact.briefs().len(), 1);
        let mid_call = orchestrator.snapshot("twin").await.expect("snapshot");
        assert_eq!(mid_call.status, SessionStatus::Running);

        release.notify_one();
        for racer in racers {
            racer.await.expect("join").expect("accepted");
        }

        assert_eq!(h.contact.briefs().len(), 1);
        let snapshot = orchestrator.snapshot("twin").await.expect("snapshot");
        assert_eq!(snapshot.status, SessionStatus::Paused);
        assert_eq!(snapshot.state.stage, WorkflowStage::CallDecision);
        let events = &snapshot.recent_events;
        let started_calls = events.iter().filter(|e| e.kind == EventKind::CallStarted).count();
        assert_eq!(started_calls, 1);
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::CallDecisionRequired));
        assert!(events.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn held_call_in_one_session_does_not_block_another() {
        let contact = ScriptedContact { hold: Some("slow".into()), ..ScriptedContact::default() }
            .quote("b1", QUOTE);
        let h = harness(two_vendors(), contact);
        let (started, release) = (h.contact.started.clone(), h.contact.release.clone());
        let orchestrator = Arc::new(orchestrator(&h));

        let driver = orchestrator.clone();
        let slow = tokio::spawn(async move { driver.submit("slow", request()).await });
        started.notified().await;

        let fast = orchestrator.submit("fast", request());
        let fast = tokio::time::timeout(Duration::from_secs(5), fast)
            .await
            .expect("not blocked by the other session")
            .expect("accepted");
        assert_eq!(fast.stage, WorkflowStage::CallDecision);
        let waiting = orchestrator.status("slow").await.expect("status");
        assert_eq!(waiting.status, SessionStatus::Running);

        release.notify_one();
        let slow = slow.await.expect("join").expect("accepted");
        assert_eq!(slow.stage, WorkflowStage::CallDecision);
        assert_eq!(h.contact.briefs().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delete_during_a_call_waits_and_the_next_submit_starts_fresh() {
        let contact = ScriptedContact { hold: Some("b1".into()), ..ScriptedContact::default() }
            .quote("b1", QUOTE);
        let h = harness(two_vendors(), contact);
        let (started, release) = (h.contact.started.clone(), h.contact.release.clone());
        let orchestrator = Arc::new(orchestrator(&h));

        let driver = orchestrator.clone();
        let first = tokio::spawn(async move { driver.submit("race", request()).await });
        started.notified().await;

        let driver = orchestrator.clone();
        let deleting = tokio::spawn(async move { driver.delete("race").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let driver = orchestrator.clone();
        let second = tokio::spawn(async move { driver.submit("race", request()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.contact.briefs().len(), 1);
        assert!(!deleting.is_finished());
        assert!(!second.is_finished());

        release.notify_one();
        let first = first.await.expect("join").expect("accepted");
        assert_eq!(first.stage, WorkflowStage::CallDecision);
        assert!(deleting.await.expect("join").expect("valid id"));

        started.notified().await;
        assert_eq!(h.contact.briefs().len(), 2);
        release.notify_one();
        let second = second.await.expect("join").expect("accepted");

        assert_eq!(second.stage, WorkflowStage::CallDecision);
        assert_eq!(second.event_count, first.event_count);
        assert!(second.last_updated > first.last_updated);
        let records = h.records.records.lock().expect("records lock");
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].call_id, records[1].call_id);
    }

    #[tokio::test]
    async fn human_response_recalls_the_same_vendor_with_guidance() {
        let contact = ScriptedContact::new().question("b1", "Do you need a child seat?");
        let h = harness(two_vendors(), contact);
        let orchestrator = orchestrator(&h);

        let paused = orchestrator.submit("hitl", request()).await.expect("accepted");
        assert_eq!(paused.stage, WorkflowStage::HumanInterrupt);
        let interrupt = paused.pending_interrupt.expect("interrupt");
        assert_eq!(interrupt.question.as_deref(), Some("Do you need a child seat?"));
        assert!(!orchestrator.snapshot("hitl").await.expect("snapshot").state.should_continue);

        h.contact.reports.lock().expect("reports lock").insert(
            "b1".into(),
            CallStatusReport {
                transcript: Some(QUOTE.into()),
                ..CallStatusReport::pending(CallState::Ended)
            },
        );
        let resumed = orchestrator
            .submit("hitl", SessionAction::HumanResponse { response: "Yes, one seat".into() })
            .await
            .expect("accepted");

        assert_eq!(resumed.stage, WorkflowStage::CallDecision);
        let briefs = h.contact.briefs();
        assert_eq!(briefs.len(), 2);
        assert_eq!(briefs[1].business.id, "b1");
        assert_eq!(briefs[1].human_guidance.as_deref(), Some("Yes, one seat"));
    }

    #[tokio::test]
    async fn human_response_without_interrupt_is_rejected_without_mutation() {
        let h = harness(two_vendors(), ScriptedContact::new().quote("b1", QUOTE));
        let orchestrator = orchestrator(&h);
        orchestrator.submit("strict", request()).await.expect("accepted");
        let before = orchestrator.snapshot("strict").await.expect("snapshot");

        let result = orchestrator
            .submit("strict", SessionAction::HumanResponse { response: "hello".into() })
            .await;

        assert!(matches!(result, Err(InputError::InvalidState { .. })));
        let after = orchestrator.snapshot("strict").await.expect("snapshot");
        assert_eq!(after.state, before.state);
        assert_eq!(after.event_count, before.event_count);
    }

    #[tokio::test]
    async fn reset_from_any_stage_returns_to_an_empty_intake() {
        let h = harness(two_vendors(), ScriptedContact::new().quote("b1", QUOTE));
        let orchestrator = orchestrator(&h);
        orchestrator.submit("scenario-d", request()).await.expect("accepted");
        let handle = orchestrator.store().get("scenario-d").await.expect("exists");
        let (_, mut live) = handle.subscribe();

        let summary = orchestrator.submit("scenario-d", SessionAction::Reset).await.expect("reset");

        assert_eq!(summary.stage, WorkflowStage::Intake);
        assert_eq!(summary.status, SessionStatus::Paused);
        assert_eq!(summary.event_count, 0);
        assert_eq!(summary.business_count, 0);
        assert_eq!(live.recv().await.expect("announcement").kind, EventKind::SessionReset);
        assert!(orchestrator.snapshot("scenario-d").await.expect("snapshot").state.should_continue);
    }

    #[tokio::test]
    async fn fatal_step_errors_end_the_session_until_reset() {
        let h = harness(two_vendors(), ScriptedContact::new());
        let orchestrator = orchestrator(&h);
        let handle = orchestrator.store().get_or_create("broken").await.expect("create");
        {
            let guard = handle.lock().await;
            let mut state = guard.snapshot().state.clone();
            state.stage = WorkflowStage::ContactLoop;
            guard.commit(state, Vec::new(), SessionStatus::Paused);
        }

        let failed = orchestrator.advance("broken").await.expect("accepted");
        assert_eq!(failed.status, SessionStatus::Error);
        assert_eq!(failed.stage, WorkflowStage::Error);
        let snapshot = orchestrator.snapshot("broken").await.expect("snapshot");
        assert_eq!(
            snapshot.recent_events.last().map(|event| event.kind),
            Some(EventKind::AgentError)
        );
        assert!(snapshot.state.errors.iter().any(|error| !error.recoverable));

        let again = orchestrator.advance("broken").await.expect("no-op");
        assert_eq!(again.event_count, failed.event_count);
        assert!(matches!(
            orchestrator.submit("broken", SessionAction::SearchBusinesses).await,
            Err(InputError::SessionFailed(_))
        ));

        let reset = orchestrator.submit("broken", SessionAction::Reset).await.expect("reset");
        assert_eq!(reset.status, SessionStatus::Paused);
    }

    #[tokio::test]
    async fn skip_verification_is_recorded_without_advancing() {
        let h = harness(two_vendors(), ScriptedContact::new().quote("b1", QUOTE));
        let orchestrator = orchestrator(&h);

        let summary =
            orchestrator.submit("quiet", SessionAction::SkipVerification).await.expect("ok");
        assert_eq!(summary.stage, WorkflowStage::Intake);
        assert_eq!(summary.event_count, 1);

        orchestrator.submit("quiet", request()).await.expect("accepted");
        let done = orchestrator
            .submit("quiet", SessionAction::CallDecision { decision: DecisionChoice::Stop })
            .await
            .expect("accepted");
        assert_eq!(done.status, SessionStatus::Completed);
        let snapshot = orchestrator.snapshot("quiet").await.expect("snapshot");
        assert!(snapshot
            .recent_events
            .iter()
            .any(|event| event.kind == EventKind::VerificationSkipped));
    }

    #[tokio::test]
    async fn unknown_sessions_and_bad_ids_are_input_errors() {
        let h = harness(two_vendors(), ScriptedContact::new());
        let orchestrator = orchestrator(&h);

        assert!(matches!(orchestrator.status("ghost").await, Err(InputError::SessionNotFound(_))));
        assert!(matches!(
            orchestrator.submit("no/slashes", SessionAction::Run).await,
            Err(InputError::InvalidSessionId(_))
        ));
        assert!(!orchestrator.delete("ghost").await.expect("valid id"));
    }
}
