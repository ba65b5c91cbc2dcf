use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::domain::call_record::{CallRecord, CallState};
use crate::domain::negotiation::{CallOutcome, CallResultKind, Deal, HumanInterrupt};
use crate::domain::research::{PriceBand, RankedVendor};
use crate::errors::WorkflowError;
use crate::events::{agents, AgentEvent, EventKind};
use crate::flows::interpret::{CallInterpretation, CallInterpreter};
use crate::flows::states::{StepControl, StepOutcome, WorkflowStage, WorkflowState};
use crate::ports::{
    CallBrief, CallStatusReport, Collaborators, CollaboratorError, ReasoningRequest,
    ReasoningTask, SearchLocation,
};
use crate::ranking::{Insight, ResearchAnalyst, StrategyGenerator, VendorRankingEngine};

const LEARNING_SYSTEM: &str = "You review finished price negotiations and write short, \
practical lessons for the next negotiation. Reply in plain text.";

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowSettings {
    pub search_radius_km: f64,
    pub max_candidates: usize,
    pub max_calls: u32,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub fallback_band: PriceBand,
    pub currency: String,
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            search_radius_km: config.search_radius_km,
            max_candidates: config.max_candidates,
            max_calls: config.max_calls_per_session,
            poll_interval: Duration::from_millis(config.call_poll_interval_ms),
            max_polls: config.call_max_polls,
            fallback_band: PriceBand::new(config.fallback_price_low, config.fallback_price_high),
            currency: config.currency.clone(),
        }
    }
}

/// Stage sequencer. `step` runs exactly one stage and reports whether the
/// caller should keep pulling.
#[derive(Clone)]
pub struct NegotiationWorkflow {
    collaborators: Collaborators,
    analyst: ResearchAnalyst,
    ranking: VendorRankingEngine,
    interpreter: CallInterpreter,
    settings: WorkflowSettings,
}

impl NegotiationWorkflow {
    pub fn new(collaborators: Collaborators, settings: WorkflowSettings) -> Self {
        let reasoning = collaborators.reasoning.clone();
        Self {
            analyst: ResearchAnalyst::new(
                reasoning.clone(),
                settings.fallback_band,
                settings.currency.clone(),
            ),
            ranking: VendorRankingEngine::new(StrategyGenerator::new(reasoning.clone())),
            interpreter: CallInterpreter::new(reasoning),
            collaborators,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub async fn step(
        &self,
        session_id: &str,
        current: &WorkflowState,
    ) -> Result<StepOutcome, WorkflowError> {
        let mut state = current.clone();
        let stage = state.stage;

        let (events, control) = match stage {
            WorkflowStage::Intake => self.intake(&mut state),
            WorkflowStage::Search => self.search(&mut state).await,
            WorkflowStage::Research => self.research(&mut state).await,
            WorkflowStage::Ranking => self.rank(&mut state).await?,
            WorkflowStage::ContactLoop => self.contact(session_id, &mut state).await?,
            WorkflowStage::HumanInterrupt | WorkflowStage::CallDecision => {
                return Ok(StepOutcome { state, events: Vec::new(), control: StepControl::Pause });
            }
            WorkflowStage::Learning => self.learn(&mut state).await,
            WorkflowStage::Verification => self.verify(&mut state).await?,
            WorkflowStage::Completed | WorkflowStage::Error => {
                return Ok(StepOutcome { state, events: Vec::new(), control: StepControl::Finish });
            }
        };

        if control != StepControl::Continue {
            state.should_continue = false;
        }

        info!(
            event_name = "workflow.stage.completed",
            session_id = %session_id,
            from = stage.as_str(),
            to = state.stage.as_str(),
            control = ?control,
            event_count = events.len(),
            "workflow step finished"
        );

        Ok(StepOutcome { state, events, control })
    }

    fn intake(&self, state: &mut WorkflowState) -> (Vec<AgentEvent>, StepControl) {
        state.hand_off(agents::INTAKE);
        let missing = state.requirements.missing_fields();
        if !missing.is_empty() {
            let event = AgentEvent::new(
                EventKind::RequirementsIncomplete,
                agents::INTAKE,
                format!("Need more details before searching: {}", missing.join(", ")),
            )
            .with_payload(json!({ "missing_fields": missing }));
            return (vec![event], StepControl::Pause);
        }

        state.stage = WorkflowStage::Search;
        let event = AgentEvent::new(
            EventKind::StageCompleted,
            agents::INTAKE,
            format!("Requirements complete: {}", state.requirements.describe()),
        )
        .with_payload(json!({ "stage": WorkflowStage::Intake, "next": WorkflowStage::Search }));
        (vec![event], StepControl::Continue)
    }

    async fn search(&self, state: &mut WorkflowState) -> (Vec<AgentEvent>, StepControl) {
        state.hand_off(agents::SEARCH);
        let mut events = Vec::new();
        let address = state.requirements.from.clone().unwrap_or_default();

        let point = match self.collaborators.directory.geocode(&address).await {
            Ok(point) => point,
            Err(error) => {
                events.push(
                    state.record_recoverable(agents::SEARCH, format!("geocoding failed: {error}")),
                );
                None
            }
        };
        let location = SearchLocation { address, point };
        let service = state.requirements.service_label().to_string();

        let mut businesses = match self
            .collaborators
            .directory
            .search(&service, &location, self.settings.search_radius_km)
            .await
        {
            Ok(businesses) => businesses,
            Err(error) => {
                let message = format!("vendor search failed: {error}");
                events.push(state.record_recoverable(agents::SEARCH, message));
                return (events, StepControl::Pause);
            }
        };

        businesses.truncate(self.settings.max_candidates);
        if let Some(origin) = point {
            for business in &mut businesses {
                if business.distance_km.is_none() {
                    business.distance_km =
                        business.location.map(|location| origin.distance_km(&location));
                }
            }
        }

        state.businesses = businesses;
        state.stage = WorkflowStage::Research;

        if state.businesses.is_empty() {
            events.push(state.record_recoverable(
                agents::SEARCH,
                format!("No {service} vendors found near {}", location.address),
            ));
            return (events, StepControl::Pause);
        }

        events.push(
            AgentEvent::new(
                EventKind::SearchCompleted,
                agents::SEARCH,
                format!("Found {} {service} vendor(s)", state.businesses.len()),
            )
            .with_payload(json!({
                "count": state.businesses.len(),
                "businesses": state.businesses.iter().map(|b| &b.name).collect::<Vec<_>>(),
            })),
        );
        (events, StepControl::Continue)
    }

    async fn research(&self, state: &mut WorkflowState) -> (Vec<AgentEvent>, StepControl) {
        state.hand_off(agents::RESEARCH);
        if state.businesses.is_empty() {
            let event = state.record_recoverable(
                agents::RESEARCH,
                "No vendors to research; update the requirements or search again",
            );
            return (vec![event], StepControl::Pause);
        }

        let bundle = self.analyst.research(&state.requirements, &state.businesses).await;
        let mut events: Vec<AgentEvent> = bundle
            .fallback_reasons
            .iter()
            .map(|reason| state.record_recoverable(agents::RESEARCH, reason.clone()))
            .collect();

        let baseline = bundle.price_intelligence.baseline;
        events.push(
            AgentEvent::new(
                EventKind::ResearchCompleted,
                agents::RESEARCH,
                format!(
                    "Market range {}-{} {}; analysed reviews for {} vendor(s)",
                    baseline.low,
                    baseline.high,
                    bundle.price_intelligence.currency,
                    bundle.review_analysis.len()
                ),
            )
            .with_payload(json!({
                "price_intelligence": bundle.price_intelligence,
                "analysed": bundle.review_analysis.len(),
            })),
        );

        state.research.price_intelligence = Some(bundle.price_intelligence);
        state.research.review_analysis = bundle.review_analysis;
        state.research.ranking = None;
        state.stage = WorkflowStage::Ranking;
        (events, StepControl::Continue)
    }

    async fn rank(
        &self,
        state: &mut WorkflowState,
    ) -> Result<(Vec<AgentEvent>, StepControl), WorkflowError> {
        state.hand_off(agents::RANKING);
        if state.businesses.is_empty() {
            let event = state.record_recoverable(agents::RANKING, "No vendors to rank");
            return Ok((vec![event], StepControl::Pause));
        }
        let intelligence = state.research.price_intelligence.clone().ok_or_else(|| {
            WorkflowError::InvariantViolation("ranking entered without price intelligence".into())
        })?;

        let report = self
            .ranking
            .rank(
                &state.requirements,
                &state.businesses,
                &state.research.review_analysis,
                &intelligence,
            )
            .await;
        let mut events: Vec<AgentEvent> = report
            .fallback_reasons
            .iter()
            .map(|reason| state.record_recoverable(agents::RANKING, reason.clone()))
            .collect();

        let top = report
            .ranking
            .vendors
            .iter()
            .map(|vendor| {
                json!({
                    "rank": vendor.rank,
                    "name": vendor.business.name,
                    "score": vendor.composite_score,
                    "preferred": vendor.preferred,
                })
            })
            .collect::<Vec<_>>();
        events.push(
            AgentEvent::new(
                EventKind::RankingCompleted,
                agents::RANKING,
                format!("Ranked {} vendor(s)", report.ranking.vendors.len()),
            )
            .with_payload(json!({ "criteria": report.ranking.criteria, "vendors": top })),
        );

        state.research.ranking = Some(report.ranking);
        state.negotiation = Default::default();
        state.best_deal = None;
        state.stage = WorkflowStage::ContactLoop;
        Ok((events, StepControl::Continue))
    }

    async fn contact(
        &self,
        session_id: &str,
        state: &mut WorkflowState,
    ) -> Result<(Vec<AgentEvent>, StepControl), WorkflowError> {
        state.hand_off(agents::CALLING);
        let ranking = state.research.ranking.as_ref().ok_or(WorkflowError::MissingRanking)?;
        let index = state.negotiation.current_vendor_index;

        let exhausted = index >= ranking.vendors.len();
        // a recall carrying the requester's answer is not held to the cap
        let answering = state.negotiation.human_guidance.is_some();
        let capped = !answering && state.negotiation.calls_placed >= self.settings.max_calls;
        if exhausted || capped {
            let reason = if exhausted {
                "All ranked vendors have been contacted"
            } else {
                "Call limit for this session reached"
            };
            state.stage = WorkflowStage::Learning;
            let event = AgentEvent::new(EventKind::VendorsExhausted, agents::CALLING, reason)
                .with_payload(json!({ "calls_placed": state.negotiation.calls_placed }));
            return Ok((vec![event], StepControl::Continue));
        }

        let vendor = ranking.vendors[index].clone();
        let brief = CallBrief {
            session_id: session_id.to_string(),
            business: vendor.business.clone(),
            requirements: state.requirements.clone(),
            strategy: vendor.negotiation_strategy.clone(),
            target_band: Some(vendor.estimated_price_range),
            benchmark: state.best_deal.as_ref().map(|deal| deal.price),
            human_guidance: state.negotiation.human_guidance.take(),
        };

        let mut events = Vec::new();
        let handle = match self.collaborators.contact.place_call(brief).await {
            Ok(handle) => handle,
            Err(error) => {
                events.push(state.record_recoverable(
                    agents::CALLING,
                    format!("could not call {}: {error}", vendor.business.name),
                ));
                let interpretation = CallInterpretation {
                    kind: CallResultKind::Failed,
                    quoted_price: None,
                    negotiated_price: None,
                    summary: error.to_string(),
                    question: None,
                };
                events.push(self.record_outcome(state, &vendor, None, &interpretation));
                state.negotiation.current_vendor_index += 1;
                return Ok((events, StepControl::Continue));
            }
        };

        state.negotiation.calls_placed += 1;
        events.push(
            AgentEvent::new(
                EventKind::CallStarted,
                agents::CALLING,
                format!("Calling {} (rank {})", vendor.business.name, vendor.rank),
            )
            .with_payload(json!({
                "call_id": handle.call_id,
                "vendor": vendor.business.name,
                "vendor_index": index,
            })),
        );

        let report = match self.await_call(&handle.call_id).await {
            Ok(report) => report,
            Err(error) => {
                events.push(state.record_recoverable(agents::CALLING, error.to_string()));
                CallStatusReport {
                    ended_reason: Some(error.to_string()),
                    ..CallStatusReport::pending(CallState::Failed)
                }
            }
        };

        let Insight { value: interpretation, fallback_reason } =
            self.interpreter.interpret(&vendor.business.name, &report).await;
        if let Some(reason) = fallback_reason {
            events.push(
                state.record_recoverable(agents::CALLING, format!("price extraction: {reason}")),
            );
        }

        if let Err(error) = self
            .persist_call(session_id, state, &vendor, &handle.call_id, &report, &interpretation)
            .await
        {
            let message = format!("call record not saved: {error}");
            events.push(state.record_recoverable(agents::CALLING, message));
        }

        events.push(self.record_outcome(state, &vendor, Some(&handle.call_id), &interpretation));

        let control = match interpretation.kind {
            CallResultKind::NeedsInput => {
                let question = interpretation.question.clone().unwrap_or_default();
                state.human_interrupt = HumanInterrupt {
                    active: true,
                    question: Some(question.clone()),
                    reason: Some(format!(
                        "{} asked something only you can answer",
                        vendor.business.name
                    )),
                    vendor_name: Some(vendor.business.name.clone()),
                    response: None,
                    responded_at: None,
                };
                state.stage = WorkflowStage::HumanInterrupt;
                state.hand_off(agents::HUMAN);
                events.push(
                    AgentEvent::new(EventKind::HumanInterrupt, agents::HUMAN, question.clone())
                        .with_payload(json!({
                            "question": question,
                            "vendor": vendor.business.name,
                        })),
                );
                StepControl::Pause
            }
            CallResultKind::Quoted => {
                let best = state
                    .negotiation
                    .best_outcome()
                    .and_then(|outcome| Deal::from_outcome(outcome, &self.settings.currency));
                state.negotiation.best_deal = best.clone();
                state.best_deal = best;

                let remaining = state.vendor_count().saturating_sub(index + 1);
                let decision = &mut state.call_decision;
                decision.awaiting_decision = true;
                decision.decision = None;
                decision.last_call_summary = Some(interpretation.summary.clone());
                decision.vendors_remaining = remaining;
                decision.current_best_price = state.best_deal.as_ref().map(|deal| deal.price);
                decision.current_best_vendor =
                    state.best_deal.as_ref().map(|deal| deal.vendor_name.clone());
                state.stage = WorkflowStage::CallDecision;
                state.hand_off(agents::DECISION);
                events.push(
                    AgentEvent::new(
                        EventKind::CallDecisionRequired,
                        agents::DECISION,
                        format!(
                            "{} quoted; continue with {remaining} remaining vendor(s) or stop?",
                            vendor.business.name
                        ),
                    )
                    .with_payload(json!({
                        "vendors_remaining": remaining,
                        "current_best_price": state.call_decision.current_best_price,
                        "current_best_vendor": state.call_decision.current_best_vendor,
                    })),
                );
                StepControl::Pause
            }
            CallResultKind::NoQuote | CallResultKind::Failed => {
                state.negotiation.current_vendor_index += 1;
                StepControl::Continue
            }
        };

        Ok((events, control))
    }

    /// Polls until the call reaches a terminal status or the poll budget runs out.
    async fn await_call(&self, call_id: &str) -> Result<CallStatusReport, CollaboratorError> {
        let mut last_error = None;
        for attempt in 0..self.settings.max_polls.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
            match self.collaborators.contact.call_status(call_id).await {
                Ok(report) if report.status.is_terminal() => return Ok(report),
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        event_name = "workflow.call.status_failed",
                        call_id = %call_id,
                        error = %error,
                        "call status poll failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(CollaboratorError::Timeout {
            service: "contact",
            waited_ms: self.settings.poll_interval.as_millis() as u64
                * u64::from(self.settings.max_polls),
        }))
    }

    async fn persist_call(
        &self,
        session_id: &str,
        state: &WorkflowState,
        vendor: &RankedVendor,
        call_id: &str,
        report: &CallStatusReport,
        interpretation: &CallInterpretation,
    ) -> Result<(), CollaboratorError> {
        let now = Utc::now();
        let duration_secs = match (report.started_at, report.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0)),
            _ => None,
        };
        self.collaborators
            .call_records
            .create(CallRecord {
                call_id: call_id.to_string(),
                session_id: session_id.to_string(),
                vendor_name: vendor.business.name.clone(),
                vendor_phone: vendor.business.phone.clone(),
                started_at: report.started_at,
                ended_at: report.ended_at,
                duration_secs,
                status: report.status,
                ended_reason: report.ended_reason.clone(),
                requirements: state.requirements.clone(),
                quoted_price: interpretation.quoted_price,
                negotiated_price: interpretation.negotiated_price,
                transcript: report.transcript.clone(),
                recording_url: report.recording_url.clone(),
                notes: Some(interpretation.summary.clone()),
                created_at: now,
                updated_at: now,
            })
            .await
    }

    fn record_outcome(
        &self,
        state: &mut WorkflowState,
        vendor: &RankedVendor,
        call_id: Option<&str>,
        interpretation: &CallInterpretation,
    ) -> AgentEvent {
        let outcome = CallOutcome {
            vendor_index: state.negotiation.current_vendor_index,
            business_id: vendor.business.id.clone(),
            vendor_name: vendor.business.name.clone(),
            vendor_phone: vendor.business.phone.clone(),
            call_id: call_id.map(str::to_string),
            kind: interpretation.kind,
            quoted_price: interpretation.quoted_price,
            negotiated_price: interpretation.negotiated_price,
            summary: interpretation.summary.clone(),
            recorded_at: Utc::now(),
        };
        let kind = if outcome.kind == CallResultKind::Failed {
            EventKind::CallFailed
        } else {
            EventKind::CallCompleted
        };
        let event = AgentEvent::new(
            kind,
            agents::CALLING,
            format!("{}: {}", outcome.vendor_name, outcome.summary),
        )
        .with_payload(json!({
            "call_id": outcome.call_id,
            "result": outcome.kind,
            "quoted_price": outcome.quoted_price,
            "negotiated_price": outcome.negotiated_price,
        }));
        state.negotiation.outcomes.push(outcome);
        event
    }

    async fn learn(&self, state: &mut WorkflowState) -> (Vec<AgentEvent>, StepControl) {
        state.hand_off(agents::LEARNING);
        let mut events = Vec::new();

        let best = state
            .negotiation
            .best_outcome()
            .and_then(|outcome| Deal::from_outcome(outcome, &self.settings.currency));
        state.negotiation.best_deal = best.clone();
        state.best_deal = best;

        let fallback = fallback_learnings(state);
        let learnings = if state.negotiation.outcomes.is_empty() {
            fallback
        } else {
            let request = ReasoningRequest::new(
                ReasoningTask::Learnings,
                LEARNING_SYSTEM,
                format!(
                    "Request: {}\nOutcomes:\n{}\n\nWhat should the next negotiation do differently?",
                    state.requirements.describe(),
                    outcome_lines(state)
                ),
            );
            match self.collaborators.reasoning.invoke(request).await {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => {
                    events.push(
                        state.record_recoverable(agents::LEARNING, "learnings reply was empty"),
                    );
                    fallback
                }
                Err(error) => {
                    events.push(
                        state.record_recoverable(agents::LEARNING, format!("learnings: {error}")),
                    );
                    fallback
                }
            }
        };
        state.negotiation.learnings = Some(learnings.clone());

        events.push(
            AgentEvent::new(EventKind::LearningCompleted, agents::LEARNING, learnings).with_payload(
                json!({
                    "best_deal": state.best_deal,
                    "calls_placed": state.negotiation.calls_placed,
                }),
            ),
        );

        if state.best_deal.is_some() {
            state.stage = WorkflowStage::Verification;
            return (events, StepControl::Continue);
        }

        state.stage = WorkflowStage::Completed;
        events.push(AgentEvent::new(
            EventKind::WorkflowCompleted,
            agents::ORCHESTRATOR,
            "Negotiation finished without an acceptable quote",
        ));
        (events, StepControl::Finish)
    }

    async fn verify(
        &self,
        state: &mut WorkflowState,
    ) -> Result<(Vec<AgentEvent>, StepControl), WorkflowError> {
        state.hand_off(agents::VERIFICATION);
        let mut deal = state.best_deal.clone().ok_or(WorkflowError::MissingBestDeal)?;
        let mut events = Vec::new();

        if state.skip_verification {
            events.push(AgentEvent::new(
                EventKind::VerificationSkipped,
                agents::VERIFICATION,
                "Verification skipped at the requester's request",
            ));
        } else {
            match self.collaborators.contact.confirm_deal(&deal, &state.requirements).await {
                Ok(confirmed) => {
                    deal.verified = confirmed;
                    let message = if confirmed {
                        format!("{} confirmed {} {}", deal.vendor_name, deal.price, deal.currency)
                    } else {
                        format!("{} did not reconfirm the agreed terms", deal.vendor_name)
                    };
                    events.push(
                        AgentEvent::new(
                            EventKind::VerificationCompleted,
                            agents::VERIFICATION,
                            message,
                        )
                        .with_payload(json!({ "confirmed": confirmed })),
                    );
                }
                Err(error) => {
                    let message = format!("verification: {error}");
                    events.push(state.record_recoverable(agents::VERIFICATION, message));
                }
            }
        }

        state.negotiation.best_deal = Some(deal.clone());
        state.stage = WorkflowStage::Completed;
        events.push(
            AgentEvent::new(
                EventKind::WorkflowCompleted,
                agents::ORCHESTRATOR,
                format!("Best deal: {} at {} {}", deal.vendor_name, deal.price, deal.currency),
            )
            .with_payload(json!({ "best_deal": deal })),
        );
        state.best_deal = Some(deal);
        Ok((events, StepControl::Finish))
    }
}

fn outcome_lines(state: &WorkflowState) -> String {
    state
        .negotiation
        .outcomes
        .iter()
        .map(|outcome| {
            let price = outcome
                .effective_price()
                .map_or_else(|| "no price".to_string(), |price: Decimal| price.to_string());
            format!("- {} ({:?}): {price}. {}", outcome.vendor_name, outcome.kind, outcome.summary)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fallback_learnings(state: &WorkflowState) -> String {
    let outcomes = &state.negotiation.outcomes;
    let quoted = outcomes.iter().filter(|outcome| outcome.kind == CallResultKind::Quoted).count();
    let mut text = format!("Contacted {} vendor(s); {quoted} gave a quote.", outcomes.len());
    if let Some(deal) = &state.best_deal {
        text.push_str(&format!(
            " Best price {} {} from {}.",
            deal.price, deal.currency, deal.vendor_name
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::domain::negotiation::{CallResultKind, Deal};
    use crate::errors::WorkflowError;
    use crate::events::{AgentEvent, EventKind};
    use crate::flows::states::{StepControl, WorkflowStage, WorkflowState};
    use crate::testing::{business, cab_request, harness, FakeDirectory, Harness, ScriptedContact};

    fn kinds(events: &[AgentEvent]) -> Vec<EventKind> {
        events.iter().map(|event| event.kind).collect()
    }

    fn one_vendor() -> Arc<FakeDirectory> {
        FakeDirectory::with(vec![business("b1", 2.0, 4.5, 120)])
    }

    async fn run_to(h: &Harness, target: WorkflowStage) -> WorkflowState {
        let mut state = WorkflowState { requirements: cab_request(), ..WorkflowState::initial() };
        for _ in 0..8 {
            if state.stage == target {
                return state;
            }
            state = h.workflow.step("s1", &state).await.expect("step").state;
        }
        panic!("never reached {target:?}, stuck at {:?}", state.stage);
    }

    fn deal() -> Deal {
        Deal {
            business_id: "b1".to_string(),
            vendor_name: "b1 Cabs".to_string(),
            vendor_phone: None,
            price: Decimal::new(1_100, 0),
            currency: "INR".to_string(),
            call_id: Some("b1#1".to_string()),
            summary: "settled".to_string(),
            verified: false,
        }
    }

    #[tokio::test]
    async fn intake_pauses_until_requirements_are_complete() {
        let h = harness(one_vendor(), ScriptedContact::new());

        let outcome = h.workflow.step("s1", &WorkflowState::initial()).await.expect("step");

        assert_eq!(outcome.control, StepControl::Pause);
        assert_eq!(outcome.state.stage, WorkflowStage::Intake);
        assert!(!outcome.state.should_continue);
        assert_eq!(kinds(&outcome.events), vec![EventKind::RequirementsIncomplete]);

        let ready = WorkflowState { requirements: cab_request(), ..WorkflowState::initial() };
        let outcome = h.workflow.step("s1", &ready).await.expect("step");
        assert_eq!(outcome.control, StepControl::Continue);
        assert_eq!(outcome.state.stage, WorkflowStage::Search);
    }

    #[tokio::test]
    async fn directory_outage_pauses_search_without_failing_the_session() {
        let directory = Arc::new(FakeDirectory { businesses: Vec::new(), fail: true });
        let h = harness(directory, ScriptedContact::new());
        let state = WorkflowState {
            stage: WorkflowStage::Search,
            requirements: cab_request(),
            ..WorkflowState::initial()
        };

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.control, StepControl::Pause);
        assert_eq!(outcome.state.stage, WorkflowStage::Search);
        assert_eq!(kinds(&outcome.events), vec![EventKind::RecoverableError]);
        assert!(outcome.state.errors.iter().all(|error| error.recoverable));
    }

    #[tokio::test]
    async fn search_keeps_at_most_the_candidate_limit() {
        let many: Vec<_> =
            (0..12u32).map(|n| business(&format!("v{n}"), f64::from(n), 4.0, 10)).collect();
        let h = harness(FakeDirectory::with(many), ScriptedContact::new());
        let state = WorkflowState {
            stage: WorkflowStage::Search,
            requirements: cab_request(),
            ..WorkflowState::initial()
        };

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.state.businesses.len(), 10);
        assert_eq!(outcome.state.stage, WorkflowStage::Research);
        assert_eq!(kinds(&outcome.events), vec![EventKind::SearchCompleted]);
    }

    #[tokio::test]
    async fn unreachable_vendor_is_skipped_without_using_a_call() {
        let contact = ScriptedContact { unreachable: Some("b1".into()), ..Default::default() };
        let h = harness(one_vendor(), contact);
        let state = run_to(&h, WorkflowStage::ContactLoop).await;

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.control, StepControl::Continue);
        assert_eq!(outcome.state.negotiation.calls_placed, 0);
        assert_eq!(outcome.state.negotiation.current_vendor_index, 1);
        assert_eq!(
            kinds(&outcome.events),
            vec![EventKind::RecoverableError, EventKind::CallFailed]
        );
        assert_eq!(outcome.state.negotiation.outcomes[0].kind, CallResultKind::Failed);
        assert!(h.records.records.lock().expect("records").is_empty());

        let next = h.workflow.step("s1", &outcome.state).await.expect("step");
        assert_eq!(next.state.stage, WorkflowStage::Learning);
        assert_eq!(kinds(&next.events), vec![EventKind::VendorsExhausted]);
    }

    #[tokio::test]
    async fn call_limit_ends_the_contact_loop() {
        let h = harness(one_vendor(), ScriptedContact::new());
        let mut state = run_to(&h, WorkflowStage::ContactLoop).await;
        state.negotiation.calls_placed = h.workflow.settings().max_calls;

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.state.stage, WorkflowStage::Learning);
        assert_eq!(outcome.events[0].message, "Call limit for this session reached");
        assert!(h.contact.briefs().is_empty());
    }

    #[tokio::test]
    async fn answered_question_is_relayed_even_at_the_call_limit() {
        let vendors = vec![business("b1", 2.0, 4.5, 120), business("b2", 9.0, 3.0, 4)];
        let h = harness(FakeDirectory::with(vendors), ScriptedContact::new());
        let mut state = run_to(&h, WorkflowStage::ContactLoop).await;
        state.negotiation.calls_placed = h.workflow.settings().max_calls;
        state.negotiation.human_guidance = Some("Four passengers".to_string());

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        let briefs = h.contact.briefs();
        assert_eq!(briefs.len(), 1);
        assert_eq!(briefs[0].human_guidance.as_deref(), Some("Four passengers"));
        assert_eq!(outcome.events[0].kind, EventKind::CallStarted);
        assert_eq!(outcome.state.negotiation.human_guidance, None);

        assert_eq!(outcome.state.negotiation.current_vendor_index, 1);
        let next = h.workflow.step("s1", &outcome.state).await.expect("step");
        assert_eq!(next.state.stage, WorkflowStage::Learning);
        assert_eq!(next.events[0].message, "Call limit for this session reached");
        assert_eq!(h.contact.briefs().len(), 1);
    }

    #[tokio::test]
    async fn learning_without_outcomes_completes_without_a_deal() {
        let h = harness(one_vendor(), ScriptedContact::new());
        let state = WorkflowState {
            stage: WorkflowStage::Learning,
            requirements: cab_request(),
            ..WorkflowState::initial()
        };

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.control, StepControl::Finish);
        assert_eq!(outcome.state.stage, WorkflowStage::Completed);
        assert_eq!(outcome.state.best_deal, None);
        assert!(outcome.state.errors.is_empty());
        assert!(outcome.state.negotiation.learnings.is_some());
        assert_eq!(
            kinds(&outcome.events),
            vec![EventKind::LearningCompleted, EventKind::WorkflowCompleted]
        );
    }

    #[tokio::test]
    async fn unconfirmed_verification_leaves_the_deal_unverified() {
        let h = harness(one_vendor(), ScriptedContact::new());
        let state = WorkflowState {
            stage: WorkflowStage::Verification,
            requirements: cab_request(),
            best_deal: Some(deal()),
            ..WorkflowState::initial()
        };

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.state.stage, WorkflowStage::Completed);
        let best = outcome.state.best_deal.expect("deal kept");
        assert!(!best.verified);
        assert_eq!(outcome.state.errors.len(), 1);
        assert_eq!(outcome.state.errors[0].stage, WorkflowStage::Verification);
    }

    #[tokio::test]
    async fn skipped_verification_does_not_call_the_vendor() {
        let contact = ScriptedContact { confirm: Some(true), ..Default::default() };
        let h = harness(one_vendor(), contact);
        let state = WorkflowState {
            stage: WorkflowStage::Verification,
            best_deal: Some(deal()),
            skip_verification: true,
            ..WorkflowState::initial()
        };

        let outcome = h.workflow.step("s1", &state).await.expect("step");

        assert_eq!(outcome.events[0].kind, EventKind::VerificationSkipped);
        assert_eq!(outcome.state.best_deal.map(|deal| deal.verified), Some(false));
    }

    #[tokio::test]
    async fn verification_without_a_deal_is_fatal() {
        let h = harness(one_vendor(), ScriptedContact::new());
        let state =
            WorkflowState { stage: WorkflowStage::Verification, ..WorkflowState::initial() };

        let error = h.workflow.step("s1", &state).await.expect_err("no deal");

        assert_eq!(error, WorkflowError::MissingBestDeal);
    }

    #[tokio::test]
    async fn waiting_stages_pause_without_events() {
        let h = harness(one_vendor(), ScriptedContact::new());
        for stage in [WorkflowStage::HumanInterrupt, WorkflowStage::CallDecision] {
            let state = WorkflowState { stage, ..WorkflowState::initial() };
            let outcome = h.workflow.step("s1", &state).await.expect("step");
            assert_eq!(outcome.control, StepControl::Pause);
            assert!(outcome.events.is_empty());
        }
    }
}
