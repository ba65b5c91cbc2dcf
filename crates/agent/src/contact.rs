//! Deterministic stand-in for an outbound telephony provider.
//!
//! Every call rings for a configurable number of polls and then ends with a
//! scripted transcript: the vendor opens at the top of the target band and
//! settles at its midpoint, or at the bottom when the caller can cite a
//! cheaper benchmark. Transport bookings without a passenger count get an
//! open question instead, unless the requester already left guidance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use haggle_core::domain::call_record::CallState;
use haggle_core::domain::research::PriceBand;
use haggle_core::ports::{
    CallBrief, CallHandle, CallStatusReport, CollaboratorError, ContactService,
};

const SERVICE: &str = "contact";
pub const PASSENGER_QUESTION: &str = "How many passengers will travel?";

struct SimulatedCall {
    brief: CallBrief,
    placed_at: DateTime<Utc>,
    polls: u32,
}

pub struct SimulatedContactService {
    default_band: PriceBand,
    rings: u32,
    /// Calls still ringing. An entry is dropped once its final report is handed out.
    calls: Mutex<HashMap<String, SimulatedCall>>,
}

impl SimulatedContactService {
    /// `rings` is how many status polls report the call as still in progress.
    pub fn new(default_band: PriceBand, rings: u32) -> Self {
        Self { default_band, rings, calls: Mutex::new(HashMap::new()) }
    }

    fn conclude(&self, call: &SimulatedCall) -> CallStatusReport {
        let brief = &call.brief;
        let vendor = &brief.business.name;
        let mut report = CallStatusReport::pending(CallState::Ended);
        report.started_at = Some(call.placed_at);
        report.ended_at = Some(Utc::now());
        report.ended_reason = Some("customer-ended-call".to_string());

        if brief.requirements.is_transport()
            && brief.requirements.passengers.is_none()
            && brief.human_guidance.is_none()
        {
            report.transcript = Some(format!(
                "Vendor: {vendor} here. Before I quote, {}",
                PASSENGER_QUESTION.to_ascii_lowercase()
            ));
            report.summary = Some(format!("{vendor} needs the passenger count before quoting"));
            report.open_question = Some(PASSENGER_QUESTION.to_string());
            return report;
        }

        let band = brief.target_band.filter(PriceBand::is_well_formed).unwrap_or(self.default_band);
        let opening = whole(band.high);
        let settled = match brief.benchmark {
            Some(benchmark) if benchmark <= band.midpoint() => whole(band.low),
            _ => whole(band.midpoint()),
        };

        report.transcript = Some(format!(
            "Vendor: for {} it will be Rs {opening}. Me: that is above what others quoted. \
             Vendor: okay, final Rs {settled}.",
            brief.requirements.describe()
        ));
        report.summary =
            Some(format!("{vendor} opened at Rs {opening} and settled at Rs {settled}"));
        report
    }
}

fn whole(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[async_trait]
impl ContactService for SimulatedContactService {
    async fn place_call(&self, brief: CallBrief) -> Result<CallHandle, CollaboratorError> {
        if brief.business.phone.as_deref().map_or(true, |phone| phone.trim().is_empty()) {
            return Err(CollaboratorError::invalid(
                SERVICE,
                format!("{} has no phone number", brief.business.name),
            ));
        }

        let call_id = format!("sim-{}", Uuid::new_v4());
        info!(
            event_name = "contact.call.placed",
            session_id = %brief.session_id,
            call_id = %call_id,
            vendor = %brief.business.name,
            "simulated call placed"
        );
        let call = SimulatedCall { brief, placed_at: Utc::now(), polls: 0 };
        self.calls.lock().await.insert(call_id.clone(), call);
        Ok(CallHandle { call_id, status: CallState::Queued })
    }

    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, CollaboratorError> {
        let unknown = || CollaboratorError::NotFound { service: SERVICE, id: call_id.to_string() };
        let mut calls = self.calls.lock().await;
        let call = calls.get_mut(call_id).ok_or_else(unknown)?;

        call.polls += 1;
        if call.polls <= self.rings {
            let mut report = CallStatusReport::pending(CallState::InProgress);
            report.started_at = Some(call.placed_at);
            return Ok(report);
        }

        let call = calls.remove(call_id).ok_or_else(unknown)?;
        drop(calls);
        let report = self.conclude(&call);
        debug!(
            event_name = "contact.call.ended",
            session_id = %call.brief.session_id,
            call_id = %call_id,
            "simulated call ended"
        );
        Ok(report)
    }
}
