//! In-memory collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Notify;

use crate::domain::business::{Business, GeoPoint};
use crate::domain::call_record::{CallRecord, CallRecordPatch, CallState};
use crate::domain::research::PriceBand;
use crate::flows::{NegotiationWorkflow, WorkflowSettings};
use crate::ports::{
    BusinessDirectory, CallBrief, CallHandle, CallRecordStore, CallStatusReport, Collaborators,
    CollaboratorError, ContactService, ReasoningRequest, ReasoningService, SearchLocation,
};

pub struct FakeDirectory {
    pub businesses: Vec<Business>,
    pub fail: bool,
}

impl FakeDirectory {
    pub fn with(businesses: Vec<Business>) -> Arc<Self> {
        Arc::new(Self { businesses, fail: false })
    }
}

#[async_trait]
impl BusinessDirectory for FakeDirectory {
    async fn search(
        &self,
        _service_kind: &str,
        _location: &SearchLocation,
        _radius_km: f64,
    ) -> Result<Vec<Business>, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::unavailable("directory", "maintenance window"));
        }
        Ok(self.businesses.clone())
    }

    async fn geocode(&self, _address: &str) -> Result<Option<GeoPoint>, CollaboratorError> {
        Ok(Some(GeoPoint::new(12.9698, 77.75)))
    }
}

/// Answers each vendor with a canned report; unknown vendors end without a quote.
#[derive(Default)]
pub struct ScriptedContact {
    pub reports: Mutex<HashMap<String, CallStatusReport>>,
    pub briefs: Mutex<Vec<CallBrief>>,
    pub confirm: Option<bool>,
    /// Placing a call to this business fails outright.
    pub unreachable: Option<String>,
    /// Calls to this business, or placed by this session, block until `release` is notified.
    pub hold: Option<String>,
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedContact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote(self, business_id: &str, transcript: &str) -> Self {
        self.script(
            business_id,
            CallStatusReport {
                transcript: Some(transcript.to_string()),
                summary: Some(format!("{business_id} quoted")),
                ..CallStatusReport::pending(CallState::Ended)
            },
        )
    }

    pub fn question(self, business_id: &str, question: &str) -> Self {
        self.script(
            business_id,
            CallStatusReport {
                open_question: Some(question.to_string()),
                ..CallStatusReport::pending(CallState::Ended)
            },
        )
    }

    pub fn script(self, business_id: &str, report: CallStatusReport) -> Self {
        self.reports.lock().expect("reports lock").insert(business_id.to_string(), report);
        self
    }

    pub fn briefs(&self) -> Vec<CallBrief> {
        self.briefs.lock().expect("briefs lock").clone()
    }
}

#[async_trait]
impl ContactService for ScriptedContact {
    async fn place_call(&self, brief: CallBrief) -> Result<CallHandle, CollaboratorError> {
        let business_id = brief.business.id.clone();
        let held = self
            .hold
            .as_deref()
            .is_some_and(|hold| hold == business_id || hold == brief.session_id);
        if self.unreachable.as_deref() == Some(business_id.as_str()) {
            return Err(CollaboratorError::unavailable("contact", "number not reachable"));
        }
        let call_number = {
            let mut briefs = self.briefs.lock().expect("briefs lock");
            briefs.push(brief);
            briefs.len()
        };
        if held {
            self.started.notify_one();
            self.release.notified().await;
        }
        let call_id = format!("{business_id}#{call_number}");
        Ok(CallHandle { call_id, status: CallState::Queued })
    }

    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, CollaboratorError> {
        let business_id = call_id.split('#').next().unwrap_or_default();
        Ok(self
            .reports
            .lock()
            .expect("reports lock")
            .get(business_id)
            .cloned()
            .unwrap_or_else(|| CallStatusReport::pending(CallState::Ended)))
    }

    async fn confirm_deal(
        &self,
        _deal: &crate::domain::negotiation::Deal,
        _requirements: &crate::domain::requirements::ServiceRequirements,
    ) -> Result<bool, CollaboratorError> {
        self.confirm
            .ok_or_else(|| CollaboratorError::unavailable("contact", "confirmation line busy"))
    }
}

pub struct OfflineReasoning;

#[async_trait]
impl ReasoningService for OfflineReasoning {
    async fn invoke(&self, _request: ReasoningRequest) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::unavailable("reasoning", "offline"))
    }
}

#[derive(Default)]
pub struct MemoryCallRecords {
    pub records: Mutex<Vec<CallRecord>>,
}

#[async_trait]
impl CallRecordStore for MemoryCallRecords {
    async fn create(&self, record: CallRecord) -> Result<(), CollaboratorError> {
        self.records.lock().expect("records lock").push(record);
        Ok(())
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, CollaboratorError> {
        Ok(self
            .records
            .lock()
            .expect("records lock")
            .iter()
            .find(|record| record.call_id == call_id)
            .cloned())
    }

    async fn update(
        &self,
        call_id: &str,
        patch: CallRecordPatch,
    ) -> Result<Option<CallRecord>, CollaboratorError> {
        let mut records = self.records.lock().expect("records lock");
        Ok(records.iter_mut().find(|record| record.call_id == call_id).map(|record| {
            record.apply(patch);
            record.clone()
        }))
    }

    async fn delete(&self, call_id: &str) -> Result<bool, CollaboratorError> {
        let mut records = self.records.lock().expect("records lock");
        let before = records.len();
        records.retain(|record| record.call_id != call_id);
        Ok(records.len() != before)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CallRecord>, CollaboratorError> {
        let records = self.records.lock().expect("records lock");
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

pub fn business(id: &str, distance_km: f64, rating: f64, review_count: u32) -> Business {
    Business {
        id: id.to_string(),
        name: format!("{id} Cabs"),
        phone: Some(format!("+91-80-{id}")),
        distance_km: Some(distance_km),
        rating: Some(rating),
        review_count,
        ..Business::default()
    }
}

pub fn settings() -> WorkflowSettings {
    WorkflowSettings {
        search_radius_km: 15.0,
        max_candidates: 10,
        max_calls: 10,
        poll_interval: Duration::from_millis(1),
        max_polls: 3,
        fallback_band: PriceBand::new(Decimal::new(500, 0), Decimal::new(1_500, 0)),
        currency: "INR".to_string(),
    }
}

pub struct Harness {
    pub contact: Arc<ScriptedContact>,
    pub records: Arc<MemoryCallRecords>,
    pub workflow: NegotiationWorkflow,
}

pub fn harness(directory: Arc<FakeDirectory>, contact: ScriptedContact) -> Harness {
    let contact = Arc::new(contact);
    let records = Arc::new(MemoryCallRecords::default());
    let collaborators = Collaborators {
        directory,
        contact: contact.clone(),
        reasoning: Arc::new(OfflineReasoning),
        call_records: records.clone(),
    };
    Harness { contact, records, workflow: NegotiationWorkflow::new(collaborators, settings()) }
}

pub fn cab_request() -> crate::domain::requirements::ServiceRequirements {
    serde_json::from_value(serde_json::json!({
        "service": "cab",
        "from": "Whitefield",
        "to": "Airport",
        "date": "tomorrow"
    }))
    .expect("cab request")
}
