//! Contracts for the external collaborators the workflow delegates to.
//!
//! Every method is a suspension point. Failures come back as
//! [`CollaboratorError`] and are turned into recoverable stage errors by the
//! caller, never propagated as fatal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::business::{Business, GeoPoint};
use crate::domain::call_record::{CallRecord, CallRecordPatch, CallState};
use crate::domain::negotiation::Deal;
use crate::domain::requirements::ServiceRequirements;
use crate::domain::research::PriceBand;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} is unavailable: {message}")]
    Unavailable { service: &'static str, message: String },
    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse { service: &'static str, message: String },
    #[error("{service} has no record `{id}`")]
    NotFound { service: &'static str, id: String },
    #[error("{service} timed out after {waited_ms}ms")]
    Timeout { service: &'static str, waited_ms: u64 },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable { service, message: message.into() }
    }

    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse { service, message: message.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchLocation {
    pub address: String,
    pub point: Option<GeoPoint>,
}

#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    async fn search(
        &self,
        service_kind: &str,
        location: &SearchLocation,
        radius_km: f64,
    ) -> Result<Vec<Business>, CollaboratorError>;

    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, CollaboratorError>;
}

/// Everything the telephony side needs to run one negotiation call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallBrief {
    pub session_id: String,
    pub business: Business,
    pub requirements: ServiceRequirements,
    pub strategy: String,
    pub target_band: Option<PriceBand>,
    /// Best price seen so far in this session, used as leverage.
    pub benchmark: Option<Decimal>,
    pub human_guidance: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHandle {
    pub call_id: String,
    pub status: CallState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatusReport {
    pub status: CallState,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    /// Set when the vendor asked something only the requester can answer.
    pub open_question: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_reason: Option<String>,
    pub recording_url: Option<String>,
}

impl CallStatusReport {
    pub fn pending(status: CallState) -> Self {
        Self {
            status,
            transcript: None,
            summary: None,
            open_question: None,
            started_at: None,
            ended_at: None,
            ended_reason: None,
            recording_url: None,
        }
    }
}

#[async_trait]
pub trait ContactService: Send + Sync {
    async fn place_call(&self, brief: CallBrief) -> Result<CallHandle, CollaboratorError>;

    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, CollaboratorError>;

    /// Re-confirms the agreed terms with the vendor. Providers without a
    /// confirmation channel accept the deal as negotiated.
    async fn confirm_deal(
        &self,
        _deal: &Deal,
        _requirements: &ServiceRequirements,
    ) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningTask {
    NegotiationStrategy,
    PriceIntelligence,
    ReviewAnalysis,
    PriceExtraction,
    Learnings,
}

impl ReasoningTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NegotiationStrategy => "negotiation_strategy",
            Self::PriceIntelligence => "price_intelligence",
            Self::ReviewAnalysis => "review_analysis",
            Self::PriceExtraction => "price_extraction",
            Self::Learnings => "learnings",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub task: ReasoningTask,
    pub system: String,
    pub prompt: String,
}

impl ReasoningRequest {
    pub fn new(task: ReasoningTask, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { task, system: system.into(), prompt: prompt.into() }
    }
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn invoke(&self, request: ReasoningRequest) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn create(&self, record: CallRecord) -> Result<(), CollaboratorError>;

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, CollaboratorError>;

    async fn update(
        &self,
        call_id: &str,
        patch: CallRecordPatch,
    ) -> Result<Option<CallRecord>, CollaboratorError>;

    async fn delete(&self, call_id: &str) -> Result<bool, CollaboratorError>;

    async fn list_recent(&self, limit: usize) -> Result<Vec<CallRecord>, CollaboratorError>;
}

/// The full set of adapters a workflow needs.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn BusinessDirectory>,
    pub contact: Arc<dyn ContactService>,
    pub reasoning: Arc<dyn ReasoningService>,
    pub call_records: Arc<dyn CallRecordStore>,
}
