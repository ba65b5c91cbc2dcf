use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::requirements::ServiceRequirements;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Ended,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Ended | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Ringing => "ringing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for CallState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "queued" => Ok(Self::Queued),
            "ringing" => Ok(Self::Ringing),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "ended" => Ok(Self::Ended),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown call state `{other}`")),
        }
    }
}

/// Durable history entry for one outbound call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub session_id: String,
    pub vendor_name: String,
    pub vendor_phone: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub status: CallState,
    pub ended_reason: Option<String>,
    pub requirements: ServiceRequirements,
    pub quoted_price: Option<Decimal>,
    pub negotiated_price: Option<Decimal>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied after asynchronous enrichment (transcript, prices).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallRecordPatch {
    pub status: Option<CallState>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_reason: Option<String>,
    pub quoted_price: Option<Decimal>,
    pub negotiated_price: Option<Decimal>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub notes: Option<String>,
}

impl CallRecord {
    pub fn apply(&mut self, patch: CallRecordPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ended_at) = patch.ended_at {
            self.ended_at = Some(ended_at);
        }
        if let Some(ended_reason) = patch.ended_reason {
            self.ended_reason = Some(ended_reason);
        }
        if let Some(quoted_price) = patch.quoted_price {
            self.quoted_price = Some(quoted_price);
        }
        if let Some(negotiated_price) = patch.negotiated_price {
            self.negotiated_price = Some(negotiated_price);
        }
        if let Some(transcript) = patch.transcript {
            self.transcript = Some(transcript);
        }
        if let Some(recording_url) = patch.recording_url {
            self.recording_url = Some(recording_url);
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
        self.duration_secs = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0)),
            _ => self.duration_secs,
        };
        self.updated_at = Utc::now();
    }
}
