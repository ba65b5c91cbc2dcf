use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResultKind {
    Quoted,
    NoQuote,
    NeedsInput,
    Failed,
}

/// What happened on one call to one vendor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub vendor_index: usize,
    pub business_id: String,
    pub vendor_name: String,
    pub vendor_phone: Option<String>,
    pub call_id: Option<String>,
    pub kind: CallResultKind,
    pub quoted_price: Option<Decimal>,
    pub negotiated_price: Option<Decimal>,
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

impl CallOutcome {
    pub fn effective_price(&self) -> Option<Decimal> {
        self.negotiated_price.or(self.quoted_price)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub business_id: String,
    pub vendor_name: String,
    pub vendor_phone: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub call_id: Option<String>,
    pub summary: String,
    pub verified: bool,
}

impl Deal {
    pub fn from_outcome(outcome: &CallOutcome, currency: &str) -> Option<Self> {
        let price = outcome.effective_price()?;
        Some(Self {
            business_id: outcome.business_id.clone(),
            vendor_name: outcome.vendor_name.clone(),
            vendor_phone: outcome.vendor_phone.clone(),
            price,
            currency: currency.to_string(),
            call_id: outcome.call_id.clone(),
            summary: outcome.summary.clone(),
            verified: false,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationState {
    pub current_vendor_index: usize,
    pub outcomes: Vec<CallOutcome>,
    pub best_deal: Option<Deal>,
    pub calls_placed: u32,
    /// Human answer to forward on the next call to the current vendor.
    pub human_guidance: Option<String>,
    pub learnings: Option<String>,
}

impl NegotiationState {
    /// Lowest effective price across quoted outcomes; earlier quotes win ties.
    pub fn best_outcome(&self) -> Option<&CallOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.kind == CallResultKind::Quoted)
            .filter(|outcome| outcome.effective_price().is_some())
            .fold(None, |best: Option<&CallOutcome>, candidate| match best {
                Some(current) if current.effective_price() <= candidate.effective_price() => {
                    Some(current)
                }
                _ => Some(candidate),
            })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInterrupt {
    pub active: bool,
    pub question: Option<String>,
    pub reason: Option<String>,
    pub vendor_name: Option<String>,
    pub response: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionChoice {
    Continue,
    Stop,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDecision {
    pub awaiting_decision: bool,
    pub last_call_summary: Option<String>,
    pub vendors_remaining: usize,
    pub current_best_price: Option<Decimal>,
    pub current_best_vendor: Option<String>,
    pub decision: Option<DecisionChoice>,
}
