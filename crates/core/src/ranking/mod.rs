//! Vendor ranking
//!
//! Scores every candidate on proximity, rating, professionalism and price
//! perception, orders them, promotes preferred vendors and attaches a
//! negotiation strategy to each.

mod engine;
mod matching;
mod research;
mod scoring;
mod strategy;

pub use engine::{RankingReport, VendorRankingEngine};
pub use matching::{is_preferred, normalize_vendor_name};
pub use research::{ResearchAnalyst, ResearchBundle};
pub use scoring::{
    composite_score, price_score, professionalism_score, proximity_score, rating_score,
    strengths_and_weaknesses, ScoringWeights,
};
pub use strategy::{default_strategy, StrategyGenerator, StrategyPlan};

use serde::de::DeserializeOwned;

/// Default composite weights.
pub const DEFAULT_WEIGHTS: ScoringWeights =
    ScoringWeights { proximity: 0.20, rating: 0.25, professionalism: 0.30, price: 0.25 };

/// Neutral prior used when shrinking ratings toward the middle.
pub const RATING_PRIOR: f64 = 3.0;

/// How many reviews the prior is worth.
pub const RATING_PRIOR_WEIGHT: f64 = 10.0;

/// A delegated result together with the reason it was degraded, if it was.
#[derive(Clone, Debug, PartialEq)]
pub struct Insight<T> {
    pub value: T,
    pub fallback_reason: Option<String>,
}

impl<T> Insight<T> {
    pub fn direct(value: T) -> Self {
        Self { value, fallback_reason: None }
    }

    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self { value, fallback_reason: Some(reason.into()) }
    }
}

/// Reasoning replies are free text that usually wraps one JSON object.
pub(crate) fn parse_json_reply<T>(reply: &str) -> Result<T, String>
where
    T: DeserializeOwned,
{
    let start = reply.find('{').ok_or_else(|| "reply contains no JSON object".to_string())?;
    let end = reply.rfind('}').ok_or_else(|| "reply contains no JSON object".to_string())?;
    if end < start {
        return Err("reply contains no JSON object".to_string());
    }
    serde_json::from_str(&reply[start..=end]).map_err(|error| format!("unparseable reply: {error}"))
}

pub(crate) fn decimal_from(value: f64) -> Option<rust_decimal::Decimal> {
    if !value.is_finite() {
        return None;
    }
    rust_decimal::Decimal::try_from(value).ok().map(|decimal| decimal.round_dp(2))
}
