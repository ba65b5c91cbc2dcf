use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::business::Business;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Professionalism {
    High,
    Medium,
    Low,
}

impl std::str::FromStr for Professionalism {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" | "moderate" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown professionalism level `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePerception {
    Cheap,
    Fair,
    Expensive,
    Unknown,
}

impl std::str::FromStr for PricePerception {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cheap" | "low" | "affordable" => Ok(Self::Cheap),
            "fair" | "reasonable" | "average" => Ok(Self::Fair),
            "expensive" | "high" | "overpriced" => Ok(Self::Expensive),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(format!("unknown price perception `{other}`")),
        }
    }
}

/// Where a derived research value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Reasoning,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAnalysis {
    pub business_id: String,
    pub professionalism: Professionalism,
    pub red_flags: Vec<String>,
    pub price_perception: PricePerception,
    pub summary: String,
    pub source: InsightSource,
}

impl ReviewAnalysis {
    /// Used when a candidate has no analysis at all.
    pub fn neutral(business_id: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            professionalism: Professionalism::Medium,
            red_flags: Vec::new(),
            price_perception: PricePerception::Unknown,
            summary: "No review signals available.".to_string(),
            source: InsightSource::Fallback,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBand {
    pub low: Decimal,
    pub high: Decimal,
}

impl PriceBand {
    pub fn new(low: Decimal, high: Decimal) -> Self {
        Self { low, high }
    }

    pub fn midpoint(&self) -> Decimal {
        ((self.low + self.high) / Decimal::TWO).round_dp(2).normalize()
    }

    pub fn is_well_formed(&self) -> bool {
        self.low > Decimal::ZERO && self.low <= self.high
    }
}

/// Market-level price summary shared by every candidate in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceIntelligence {
    pub baseline: PriceBand,
    pub typical: Option<Decimal>,
    pub currency: String,
    pub notes: String,
    pub source: InsightSource,
}

impl PriceIntelligence {
    /// Typical price when one was reported, otherwise the baseline midpoint.
    pub fn reference_price(&self) -> Decimal {
        self.typical.unwrap_or_else(|| self.baseline.midpoint())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub proximity: f64,
    pub rating: f64,
    pub professionalism: f64,
    pub price: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedVendor {
    pub business: Business,
    pub composite_score: u32,
    pub rank: usize,
    pub scores: ComponentScores,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub negotiation_strategy: String,
    pub estimated_price_range: PriceBand,
    pub preferred: bool,
    pub strategy_source: InsightSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorRanking {
    pub vendors: Vec<RankedVendor>,
    pub criteria: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchSummary {
    pub price_intelligence: Option<PriceIntelligence>,
    /// Keyed by business id.
    pub review_analysis: BTreeMap<String, ReviewAnalysis>,
    pub ranking: Option<VendorRanking>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{PriceBand, PricePerception, Professionalism};

    #[test]
    fn labels_parse_leniently() {
        assert_eq!("HIGH".parse::<Professionalism>(), Ok(Professionalism::High));
        assert_eq!("moderate".parse::<Professionalism>(), Ok(Professionalism::Medium));
        assert_eq!(" overpriced ".parse::<PricePerception>(), Ok(PricePerception::Expensive));
        assert!("sparkly".parse::<PricePerception>().is_err());
    }

    #[test]
    fn price_band_midpoint_and_shape() {
        let band = PriceBand::new(Decimal::new(800, 0), Decimal::new(1_100, 0));
        assert_eq!(band.midpoint(), Decimal::new(950, 0));
        assert!(band.is_well_formed());
        assert!(!PriceBand::new(Decimal::new(5, 0), Decimal::new(4, 0)).is_well_formed());
    }
}
