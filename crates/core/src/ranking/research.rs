use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use tracing::warn;

use crate::domain::business::Business;
use crate::domain::requirements::ServiceRequirements;
use crate::domain::research::{
    InsightSource, PriceBand, PriceIntelligence, PricePerception, Professionalism, ReviewAnalysis,
};
use crate::ports::{ReasoningRequest, ReasoningService, ReasoningTask};

use super::{decimal_from, parse_json_reply, Insight};

const RED_FLAGS: &[(&str, &str)] = &[
    ("rude", "rude staff"),
    ("late", "late arrival"),
    ("overcharg", "overcharging"),
    ("cancel", "cancellations"),
    ("unsafe", "unsafe driving"),
    ("dirty", "dirty vehicle"),
    ("scam", "scam reports"),
    ("no show", "no-shows"),
    ("hidden charge", "hidden charges"),
];

const POSITIVE_SIGNALS: &[&str] =
    &["professional", "polite", "on time", "punctual", "courteous", "clean"];

const CHEAP_WORDS: &[&str] = &["cheap", "affordable", "value for money", "low price", "budget"];
const EXPENSIVE_WORDS: &[&str] = &["expensive", "overpriced", "costly", "pricey"];
const FAIR_WORDS: &[&str] = &["fair price", "reasonable", "fairly priced", "worth"];

const ANALYST_SYSTEM: &str = "You are a market research analyst for local service bookings. \
Reply with a single JSON object and nothing else.";

/// Market and review research shared by the ranking stage.
#[derive(Clone, Debug, PartialEq)]
pub struct ResearchBundle {
    pub price_intelligence: PriceIntelligence,
    pub review_analysis: BTreeMap<String, ReviewAnalysis>,
    pub fallback_reasons: Vec<String>,
}

#[derive(Clone)]
pub struct ResearchAnalyst {
    reasoning: Arc<dyn ReasoningService>,
    fallback_band: PriceBand,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PriceReply {
    low: f64,
    high: f64,
    #[serde(default)]
    typical: Option<f64>,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReviewReply {
    professionalism: String,
    red_flags: Vec<String>,
    price_perception: String,
    summary: String,
}

impl ResearchAnalyst {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        fallback_band: PriceBand,
        currency: impl Into<String>,
    ) -> Self {
        Self { reasoning, fallback_band, currency: currency.into() }
    }

    pub async fn research(
        &self,
        requirements: &ServiceRequirements,
        businesses: &[Business],
    ) -> ResearchBundle {
        let intelligence = self.price_intelligence(requirements, businesses).await;
        let analyses =
            join_all(businesses.iter().map(|business| self.review_analysis(requirements, business)))
                .await;

        let mut fallback_reasons = Vec::new();
        if let Some(reason) = intelligence.fallback_reason {
            fallback_reasons.push(format!("price intelligence: {reason}"));
        }

        let mut review_analysis = BTreeMap::new();
        for (business, analysis) in businesses.iter().zip(analyses) {
            if let Some(reason) = analysis.fallback_reason {
                fallback_reasons.push(format!("review analysis for {}: {reason}", business.name));
            }
            review_analysis.insert(business.id.clone(), analysis.value);
        }

        ResearchBundle { price_intelligence: intelligence.value, review_analysis, fallback_reasons }
    }

    pub async fn price_intelligence(
        &self,
        requirements: &ServiceRequirements,
        businesses: &[Business],
    ) -> Insight<PriceIntelligence> {
        let prompt = format!(
            "Estimate the going market rate in {currency} for: {request}.\n\
             {count} local vendors were found.\n\
             Respond as {{\"low\": number, \"high\": number, \"typical\": number, \"notes\": string}}.",
            currency = self.currency,
            request = requirements.describe(),
            count = businesses.len(),
        );
        let request =
            ReasoningRequest::new(ReasoningTask::PriceIntelligence, ANALYST_SYSTEM, prompt);

        let reason = match self.reasoning.invoke(request).await {
            Ok(reply) => match self.parse_price_reply(&reply) {
                Ok(intelligence) => return Insight::direct(intelligence),
                Err(reason) => reason,
            },
            Err(error) => error.to_string(),
        };

        warn!(
            event_name = "research.price_intelligence.fallback",
            reason = %reason,
            "using configured price band"
        );
        Insight::degraded(self.fallback_intelligence(), reason)
    }

    pub async fn review_analysis(
        &self,
        requirements: &ServiceRequirements,
        business: &Business,
    ) -> Insight<ReviewAnalysis> {
        if business.reviews.is_empty() {
            return Insight::direct(analyze_reviews(business));
        }

        let prompt = format!(
            "Vendor: {name}\nRequest: {request}\nReviews:\n- {reviews}\n\n\
             Respond as {{\"professionalism\": \"high|medium|low\", \"red_flags\": [string], \
             \"price_perception\": \"cheap|fair|expensive|unknown\", \"summary\": string}}.",
            name = business.name,
            request = requirements.describe(),
            reviews = business.reviews.join("\n- "),
        );
        let request = ReasoningRequest::new(ReasoningTask::ReviewAnalysis, ANALYST_SYSTEM, prompt);

        let reason = match self.reasoning.invoke(request).await {
            Ok(reply) => match parse_review_reply(&business.id, &reply) {
                Ok(analysis) => return Insight::direct(analysis),
                Err(reason) => reason,
            },
            Err(error) => error.to_string(),
        };

        warn!(
            event_name = "research.review_analysis.fallback",
            business_id = %business.id,
            reason = %reason,
            "using keyword review heuristic"
        );
        Insight::degraded(analyze_reviews(business), reason)
    }

    fn parse_price_reply(&self, reply: &str) -> Result<PriceIntelligence, String> {
        let parsed: PriceReply = parse_json_reply(reply)?;
        let low = decimal_from(parsed.low).ok_or("price low is not a number")?;
        let high = decimal_from(parsed.high).ok_or("price high is not a number")?;
        let baseline = PriceBand::new(low, high);
        if !baseline.is_well_formed() {
            return Err(format!("implausible price band {low}-{high}"));
        }
        let typical = parsed
            .typical
            .and_then(decimal_from)
            .filter(|typical| *typical >= baseline.low && *typical <= baseline.high);

        Ok(PriceIntelligence {
            baseline,
            typical,
            currency: self.currency.clone(),
            notes: parsed.notes,
            source: InsightSource::Reasoning,
        })
    }

    fn fallback_intelligence(&self) -> PriceIntelligence {
        PriceIntelligence {
            baseline: self.fallback_band,
            typical: Some(self.fallback_band.midpoint()),
            currency: self.currency.clone(),
            notes: "Market estimate unavailable; using the configured default band.".to_string(),
            source: InsightSource::Fallback,
        }
    }
}

fn parse_review_reply(business_id: &str, reply: &str) -> Result<ReviewAnalysis, String> {
    let parsed: ReviewReply = parse_json_reply(reply)?;
    let professionalism = parsed.professionalism.parse::<Professionalism>()?;
    let price_perception = parsed.price_perception.parse::<PricePerception>()?;
    let red_flags = parsed
        .red_flags
        .into_iter()
        .map(|flag| flag.trim().to_string())
        .filter(|flag| !flag.is_empty())
        .collect();

    Ok(ReviewAnalysis {
        business_id: business_id.to_string(),
        professionalism,
        red_flags,
        price_perception,
        summary: parsed.summary,
        source: InsightSource::Reasoning,
    })
}

/// Keyword heuristic used when no reasoning reply is usable.
pub(crate) fn analyze_reviews(business: &Business) -> ReviewAnalysis {
    if business.reviews.is_empty() {
        return ReviewAnalysis::neutral(business.id.clone());
    }

    let corpus: Vec<String> = business.reviews.iter().map(|review| review.to_lowercase()).collect();
    let mentions = |needle: &str| corpus.iter().any(|review| review.contains(needle));
    let count = |words: &[&str]| {
        corpus
            .iter()
            .map(|review| words.iter().filter(|word| review.contains(**word)).count())
            .sum::<usize>()
    };

    let red_flags: Vec<String> = RED_FLAGS
        .iter()
        .filter(|(needle, _)| mentions(needle))
        .map(|(_, label)| label.to_string())
        .collect();
    let positives = POSITIVE_SIGNALS.iter().filter(|signal| mentions(signal)).count();

    let professionalism = if positives >= 2 && red_flags.is_empty() {
        Professionalism::High
    } else if red_flags.len() >= 2 {
        Professionalism::Low
    } else {
        Professionalism::Medium
    };

    let (cheap, expensive, fair) = (count(CHEAP_WORDS), count(EXPENSIVE_WORDS), count(FAIR_WORDS));
    let price_perception = if cheap + expensive + fair == 0 {
        PricePerception::Unknown
    } else if expensive > cheap && expensive > fair {
        PricePerception::Expensive
    } else if cheap > expensive && cheap > fair {
        PricePerception::Cheap
    } else {
        PricePerception::Fair
    };

    let summary = format!(
        "{} reviews scanned: {} positive signal(s), {} red flag(s).",
        business.reviews.len(),
        positives,
        red_flags.len()
    );

    ReviewAnalysis {
        business_id: business.id.clone(),
        professionalism,
        red_flags,
        price_perception,
        summary,
        source: InsightSource::Fallback,
    }
}
