use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::domain::business::Business;
use crate::domain::requirements::ServiceRequirements;
use crate::domain::research::{
    ComponentScores, InsightSource, PriceBand, PriceIntelligence, ReviewAnalysis,
};
use crate::ports::{ReasoningRequest, ReasoningService, ReasoningTask};

use super::{decimal_from, parse_json_reply, Insight};

const NEGOTIATOR_SYSTEM: &str = "You plan phone negotiations with local service vendors. \
Reply with a single JSON object and nothing else.";

#[derive(Clone, Debug, PartialEq)]
pub struct StrategyPlan {
    pub strategy: String,
    pub target_band: PriceBand,
    pub source: InsightSource,
}

#[derive(Debug, Deserialize)]
struct StrategyReply {
    strategy: String,
    target_low: f64,
    target_high: f64,
}

#[derive(Clone)]
pub struct StrategyGenerator {
    reasoning: Arc<dyn ReasoningService>,
}

impl StrategyGenerator {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }

    pub async fn generate(
        &self,
        requirements: &ServiceRequirements,
        business: &Business,
        analysis: &ReviewAnalysis,
        scores: &ComponentScores,
        intelligence: &PriceIntelligence,
    ) -> Insight<StrategyPlan> {
        let prompt = format!(
            "Request: {request}\n\
             Vendor: {name} (distance {distance}, rating {rating} from {reviews} reviews)\n\
             Scores out of 100: proximity {proximity:.0}, rating {rating_score:.0}, \
             professionalism {professionalism:.0}, price {price:.0}\n\
             Review summary: {summary}\n\
             Market band: {low}-{high} {currency}\n\n\
             Respond as {{\"strategy\": string, \"target_low\": number, \"target_high\": number}}.",
            request = requirements.describe(),
            name = business.name,
            distance = business
                .distance_km
                .map_or_else(|| "unknown".to_string(), |km| format!("{km:.1} km")),
            rating = business.rating.map_or_else(|| "n/a".to_string(), |r| format!("{r:.1}")),
            reviews = business.review_count,
            proximity = scores.proximity,
            rating_score = scores.rating,
            professionalism = scores.professionalism,
            price = scores.price,
            summary = analysis.summary,
            low = intelligence.baseline.low,
            high = intelligence.baseline.high,
            currency = intelligence.currency,
        );
        let request =
            ReasoningRequest::new(ReasoningTask::NegotiationStrategy, NEGOTIATOR_SYSTEM, prompt);

        let reason = match self.reasoning.invoke(request).await {
            Ok(reply) => match parse_strategy_reply(&reply, &intelligence.baseline) {
                Ok(plan) => return Insight::direct(plan),
                Err(reason) => reason,
            },
            Err(error) => error.to_string(),
        };

        warn!(
            event_name = "ranking.strategy.fallback",
            business_id = %business.id,
            reason = %reason,
            "using default negotiation strategy"
        );
        Insight::degraded(
            StrategyPlan {
                strategy: default_strategy(business, analysis, scores, intelligence),
                target_band: intelligence.baseline,
                source: InsightSource::Fallback,
            },
            reason,
        )
    }
}

fn parse_strategy_reply(reply: &str, baseline: &PriceBand) -> Result<StrategyPlan, String> {
    let parsed: StrategyReply = parse_json_reply(reply)?;
    let strategy = parsed.strategy.trim().to_string();
    if strategy.is_empty() {
        return Err("empty strategy text".to_string());
    }
    let low = decimal_from(parsed.target_low).ok_or("target_low is not a number")?;
    let high = decimal_from(parsed.target_high).ok_or("target_high is not a number")?;
    let band = PriceBand::new(low, high);
    if !is_plausible(&band, baseline) {
        return Err(format!(
            "target band {low}-{high} is implausible against market band {}-{}",
            baseline.low, baseline.high
        ));
    }
    Ok(StrategyPlan { strategy, target_band: band, source: InsightSource::Reasoning })
}

/// A target band must be ordered, positive and within half to one and a half
/// times the market band.
fn is_plausible(band: &PriceBand, baseline: &PriceBand) -> bool {
    let floor = baseline.low * Decimal::new(5, 1);
    let ceiling = baseline.high * Decimal::new(15, 1);
    band.is_well_formed() && band.low >= floor && band.high <= ceiling
}

pub fn default_strategy(
    business: &Business,
    analysis: &ReviewAnalysis,
    scores: &ComponentScores,
    intelligence: &PriceIntelligence,
) -> String {
    let mut lines = vec![format!(
        "Open near {low} {currency} and do not accept more than {ceiling} {currency}.",
        low = intelligence.baseline.low,
        ceiling = intelligence.reference_price(),
        currency = intelligence.currency,
    )];

    if scores.price <= 40.0 {
        lines.push(
            "Reviews call them expensive, so mention cheaper quotes from nearby vendors."
                .to_string(),
        );
    } else if scores.price >= 100.0 {
        lines.push(
            "They are known to be affordable; confirm there are no add-on fees.".to_string(),
        );
    }
    if scores.proximity >= 80.0 {
        lines.push(format!(
            "{} is close to the pickup point; ask for a lower fare given the short dead mileage.",
            business.name
        ));
    }
    if scores.rating >= 80.0 {
        lines.push(
            "Acknowledge their strong reviews, then ask for an advance-booking discount."
                .to_string(),
        );
    }
    if !analysis.red_flags.is_empty() {
        lines.push(format!(
            "Get the final price and timing confirmed explicitly (reviews mention {}).",
            analysis.red_flags.join(", ")
        ));
    }

    lines.join(" ")
}
