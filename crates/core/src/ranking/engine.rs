use std::collections::BTreeMap;

use futures_util::future::join_all;
use tracing::info;

use crate::domain::business::Business;
use crate::domain::requirements::ServiceRequirements;
use crate::domain::research::{
    ComponentScores, PriceIntelligence, RankedVendor, ReviewAnalysis, VendorRanking,
};

use super::matching::is_preferred;
use super::scoring::{component_scores, composite_score, strengths_and_weaknesses, ScoringWeights};
use super::strategy::StrategyGenerator;

#[derive(Clone, Debug, PartialEq)]
pub struct RankingReport {
    pub ranking: VendorRanking,
    pub fallback_reasons: Vec<String>,
}

#[derive(Clone)]
pub struct VendorRankingEngine {
    weights: ScoringWeights,
    strategy: StrategyGenerator,
}

struct ScoredCandidate {
    business: Business,
    analysis: ReviewAnalysis,
    scores: ComponentScores,
    composite: u32,
    preferred: bool,
}

impl VendorRankingEngine {
    pub fn new(strategy: StrategyGenerator) -> Self {
        Self { weights: ScoringWeights::default(), strategy }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub async fn rank(
        &self,
        requirements: &ServiceRequirements,
        businesses: &[Business],
        reviews: &BTreeMap<String, ReviewAnalysis>,
        intelligence: &PriceIntelligence,
    ) -> RankingReport {
        let ordered = self.order(requirements, businesses, reviews);

        let plans = join_all(ordered.iter().map(|candidate| {
            self.strategy.generate(
                requirements,
                &candidate.business,
                &candidate.analysis,
                &candidate.scores,
                intelligence,
            )
        }))
        .await;

        let mut fallback_reasons = Vec::new();
        let vendors = ordered
            .into_iter()
            .zip(plans)
            .enumerate()
            .map(|(index, (candidate, plan))| {
                if let Some(reason) = plan.fallback_reason {
                    fallback_reasons
                        .push(format!("strategy for {}: {reason}", candidate.business.name));
                }
                let (strengths, weaknesses) = strengths_and_weaknesses(
                    &candidate.business,
                    &candidate.analysis,
                    &candidate.scores,
                );
                RankedVendor {
                    business: candidate.business,
                    composite_score: candidate.composite,
                    rank: index + 1,
                    scores: candidate.scores,
                    strengths,
                    weaknesses,
                    negotiation_strategy: plan.value.strategy,
                    estimated_price_range: plan.value.target_band,
                    preferred: candidate.preferred,
                    strategy_source: plan.value.source,
                }
            })
            .collect::<Vec<_>>();

        info!(
            event_name = "ranking.completed",
            vendor_count = vendors.len(),
            degraded = fallback_reasons.len(),
            "vendor ranking completed"
        );

        RankingReport {
            ranking: VendorRanking { vendors, criteria: self.criteria(requirements) },
            fallback_reasons,
        }
    }

    fn order(
        &self,
        requirements: &ServiceRequirements,
        businesses: &[Business],
        reviews: &BTreeMap<String, ReviewAnalysis>,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = businesses
            .iter()
            .map(|business| {
                let analysis = reviews
                    .get(&business.id)
                    .cloned()
                    .unwrap_or_else(|| ReviewAnalysis::neutral(business.id.clone()));
                let scores = component_scores(business, &analysis);
                ScoredCandidate {
                    composite: composite_score(&scores, &self.weights),
                    preferred: is_preferred(&business.name, &requirements.preferred_vendors),
                    business: business.clone(),
                    analysis,
                    scores,
                }
            })
            .collect();

        // sort_by is stable: equal scores keep directory order
        scored.sort_by(|left, right| right.composite.cmp(&left.composite));

        let (mut preferred, rest): (Vec<_>, Vec<_>) =
            scored.into_iter().partition(|candidate| candidate.preferred);
        preferred.extend(rest);
        preferred
    }

    fn criteria(&self, requirements: &ServiceRequirements) -> String {
        let mut criteria = format!("Weighted composite: {}.", self.weights.describe());
        if !requirements.preferred_vendors.is_empty() {
            criteria.push_str(" Preferred vendors are called first.");
        }
        criteria
    }
}
