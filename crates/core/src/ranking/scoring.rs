//! Pure component scores, each on a 0-100 scale.

use crate::domain::business::Business;
use crate::domain::research::{ComponentScores, PricePerception, Professionalism, ReviewAnalysis};

use super::{DEFAULT_WEIGHTS, RATING_PRIOR, RATING_PRIOR_WEIGHT};

/// Weights for the composite score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub proximity: f64,
    pub rating: f64,
    pub professionalism: f64,
    pub price: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl ScoringWeights {
    pub fn describe(&self) -> String {
        format!(
            "proximity {:.0}%, rating {:.0}%, professionalism {:.0}%, price perception {:.0}%",
            self.proximity * 100.0,
            self.rating * 100.0,
            self.professionalism * 100.0,
            self.price * 100.0
        )
    }
}

/// Step function over distance. Unknown distances score as mid-range.
pub fn proximity_score(distance_km: Option<f64>) -> f64 {
    let Some(distance) = distance_km.filter(|value| !value.is_nan()) else {
        return 50.0;
    };
    match distance {
        d if d <= 1.0 => 100.0,
        d if d <= 2.0 => 90.0,
        d if d <= 3.0 => 80.0,
        d if d <= 5.0 => 70.0,
        d if d <= 10.0 => 50.0,
        d if d <= 15.0 => 30.0,
        _ => 10.0,
    }
}

/// Bayesian average of the rating, shrunk toward the prior by review volume.
pub fn rating_score(rating: Option<f64>, review_count: u32) -> f64 {
    let Some(rating) = rating.filter(|value| value.is_finite()) else {
        return RATING_PRIOR / 5.0 * 100.0;
    };
    let rating = rating.clamp(0.0, 5.0);
    let count = f64::from(review_count);
    let shrunk =
        (rating * count + RATING_PRIOR * RATING_PRIOR_WEIGHT) / (count + RATING_PRIOR_WEIGHT);
    shrunk / 5.0 * 100.0
}

pub fn professionalism_score(level: Professionalism, red_flags: usize) -> f64 {
    let base: f64 = match level {
        Professionalism::High => 100.0,
        Professionalism::Medium => 70.0,
        Professionalism::Low => 40.0,
    };
    (base - 10.0 * red_flags as f64).max(0.0)
}

pub fn price_score(perception: PricePerception) -> f64 {
    match perception {
        PricePerception::Cheap => 100.0,
        PricePerception::Fair => 75.0,
        PricePerception::Expensive => 40.0,
        PricePerception::Unknown => 60.0,
    }
}

pub fn component_scores(business: &Business, analysis: &ReviewAnalysis) -> ComponentScores {
    ComponentScores {
        proximity: proximity_score(business.distance_km),
        rating: rating_score(business.rating, business.review_count),
        professionalism: professionalism_score(analysis.professionalism, analysis.red_flags.len()),
        price: price_score(analysis.price_perception),
    }
}

pub fn composite_score(scores: &ComponentScores, weights: &ScoringWeights) -> u32 {
    let total = scores.proximity * weights.proximity
        + scores.rating * weights.rating
        + scores.professionalism * weights.professionalism
        + scores.price * weights.price;
    total.round().clamp(0.0, 100.0) as u32
}

/// Human-readable rationale derived only from the component scores.
pub fn strengths_and_weaknesses(
    business: &Business,
    analysis: &ReviewAnalysis,
    scores: &ComponentScores,
) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();

    match business.distance_km {
        Some(distance) if scores.proximity >= 80.0 => {
            strengths.push(format!("Close by ({distance:.1} km away)"));
        }
        Some(distance) if scores.proximity <= 30.0 => {
            weaknesses.push(format!("Far away ({distance:.1} km)"));
        }
        None => weaknesses.push("Distance unknown".to_string()),
        _ => {}
    }

    if scores.rating >= 80.0 {
        strengths.push(format!(
            "Well rated ({:.1}/5 across {} reviews)",
            business.rating.unwrap_or_default(),
            business.review_count
        ));
    } else if scores.rating < 55.0 {
        weaknesses.push("Below-average rating".to_string());
    } else if business.review_count < 10 {
        weaknesses.push("Few reviews to judge by".to_string());
    }

    if scores.professionalism >= 90.0 {
        strengths.push("Reviewers describe the service as professional".to_string());
    } else if scores.professionalism <= 40.0 {
        weaknesses.push("Professionalism concerns in reviews".to_string());
    }
    for flag in &analysis.red_flags {
        weaknesses.push(format!("Red flag: {flag}"));
    }

    match analysis.price_perception {
        PricePerception::Cheap => strengths.push("Perceived as affordable".to_string()),
        PricePerception::Fair => strengths.push("Perceived as fairly priced".to_string()),
        PricePerception::Expensive => weaknesses.push("Perceived as expensive".to_string()),
        PricePerception::Unknown => {}
    }

    (strengths, weaknesses)
}
