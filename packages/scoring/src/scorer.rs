//! Impact / urgency / severity model.
//!
//! Each category contributes its `close` weight when the nearest point is
//! within `close_km`, its `near` weight when within `near_km`, and nothing
//! otherwise. Urgency additionally receives synergy bonuses for category
//! pairs that are both within `near_km`. Both sums are clamped to
//! `[0, 1]` and blended into a 0-5 severity.

use std::collections::BTreeMap;

use verifix_severity_models::{
    SENTINEL_DISTANCE_KM, SeverityAssessment, SeverityLevel, SeverityParameters, TierWeights,
};

/// Scores one location from its per-category nearest distances.
///
/// Categories missing from `distances` are treated as having no points.
/// Thresholds are compared against the unrounded distances.
#[must_use]
pub fn score(distances: &BTreeMap<String, f64>, params: &SeverityParameters) -> SeverityAssessment {
    let impact_a = tiered_sum(&params.impact_weights, distances, params).clamp(0.0, 1.0);

    let mut urgency = tiered_sum(&params.urgency_weights, distances, params);
    for rule in &params.synergy {
        if distance_to(distances, &rule.first) <= params.near_km
            && distance_to(distances, &rule.second) <= params.near_km
        {
            urgency += rule.bonus;
        }
    }
    let urgency_b = urgency.clamp(0.0, 1.0);

    let severity = combine(impact_a, urgency_b, params.w_a, params.w_b);
    let level = SeverityLevel::from_severity(severity, &params.buckets);

    SeverityAssessment {
        impact_a,
        urgency_b,
        severity,
        level,
    }
}

/// Weighted 0-5 blend of impact and urgency.
///
/// A zero total weight is replaced by 1 in the denominator.
#[must_use]
pub fn combine(impact_a: f64, urgency_b: f64, w_a: f64, w_b: f64) -> f64 {
    let total = w_a + w_b;
    let denominator = if total > 0.0 { total } else { 1.0 };
    5.0 * w_a.mul_add(impact_a, w_b * urgency_b) / denominator
}

fn tiered_sum(
    weights: &BTreeMap<String, TierWeights>,
    distances: &BTreeMap<String, f64>,
    params: &SeverityParameters,
) -> f64 {
    weights
        .iter()
        .map(|(category, w)| {
            let d = distance_to(distances, category);
            if d <= params.close_km {
                w.close
            } else if d <= params.near_km {
                w.near
            } else {
                0.0
            }
        })
        .sum()
}

fn distance_to(distances: &BTreeMap<String, f64>, category: &str) -> f64 {
    distances
        .get(category)
        .copied()
        .unwrap_or(SENTINEL_DISTANCE_KM)
}
