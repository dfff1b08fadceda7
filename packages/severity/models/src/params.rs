//! Severity scoring parameters and their defaults.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Process-wide default parameters. Read-only; per-call overrides are
/// passed explicitly.
pub static DEFAULT_PARAMS: LazyLock<SeverityParameters> = LazyLock::new(SeverityParameters::default);

/// Weight contributed by a category depending on which distance band the
/// nearest point falls into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    /// Added when the distance is within `close_km`.
    pub close: f64,
    /// Added when the distance is within `near_km` but beyond `close_km`.
    pub near: f64,
}

impl TierWeights {
    #[must_use]
    pub const fn new(close: f64, near: f64) -> Self {
        Self { close, near }
    }
}

/// Urgency bonus applied when two categories are both within `near_km`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyRule {
    pub first: String,
    pub second: String,
    pub bonus: f64,
}

impl SynergyRule {
    #[must_use]
    pub fn new(first: &str, second: &str, bonus: f64) -> Self {
        Self {
            first: first.to_string(),
            second: second.to_string(),
            bonus,
        }
    }
}

/// Tunable inputs of the severity model.
///
/// Deserialization fills any missing field from [`SeverityParameters::default`],
/// so configuration files only need to name what they override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityParameters {
    /// Upper bound (inclusive) of the "close" band, in kilometers.
    pub close_km: f64,
    /// Upper bound (inclusive) of the "near" band, in kilometers.
    pub near_km: f64,
    pub impact_weights: BTreeMap<String, TierWeights>,
    pub urgency_weights: BTreeMap<String, TierWeights>,
    /// Applied in order after the tiered urgency sum.
    pub synergy: Vec<SynergyRule>,
    /// Coefficient of impact in the combined severity.
    #[serde(rename = "wA", alias = "w_a")]
    pub w_a: f64,
    /// Coefficient of urgency in the combined severity.
    #[serde(rename = "wB", alias = "w_b")]
    pub w_b: f64,
    /// Ascending severity cut points for Safe / Moderate / High / Critical.
    pub buckets: [f64; 3],
}

impl Default for SeverityParameters {
    fn default() -> Self {
        let weights = |entries: &[(&str, f64, f64)]| {
            entries
                .iter()
                .map(|(category, close, near)| {
                    ((*category).to_string(), TierWeights::new(*close, *near))
                })
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            close_km: 0.5,
            near_km: 2.0,
            impact_weights: weights(&[
                ("hospital", 1.0, 0.5),
                ("school", 0.8, 0.3),
                ("waterway", 0.5, 0.2),
                ("atm", 0.1, 0.05),
                ("fuel", 0.2, 0.1),
            ]),
            urgency_weights: weights(&[
                ("fuel", 0.7, 0.3),
                ("school", 0.6, 0.2),
                ("hospital", 0.2, 0.1),
                ("waterway", 0.3, 0.1),
                ("atm", 0.05, 0.02),
            ]),
            synergy: vec![
                SynergyRule::new("fuel", "school", 0.5),
                SynergyRule::new("fuel", "hospital", 0.3),
                SynergyRule::new("waterway", "school", 0.25),
            ],
            w_a: 0.5,
            w_b: 0.5,
            buckets: [1.0, 2.5, 4.0],
        }
    }
}

impl SeverityParameters {
    /// Checks the structural constraints of the model.
    ///
    /// # Errors
    ///
    /// Returns a [`ParameterError`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.close_km.is_finite() && self.close_km > 0.0) {
            return Err(ParameterError::InvalidBand {
                close_km: self.close_km,
                near_km: self.near_km,
            });
        }
        if !(self.near_km.is_finite() && self.close_km < self.near_km) {
            return Err(ParameterError::InvalidBand {
                close_km: self.close_km,
                near_km: self.near_km,
            });
        }

        for (table, weights) in [
            ("impact_weights", &self.impact_weights),
            ("urgency_weights", &self.urgency_weights),
        ] {
            for (category, w) in weights {
                for value in [w.close, w.near] {
                    check_non_negative(&format!("{table}.{category}"), value)?;
                }
            }
        }

        for rule in &self.synergy {
            check_non_negative(
                &format!("synergy.{}+{}", rule.first, rule.second),
                rule.bonus,
            )?;
        }

        check_non_negative("wA", self.w_a)?;
        check_non_negative("wB", self.w_b)?;

        let [b0, b1, b2] = self.buckets;
        let finite = self.buckets.iter().all(|b| b.is_finite());
        if !finite || b0 < 0.0 || b0 >= b1 || b1 >= b2 {
            return Err(ParameterError::InvalidBuckets(self.buckets));
        }

        Ok(())
    }

    /// Every category named by a weight table or synergy rule.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .impact_weights
            .keys()
            .chain(self.urgency_weights.keys())
            .chain(self.synergy.iter().flat_map(|r| [&r.first, &r.second]))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NegativeWeight {
            field: field.to_string(),
            value,
        })
    }
}

/// Structurally malformed [`SeverityParameters`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    /// Distance bands must satisfy `0 < close_km < near_km`.
    #[error("invalid distance bands: close_km={close_km}, near_km={near_km}")]
    InvalidBand {
        /// Configured close threshold.
        close_km: f64,
        /// Configured near threshold.
        near_km: f64,
    },

    /// A weight, bonus or coefficient is negative or not finite.
    #[error("{field} must be a finite non-negative number, got {value}")]
    NegativeWeight {
        /// Dotted path of the offending field.
        field: String,
        /// The rejected value.
        value: f64,
    },

    /// Bucket thresholds must be non-negative and strictly ascending.
    #[error("bucket thresholds must be non-negative and strictly ascending, got {0:?}")]
    InvalidBuckets([f64; 3]),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = SeverityParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(*DEFAULT_PARAMS, params);
        assert_eq!(
            params.categories(),
            vec!["atm", "fuel", "hospital", "school", "waterway"]
        );
    }

    #[test]
    fn default_weights_match_published_table() {
        let params = SeverityParameters::default();
        assert_eq!(params.impact_weights["hospital"], TierWeights::new(1.0, 0.5));
        assert_eq!(params.urgency_weights["fuel"], TierWeights::new(0.7, 0.3));
        assert_eq!(params.synergy[2], SynergyRule::new("waterway", "school", 0.25));
        assert_eq!(params.buckets, [1.0, 2.5, 4.0]);
    }

    #[test]
    fn rejects_inverted_bands() {
        let params = SeverityParameters {
            close_km: 2.0,
            near_km: 2.0,
            ..SeverityParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParameterError::InvalidBand { .. })
        ));

        let params = SeverityParameters {
            close_km: 0.0,
            ..SeverityParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_non_ascending_buckets() {
        for buckets in [[1.0, 1.0, 4.0], [3.0, 2.5, 4.0], [-1.0, 2.5, 4.0], [1.0, 2.5, f64::NAN]] {
            let params = SeverityParameters {
                buckets,
                ..SeverityParameters::default()
            };
            assert!(
                matches!(params.validate(), Err(ParameterError::InvalidBuckets(_))),
                "{buckets:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_negative_weights() {
        let mut params = SeverityParameters::default();
        params
            .urgency_weights
            .insert("school".to_string(), TierWeights::new(-0.1, 0.2));
        let err = params.validate().unwrap_err();
        assert_eq!(
            err,
            ParameterError::NegativeWeight {
                field: "urgency_weights.school".to_string(),
                value: -0.1,
            }
        );

        let params = SeverityParameters {
            w_b: -1.0,
            ..SeverityParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let params: SeverityParameters =
            serde_json::from_str(r#"{"near_km": 3.0, "wA": 1.0}"#).unwrap();
        assert!((params.near_km - 3.0).abs() < f64::EPSILON);
        assert!((params.w_a - 1.0).abs() < f64::EPSILON);
        assert!((params.close_km - 0.5).abs() < f64::EPSILON);
        assert_eq!(params.synergy.len(), 3);
    }

    #[test]
    fn serializes_coefficients_under_short_names() {
        let json = serde_json::to_value(SeverityParameters::default()).unwrap();
        assert_eq!(json["wA"], 0.5);
        assert_eq!(json["wB"], 0.5);
        assert_eq!(json["synergy"][0]["first"], "fuel");
    }
}
