#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident, amenity and severity scoring types.
//!
//! Plain data shared by the spatial index, the severity scorer and the
//! batch pipeline. Nothing in this crate performs I/O.

mod incident;
mod params;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use incident::{Incident, LAT_ALIASES, LON_ALIASES};
pub use params::{DEFAULT_PARAMS, ParameterError, SeverityParameters, SynergyRule, TierWeights};

/// Distance reported for a category that has no points to measure against.
pub const SENTINEL_DISTANCE_KM: f64 = 9999.0;

/// A WGS84 coordinate in degrees.
///
/// Serialized as a `[lat, lon]` pair, which is how raw amenity points are
/// stored in the persisted index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLon {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl LatLon {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns `true` if both components are finite and inside the
    /// latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl From<[f64; 2]> for LatLon {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<LatLon> for [f64; 2] {
    fn from(p: LatLon) -> Self {
        [p.lat, p.lon]
    }
}

impl From<(f64, f64)> for LatLon {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

/// A single amenity location (hospital, school, fuel station, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    /// Open category identifier (e.g. `"hospital"`).
    pub category: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl PointOfInterest {
    #[must_use]
    pub const fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Groups amenity points by category, preserving per-category input order.
#[must_use]
pub fn group_by_category(points: &[PointOfInterest]) -> BTreeMap<String, Vec<LatLon>> {
    let mut grouped: BTreeMap<String, Vec<LatLon>> = BTreeMap::new();
    for poi in points {
        grouped
            .entry(poi.category.clone())
            .or_default()
            .push(poi.location());
    }
    grouped
}

/// Discrete severity level derived from the 0-5 severity score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SeverityLevel {
    Safe,
    Moderate,
    High,
    Critical,
}

impl SeverityLevel {
    /// Buckets a severity score. Boundary values belong to the lower
    /// bucket.
    #[must_use]
    pub fn from_severity(severity: f64, buckets: &[f64; 3]) -> Self {
        let [b0, b1, b2] = *buckets;
        if severity <= b0 {
            Self::Safe
        } else if severity <= b1 {
            Self::Moderate
        } else if severity <= b2 {
            Self::High
        } else {
            Self::Critical
        }
    }

    /// Returns all variants in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Safe, Self::Moderate, Self::High, Self::Critical]
    }
}

/// Unrounded output of the severity scorer for one location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityAssessment {
    /// Impact score in `[0, 1]`.
    pub impact_a: f64,
    /// Urgency score in `[0, 1]`, synergy bonuses included.
    pub urgency_b: f64,
    /// Combined severity in `[0, 5]`.
    pub severity: f64,
    pub level: SeverityLevel,
}

/// Scored incident as returned to callers.
///
/// Numeric fields are rounded to three decimals; the level was derived
/// from the unrounded severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// The incident exactly as it was submitted.
    pub input: Incident,
    #[serde(rename = "impact_A")]
    pub impact_a: f64,
    #[serde(rename = "urgency_B")]
    pub urgency_b: f64,
    pub severity_0_5: f64,
    pub level: SeverityLevel,
    /// Nearest distance per category in kilometers, or
    /// [`SENTINEL_DISTANCE_KM`] for empty categories.
    pub distances_km: BTreeMap<String, f64>,
}

impl ScoreResult {
    /// Builds the presentation form of an assessment.
    #[must_use]
    pub fn new(
        input: Incident,
        assessment: &SeverityAssessment,
        distances_km: &BTreeMap<String, f64>,
    ) -> Self {
        Self {
            input,
            impact_a: round3(assessment.impact_a),
            urgency_b: round3(assessment.urgency_b),
            severity_0_5: round3(assessment.severity),
            level: assessment.level,
            distances_km: distances_km
                .iter()
                .map(|(category, d)| (category.clone(), round3(*d)))
                .collect(),
        }
    }
}

/// Batch response document: `{ "count": n, "results": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub count: usize,
    pub results: Vec<ScoreResult>,
}

impl From<Vec<ScoreResult>> for ScoreReport {
    fn from(results: Vec<ScoreResult>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Rounds to three decimal places for presentation.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
