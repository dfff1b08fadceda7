//! Batch scoring over a shared point index.
//!
//! The index is built once per batch and only read afterwards, so the
//! parallel variant hands the same `&PointIndex` to every rayon worker.

use std::collections::BTreeMap;

use rayon::prelude::*;
use verifix_severity_models::{Incident, LatLon, ScoreResult, SeverityAssessment, SeverityParameters};
use verifix_spatial::{PointIndex, build_point_index};

use crate::progress::{NullProgress, ScoringProgress};
use crate::scorer::score;
use crate::{ScoringError, resolve_params};

/// An incident that could not be scored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// Neither `lat`/`latitude`/`y` nor `lon`/`longitude`/`x` held a
    /// usable number.
    #[error("incident #{position} has no usable coordinates")]
    MissingCoordinates {
        /// Position of the incident in the submitted batch.
        position: usize,
    },

    /// A single incident scored outside of any batch had no usable
    /// coordinates.
    #[error("incident {} has no usable coordinates", .id.as_deref().unwrap_or("without id"))]
    Unlocated {
        /// The incident's `id` field, rendered as JSON, when present.
        id: Option<String>,
    },
}

impl InputError {
    /// Error for an incident scored on its own.
    #[must_use]
    pub fn unlocated(incident: &Incident) -> Self {
        Self::Unlocated {
            id: incident.id().map(ToString::to_string),
        }
    }

    /// Position in the submitted batch, for batch skips.
    #[must_use]
    pub const fn position(&self) -> Option<usize> {
        match self {
            Self::MissingCoordinates { position } => Some(*position),
            Self::Unlocated { .. } => None,
        }
    }
}

/// Results of a batch together with the incidents left out of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Scored incidents, in input order.
    pub results: Vec<ScoreResult>,
    /// One entry per skipped incident, in input order.
    pub skipped: Vec<InputError>,
}

impl BatchOutcome {
    /// Input positions of the skipped incidents.
    #[must_use]
    pub fn skipped_positions(&self) -> Vec<usize> {
        self.skipped
            .iter()
            .filter_map(InputError::position)
            .collect()
    }
}

/// Nearest distance per indexed category and the resulting assessment.
#[must_use]
pub fn score_location(
    index: &PointIndex,
    location: LatLon,
    params: &SeverityParameters,
) -> (SeverityAssessment, BTreeMap<String, f64>) {
    let distances = index.nearest_all(location.lat, location.lon);
    (score(&distances, params), distances)
}

/// Scores one incident, or `None` when it has no usable coordinates.
#[must_use]
pub fn score_incident(
    index: &PointIndex,
    incident: &Incident,
    params: &SeverityParameters,
) -> Option<ScoreResult> {
    let location = incident.coordinates()?;
    let (assessment, distances) = score_location(index, location, params);
    log::debug!(
        "Scored incident {:?}: severity {:.3} ({})",
        incident.id(),
        assessment.severity,
        assessment.level
    );
    Some(ScoreResult::new(incident.clone(), &assessment, &distances))
}

/// Builds the index for `category_points` once and scores every
/// incident against it.
///
/// Incidents without usable coordinates are left out of the output.
///
/// # Errors
///
/// Returns [`ScoringError::Parameters`] if `params` is malformed.
pub fn score_batch(
    incidents: &[Incident],
    category_points: &BTreeMap<String, Vec<LatLon>>,
    params: Option<&SeverityParameters>,
) -> Result<Vec<ScoreResult>, ScoringError> {
    let params = resolve_params(params)?;
    let index = build_point_index(category_points);
    Ok(score_batch_with_index(incidents, &index, params))
}

/// Scores every incident against an already built index.
#[must_use]
pub fn score_batch_with_index(
    incidents: &[Incident],
    index: &PointIndex,
    params: &SeverityParameters,
) -> Vec<ScoreResult> {
    score_batch_detailed(incidents, index, params, &NullProgress).results
}

/// Sequential batch that also reports which incidents were skipped.
#[must_use]
pub fn score_batch_detailed(
    incidents: &[Incident],
    index: &PointIndex,
    params: &SeverityParameters,
    progress: &dyn ScoringProgress,
) -> BatchOutcome {
    progress.begin(incidents.len());

    let mut outcome = BatchOutcome {
        results: Vec::with_capacity(incidents.len()),
        skipped: Vec::new(),
    };
    for (position, incident) in incidents.iter().enumerate() {
        let result = score_incident(index, incident, params);
        progress.incident_done(result.is_some());
        match result {
            Some(result) => outcome.results.push(result),
            None => outcome.skipped.push(skip(position, incident)),
        }
    }

    progress.end(outcome.results.len(), outcome.skipped.len());
    outcome
}

/// Like [`score_batch_detailed`], sharded across the rayon thread pool.
///
/// Results come back in the same order as the sequential pipeline.
#[must_use]
pub fn score_batch_parallel(
    incidents: &[Incident],
    index: &PointIndex,
    params: &SeverityParameters,
    progress: &dyn ScoringProgress,
) -> BatchOutcome {
    progress.begin(incidents.len());

    let scored: Vec<Option<ScoreResult>> = incidents
        .par_iter()
        .map(|incident| {
            let result = score_incident(index, incident, params);
            progress.incident_done(result.is_some());
            result
        })
        .collect();

    let mut outcome = BatchOutcome {
        results: Vec::with_capacity(scored.len()),
        skipped: Vec::new(),
    };
    for (position, (result, incident)) in scored.into_iter().zip(incidents).enumerate() {
        match result {
            Some(result) => outcome.results.push(result),
            None => outcome.skipped.push(skip(position, incident)),
        }
    }

    progress.end(outcome.results.len(), outcome.skipped.len());
    outcome
}

fn skip(position: usize, incident: &Incident) -> InputError {
    log::warn!(
        "Skipping incident #{position} ({:?}): no usable coordinates",
        incident.id()
    );
    InputError::MissingCoordinates { position }
}
