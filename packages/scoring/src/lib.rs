#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Proximity-severity scoring of civic incidents.
//!
//! Ties the amenity point index to the impact / urgency model:
//!
//! 1. Build (or load) a [`PointIndex`] over the amenity categories.
//! 2. For each incident, measure the nearest point of every category.
//! 3. [`scorer::score`] turns those distances into impact, urgency, a
//!    0-5 severity and a [`SeverityLevel`](verifix_severity_models::SeverityLevel).
//!
//! [`SeverityEngine`] bundles an index with default parameters for
//! services that score many requests against the same amenities.

pub mod config;
pub mod pipeline;
pub mod progress;
pub mod scorer;

use std::collections::BTreeMap;
use std::path::Path;

use verifix_severity_models::{
    DEFAULT_PARAMS, Incident, LatLon, ParameterError, ScoreResult, SeverityParameters,
};
use verifix_spatial::{IndexBackend, IndexBuilder, PersistError, PointIndex};

pub use config::{IndexSettings, ScoringConfig};
pub use pipeline::{
    BatchOutcome, InputError, score_batch, score_batch_detailed, score_batch_parallel,
    score_batch_with_index, score_incident, score_location,
};
pub use progress::{NullProgress, ScoringProgress};
pub use scorer::score;

/// Errors surfaced by the scoring entry points.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// Malformed severity parameters.
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    /// An index file could not be loaded.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// An incident could not be scored.
    #[error(transparent)]
    Input(#[from] InputError),

    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("Invalid config in {path}: {source}")]
    Config {
        /// Where the configuration came from.
        path: String,
        /// Parser error.
        source: Box<toml::de::Error>,
    },

    /// A configuration value is out of range.
    #[error("Invalid setting {field}: {message}")]
    InvalidSetting {
        /// Dotted path of the setting.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// I/O error reading a configuration file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Validates an explicit override, or returns the process-wide default.
///
/// # Errors
///
/// Returns [`ScoringError::Parameters`] if `params` is malformed.
pub fn resolve_params(
    params: Option<&SeverityParameters>,
) -> Result<&SeverityParameters, ScoringError> {
    match params {
        Some(params) => {
            params.validate()?;
            Ok(params)
        }
        None => Ok(&*DEFAULT_PARAMS),
    }
}

/// Builds an index over `category_points` with the default R-tree
/// backend.
#[must_use]
pub fn build_index(category_points: &BTreeMap<String, Vec<LatLon>>) -> PointIndex {
    verifix_spatial::build_point_index(category_points)
}

/// Builds an index with the backend described by `settings`.
#[must_use]
pub fn build_index_with(
    category_points: &BTreeMap<String, Vec<LatLon>>,
    settings: &IndexSettings,
) -> PointIndex {
    IndexBuilder::new(&settings.backend()).build(category_points)
}

/// Persists `index`. Returns `false` only if nothing could be written.
#[must_use]
pub fn save_index(index: &PointIndex, path: &Path) -> bool {
    verifix_spatial::save_index(index, path)
}

/// Loads a persisted index, rebuilding structures with `rebuild` when
/// `rebuild_if_needed` is set.
///
/// # Errors
///
/// Returns [`ScoringError::Persist`] if the file is missing, corrupt or
/// of an unknown format.
pub fn load_index(
    path: &Path,
    rebuild_if_needed: bool,
    rebuild: Option<&dyn IndexBackend>,
) -> Result<PointIndex, ScoringError> {
    Ok(verifix_spatial::load_index(path, rebuild_if_needed, rebuild)?)
}

/// A point index paired with the parameters used when a call does not
/// supply its own.
#[derive(Debug)]
pub struct SeverityEngine {
    index: PointIndex,
    params: SeverityParameters,
}

impl SeverityEngine {
    /// # Errors
    ///
    /// Returns [`ScoringError::Parameters`] if `params` is malformed.
    pub fn new(index: PointIndex, params: SeverityParameters) -> Result<Self, ScoringError> {
        params.validate()?;
        Ok(Self { index, params })
    }

    /// An engine using the default parameters.
    #[must_use]
    pub fn with_default_params(index: PointIndex) -> Self {
        Self {
            index,
            params: DEFAULT_PARAMS.clone(),
        }
    }

    #[must_use]
    pub const fn index(&self) -> &PointIndex {
        &self.index
    }

    #[must_use]
    pub const fn params(&self) -> &SeverityParameters {
        &self.params
    }

    fn params_for<'a>(
        &'a self,
        params: Option<&'a SeverityParameters>,
    ) -> Result<&'a SeverityParameters, ScoringError> {
        match params {
            Some(params) => resolve_params(Some(params)),
            None => Ok(&self.params),
        }
    }

    /// Scores a single incident.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Input`] if the incident has no usable
    /// coordinates, or [`ScoringError::Parameters`] for a malformed
    /// override.
    pub fn score_one(
        &self,
        incident: &Incident,
        params: Option<&SeverityParameters>,
    ) -> Result<ScoreResult, ScoringError> {
        let params = self.params_for(params)?;
        score_incident(&self.index, incident, params)
            .ok_or_else(|| InputError::unlocated(incident).into())
    }

    /// Scores a batch, leaving out incidents without coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Parameters`] for a malformed override.
    pub fn score_batch(
        &self,
        incidents: &[Incident],
        params: Option<&SeverityParameters>,
    ) -> Result<Vec<ScoreResult>, ScoringError> {
        let params = self.params_for(params)?;
        Ok(score_batch_with_index(incidents, &self.index, params))
    }

    /// Scores a batch and reports skipped incidents, optionally across
    /// the rayon thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Parameters`] for a malformed override.
    pub fn score_batch_detailed(
        &self,
        incidents: &[Incident],
        params: Option<&SeverityParameters>,
        parallel: bool,
        progress: &dyn ScoringProgress,
    ) -> Result<BatchOutcome, ScoringError> {
        let params = self.params_for(params)?;
        Ok(if parallel {
            score_batch_parallel(incidents, &self.index, params, progress)
        } else {
            score_batch_detailed(incidents, &self.index, params, progress)
        })
    }

    /// Persists the engine's index.
    #[must_use]
    pub fn save_index(&self, path: &Path) -> bool {
        save_index(&self.index, path)
    }
}
