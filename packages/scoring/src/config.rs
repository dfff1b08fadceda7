//! TOML configuration for the scoring engine.
//!
//! ```toml
//! [params]
//! close_km = 0.4
//! wA = 0.7
//!
//! [index]
//! path = "data/verifix_index.msgpack.gz"
//! acceleration = true
//! confirm_candidates = 4
//!
//! [layers]
//! hospital = "layers/hospitals.geojson"
//! ```
//!
//! Every section and field is optional. `[params]` fields that are left
//! out keep their default values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use verifix_amenities::LayerConfig;
use verifix_severity_models::SeverityParameters;
use verifix_spatial::{DEFAULT_CONFIRM_CANDIDATES, RTreeBackend};

use crate::ScoringError;

/// Default location of the persisted index.
pub const DEFAULT_INDEX_PATH: &str = "data/verifix_index.msgpack.gz";

/// Overrides the persisted index location.
pub const INDEX_PATH_VAR: &str = "VERIFIX_INDEX_PATH";

/// Any value other than empty, `0` or `false` forces brute-force mode.
pub const DISABLE_ACCELERATION_VAR: &str = "VERIFIX_DISABLE_ACCELERATION";

/// Everything the CLI needs to build, persist and score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub params: SeverityParameters,
    pub index: IndexSettings,
    /// Extra or replacement amenity layers, on top of the built-in ones.
    pub layers: LayerConfig,
}

/// `[index]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub path: PathBuf,
    /// `false` builds every category in brute-force mode.
    pub acceleration: bool,
    /// Planar candidates re-measured with haversine per query.
    pub confirm_candidates: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_INDEX_PATH),
            acceleration: true,
            confirm_candidates: DEFAULT_CONFIRM_CANDIDATES,
        }
    }
}

impl IndexSettings {
    /// The backend these settings describe.
    #[must_use]
    pub const fn backend(&self) -> RTreeBackend {
        if self.acceleration {
            RTreeBackend::new(self.confirm_candidates)
        } else {
            RTreeBackend::disabled()
        }
    }
}

impl ScoringConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Config`] for malformed TOML and
    /// [`ScoringError::Parameters`] or [`ScoringError::InvalidSetting`]
    /// for values that parse but are out of range.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ScoringError> {
        let config: Self = toml::from_str(text).map_err(|e| ScoringError::Config {
            path: origin.to_string(),
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file. Relative layer paths are resolved against the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Io`] if the file cannot be read, otherwise
    /// the same errors as [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ScoringError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScoringError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config = Self::from_toml_str(&text, &path.display().to_string())?;
        if let Some(dir) = path.parent() {
            config.layers = config.layers.relative_to(dir);
        }
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Applies `VERIFIX_INDEX_PATH` and `VERIFIX_DISABLE_ACCELERATION`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies the environment overrides, reading them through `lookup`.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(INDEX_PATH_VAR).filter(|v| !v.is_empty()) {
            self.index.path = PathBuf::from(path);
        }
        if lookup(DISABLE_ACCELERATION_VAR).is_some_and(|v| is_truthy(&v)) {
            log::debug!("{DISABLE_ACCELERATION_VAR} set, acceleration disabled");
            self.index.acceleration = false;
        }
        self
    }

    /// Built-in layers (with their `VERIFIX_*` file overrides) replaced
    /// by any layers named in the config.
    #[must_use]
    pub fn resolved_layers(&self, lookup: impl Fn(&str) -> Option<String>) -> LayerConfig {
        LayerConfig::from_lookup(lookup).merged_with(&self.layers)
    }

    /// Checks parameter structure and index settings.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ScoringError> {
        self.params.validate()?;
        if self.index.confirm_candidates == 0 {
            return Err(ScoringError::InvalidSetting {
                field: "index.confirm_candidates".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}
