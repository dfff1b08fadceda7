//! Category → `GeoJSON` file configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use verifix_severity_models::LatLon;

use crate::load_geojson_points;

/// Built-in layers: category, environment variable overriding the file,
/// default file name.
pub const DEFAULT_LAYERS: &[(&str, &str, &str)] = &[
    ("hospital", "VERIFIX_HOSPITALS", "jh_hospitals.geojson"),
    ("school", "VERIFIX_SCHOOLS", "jh_schools.geojson"),
    ("fuel", "VERIFIX_FUELS", "jh_fuel.geojson"),
    ("atm", "VERIFIX_ATMS", "jh_atms.geojson"),
    ("waterway", "VERIFIX_WATER", "jh_water.geojson"),
];

/// Which `GeoJSON` file supplies each amenity category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerConfig {
    layers: BTreeMap<String, PathBuf>,
}

impl LayerConfig {
    /// The built-in layers, resolving overrides through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let layers = DEFAULT_LAYERS
            .iter()
            .map(|(category, var, default)| {
                let file = lookup(var)
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| (*default).to_string());
                ((*category).to_string(), PathBuf::from(file))
            })
            .collect();
        Self { layers }
    }

    /// Adds or replaces a layer.
    #[must_use]
    pub fn with_layer(mut self, category: &str, path: impl Into<PathBuf>) -> Self {
        self.layers.insert(category.to_string(), path.into());
        self
    }

    /// Layers from `other` replace layers of the same category.
    #[must_use]
    pub fn merged_with(mut self, other: &Self) -> Self {
        for (category, path) in &other.layers {
            self.layers.insert(category.clone(), path.clone());
        }
        self
    }

    /// Resolves relative paths against `base`.
    #[must_use]
    pub fn relative_to(&self, base: &Path) -> Self {
        let layers = self
            .layers
            .iter()
            .map(|(category, path)| {
                let resolved = if path.is_relative() {
                    base.join(path)
                } else {
                    path.clone()
                };
                (category.clone(), resolved)
            })
            .collect();
        Self { layers }
    }

    #[must_use]
    pub fn get(&self, category: &str) -> Option<&Path> {
        self.layers.get(category).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.layers
            .iter()
            .map(|(category, path)| (category.as_str(), path.as_path()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Loads every configured layer. A layer that cannot be read comes back
/// as an empty list.
#[must_use]
pub fn load_layers(config: &LayerConfig) -> BTreeMap<String, Vec<LatLon>> {
    config
        .iter()
        .map(|(category, path)| {
            let points = load_geojson_points(path);
            log::info!(
                "Loaded {} {category} points from {}",
                points.len(),
                path.display()
            );
            (category.to_string(), points)
        })
        .collect()
}
