#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Amenity layer loading.
//!
//! Turns `GeoJSON` files (one per amenity category) into the
//! category → `(lat, lon)` mapping the point index is built from. Only
//! `Point` geometries are consumed; `GeoJSON` stores them as
//! `[lon, lat]`, which is flipped here.

pub mod demo;
pub mod layers;

use std::path::Path;

use geojson::{Feature, GeoJson, Geometry};
use serde_json::Value;
use verifix_severity_models::LatLon;

pub use layers::{DEFAULT_LAYERS, LayerConfig, load_layers};

/// Errors from reading amenity layers.
#[derive(Debug, thiserror::Error)]
pub enum AmenityError {
    /// I/O error reading or writing a layer file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid `GeoJSON`.
    #[error("Invalid GeoJSON in {path}: {source}")]
    GeoJson {
        /// Path of the offending file.
        path: String,
        /// Parser error.
        source: Box<geojson::Error>,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads the `Point` locations from a `GeoJSON` file.
///
/// Accepts a `FeatureCollection`, a single `Feature` or a bare `Point`
/// geometry. Other geometry types and features without geometry are
/// skipped. Within a `FeatureCollection` each feature is parsed on its
/// own: a malformed one is logged and skipped, the rest still load.
///
/// # Errors
///
/// Returns an [`AmenityError`] if the file cannot be read, is not JSON,
/// or is not `GeoJSON` at the top level.
pub fn read_geojson_points(path: &Path) -> Result<Vec<LatLon>, AmenityError> {
    let invalid = |e: geojson::Error| AmenityError::GeoJson {
        path: path.display().to_string(),
        source: Box::new(e),
    };

    let text = std::fs::read_to_string(path).map_err(|e| AmenityError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut value: Value =
        serde_json::from_str(&text).map_err(|e| invalid(geojson::Error::MalformedJson(e)))?;

    if let Some(features) = take_features(&mut value) {
        return Ok(points_from_features(features, path));
    }
    let geojson = GeoJson::from_json_value(value).map_err(invalid)?;
    Ok(points_from_geojson(geojson))
}

/// The raw `features` array of a `FeatureCollection` object.
fn take_features(value: &mut Value) -> Option<Vec<Value>> {
    if value.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return None;
    }
    match value.get_mut("features").filter(|f| f.is_array())?.take() {
        Value::Array(features) => Some(features),
        _ => None,
    }
}

fn points_from_features(features: Vec<Value>, path: &Path) -> Vec<LatLon> {
    features
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| match Feature::from_json_value(raw) {
            Ok(feature) => feature.geometry,
            Err(e) => {
                log::warn!("Skipping feature #{i} in {}: {e}", path.display());
                None
            }
        })
        .filter_map(point_location)
        .collect()
}

/// Like [`read_geojson_points`], but an unreadable file logs a warning
/// and yields no points, so the layer simply contributes nothing.
#[must_use]
pub fn load_geojson_points(path: &Path) -> Vec<LatLon> {
    match read_geojson_points(path) {
        Ok(points) => points,
        Err(e) => {
            log::warn!("Couldn't read amenity layer: {e}");
            Vec::new()
        }
    }
}

/// Extracts `Point` locations from parsed `GeoJSON`.
#[must_use]
pub fn points_from_geojson(geojson: GeoJson) -> Vec<LatLon> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .filter_map(point_location)
            .collect(),
        GeoJson::Feature(feature) => feature.geometry.and_then(point_location).into_iter().collect(),
        GeoJson::Geometry(geometry) => point_location(geometry).into_iter().collect(),
    }
}

fn point_location(geometry: Geometry) -> Option<LatLon> {
    let geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geometry {
        geo::Geometry::Point(p) => Some(LatLon::new(p.y(), p.x())),
        _ => None,
    }
}
