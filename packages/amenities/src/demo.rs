//! Small Jharkhand sample: one point per amenity category and four
//! incidents around them.

use std::collections::BTreeMap;
use std::path::Path;

use verifix_severity_models::{Incident, LatLon, PointOfInterest, group_by_category};

use crate::layers::{DEFAULT_LAYERS, LayerConfig};
use crate::AmenityError;

/// `(category, lon, lat)` of each sample amenity, in `GeoJSON` order.
const DEMO_AMENITIES: &[(&str, f64, f64)] = &[
    ("hospital", 86.956_092_834_472_656, 23.090_784_072_875_977),
    ("school", 87.347_976_684_570_312, 23.581_695_556_640_625),
    ("atm", 87.317_855_834_960_938, 23.567_581_176_757_812),
    ("fuel", 86.167_037_963_867_188, 22.804_729_461_669_922),
    ("waterway", 87.301_322_937_011_719, 23.474_699_020_385_742),
];

/// The sample amenities as individual points of interest.
#[must_use]
pub fn demo_amenities() -> Vec<PointOfInterest> {
    DEMO_AMENITIES
        .iter()
        .map(|(category, lon, lat)| PointOfInterest {
            category: (*category).to_string(),
            lat: *lat,
            lon: *lon,
        })
        .collect()
}

/// Sample amenity points keyed by category.
#[must_use]
pub fn demo_points() -> BTreeMap<String, Vec<LatLon>> {
    group_by_category(&demo_amenities())
}

/// Sample incidents: next to the hospital, between the school and ATM,
/// at the fuel station, and far from everything.
#[must_use]
pub fn demo_incidents() -> Vec<Incident> {
    [
        ("inc_hosp_near", 23.0909, 86.9561, "medical emergency"),
        ("inc_school_atm", 23.5680, 87.3180, "crowd"),
        ("inc_fuel", 22.8050, 86.1675, "fire risk"),
        ("inc_remote", 24.0, 86.0, "minor"),
    ]
    .into_iter()
    .map(|(id, lat, lon, issue)| Incident::new(id, lat, lon).with_field("issue_type", issue))
    .collect()
}

/// Writes the sample layers as `GeoJSON` files into `dir` and returns the
/// matching configuration.
///
/// # Errors
///
/// Returns an [`AmenityError`] if a file cannot be written.
pub fn write_demo_layers(dir: &Path) -> Result<LayerConfig, AmenityError> {
    std::fs::create_dir_all(dir).map_err(|e| AmenityError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let amenities = demo_amenities();
    let mut config = LayerConfig::default();
    for (category, _, file_name) in DEFAULT_LAYERS {
        let features: Vec<serde_json::Value> = amenities
            .iter()
            .filter(|poi| poi.category == *category)
            .map(|poi| {
                serde_json::json!({
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Point", "coordinates": [poi.lon, poi.lat] },
                })
            })
            .collect();
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": features,
        });

        let path = dir.join(file_name);
        std::fs::write(&path, serde_json::to_string(&collection)?).map_err(|e| {
            AmenityError::Io {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        config = config.with_layer(category, path);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layers;

    #[test]
    fn demo_layers_round_trip_through_geojson() {
        let dir = std::env::temp_dir().join("verifix_demo_layers");
        let _ = std::fs::remove_dir_all(&dir);

        let config = write_demo_layers(&dir).unwrap();
        assert_eq!(config.len(), 5);

        let loaded = load_layers(&config);
        let expected = demo_points();
        assert_eq!(loaded.len(), expected.len());
        for (category, points) in &expected {
            let got = &loaded[category];
            assert_eq!(got.len(), points.len(), "{category}");
            for (a, b) in got.iter().zip(points) {
                assert!((a.lat - b.lat).abs() < 1e-12 && (a.lon - b.lon).abs() < 1e-12);
            }
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn demo_points_group_every_amenity() {
        let amenities = demo_amenities();
        let points = demo_points();
        assert_eq!(points.values().map(Vec::len).sum::<usize>(), amenities.len());
        for poi in &amenities {
            assert!(points[&poi.category].contains(&poi.location()));
        }
    }

    #[test]
    fn demo_incidents_have_coordinates() {
        let incidents = demo_incidents();
        assert_eq!(incidents.len(), 4);
        assert!(incidents.iter().all(|i| i.coordinates().is_some()));
        assert_eq!(incidents[2].issue_type(), Some("fire risk"));
    }
}
