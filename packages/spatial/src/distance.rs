//! Great-circle distance on a spherical Earth.

use verifix_severity_models::{LatLon, SENTINEL_DISTANCE_KM};

/// Sphere radius used for every distance the engine reports.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers between two points given in degrees.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Exact nearest distance by scanning every point.
///
/// Returns [`SENTINEL_DISTANCE_KM`] when `points` is empty.
#[must_use]
pub fn nearest_distance_bruteforce(lat: f64, lon: f64, points: &[LatLon]) -> f64 {
    if points.is_empty() {
        return SENTINEL_DISTANCE_KM;
    }
    points
        .iter()
        .map(|p| haversine_km(lat, lon, p.lat, p.lon))
        .fold(f64::INFINITY, f64::min)
}
