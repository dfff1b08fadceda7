//! Structure backends selected when an index is built or rebuilt.

use verifix_severity_models::LatLon;

use crate::IndexError;
use crate::query::{AccelerationIndex, BruteForceIndex, DEFAULT_CONFIRM_CANDIDATES, QueryIndex};

/// Builds a [`QueryIndex`] for one category's points.
///
/// Also serves as the rebuild function when a raw-only index file is
/// loaded.
pub trait IndexBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runtime capability check. When this returns `false` the builder
    /// answers every category by brute force instead.
    fn is_available(&self) -> bool {
        true
    }

    /// Builds the structure for `points`.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if the structure cannot be built for
    /// this category. Other categories are unaffected.
    fn build(&self, category: &str, points: &[LatLon]) -> Result<Box<dyn QueryIndex>, IndexError>;
}

/// R-tree backend producing [`AccelerationIndex`] structures.
#[derive(Debug, Clone, Copy)]
pub struct RTreeBackend {
    confirm_candidates: usize,
    enabled: bool,
}

impl Default for RTreeBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_CANDIDATES)
    }
}

impl RTreeBackend {
    /// Creates a backend that confirms the `confirm_candidates` nearest
    /// planar candidates with haversine (at least one).
    #[must_use]
    pub const fn new(confirm_candidates: usize) -> Self {
        Self {
            confirm_candidates,
            enabled: true,
        }
    }

    /// A backend that reports itself unavailable, forcing brute-force
    /// mode.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            confirm_candidates: DEFAULT_CONFIRM_CANDIDATES,
            enabled: false,
        }
    }
}

impl IndexBackend for RTreeBackend {
    fn name(&self) -> &'static str {
        "rtree"
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    fn build(&self, category: &str, points: &[LatLon]) -> Result<Box<dyn QueryIndex>, IndexError> {
        if !self.enabled {
            return Err(IndexError::BackendUnavailable(self.name()));
        }
        validate_points(category, points)?;
        Ok(Box::new(AccelerationIndex::build(
            points,
            self.confirm_candidates,
        )))
    }
}

/// Backend producing [`BruteForceIndex`] structures. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceBackend;

impl IndexBackend for BruteForceBackend {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn build(&self, category: &str, points: &[LatLon]) -> Result<Box<dyn QueryIndex>, IndexError> {
        validate_points(category, points)?;
        Ok(Box::new(BruteForceIndex::new(points.to_vec())))
    }
}

/// Rejects non-finite or out-of-range coordinates.
///
/// # Errors
///
/// Returns [`IndexError::InvalidPoint`] for the first offending point.
pub fn validate_points(category: &str, points: &[LatLon]) -> Result<(), IndexError> {
    match points.iter().position(|p| !p.is_valid()) {
        Some(index) => Err(IndexError::InvalidPoint {
            category: category.to_string(),
            index,
            lat: points[index].lat,
            lon: points[index].lon,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::IndexMode;

    #[test]
    fn rtree_backend_builds_accelerated_structures() {
        let backend = RTreeBackend::default();
        assert!(backend.is_available());
        let index = backend
            .build("hospital", &[LatLon::new(23.09, 86.956)])
            .unwrap();
        assert_eq!(index.mode(), IndexMode::Accelerated);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn disabled_backend_refuses_to_build() {
        let backend = RTreeBackend::disabled();
        assert!(!backend.is_available());
        assert!(matches!(
            backend.build("hospital", &[]),
            Err(IndexError::BackendUnavailable("rtree"))
        ));
    }

    #[test]
    fn both_backends_reject_invalid_points() {
        let points = [LatLon::new(1.0, 1.0), LatLon::new(f64::NAN, 2.0)];
        for backend in [&RTreeBackend::default() as &dyn IndexBackend, &BruteForceBackend] {
            match backend.build("fuel", &points) {
                Err(IndexError::InvalidPoint { category, index, .. }) => {
                    assert_eq!(category, "fuel");
                    assert_eq!(index, 1);
                }
                other => panic!("{}: expected InvalidPoint, got {other:?}", backend.name()),
            }
        }
    }
}
