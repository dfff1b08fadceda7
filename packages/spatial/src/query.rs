//! Nearest-distance query structures.
//!
//! Two variants answer the same question: [`AccelerationIndex`] filters
//! candidates through an R-tree built on raw `[lat, lon]` pairs (planar
//! metric) and confirms them with haversine, while [`BruteForceIndex`]
//! scans every point. Both return the exact haversine distance of the
//! point they select, never a planar distance.

use rstar::{AABB, PointDistance, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use verifix_severity_models::{LatLon, SENTINEL_DISTANCE_KM};

use crate::IndexError;
use crate::distance::{haversine_km, nearest_distance_bruteforce};

/// Number of planar candidates confirmed with haversine per query.
pub const DEFAULT_CONFIRM_CANDIDATES: usize = 4;

/// How a category answers nearest-distance queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndexMode {
    /// Sub-linear R-tree candidate filter.
    Accelerated,
    /// Linear scan over the raw points.
    BruteForce,
}

/// The nearest-distance capability shared by every index variant.
///
/// Implementations are immutable once built and must be safe to query
/// from many threads at once.
pub trait QueryIndex: Send + Sync + std::fmt::Debug {
    fn mode(&self) -> IndexMode;

    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exact haversine distance in kilometers to the nearest indexed
    /// point, or [`SENTINEL_DISTANCE_KM`] if there are none.
    fn nearest_km(&self, query: LatLon) -> f64;

    /// Captures the structure for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unsupported`] if the structure has no
    /// portable representation.
    fn export(&self) -> Result<StructureSnapshot, IndexError>;
}

/// Serializable state of a built structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureSnapshot {
    /// Materialized coordinate array mirroring the raw points.
    pub arr: Option<Vec<LatLon>>,
    pub tree: Option<RTree<AmenityEntry>>,
    pub confirm_candidates: Option<usize>,
}

/// A point stored in the R-tree, keyed by its position in the raw list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmenityEntry {
    pub idx: usize,
    pub lat: f64,
    pub lon: f64,
}

impl AmenityEntry {
    #[must_use]
    pub const fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

impl RTreeObject for AmenityEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lon])
    }
}

impl PointDistance for AmenityEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d_lat = self.lat - point[0];
        let d_lon = self.lon - point[1];
        d_lat * d_lat + d_lon * d_lon
    }
}

/// Linear-scan index. Also the fallback whenever no acceleration
/// structure is available for a category.
#[derive(Debug, Clone, Default)]
pub struct BruteForceIndex {
    points: Vec<LatLon>,
}

impl BruteForceIndex {
    #[must_use]
    pub const fn new(points: Vec<LatLon>) -> Self {
        Self { points }
    }

    /// An index with no points; every query returns the sentinel.
    #[must_use]
    pub const fn empty() -> Self {
        Self { points: Vec::new() }
    }
}

impl QueryIndex for BruteForceIndex {
    fn mode(&self) -> IndexMode {
        IndexMode::BruteForce
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn nearest_km(&self, query: LatLon) -> f64 {
        nearest_distance_bruteforce(query.lat, query.lon, &self.points)
    }

    fn export(&self) -> Result<StructureSnapshot, IndexError> {
        Ok(StructureSnapshot {
            arr: Some(self.points.clone()),
            tree: None,
            confirm_candidates: None,
        })
    }
}

/// R-tree over raw `[lat, lon]` pairs.
///
/// The tree orders candidates by planar distance in degrees; the
/// `confirm_candidates` nearest of them are re-measured with haversine
/// and the smallest exact distance is returned.
#[derive(Debug, Clone)]
pub struct AccelerationIndex {
    tree: RTree<AmenityEntry>,
    arr: Vec<LatLon>,
    confirm_candidates: usize,
}

impl AccelerationIndex {
    /// Bulk-loads a tree over `points`.
    #[must_use]
    pub fn build(points: &[LatLon], confirm_candidates: usize) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(idx, p)| AmenityEntry {
                idx,
                lat: p.lat,
                lon: p.lon,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            arr: points.to_vec(),
            confirm_candidates: confirm_candidates.max(1),
        }
    }

    /// Restores a previously exported tree.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StaleStructure`] if the tree and the array
    /// do not describe the same points.
    pub fn from_parts(
        category: &str,
        tree: RTree<AmenityEntry>,
        arr: Vec<LatLon>,
        confirm_candidates: usize,
    ) -> Result<Self, IndexError> {
        let consistent = tree.size() == arr.len()
            && tree
                .iter()
                .all(|e| arr.get(e.idx).is_some_and(|p| *p == e.location()));
        if !consistent {
            return Err(IndexError::StaleStructure {
                category: category.to_string(),
                tree_points: tree.size(),
                raw_points: arr.len(),
            });
        }

        Ok(Self {
            tree,
            arr,
            confirm_candidates: confirm_candidates.max(1),
        })
    }

    #[must_use]
    pub const fn confirm_candidates(&self) -> usize {
        self.confirm_candidates
    }
}

impl QueryIndex for AccelerationIndex {
    fn mode(&self) -> IndexMode {
        IndexMode::Accelerated
    }

    fn len(&self) -> usize {
        self.tree.size()
    }

    fn nearest_km(&self, query: LatLon) -> f64 {
        if self.tree.size() == 0 {
            return SENTINEL_DISTANCE_KM;
        }
        self.tree
            .nearest_neighbor_iter(&[query.lat, query.lon])
            .take(self.confirm_candidates)
            .map(|e| haversine_km(query.lat, query.lon, e.lat, e.lon))
            .fold(f64::INFINITY, f64::min)
    }

    fn export(&self) -> Result<StructureSnapshot, IndexError> {
        Ok(StructureSnapshot {
            arr: Some(self.arr.clone()),
            tree: Some(self.tree.clone()),
            confirm_candidates: Some(self.confirm_candidates),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IndexBackend, RTreeBackend};

    fn grid() -> Vec<LatLon> {
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                points.push(LatLon::new(
                    22.0 + f64::from(i) * 0.07,
                    86.0 + f64::from(j) * 0.09,
                ));
            }
        }
        points
    }

    #[test]
    fn empty_indexes_return_sentinel() {
        let q = LatLon::new(1.0, 2.0);
        let brute = BruteForceIndex::empty();
        let accel = AccelerationIndex::build(&[], DEFAULT_CONFIRM_CANDIDATES);
        assert!((brute.nearest_km(q) - SENTINEL_DISTANCE_KM).abs() < f64::EPSILON);
        assert!((accel.nearest_km(q) - SENTINEL_DISTANCE_KM).abs() < f64::EPSILON);
        assert!(accel.is_empty());
    }

    #[test]
    fn stored_point_is_zero_distance() {
        let points = grid();
        let accel = AccelerationIndex::build(&points, 1);
        for p in points.iter().step_by(37) {
            assert!(accel.nearest_km(*p) < 1e-6);
        }
    }

    #[test]
    fn variants_agree_on_regional_queries() {
        let points = grid();
        let brute = BruteForceIndex::new(points.clone());
        let accel = AccelerationIndex::build(&points, DEFAULT_CONFIRM_CANDIDATES);

        for i in 0..30 {
            let q = LatLon::new(
                21.9 + f64::from(i) * 0.05,
                85.95 + f64::from(i) * 0.063,
            );
            let a = accel.nearest_km(q);
            let b = brute.nearest_km(q);
            assert!((a - b).abs() < 1e-9, "query {q:?}: accelerated {a} vs brute {b}");
        }
    }

    #[test]
    fn reports_haversine_not_planar_distance() {
        let accel = AccelerationIndex::build(&[LatLon::new(0.0, 1.0)], 1);
        let d = accel.nearest_km(LatLon::new(0.0, 0.0));
        // One degree of longitude at the equator, not "1.0".
        assert!((d - haversine_km(0.0, 0.0, 0.0, 1.0)).abs() < 1e-9);
        assert!(d > 100.0);
    }

    #[test]
    fn confirmation_corrects_high_latitude_ranking() {
        // At 60N a degree of longitude is half a degree of latitude, so the
        // planar nearest is not the haversine nearest.
        let points = vec![LatLon::new(60.0, 0.9), LatLon::new(60.8, 0.0)];
        let q = LatLon::new(60.0, 0.0);
        let exact = BruteForceIndex::new(points.clone()).nearest_km(q);
        assert!((exact - haversine_km(60.0, 0.0, 60.0, 0.9)).abs() < 1e-9);

        let single = AccelerationIndex::build(&points, 1).nearest_km(q);
        assert!(single - exact > 30.0, "single {single} vs exact {exact}");

        for k in [2, DEFAULT_CONFIRM_CANDIDATES] {
            let d = AccelerationIndex::build(&points, k).nearest_km(q);
            assert!((d - exact).abs() < 1e-9, "k={k}: {d} vs {exact}");
        }
        let rebuilt = RTreeBackend::new(2).build("hospital", &points).unwrap();
        assert!((rebuilt.nearest_km(q) - exact).abs() < 1e-9);
    }

    #[test]
    fn from_parts_rejects_mismatched_tree() {
        let points = grid();
        let built = AccelerationIndex::build(&points, 2);
        let snapshot = built.export().unwrap();
        let tree = snapshot.tree.unwrap();

        let restored = AccelerationIndex::from_parts("school", tree.clone(), points.clone(), 2);
        assert!(restored.is_ok());

        let err = AccelerationIndex::from_parts("school", tree, points[1..].to_vec(), 2).unwrap_err();
        assert!(matches!(err, IndexError::StaleStructure { .. }));
    }

    #[test]
    fn confirm_candidates_is_at_least_one() {
        let accel = AccelerationIndex::build(&grid(), 0);
        assert_eq!(accel.confirm_candidates(), 1);
    }
}
