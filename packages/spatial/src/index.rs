//! Per-category point index construction and queries.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use verifix_severity_models::{LatLon, SENTINEL_DISTANCE_KM};

use crate::IndexError;
use crate::backend::{BruteForceBackend, IndexBackend, RTreeBackend};
use crate::query::{BruteForceIndex, IndexMode, QueryIndex};

/// Raw points plus the structure that answers queries over them.
///
/// The raw list is always retained, whatever happened to the structure.
#[derive(Debug)]
pub struct CategoryIndex {
    raw: Vec<LatLon>,
    query: Box<dyn QueryIndex>,
    degraded: Option<String>,
}

impl CategoryIndex {
    /// Wraps a structure built over exactly `raw`.
    #[must_use]
    pub fn new(raw: Vec<LatLon>, query: Box<dyn QueryIndex>) -> Self {
        Self {
            raw,
            query,
            degraded: None,
        }
    }

    /// A category whose structure could not be built. It answers every
    /// query with the sentinel distance, as if it had no points.
    #[must_use]
    pub fn degraded(raw: Vec<LatLon>, reason: &IndexError) -> Self {
        Self {
            raw,
            query: Box::new(BruteForceIndex::empty()),
            degraded: Some(reason.to_string()),
        }
    }

    #[must_use]
    pub fn raw(&self) -> &[LatLon] {
        &self.raw
    }

    #[must_use]
    pub fn query(&self) -> &dyn QueryIndex {
        self.query.as_ref()
    }

    #[must_use]
    pub fn mode(&self) -> IndexMode {
        self.query.mode()
    }

    /// Why the structure failed to build, if it did.
    #[must_use]
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    /// Nearest distance in kilometers from `(lat, lon)`.
    #[must_use]
    pub fn nearest(&self, lat: f64, lon: f64) -> f64 {
        self.query.nearest_km(LatLon::new(lat, lon))
    }
}

/// Nearest distance from `(lat, lon)` to any point of `category`.
///
/// Returns [`SENTINEL_DISTANCE_KM`] for a category with no points.
#[must_use]
pub fn nearest(lat: f64, lon: f64, category: &CategoryIndex) -> f64 {
    category.nearest(lat, lon)
}

/// Immutable set of category indexes. Safe to share across threads.
#[derive(Debug, Default)]
pub struct PointIndex {
    categories: BTreeMap<String, CategoryIndex>,
}

/// Summary of one category, as reported by [`PointIndex::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub points: usize,
    pub mode: IndexMode,
    pub degraded: bool,
}

impl PointIndex {
    #[must_use]
    pub const fn from_categories(categories: BTreeMap<String, CategoryIndex>) -> Self {
        Self { categories }
    }

    #[must_use]
    pub fn category(&self, name: &str) -> Option<&CategoryIndex> {
        self.categories.get(name)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &CategoryIndex)> {
        self.categories.iter().map(|(name, c)| (name.as_str(), c))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    #[must_use]
    pub fn total_points(&self) -> usize {
        self.categories.values().map(|c| c.raw.len()).sum()
    }

    /// Nearest distance to `category`, or the sentinel if the category
    /// is unknown or empty.
    #[must_use]
    pub fn nearest(&self, category: &str, lat: f64, lon: f64) -> f64 {
        self.categories
            .get(category)
            .map_or(SENTINEL_DISTANCE_KM, |c| c.nearest(lat, lon))
    }

    /// Nearest distance to every category.
    #[must_use]
    pub fn nearest_all(&self, lat: f64, lon: f64) -> BTreeMap<String, f64> {
        self.categories
            .iter()
            .map(|(name, c)| {
                let d = c.nearest(lat, lon);
                log::trace!("{name}: {d:.3} km");
                (name.clone(), d)
            })
            .collect()
    }

    /// Copies of the raw point lists.
    #[must_use]
    pub fn raw_points(&self) -> BTreeMap<String, Vec<LatLon>> {
        self.categories
            .iter()
            .map(|(name, c)| (name.clone(), c.raw.clone()))
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> Vec<CategoryStats> {
        self.categories
            .iter()
            .map(|(name, c)| CategoryStats {
                category: name.clone(),
                points: c.raw.len(),
                mode: c.mode(),
                degraded: c.degraded.is_some(),
            })
            .collect()
    }

    /// Returns `true` if any category answers by linear scan.
    #[must_use]
    pub fn is_brute_force(&self) -> bool {
        self.categories
            .values()
            .any(|c| c.mode() == IndexMode::BruteForce && !c.raw.is_empty())
    }
}

/// Builds [`PointIndex`] values with a chosen backend.
pub struct IndexBuilder<'a> {
    backend: &'a dyn IndexBackend,
}

impl<'a> IndexBuilder<'a> {
    #[must_use]
    pub fn new(backend: &'a dyn IndexBackend) -> Self {
        Self { backend }
    }

    /// Builds one index per category.
    ///
    /// If the backend is unavailable every category is answered by brute
    /// force. A category whose structure fails to build is degraded on
    /// its own; the rest are built normally.
    #[must_use]
    pub fn build(&self, points: &BTreeMap<String, Vec<LatLon>>) -> PointIndex {
        let start = Instant::now();

        let backend: &dyn IndexBackend = if self.backend.is_available() {
            self.backend
        } else {
            log::warn!(
                "Index backend '{}' unavailable, building in brute-force mode",
                self.backend.name()
            );
            &BruteForceBackend
        };

        let categories: BTreeMap<String, CategoryIndex> = points
            .iter()
            .map(|(name, pts)| (name.clone(), build_category(backend, name, pts.clone())))
            .collect();

        let index = PointIndex::from_categories(categories);
        log::info!(
            "Built {} categories ({} points) with '{}' in {:.1?}",
            index.len(),
            index.total_points(),
            backend.name(),
            start.elapsed()
        );
        index
    }
}

/// Builds a single category, degrading it if the backend fails.
pub(crate) fn build_category(
    backend: &dyn IndexBackend,
    name: &str,
    raw: Vec<LatLon>,
) -> CategoryIndex {
    match backend.build(name, &raw) {
        Ok(query) => CategoryIndex::new(raw, query),
        Err(e) => {
            log::warn!("Category '{name}' failed to build, treating it as empty: {e}");
            CategoryIndex::degraded(raw, &e)
        }
    }
}

/// Builds an index with the default R-tree backend.
#[must_use]
pub fn build_point_index(points: &BTreeMap<String, Vec<LatLon>>) -> PointIndex {
    IndexBuilder::new(&RTreeBackend::default()).build(points)
}
