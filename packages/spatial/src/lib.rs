#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory amenity point index for proximity scoring.
//!
//! Builds one index per amenity category (hospital, school, fuel, ...)
//! from raw `(lat, lon)` lists and answers "how far is the nearest point
//! of this category" in kilometers. Indexes are built once and never
//! mutated, so a single [`PointIndex`] can be shared by every worker
//! scoring a batch.
//!
//! # Query variants
//!
//! - [`AccelerationIndex`]: R-tree bulk-loaded on raw `[lat, lon]` pairs.
//!   Candidates are ranked by planar distance in degrees, then the best
//!   `k` are re-measured with haversine.
//! - [`BruteForceIndex`]: exact scan. Used when the R-tree backend is
//!   unavailable, for raw-only loads without a rebuild, and for any
//!   category whose structure failed to build.
//!
//! Both report the exact haversine distance (sphere radius 6371 km) and
//! [`SENTINEL_DISTANCE_KM`](verifix_severity_models::SENTINEL_DISTANCE_KM)
//! for empty categories.
//!
//! # Persistence
//!
//! [`persist`] stores an index as gzip-compressed `MessagePack`, with a
//! raw-only fallback when structures cannot be exported.

pub mod backend;
pub mod distance;
pub mod index;
pub mod persist;
pub mod query;

pub use backend::{BruteForceBackend, IndexBackend, RTreeBackend};
pub use distance::{EARTH_RADIUS_KM, haversine_km, nearest_distance_bruteforce};
pub use index::{CategoryIndex, CategoryStats, IndexBuilder, PointIndex, build_point_index, nearest};
pub use persist::{
    IndexFileInfo, PersistError, SaveReport, StoredFormat, inspect, load, load_index, save,
    save_index,
};
pub use query::{
    AccelerationIndex, BruteForceIndex, DEFAULT_CONFIRM_CANDIDATES, IndexMode, QueryIndex,
    StructureSnapshot,
};

/// Errors from building or exporting a category structure.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A point is non-finite or outside the lat/lon ranges.
    #[error("invalid point #{index} in category '{category}': ({lat}, {lon})")]
    InvalidPoint {
        /// Category the point belongs to.
        category: String,
        /// Position of the point in the category's raw list.
        index: usize,
        /// Latitude as given.
        lat: f64,
        /// Longitude as given.
        lon: f64,
    },

    /// The backend's runtime capability check failed.
    #[error("index backend '{0}' is unavailable")]
    BackendUnavailable(&'static str),

    /// The structure has no portable serialized form.
    #[error("structure cannot be serialized: {0}")]
    Unsupported(String),

    /// A stored structure does not index exactly the category's raw points.
    #[error(
        "stored structure for '{category}' is stale ({tree_points} indexed vs {raw_points} raw points)"
    )]
    StaleStructure {
        /// Category whose structure was rejected.
        category: String,
        /// Points found in the stored structure.
        tree_points: usize,
        /// Points in the raw list.
        raw_points: usize,
    },
}
