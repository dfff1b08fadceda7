//! Gzip-compressed `MessagePack` persistence for [`PointIndex`].
//!
//! The blob is a tagged record `{ version, type, idx | raw }`:
//!
//! - `type = "full"` stores, per category, the raw points together with
//!   the exported structure (materialized coordinate array and R-tree).
//! - `type = "raw_only"` stores only the raw `[lat, lon]` lists. Saving
//!   falls back to this when a structure cannot be exported; loading can
//!   rebuild structures eagerly through an [`IndexBackend`].
//!
//! Files are written to a sibling temp file and renamed into place, so a
//! failed save never leaves a truncated index behind.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use verifix_severity_models::LatLon;

use crate::IndexError;
use crate::backend::{BruteForceBackend, IndexBackend};
use crate::index::{CategoryIndex, PointIndex, build_category};
use crate::query::{AccelerationIndex, AmenityEntry, DEFAULT_CONFIRM_CANDIDATES};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Which payload a persisted index carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum StoredFormat {
    /// Raw points plus exported structures.
    Full,
    /// Raw points only.
    RawOnly,
}

/// Outcome of a successful [`save`].
#[derive(Debug)]
pub struct SaveReport {
    pub format: StoredFormat,
    /// Compressed size on disk.
    pub bytes: u64,
    /// Why the full format was not written, if it wasn't.
    pub fallback_reason: Option<IndexError>,
}

/// Header information read by [`inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFileInfo {
    pub version: u32,
    pub format: StoredFormat,
    /// Raw point count per category.
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndexFile {
    version: u32,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idx: Option<BTreeMap<String, PersistedCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<BTreeMap<String, Vec<LatLon>>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCategory {
    #[serde(default)]
    raw: Vec<LatLon>,
    #[serde(default)]
    arr: Option<Vec<LatLon>>,
    #[serde(default)]
    tree: Option<RTree<AmenityEntry>>,
    #[serde(default)]
    confirm_candidates: Option<usize>,
}

/// Saves `index` to `path`.
///
/// Tries the full format first. If any category's structure cannot be
/// exported or the full record cannot be encoded, writes the raw-only
/// format instead and records why in [`SaveReport::fallback_reason`].
///
/// # Errors
///
/// Returns [`PersistError::Encode`] if neither format can be encoded, or
/// [`PersistError::Io`] if the file cannot be written.
pub fn save(index: &PointIndex, path: &Path) -> Result<SaveReport, PersistError> {
    let (format, payload, fallback_reason) = match encode_full(index) {
        Ok(bytes) => (StoredFormat::Full, bytes, None),
        Err(reason) => {
            log::warn!("Falling back to raw-only index format: {reason}");
            (StoredFormat::RawOnly, encode_raw_only(index)?, Some(reason))
        }
    };

    let bytes = write_atomic(path, &payload)?;
    log::info!(
        "Saved {format} index ({} categories, {} points) to {} ({bytes} bytes)",
        index.len(),
        index.total_points(),
        path.display()
    );

    Ok(SaveReport {
        format,
        bytes,
        fallback_reason,
    })
}

/// Saves `index`, reporting success as a boolean.
///
/// Returns `true` if either format was written. Failures are logged,
/// never raised.
#[must_use]
pub fn save_index(index: &PointIndex, path: &Path) -> bool {
    match save(index, path) {
        Ok(_) => true,
        Err(e) => {
            log::error!("Failed to save index to {}: {e}", path.display());
            false
        }
    }
}

/// Loads an index saved by [`save`].
///
/// For a raw-only file, structures are rebuilt eagerly with `backend`
/// when `rebuild_if_needed` is set; otherwise (or when a category's
/// rebuild fails) the category is answered by brute force. A full file's
/// stored trees are used as-is; a category whose tree is missing or does
/// not match its raw points is rebuilt the same way.
///
/// A `backend` that reports itself unavailable turns acceleration off for
/// the whole load: stored trees are ignored and nothing is rebuilt.
///
/// # Errors
///
/// Returns [`PersistError::NotFound`] before any decoding if `path` does
/// not exist, [`PersistError::Decode`] for a corrupt blob,
/// [`PersistError::UnsupportedVersion`] for a newer format and
/// [`PersistError::UnknownFormat`] for an unrecognized `type` tag.
pub fn load(
    path: &Path,
    rebuild_if_needed: bool,
    backend: Option<&dyn IndexBackend>,
) -> Result<PointIndex, PersistError> {
    let file = read_file(path)?;
    let format = check_header(&file)?;

    let acceleration_off = match backend {
        Some(b) if !b.is_available() => {
            log::info!(
                "Backend '{}' unavailable, loading every category by brute force",
                b.name()
            );
            true
        }
        _ => false,
    };
    let rebuild_with = if rebuild_if_needed && !acceleration_off {
        backend
    } else {
        None
    };
    let index = match format {
        StoredFormat::Full => {
            restore_full(file.idx.unwrap_or_default(), rebuild_with, !acceleration_off)
        }
        StoredFormat::RawOnly => restore_raw_only(file.raw.unwrap_or_default(), rebuild_with),
    };

    log::info!(
        "Loaded {format} index from {} ({} categories, {} points)",
        path.display(),
        index.len(),
        index.total_points()
    );
    Ok(index)
}

/// Alias of [`load`] matching the consumer-facing call name.
///
/// # Errors
///
/// See [`load`].
pub fn load_index(
    path: &Path,
    rebuild_if_needed: bool,
    backend: Option<&dyn IndexBackend>,
) -> Result<PointIndex, PersistError> {
    load(path, rebuild_if_needed, backend)
}

/// Reads the header and per-category point counts without building any
/// structure.
///
/// # Errors
///
/// Same conditions as [`load`].
pub fn inspect(path: &Path) -> Result<IndexFileInfo, PersistError> {
    let file = read_file(path)?;
    let format = check_header(&file)?;

    let categories = match format {
        StoredFormat::Full => file
            .idx
            .unwrap_or_default()
            .into_iter()
            .map(|(name, c)| {
                let count = if c.raw.is_empty() {
                    c.arr.map_or(0, |a| a.len())
                } else {
                    c.raw.len()
                };
                (name, count)
            })
            .collect(),
        StoredFormat::RawOnly => file
            .raw
            .unwrap_or_default()
            .into_iter()
            .map(|(name, pts)| (name, pts.len()))
            .collect(),
    };

    Ok(IndexFileInfo {
        version: file.version,
        format,
        categories,
    })
}

fn encode_full(index: &PointIndex) -> Result<Vec<u8>, IndexError> {
    let mut idx = BTreeMap::new();
    for (name, category) in index.categories() {
        let snapshot = category.query().export()?;
        idx.insert(
            name.to_string(),
            PersistedCategory {
                raw: category.raw().to_vec(),
                arr: snapshot.arr,
                tree: snapshot.tree,
                confirm_candidates: snapshot.confirm_candidates,
            },
        );
    }

    let file = PersistedIndexFile {
        version: FORMAT_VERSION,
        kind: StoredFormat::Full.to_string(),
        idx: Some(idx),
        raw: None,
    };
    rmp_serde::to_vec_named(&file).map_err(|e| IndexError::Unsupported(e.to_string()))
}

fn encode_raw_only(index: &PointIndex) -> Result<Vec<u8>, PersistError> {
    let file = PersistedIndexFile {
        version: FORMAT_VERSION,
        kind: StoredFormat::RawOnly.to_string(),
        idx: None,
        raw: Some(index.raw_points()),
    };
    rmp_serde::to_vec_named(&file).map_err(|e| PersistError::Encode(e.to_string()))
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<u64, PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
    }

    let tmp_path = temp_path(path);
    if let Err(e) = write_compressed(&tmp_path, payload) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(PersistError::io(path, e));
    }

    Ok(std::fs::metadata(path).map(|m| m.len()).unwrap_or(0))
}

fn write_compressed(tmp_path: &Path, payload: &[u8]) -> Result<(), PersistError> {
    let file = File::create(tmp_path).map_err(|e| PersistError::io(tmp_path, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|e| PersistError::io(tmp_path, e))?;
    let writer = encoder.finish().map_err(|e| PersistError::io(tmp_path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| PersistError::io(tmp_path, e.into_error()))?;
    file.sync_all().map_err(|e| PersistError::io(tmp_path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_file(path: &Path) -> Result<PersistedIndexFile, PersistError> {
    if !path.exists() {
        return Err(PersistError::NotFound(path.display().to_string()));
    }

    let file = File::open(path).map_err(|e| PersistError::io(path, e))?;
    let mut bytes = Vec::new();
    GzDecoder::new(BufReader::new(file))
        .read_to_end(&mut bytes)
        .map_err(|e| PersistError::Decode(format!("{}: {e}", path.display())))?;

    rmp_serde::from_slice(&bytes)
        .map_err(|e| PersistError::Decode(format!("{}: {e}", path.display())))
}

fn check_header(file: &PersistedIndexFile) -> Result<StoredFormat, PersistError> {
    let format = StoredFormat::from_str(&file.kind)
        .map_err(|_| PersistError::UnknownFormat(file.kind.clone()))?;
    if file.version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(file.version));
    }
    Ok(format)
}

fn restore_full(
    idx: BTreeMap<String, PersistedCategory>,
    backend: Option<&dyn IndexBackend>,
    use_stored_trees: bool,
) -> PointIndex {
    let categories = idx
        .into_iter()
        .map(|(name, stored)| {
            let category = restore_full_category(&name, stored, backend, use_stored_trees);
            (name, category)
        })
        .collect();
    PointIndex::from_categories(categories)
}

fn restore_full_category(
    name: &str,
    stored: PersistedCategory,
    backend: Option<&dyn IndexBackend>,
    use_stored_trees: bool,
) -> CategoryIndex {
    let PersistedCategory {
        raw,
        arr,
        tree,
        confirm_candidates,
    } = stored;

    let raw = if raw.is_empty() {
        reconstruct_raw(name, arr.as_deref(), tree.as_ref())
    } else {
        raw
    };

    if let Some(tree) = tree.filter(|_| use_stored_trees) {
        let confirm = confirm_candidates.unwrap_or(DEFAULT_CONFIRM_CANDIDATES);
        match AccelerationIndex::from_parts(name, tree, raw.clone(), confirm) {
            Ok(structure) => return CategoryIndex::new(raw, Box::new(structure)),
            Err(e) => log::warn!("Discarding stored structure: {e}"),
        }
    }

    build_category(backend.unwrap_or(&BruteForceBackend), name, raw)
}

/// Recovers a category's raw points from its stored structure.
///
/// Prefers the materialized array, then the tree entries in their
/// original order. A category whose stored coordinates are unusable comes
/// back empty.
fn reconstruct_raw(
    name: &str,
    arr: Option<&[LatLon]>,
    tree: Option<&RTree<AmenityEntry>>,
) -> Vec<LatLon> {
    let extracted = arr.map(<[LatLon]>::to_vec).or_else(|| {
        tree.map(|t| {
            let mut entries: Vec<&AmenityEntry> = t.iter().collect();
            entries.sort_by_key(|e| e.idx);
            entries.into_iter().map(AmenityEntry::location).collect()
        })
    });

    match extracted {
        Some(points) if points.iter().all(LatLon::is_valid) => points,
        Some(_) => {
            log::warn!("Category '{name}' has unusable stored coordinates, loading it empty");
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn restore_raw_only(
    raw: BTreeMap<String, Vec<LatLon>>,
    backend: Option<&dyn IndexBackend>,
) -> PointIndex {
    let backend = backend.unwrap_or(&BruteForceBackend);
    let categories = raw
        .into_iter()
        .map(|(name, pts)| {
            let category = match backend.build(&name, &pts) {
                Ok(query) => CategoryIndex::new(pts, query),
                Err(e) => {
                    log::warn!("Rebuild failed for '{name}', using brute force: {e}");
                    build_category(&BruteForceBackend, &name, pts)
                }
            };
            (name, category)
        })
        .collect();
    PointIndex::from_categories(categories)
}

/// Errors from saving or loading a persisted index.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The index file does not exist.
    #[error("Index file not found: {0}")]
    NotFound(String),

    /// I/O error while reading or writing.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Neither format could be encoded.
    #[error("Failed to encode index: {0}")]
    Encode(String),

    /// The blob is not valid gzip/`MessagePack` or has the wrong shape.
    #[error("Corrupt index file: {0}")]
    Decode(String),

    /// Written by a newer format version.
    #[error("Unsupported index format version {0}")]
    UnsupportedVersion(u32),

    /// Unrecognized `type` tag.
    #[error("Unknown index file type: {0}")]
    UnknownFormat(String),
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RTreeBackend;
    use crate::index::{IndexBuilder, build_point_index};
    use crate::query::{IndexMode, QueryIndex, StructureSnapshot};
    use verifix_severity_models::SENTINEL_DISTANCE_KM;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("verifix_persist_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn sample_points() -> BTreeMap<String, Vec<LatLon>> {
        let mut points = BTreeMap::new();
        points.insert("hospital".to_string(), vec![LatLon::new(23.090_784, 86.956_093)]);
        points.insert(
            "school".to_string(),
            vec![
                LatLon::new(23.581_696, 87.347_977),
                LatLon::new(23.2, 86.8),
                LatLon::new(23.4, 87.1),
            ],
        );
        points.insert("fuel".to_string(), vec![LatLon::new(22.804_73, 86.167_038)]);
        points.insert("atm".to_string(), Vec::new());
        points
    }

    const QUERIES: [(f64, f64); 4] = [
        (23.0909, 86.9561),
        (23.5680, 87.3180),
        (22.8050, 86.1675),
        (24.0, 86.0),
    ];

    /// Structure with no portable representation.
    #[derive(Debug)]
    struct OpaqueIndex(Vec<LatLon>);

    impl QueryIndex for OpaqueIndex {
        fn mode(&self) -> IndexMode {
            IndexMode::BruteForce
        }

        fn len(&self) -> usize {
            self.0.len()
        }

        fn nearest_km(&self, query: LatLon) -> f64 {
            crate::distance::nearest_distance_bruteforce(query.lat, query.lon, &self.0)
        }

        fn export(&self) -> Result<StructureSnapshot, IndexError> {
            Err(IndexError::Unsupported("opaque structure".to_string()))
        }
    }

    struct OpaqueBackend;

    impl IndexBackend for OpaqueBackend {
        fn name(&self) -> &'static str {
            "opaque"
        }

        fn build(
            &self,
            _category: &str,
            points: &[LatLon],
        ) -> Result<Box<dyn QueryIndex>, IndexError> {
            Ok(Box::new(OpaqueIndex(points.to_vec())))
        }
    }

    /// Backend that refuses one category.
    struct PickyBackend(&'static str);

    impl IndexBackend for PickyBackend {
        fn name(&self) -> &'static str {
            "picky"
        }

        fn build(
            &self,
            category: &str,
            points: &[LatLon],
        ) -> Result<Box<dyn QueryIndex>, IndexError> {
            if category == self.0 {
                return Err(IndexError::Unsupported(format!("no structure for {category}")));
            }
            RTreeBackend::default().build(category, points)
        }
    }

    #[test]
    fn full_round_trip_preserves_raw_points_and_answers() {
        let dir = scratch_dir("full_round_trip");
        let path = dir.join("index.msgpack.gz");
        let points = sample_points();
        let original = build_point_index(&points);

        let report = save(&original, &path).unwrap();
        assert_eq!(report.format, StoredFormat::Full);
        assert!(report.fallback_reason.is_none());
        assert!(report.bytes > 0);
        assert!(!temp_path(&path).exists());

        let loaded = load(&path, true, None).unwrap();
        assert_eq!(loaded.raw_points(), points);
        assert_eq!(
            loaded.category("school").unwrap().mode(),
            IndexMode::Accelerated
        );
        for (name, _) in original.categories() {
            for (lat, lon) in QUERIES {
                let a = original.nearest(name, lat, lon);
                let b = loaded.nearest(name, lat, lon);
                assert!((a - b).abs() < 1e-12, "{name} at ({lat}, {lon})");
            }
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unexportable_structure_falls_back_to_raw_only() {
        let dir = scratch_dir("raw_only_fallback");
        let path = dir.join("index.msgpack.gz");
        let points = sample_points();
        let reference = build_point_index(&points);
        let opaque = IndexBuilder::new(&OpaqueBackend).build(&points);

        assert!(save_index(&opaque, &path));
        let report = save(&opaque, &path).unwrap();
        assert_eq!(report.format, StoredFormat::RawOnly);
        assert!(matches!(
            report.fallback_reason,
            Some(IndexError::Unsupported(_))
        ));

        let info = inspect(&path).unwrap();
        assert_eq!(info.format, StoredFormat::RawOnly);
        assert_eq!(info.version, FORMAT_VERSION);
        assert_eq!(info.categories["school"], 3);

        let backend = RTreeBackend::default();
        let loaded = load(&path, true, Some(&backend)).unwrap();
        assert_eq!(loaded.raw_points(), points);
        assert_eq!(
            loaded.category("hospital").unwrap().mode(),
            IndexMode::Accelerated
        );
        for (name, _) in reference.categories() {
            for (lat, lon) in QUERIES {
                let a = reference.nearest(name, lat, lon);
                let b = loaded.nearest(name, lat, lon);
                assert!((a - b).abs() < 1e-12, "{name} at ({lat}, {lon})");
            }
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn raw_only_without_rebuild_uses_brute_force() {
        let dir = scratch_dir("raw_only_no_rebuild");
        let path = dir.join("index.msgpack.gz");
        let opaque = IndexBuilder::new(&OpaqueBackend).build(&sample_points());
        assert!(save_index(&opaque, &path));

        let backend = RTreeBackend::default();
        let loaded = load(&path, false, Some(&backend)).unwrap();
        assert_eq!(
            loaded.category("school").unwrap().mode(),
            IndexMode::BruteForce
        );
        assert!(loaded.nearest("hospital", 23.090_784, 86.956_093) < 1e-6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rebuild_failure_is_isolated_to_its_category() {
        let dir = scratch_dir("rebuild_isolated");
        let path = dir.join("index.msgpack.gz");
        let opaque = IndexBuilder::new(&OpaqueBackend).build(&sample_points());
        assert!(save_index(&opaque, &path));

        let loaded = load(&path, true, Some(&PickyBackend("school"))).unwrap();
        assert_eq!(
            loaded.category("school").unwrap().mode(),
            IndexMode::BruteForce
        );
        assert_eq!(
            loaded.category("fuel").unwrap().mode(),
            IndexMode::Accelerated
        );
        assert!(loaded.nearest("school", 23.2, 86.8) < 1e-6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unavailable_backend_loads_every_format_by_brute_force() {
        let dir = scratch_dir("unavailable_backend");
        let full_path = dir.join("full.msgpack.gz");
        let raw_path = dir.join("raw.msgpack.gz");
        assert!(save_index(&build_point_index(&sample_points()), &full_path));
        let opaque = IndexBuilder::new(&OpaqueBackend).build(&sample_points());
        assert!(save_index(&opaque, &raw_path));

        let disabled = RTreeBackend::disabled();
        for path in [&full_path, &raw_path] {
            for rebuild in [true, false] {
                let loaded = load(path, rebuild, Some(&disabled)).unwrap();
                assert!(
                    loaded
                        .stats()
                        .iter()
                        .all(|s| s.mode == IndexMode::BruteForce && !s.degraded),
                    "{} rebuild={rebuild}",
                    path.display()
                );
                assert!(loaded.nearest("fuel", 22.804_73, 86.167_038) < 1e-6);
            }
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn confirm_candidates_survive_a_full_round_trip() {
        let dir = scratch_dir("confirm_candidates");
        let path = dir.join("index.msgpack.gz");
        let mut points = BTreeMap::new();
        points.insert(
            "hospital".to_string(),
            vec![LatLon::new(60.0, 0.9), LatLon::new(60.8, 0.0)],
        );
        let narrow = IndexBuilder::new(&RTreeBackend::new(1)).build(&points);
        let before = narrow.nearest("hospital", 60.0, 0.0);
        assert_eq!(save(&narrow, &path).unwrap().format, StoredFormat::Full);

        let loaded = load(&path, true, Some(&RTreeBackend::default())).unwrap();
        let hospital = loaded.category("hospital").unwrap();
        assert_eq!(hospital.mode(), IndexMode::Accelerated);
        assert_eq!(hospital.query().export().unwrap().confirm_candidates, Some(1));
        assert!((hospital.nearest(60.0, 0.0) - before).abs() < 1e-12);

        let exact = build_point_index(&points).nearest("hospital", 60.0, 0.0);
        assert!(before - exact > 30.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_not_found() {
        let path = scratch_dir("missing").join("nope.msgpack.gz");
        assert!(matches!(
            load(&path, true, None),
            Err(PersistError::NotFound(_))
        ));
        assert!(matches!(inspect(&path), Err(PersistError::NotFound(_))));
    }

    #[test]
    fn unknown_type_tag_is_a_format_error() {
        let dir = scratch_dir("unknown_type");
        let path = dir.join("index.msgpack.gz");
        let file = PersistedIndexFile {
            version: FORMAT_VERSION,
            kind: "sharded".to_string(),
            idx: None,
            raw: None,
        };
        write_atomic(&path, &rmp_serde::to_vec_named(&file).unwrap()).unwrap();

        match load(&path, true, None) {
            Err(PersistError::UnknownFormat(kind)) => assert_eq!(kind, "sharded"),
            other => panic!("expected UnknownFormat, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = scratch_dir("newer_version");
        let path = dir.join("index.msgpack.gz");
        let file = PersistedIndexFile {
            version: FORMAT_VERSION + 1,
            kind: "raw_only".to_string(),
            idx: None,
            raw: Some(BTreeMap::new()),
        };
        write_atomic(&path, &rmp_serde::to_vec_named(&file).unwrap()).unwrap();

        assert!(matches!(
            load(&path, true, None),
            Err(PersistError::UnsupportedVersion(2))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_blob_is_a_decode_error() {
        let dir = scratch_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("index.msgpack.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        assert!(matches!(
            load(&path, true, None),
            Err(PersistError::Decode(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn full_file_without_raw_is_reconstructed_from_structures() {
        let dir = scratch_dir("reconstruct_raw");
        let path = dir.join("index.msgpack.gz");
        let points = sample_points();
        let built = build_point_index(&points);

        let mut idx = BTreeMap::new();
        for (name, category) in built.categories() {
            let snapshot = category.query().export().unwrap();
            let stored = match name {
                // Only the tree survives for schools.
                "school" => PersistedCategory {
                    tree: snapshot.tree,
                    confirm_candidates: snapshot.confirm_candidates,
                    ..PersistedCategory::default()
                },
                // Corrupt array for fuel.
                "fuel" => PersistedCategory {
                    arr: Some(vec![LatLon::new(f64::NAN, 86.0)]),
                    ..PersistedCategory::default()
                },
                _ => PersistedCategory {
                    arr: snapshot.arr,
                    tree: snapshot.tree,
                    confirm_candidates: snapshot.confirm_candidates,
                    ..PersistedCategory::default()
                },
            };
            idx.insert(name.to_string(), stored);
        }
        let file = PersistedIndexFile {
            version: FORMAT_VERSION,
            kind: "full".to_string(),
            idx: Some(idx),
            raw: None,
        };
        write_atomic(&path, &rmp_serde::to_vec_named(&file).unwrap()).unwrap();

        let loaded = load(&path, true, None).unwrap();
        assert_eq!(loaded.category("school").unwrap().raw(), points["school"].as_slice());
        assert_eq!(
            loaded.category("school").unwrap().mode(),
            IndexMode::Accelerated
        );
        assert_eq!(loaded.category("hospital").unwrap().raw(), points["hospital"].as_slice());
        assert!(loaded.category("fuel").unwrap().raw().is_empty());
        assert!(
            (loaded.nearest("fuel", 22.8, 86.16) - SENTINEL_DISTANCE_KM).abs() < f64::EPSILON
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_tree_is_replaced() {
        let dir = scratch_dir("stale_tree");
        let path = dir.join("index.msgpack.gz");
        let old = build_point_index(&sample_points());
        let tree = old.category("school").unwrap().query().export().unwrap().tree;

        let fresh = vec![LatLon::new(10.0, 10.0)];
        let mut idx = BTreeMap::new();
        idx.insert(
            "school".to_string(),
            PersistedCategory {
                raw: fresh.clone(),
                tree,
                ..PersistedCategory::default()
            },
        );
        let file = PersistedIndexFile {
            version: FORMAT_VERSION,
            kind: "full".to_string(),
            idx: Some(idx),
            raw: None,
        };
        write_atomic(&path, &rmp_serde::to_vec_named(&file).unwrap()).unwrap();

        let backend = RTreeBackend::default();
        let loaded = load(&path, true, Some(&backend)).unwrap();
        let school = loaded.category("school").unwrap();
        assert_eq!(school.raw(), fresh.as_slice());
        assert!(school.nearest(10.0, 10.0) < 1e-6);
        assert!(school.nearest(23.2, 86.8) > 1000.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_failure_reports_false_and_leaves_no_temp_file() {
        let dir = scratch_dir("write_failure");
        std::fs::create_dir_all(&dir).unwrap();
        // A directory where the file should go makes the rename fail.
        let path = dir.join("occupied");
        std::fs::create_dir_all(path.join("child")).unwrap();

        let index = build_point_index(&sample_points());
        assert!(!save_index(&index, &path));
        assert!(matches!(save(&index, &path), Err(PersistError::Io { .. })));
        assert!(!temp_path(&path).exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stored_format_tags() {
        assert_eq!(StoredFormat::Full.to_string(), "full");
        assert_eq!(StoredFormat::RawOnly.as_ref(), "raw_only");
        assert_eq!(StoredFormat::from_str("raw_only").unwrap(), StoredFormat::RawOnly);
        assert!(StoredFormat::from_str("RawOnly").is_err());
    }
}
