//! Catalog Manifest
//!
//! `manifest.json` is the root of a catalog. It lists every partition file with
//! its row-group statistics and records the exact build options, so a reader
//! needs nothing else to interpret the data files.
//!
//! ## Atomicity
//!
//! The manifest is written last, as `manifest.json.tmp`, fsynced, then renamed
//! into place, and the directory is fsynced. A catalog without a manifest is not
//! a catalog, so a build that dies halfway leaves nothing a reader will open.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   manifest.json
//!   data/
//!     part-00000.parquet                          (no partition columns)
//!     constellation_id=ori/part-00000.parquet     (partitioned)
//!     constellation_id=__null__/part-00000.parquet
//! ```
//!
//! Each partition has exactly one file, and its row groups are in key order
//! across the whole file.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use starhouse_core::{Codec, Error, Result, Schema, Value};
use uuid::Uuid;

use crate::partition::{stored_columns, ColumnRange, ColumnSpec};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest format understood by this reader.
pub const FORMAT_VERSION: u32 = 1;

/// Everything a reader needs to open a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub build_id: Uuid,
    pub created_at_ms: u64,
    pub engine_version: String,

    /// User schema
    pub schema: Schema,
    /// Stored columns: `pk`, `healpix_index`, then the schema fields
    pub columns: Vec<ColumnSpec>,

    pub sorting_columns: Vec<String>,
    pub partition_columns: Vec<String>,
    pub compression: Codec,
    pub chunk_size: usize,
    pub row_group_size: usize,
    /// HEALPix depth of `healpix_index`
    pub resolution: u8,
    /// Description of the build filter
    pub filter: String,

    pub record_count: u64,
    /// Partition files, ordered by partition values
    pub files: Vec<FileEntry>,
}

/// One partition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the catalog root, `/`-separated
    pub path: String,
    /// Value of each partition column for every row in the file
    pub partition: Vec<PartitionValue>,
    pub record_count: u64,
    pub size_bytes: u64,
    /// CRC32 of the whole file
    pub crc32: u32,
    pub row_groups: Vec<RowGroupMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionValue {
    pub column: String,
    pub value: Value,
}

/// Row-group statistics, mirrored from the Parquet footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowGroupMeta {
    pub rows: u32,
    pub first_pk: u64,
    pub stats: Vec<ColumnStats>,
    /// Sort key of the first row: sorting columns, `healpix_index`, `pk`
    pub first_key: Vec<Value>,
    /// Sort key of the last row
    pub last_key: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub range: ColumnRange,
}

impl RowGroupMeta {
    pub fn stats_for(&self, column: &str) -> Option<&ColumnStats> {
        self.stats.iter().find(|s| s.column == column)
    }
}

impl FileEntry {
    pub fn partition_value(&self, column: &str) -> Option<&Value> {
        self.partition
            .iter()
            .find(|p| p.column == column)
            .map(|p| &p.value)
    }
}

impl Manifest {
    pub fn path(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    pub fn exists(root: &Path) -> bool {
        Self::path(root).is_file()
    }

    /// Load and sanity-check the manifest under `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::IncompatibleCatalog(format!(
                    "no catalog at {}",
                    root.display()
                )))
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let raw: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::CorruptCatalog(format!("manifest is not valid JSON: {e}")))?;
        match raw.get("format_version").and_then(serde_json::Value::as_u64) {
            Some(v) if v == FORMAT_VERSION as u64 => {}
            Some(v) => {
                return Err(Error::IncompatibleCatalog(format!(
                    "manifest format version {v} is not supported (expected {FORMAT_VERSION})"
                )))
            }
            None => {
                return Err(Error::IncompatibleCatalog(
                    "manifest has no format_version".to_string(),
                ))
            }
        }

        let manifest: Manifest = serde_json::from_value(raw)
            .map_err(|e| Error::CorruptCatalog(format!("malformed manifest: {e}")))?;
        manifest.check()?;
        Ok(manifest)
    }

    /// Structural consistency; data files are checked when read.
    fn check(&self) -> Result<()> {
        if self.columns != stored_columns(&self.schema) {
            return Err(Error::CorruptCatalog(
                "manifest column list does not match its schema".to_string(),
            ));
        }
        let mut total = 0u64;
        for file in &self.files {
            if !is_relative_data_path(&file.path) {
                return Err(Error::CorruptCatalog(format!(
                    "manifest lists unsafe path `{}`",
                    file.path
                )));
            }
            let rows: u64 = file.row_groups.iter().map(|g| g.rows as u64).sum();
            if rows != file.record_count {
                return Err(Error::CorruptCatalog(format!(
                    "{} lists {} records but its row groups hold {rows}",
                    file.path, file.record_count
                )));
            }
            total += file.record_count;
        }
        if total != self.record_count {
            return Err(Error::CorruptCatalog(format!(
                "manifest lists {} records but its files hold {total}",
                self.record_count
            )));
        }
        Ok(())
    }

    /// Atomically write the manifest under `root`.
    pub fn persist(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Serialization(format!("serialize manifest failed: {e}")))?;

        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        sync_dir(root)
    }

    pub fn row_group_count(&self) -> usize {
        self.files.iter().map(|f| f.row_groups.len()).sum()
    }

    /// Stored column index of `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn file_path(&self, root: &Path, file: &FileEntry) -> PathBuf {
        file.path.split('/').fold(root.to_path_buf(), |p, part| p.join(part))
    }
}

fn is_relative_data_path(path: &str) -> bool {
    let p = Path::new(path);
    !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(unix)]
pub(crate) fn sync_dir(path: &Path) -> Result<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhouse_core::Star;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        let schema = Star::schema();
        Manifest {
            format_version: FORMAT_VERSION,
            build_id: Uuid::new_v4(),
            created_at_ms: 1_700_000_000_000,
            engine_version: "0.1.0".to_string(),
            columns: stored_columns(&schema),
            schema,
            sorting_columns: vec!["magnitude".to_string()],
            partition_columns: vec![],
            compression: Codec::Lz4,
            chunk_size: 100,
            row_group_size: 10,
            resolution: 8,
            filter: "magnitude <= 9".to_string(),
            record_count: 3,
            files: vec![FileEntry {
                path: "data/part-00000.parquet".to_string(),
                partition: vec![],
                record_count: 3,
                size_bytes: 512,
                crc32: 0x1c29_1ca3,
                row_groups: vec![RowGroupMeta {
                    rows: 3,
                    first_pk: 2,
                    stats: vec![ColumnStats {
                        column: "magnitude".to_string(),
                        range: ColumnRange {
                            min: Value::Float(-1.44),
                            max: Value::Float(2.0),
                            null_count: 0,
                        },
                    }],
                    first_key: vec![Value::Float(-1.44), Value::Int(17), Value::Int(2)],
                    last_key: vec![Value::Float(2.0), Value::Int(3), Value::Int(1)],
                }],
            }],
        }
    }

    #[test]
    fn test_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let m = manifest();
        m.persist(dir.path()).unwrap();

        assert!(Manifest::exists(dir.path()));
        assert!(!dir.path().join("manifest.json.tmp").exists());
        assert_eq!(Manifest::load(dir.path()).unwrap(), m);
    }

    #[test]
    fn test_floats_keep_their_type() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        m.files[0].row_groups[0].stats[0].range.max = Value::Float(2.0);
        m.persist(dir.path()).unwrap();
        let back = Manifest::load(dir.path()).unwrap();
        assert_eq!(back.files[0].row_groups[0].stats[0].range.max, Value::Float(2.0));
    }

    #[test]
    fn test_missing_manifest_is_incompatible() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(Error::IncompatibleCatalog(_))
        ));
    }

    #[test]
    fn test_unknown_version_is_incompatible() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        m.format_version = 99;
        m.persist(dir.path()).unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(Error::IncompatibleCatalog(_))
        ));
    }

    #[test]
    fn test_inconsistent_counts_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        m.record_count = 4;
        m.persist(dir.path()).unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(Error::CorruptCatalog(_))
        ));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(is_relative_data_path("data/part-00000.parquet"));
        assert!(!is_relative_data_path("../etc/passwd"));
        assert!(!is_relative_data_path("/data/part.parquet"));
        assert!(!is_relative_data_path(""));
    }
}
