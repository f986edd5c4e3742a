//! Catalog
//!
//! [`Catalog`] is the entry point for both sides of the engine:
//!
//! - [`Catalog::build`] turns a record stream into a new catalog directory
//! - [`Catalog::open`] loads an existing catalog for querying
//!
//! ## Queries
//!
//! | Operation | Reads | Pruning |
//! |-----------|-------|---------|
//! | `all()`   | every row group, lazily | none |
//! | `get(p)`  | until the first match | partition values, then footer min/max/null count, then predicate columns before the rest |
//! | `cone(..)`| groups overlapping the cone's cells | footer `healpix_index` min/max against the cone cover |
//! | `verify()`| everything, plus a CRC32 of each file | none |
//!
//! Row-group pruning reads the statistics in each Parquet footer, which
//! `open_file` has already checked against the manifest.
//!
//! A `Catalog` is immutable and `Send + Sync`: it holds the root path and an
//! `Arc` of the manifest. Every query opens its own file handles, so queries
//! from many threads need no locking.
//!
//! ## Example
//!
//! ```ignore
//! use starhouse_storage::{Catalog, Predicate};
//!
//! let catalog = Catalog::open("catalogs/bright-stars/v1", 10)?;
//! if let Some(sirius) = catalog.get(&Predicate::eq("name", "Sirius"))? {
//!     println!("magnitude {:?}", sirius.get_f64("magnitude"));
//! }
//! for record in catalog.all()? {
//!     let record = record?;
//!     // ...
//! }
//! ```

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::slice::ParallelSliceMut;

use starhouse_core::spatial::angular_distance_deg;
use starhouse_core::value::compare_keys;
use starhouse_core::{Error, Record, Result, SpatialIndexer, Value, DEC_COLUMN, RA_COLUMN};

use crate::build::build_catalog;
use crate::config::BuildConfig;
use crate::filter::RecordFilter;
use crate::manifest::{FileEntry, Manifest};
use crate::observer::BuildObserver;
use crate::partition::{ColumnRange, HEALPIX_INDEX};
use crate::pipeline::{rows_from_columns, Row, SortKey};
use crate::predicate::{BoundTerm, Predicate};
use crate::reader::{open_file, read_column_checked, read_group_checked, record_at, RecordIter};
use crate::report::{BuildReport, VerifyReport};

/// A built, immutable star catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    manifest: Arc<Manifest>,
    indexer: SpatialIndexer,
}

impl Catalog {
    /// Build a new catalog at `config.output_path` from `records`.
    ///
    /// The output path must be absent or an empty directory. On any
    /// build-level error nothing is left behind.
    pub fn build<I>(
        config: &BuildConfig,
        records: I,
        filter: &dyn RecordFilter,
        observer: &dyn BuildObserver,
    ) -> Result<BuildReport>
    where
        I: IntoIterator<Item = Record>,
    {
        build_catalog(config, records, filter, observer)
    }

    /// Open the catalog at `path`, which must have been built at `resolution`.
    pub fn open(path: impl AsRef<Path>, resolution: u8) -> Result<Self> {
        let catalog = Self::open_any(path)?;
        if catalog.manifest.resolution != resolution {
            return Err(Error::IncompatibleCatalog(format!(
                "catalog was built at resolution {} but {resolution} was requested",
                catalog.manifest.resolution
            )));
        }
        Ok(catalog)
    }

    /// Open the catalog at `path` at whatever resolution it was built with.
    pub fn open_any(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let manifest = Manifest::load(&root)?;
        let indexer = SpatialIndexer::new(manifest.resolution)
            .map_err(|e| Error::IncompatibleCatalog(e.to_string()))?;

        tracing::debug!(
            path = %root.display(),
            build_id = %manifest.build_id,
            records = manifest.record_count,
            files = manifest.files.len(),
            "catalog opened"
        );
        Ok(Self {
            root,
            manifest: Arc::new(manifest),
            indexer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn resolution(&self) -> u8 {
        self.manifest.resolution
    }

    pub fn count(&self) -> u64 {
        self.manifest.record_count
    }

    /// Every record, lazily, in stored order.
    pub fn all(&self) -> Result<RecordIter> {
        Ok(RecordIter::new(self.root.clone(), Arc::clone(&self.manifest)))
    }

    /// First record in stored order matching every term of `predicate`.
    pub fn get(&self, predicate: &Predicate) -> Result<Option<Record>> {
        let terms = predicate.bind(&self.manifest)?;
        let manifest = &*self.manifest;

        for entry in &manifest.files {
            if !partition_may_match(entry, &terms) {
                continue;
            }
            let reader = open_file(&self.root, manifest, entry)?;
            for (group, meta) in entry.row_groups.iter().enumerate() {
                let may_match = terms.iter().all(|term| {
                    reader
                        .column_range(group, term.column)
                        .map_or(true, |range| range.may_contain(&term.value))
                });
                if !may_match {
                    continue;
                }

                let mut columns: Vec<Option<Vec<Value>>> = vec![None; manifest.columns.len()];
                for term in &terms {
                    if columns[term.column].is_none() {
                        columns[term.column] =
                            Some(read_column_checked(&reader, manifest, entry, group, term.column)?);
                    }
                }
                let hit = (0..meta.rows as usize).find(|&row| {
                    terms.iter().all(|term| {
                        columns[term.column]
                            .as_ref()
                            .is_some_and(|values| values[row].matches(&term.value))
                    })
                });
                let Some(row) = hit else {
                    continue;
                };

                for (column, slot) in columns.iter_mut().enumerate() {
                    if slot.is_none() {
                        *slot = Some(read_column_checked(&reader, manifest, entry, group, column)?);
                    }
                }
                let columns: Vec<Vec<Value>> = columns.into_iter().flatten().collect();
                return Ok(Some(record_at(manifest, &columns, row)));
            }
        }
        Ok(None)
    }

    /// Every record within `radius_deg` of `(ra, dec)`, in stored order.
    pub fn cone(&self, ra: f64, dec: f64, radius_deg: f64) -> Result<Vec<Record>> {
        let cover = self.indexer.cone_cover(ra, dec, radius_deg)?;
        let manifest = &*self.manifest;
        let (ra_col, dec_col) = self.coordinate_columns()?;

        let mut found = Vec::new();
        for entry in &manifest.files {
            let reader = open_file(&self.root, manifest, entry)?;
            for group in 0..entry.row_groups.len() {
                if let (Some(ranges), Some(cells)) =
                    (&cover, reader.column_range(group, HEALPIX_INDEX))
                {
                    if !cells_may_overlap(&cells, ranges) {
                        continue;
                    }
                }

                let ras = read_column_checked(&reader, manifest, entry, group, ra_col)?;
                let decs = read_column_checked(&reader, manifest, entry, group, dec_col)?;
                let inside: Vec<usize> = ras
                    .iter()
                    .zip(&decs)
                    .enumerate()
                    .filter(|(_, (r, d))| match (r.as_f64(), d.as_f64()) {
                        (Some(r), Some(d)) => angular_distance_deg(ra, dec, r, d) <= radius_deg,
                        _ => false,
                    })
                    .map(|(row, _)| row)
                    .collect();
                if inside.is_empty() {
                    continue;
                }

                let columns = read_group_checked(&reader, manifest, entry, group)?;
                found.extend(inside.into_iter().map(|row| record_at(manifest, &columns, row)));
            }
        }
        Ok(found)
    }

    /// Read everything and check it.
    ///
    /// Beyond the checks every read does, this compares each file's CRC32
    /// with the manifest, recomputes each stored `healpix_index` from
    /// `ra`/`dec`, checks that every file is in key order from first row to
    /// last with the recorded first/last keys, and that `pk` values are
    /// exactly `1..=record_count`.
    pub fn verify(&self) -> Result<VerifyReport> {
        let manifest = &*self.manifest;
        let key = SortKey::new(&manifest.schema, &manifest.sorting_columns)?;
        let (ra_col, dec_col) = self.coordinate_columns()?;
        let corrupt = |entry: &FileEntry, msg: String| {
            Error::CorruptCatalog(format!("{}: {msg}", entry.path))
        };

        let mut pks: Vec<u64> = Vec::new();
        let mut report = VerifyReport {
            files: manifest.files.len(),
            row_groups: 0,
            records: 0,
            cells_checked: 0,
        };

        for entry in &manifest.files {
            let path = manifest.file_path(&self.root, entry);
            let reader = open_file(&self.root, manifest, entry)?;
            let crc32 = file_crc32(&path)?;
            if crc32 != entry.crc32 {
                return Err(corrupt(
                    entry,
                    format!("checksum {crc32:08x} does not match manifest {:08x}", entry.crc32),
                ));
            }
            let mut previous: Option<Vec<Value>> = None;

            for (group, meta) in entry.row_groups.iter().enumerate() {
                let columns = read_group_checked(&reader, manifest, entry, group)?;
                let rows: Vec<Row> = rows_from_columns(columns);

                for (i, row) in rows.iter().enumerate() {
                    let row_key = key.key_of(row);
                    if let Some(prev) = &previous {
                        if compare_keys(prev, &row_key) == Ordering::Greater {
                            return Err(corrupt(
                                entry,
                                format!("row {i} of row group {group} is out of order"),
                            ));
                        }
                    }
                    if i == 0 && row_key != meta.first_key {
                        return Err(corrupt(entry, format!("row group {group} first key mismatch")));
                    }
                    if i + 1 == rows.len() && row_key != meta.last_key {
                        return Err(corrupt(entry, format!("row group {group} last key mismatch")));
                    }
                    previous = Some(row_key);

                    let pk = row.pk();
                    pks.push(pk);

                    let cell = match (row.value(ra_col).as_f64(), row.value(dec_col).as_f64()) {
                        (Some(ra), Some(dec)) => self.indexer.index(ra, dec).ok(),
                        _ => None,
                    };
                    if cell.map(|c| Value::Int(c as i64)).as_ref() != Some(row.value(HEALPIX_INDEX)) {
                        return Err(corrupt(
                            entry,
                            format!("healpix_index of pk {pk} does not match its coordinates"),
                        ));
                    }
                    report.cells_checked += 1;
                }

                report.records += rows.len() as u64;
                report.row_groups += 1;
            }
        }

        if report.records != manifest.record_count {
            return Err(Error::CorruptCatalog(format!(
                "found {} records, manifest lists {}",
                report.records, manifest.record_count
            )));
        }
        pks.par_sort_unstable();
        for (expected, &pk) in (1u64..).zip(&pks) {
            if pk != expected {
                let problem = if pk < expected { "duplicate" } else { "missing" };
                return Err(Error::CorruptCatalog(format!(
                    "pk sequence is broken: {problem} pk {}",
                    if pk < expected { pk } else { expected }
                )));
            }
        }
        tracing::info!(
            path = %self.root.display(),
            records = report.records,
            row_groups = report.row_groups,
            "catalog verified"
        );
        Ok(report)
    }

    /// Stored column indexes of `ra` and `dec`.
    fn coordinate_columns(&self) -> Result<(usize, usize)> {
        let find = |name: &str| {
            self.manifest.column_index(name).ok_or_else(|| {
                Error::CorruptCatalog(format!("catalog schema has no `{name}` column"))
            })
        };
        Ok((find(RA_COLUMN)?, find(DEC_COLUMN)?))
    }
}

fn partition_may_match(entry: &FileEntry, terms: &[BoundTerm]) -> bool {
    terms.iter().all(|term| {
        entry
            .partition_value(&term.name)
            .map_or(true, |value| value.matches(&term.value))
    })
}

fn cells_may_overlap(cells: &ColumnRange, ranges: &[Range<u64>]) -> bool {
    let (Some(min), Some(max)) = (cells.min.as_i64(), cells.max.as_i64()) else {
        return true;
    };
    let (min, max) = (min as u64, max as u64);
    ranges.iter().any(|r| r.start <= max && r.end > min)
}

fn file_crc32(path: &Path) -> Result<u32> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(hasher.finalize());
        }
        hasher.update(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(min: i64, max: i64) -> ColumnRange {
        ColumnRange {
            min: Value::Int(min),
            max: Value::Int(max),
            null_count: 0,
        }
    }

    #[test]
    fn test_cells_may_overlap() {
        let meta = cells(100, 200);
        assert!(cells_may_overlap(&meta, &[150..160]));
        assert!(cells_may_overlap(&meta, &[0..101]));
        assert!(cells_may_overlap(&meta, &[200..300]));
        assert!(!cells_may_overlap(&meta, &[0..100, 201..300]));
        assert!(cells_may_overlap(
            &ColumnRange {
                min: Value::Null,
                max: Value::Null,
                null_count: 1
            },
            &[0..1]
        ));
    }
}
