//! Catalog Reading
//!
//! Shared machinery for every read path (`all`, `get`, `cone`, `verify`):
//! opening partition files with their integrity checks, decoding columns with
//! their statistics checks, and turning column-major row groups back into
//! [`Record`]s.
//!
//! ## Integrity Checks
//!
//! When a file is opened:
//! - its size must equal the manifest's `size_bytes`
//! - its columns must equal the manifest's stored columns
//! - its codec, build id and sorting columns must match the manifest
//! - its row-group layout (count, rows per group) must match the manifest
//! - every manifest statistic must equal the Parquet footer statistic for the
//!   same column chunk
//!
//! When a column is decoded:
//! - the decoded values' actual range must equal the footer statistics
//! - the first decoded `pk` must equal the group's `first_pk`
//!
//! Any disagreement is `CorruptCatalog`. The whole-file CRC32 is only checked
//! by `verify`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use starhouse_core::{Error, Record, Result, Value};

use crate::manifest::{FileEntry, Manifest};
use crate::partition::{ColumnRange, PartitionFileReader, HEALPIX_INDEX, PK_INDEX};

pub(crate) type FileReader = PartitionFileReader;

/// Open a partition file and check its footer against the manifest.
pub(crate) fn open_file(root: &Path, manifest: &Manifest, entry: &FileEntry) -> Result<FileReader> {
    let reader = PartitionFileReader::open(&manifest.file_path(root, entry))?;
    let corrupt = |msg: String| Error::CorruptCatalog(format!("{}: {msg}", entry.path));

    if reader.file_size() != entry.size_bytes {
        return Err(corrupt(format!(
            "file is {} bytes, manifest lists {}",
            reader.file_size(),
            entry.size_bytes
        )));
    }
    if reader.columns() != manifest.columns.as_slice() {
        return Err(corrupt("columns do not match the manifest".to_string()));
    }
    match reader.codec()? {
        Some(codec) if codec != manifest.compression => {
            return Err(corrupt(format!(
                "file codec {codec} does not match manifest codec {}",
                manifest.compression
            )))
        }
        _ => {}
    }
    let build_id = manifest.build_id.to_string();
    if reader.build_id() != Some(build_id.as_str()) {
        return Err(corrupt(format!(
            "file was written by build {}, manifest is build {build_id}",
            reader.build_id().unwrap_or("<none>")
        )));
    }
    if reader.record_count() != entry.record_count
        || reader.row_group_count() != entry.row_groups.len()
    {
        return Err(corrupt(format!(
            "file holds {} records in {} row groups, manifest lists {} in {}",
            reader.record_count(),
            reader.row_group_count(),
            entry.record_count,
            entry.row_groups.len()
        )));
    }

    let key_columns = manifest
        .sorting_columns
        .iter()
        .map(|name| manifest.column_index(name))
        .chain([Some(HEALPIX_INDEX), Some(PK_INDEX)])
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| corrupt("sorting column missing from the manifest columns".to_string()))?;

    for (group, meta) in entry.row_groups.iter().enumerate() {
        if reader.row_group_rows(group) != Some(meta.rows as u64) {
            return Err(corrupt(format!(
                "row group {group} layout does not match the manifest"
            )));
        }
        if reader.sorting_columns(group) != key_columns {
            return Err(corrupt(format!(
                "row group {group} sorting columns do not match the manifest"
            )));
        }
        for stats in &meta.stats {
            let footer = manifest
                .column_index(&stats.column)
                .and_then(|column| reader.column_range(group, column));
            if footer.as_ref() != Some(&stats.range) {
                return Err(corrupt(format!(
                    "row group {group} statistics for `{}` disagree between manifest and file",
                    stats.column
                )));
            }
        }
    }

    tracing::debug!(
        path = %entry.path,
        row_groups = entry.row_groups.len(),
        records = entry.record_count,
        "Opened partition file"
    );
    Ok(reader)
}

/// Decode one column and check it against the group's statistics.
pub(crate) fn read_column_checked(
    reader: &FileReader,
    manifest: &Manifest,
    entry: &FileEntry,
    group: usize,
    column: usize,
) -> Result<Vec<Value>> {
    let values = reader.read_column(group, column)?;
    check_decoded(reader, manifest, entry, group, column, &values)?;
    Ok(values)
}

fn check_decoded(
    reader: &FileReader,
    manifest: &Manifest,
    entry: &FileEntry,
    group: usize,
    column: usize,
    values: &[Value],
) -> Result<()> {
    let corrupt = |msg: String| Error::CorruptCatalog(format!("{}: {msg}", entry.path));
    let meta = entry
        .row_groups
        .get(group)
        .ok_or_else(|| corrupt(format!("row group {group} is not in the manifest")))?;
    if values.len() != meta.rows as usize {
        return Err(corrupt(format!(
            "row group {group} decoded {} rows, manifest lists {}",
            values.len(),
            meta.rows
        )));
    }
    if let Some(footer) = reader.column_range(group, column) {
        if ColumnRange::of(values) != footer {
            let name = &manifest.columns[column].name;
            return Err(corrupt(format!(
                "row group {group} statistics for `{name}` do not match its data"
            )));
        }
    }
    if column == PK_INDEX
        && values.first().and_then(Value::as_i64) != Some(meta.first_pk as i64)
    {
        return Err(corrupt(format!(
            "row group {group} does not start at pk {}",
            meta.first_pk
        )));
    }
    Ok(())
}

/// Decode every column of a row group, column-major.
pub(crate) fn read_group_checked(
    reader: &FileReader,
    manifest: &Manifest,
    entry: &FileEntry,
    group: usize,
) -> Result<Vec<Vec<Value>>> {
    let columns = reader.read_row_group(group)?;
    for (column, values) in columns.iter().enumerate() {
        check_decoded(reader, manifest, entry, group, column, values)?;
    }
    Ok(columns)
}

/// Build the record at `row` from column-major data.
pub(crate) fn record_at(manifest: &Manifest, columns: &[Vec<Value>], row: usize) -> Record {
    manifest
        .columns
        .iter()
        .zip(columns)
        .map(|(spec, values)| (spec.name.clone(), values[row].clone()))
        .collect()
}

/// Turn column-major data into records, consuming it.
pub(crate) fn into_records(manifest: &Manifest, columns: Vec<Vec<Value>>) -> Vec<Record> {
    let rows = columns.first().map_or(0, Vec::len);
    let mut iters: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    (0..rows)
        .map(|_| {
            manifest
                .columns
                .iter()
                .zip(iters.iter_mut())
                .map(|(spec, values)| (spec.name.clone(), values.next().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Lazy iterator over every record of a catalog.
///
/// Records come in manifest file order, then row-group order, then row order,
/// which is the stored sort order within each file. One row group is decoded
/// at a time. The iterator owns its file handle, so any number of iterators
/// can run at once. After the first error it yields `None`.
pub struct RecordIter {
    root: PathBuf,
    manifest: Arc<Manifest>,
    file: usize,
    group: usize,
    reader: Option<FileReader>,
    buffered: std::vec::IntoIter<Record>,
    done: bool,
}

impl RecordIter {
    pub(crate) fn new(root: PathBuf, manifest: Arc<Manifest>) -> Self {
        Self {
            root,
            manifest,
            file: 0,
            group: 0,
            reader: None,
            buffered: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Decode the next row group into the buffer. `false` at the end.
    fn load_next_group(&mut self) -> Result<bool> {
        let manifest = Arc::clone(&self.manifest);
        loop {
            let Some(entry) = manifest.files.get(self.file) else {
                return Ok(false);
            };
            if self.group >= entry.row_groups.len() {
                self.reader = None;
                self.file += 1;
                self.group = 0;
                continue;
            }

            let reader = match &mut self.reader {
                Some(reader) => reader,
                slot @ None => slot.insert(open_file(&self.root, &manifest, entry)?),
            };
            let columns = read_group_checked(reader, &manifest, entry, self.group)?;
            self.buffered = into_records(&manifest, columns).into_iter();
            self.group += 1;
            return Ok(true);
        }
    }
}

impl Iterator for RecordIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffered.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.load_next_group() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    self.reader = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for RecordIter {}
