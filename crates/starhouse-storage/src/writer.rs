//! Catalog Writer
//!
//! Lays sorted data out as one partition file per partition under
//! `<root>/data/`.
//!
//! ## Write Path
//!
//! For each chunk handed over by the pipeline:
//!
//! 1. **Sort** the chunk by the composite key
//! 2. **Group** rows by their partition column values (order within a group is
//!    the sort order)
//! 3. **Spill** each group as a sorted run: an uncompressed Parquet file under
//!    `<root>/runs/`
//!
//! Once the input is exhausted, [`CatalogWriter::finish`] turns the runs into
//! the catalog:
//!
//! 4. **Merge** every partition's runs with a k-way merge on the sort key,
//!    holding one decoded row group per run
//! 5. **Write** the merged stream as one partition file, cut into row groups
//!    of `row_group_size`, and fsync it
//! 6. **Record** a [`FileEntry`] with the row-group statistics, then delete
//!    the runs
//!
//! Every partition file is in key order from its first row to its last, so
//! row-group key ranges never overlap.
//!
//! ```text
//! runs/run-00000-00001.parquet  ─┐
//! runs/run-00001-00000.parquet  ─┼─► data/constellation_id=ori/part-00000.parquet
//! runs/run-00002-00001.parquet  ─┘
//! ```
//!
//! Partition values keep ASCII letters, digits and `-` as they are; every
//! other byte is written as `%XX`. `Null` is the literal `__null__`, which no
//! escaped value can produce.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use starhouse_core::value::compare_keys;
use starhouse_core::{Codec, Error, Result, Value};
use uuid::Uuid;

use crate::config::BuildConfig;
use crate::manifest::{ColumnStats, FileEntry, PartitionValue, RowGroupMeta, MANIFEST_FILE};
use crate::observer::BuildObserver;
use crate::partition::{
    stored_columns, ColumnSpec, PartitionFileReader, PartitionFileWriter, WriteOptions,
    FILE_EXTENSION,
};
use crate::pipeline::{rows_from_columns, sort_chunk, Row, SortKey};
use crate::report::ChunkSummary;

/// Directory under the catalog root holding partition files.
pub const DATA_DIR: &str = "data";

/// Directory under the catalog root holding sorted runs while a build is in
/// progress.
pub const RUNS_DIR: &str = "runs";

const NULL_PARTITION: &str = "__null__";

/// The on-disk footprint of a build in progress.
///
/// `prepare` claims the output directory; `discard` removes everything the
/// build staged so a failed build leaves nothing behind.
#[derive(Debug)]
pub struct CatalogLayout {
    root: PathBuf,
    created_root: bool,
}

impl CatalogLayout {
    /// Claim `root` for a new catalog. It must be absent or an empty directory.
    pub fn prepare(root: &Path) -> Result<Self> {
        let created_root = match fs::read_dir(root) {
            Ok(mut entries) => {
                if root.join(MANIFEST_FILE).exists() {
                    return Err(Error::Configuration(format!(
                        "{} already holds a catalog; catalogs are immutable, build into a new path",
                        root.display()
                    )));
                }
                if entries.next().is_some() {
                    return Err(Error::Configuration(format!(
                        "output path {} is not empty",
                        root.display()
                    )));
                }
                false
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(root)?;
                true
            }
            Err(e) if root.is_file() => {
                return Err(Error::Configuration(format!(
                    "output path {} is a file: {e}",
                    root.display()
                )))
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let layout = Self {
            root: root.to_path_buf(),
            created_root,
        };
        for dir in [DATA_DIR, RUNS_DIR] {
            if let Err(e) = fs::create_dir(root.join(dir)) {
                layout.discard();
                return Err(Error::Io(e));
            }
        }
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove everything the build wrote.
    pub fn discard(self) {
        for staged in [DATA_DIR, RUNS_DIR] {
            remove_staged(&self.root.join(staged));
        }
        let _ = fs::remove_file(self.root.join(MANIFEST_FILE).with_extension("json.tmp"));
        if self.created_root {
            let _ = fs::remove_dir(&self.root);
        }
    }
}

fn remove_staged(path: &Path) {
    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    if let Err(e) = removed {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove staged data");
        }
    }
}

/// One sorted run spilled from a chunk.
#[derive(Debug)]
struct Run {
    partition: Vec<Value>,
    path: PathBuf,
}

/// Writes sorted chunks out as runs, then merges them into partition files.
pub struct CatalogWriter {
    root: PathBuf,
    columns: Vec<ColumnSpec>,
    options: WriteOptions,
    key: SortKey,
    /// (name, stored column index) per partition column
    partition_columns: Vec<(String, usize)>,

    runs: Vec<Run>,
    chunks: u32,
}

impl CatalogWriter {
    /// Set up a writer for `config`. Does no I/O.
    pub fn new(config: &BuildConfig, build_id: Uuid) -> Result<Self> {
        let columns = stored_columns(&config.schema);
        let key = SortKey::new(&config.schema, &config.sorting_columns)?;
        let partition_columns = config
            .partition_columns
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .position(|c| &c.name == name)
                    .map(|index| (name.clone(), index))
                    .ok_or_else(|| {
                        Error::Configuration(format!("unknown partition column `{name}`"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: config.output_path.clone(),
            columns,
            options: WriteOptions {
                codec: config.compression,
                row_group_size: config.row_group_size,
                key_columns: key.columns().to_vec(),
                build_id: build_id.to_string(),
            },
            key,
            partition_columns,
            runs: Vec::new(),
            chunks: 0,
        })
    }

    pub fn sort_key(&self) -> &SortKey {
        &self.key
    }

    /// Sort `rows` and spill them as the next chunk's runs.
    pub fn write_chunk(&mut self, mut rows: Vec<Row>) -> Result<ChunkSummary> {
        let chunk = self.chunks;
        let row_count = rows.len();
        sort_chunk(&mut rows, &self.key);

        let mut runs = 0;
        let mut bytes = 0u64;
        for (partition, group) in self.group_by_partition(rows) {
            let (run, size) = self.spill(chunk, runs, partition, &group)?;
            runs += 1;
            bytes += size;
            self.runs.push(run);
        }

        self.chunks += 1;
        Ok(ChunkSummary {
            chunk,
            rows: row_count,
            runs,
            bytes,
        })
    }

    /// Split sorted rows by partition values, keeping sort order inside each
    /// group. Groups come back ordered by their partition values.
    fn group_by_partition(&self, rows: Vec<Row>) -> Vec<(Vec<Value>, Vec<Row>)> {
        if self.partition_columns.is_empty() {
            return vec![(Vec::new(), rows)];
        }

        let mut groups: HashMap<Vec<PartitionKey>, (Vec<Value>, Vec<Row>)> = HashMap::new();
        for row in rows {
            let values: Vec<Value> = self
                .partition_columns
                .iter()
                .map(|(_, index)| row.value(*index).clone())
                .collect();
            let key = values.iter().map(PartitionKey::from).collect();
            groups
                .entry(key)
                .or_insert_with(|| (values, Vec::new()))
                .1
                .push(row);
        }

        let mut groups: Vec<_> = groups.into_values().collect();
        groups.sort_by(|a, b| compare_keys(&a.0, &b.0));
        groups
    }

    fn spill(
        &self,
        chunk: u32,
        index: usize,
        partition: Vec<Value>,
        rows: &[Row],
    ) -> Result<(Run, u64)> {
        let path = self
            .root
            .join(RUNS_DIR)
            .join(format!("run-{chunk:05}-{index:05}.{FILE_EXTENSION}"));
        let options = WriteOptions {
            codec: Codec::None,
            ..self.options.clone()
        };

        let file = File::create(&path)?;
        let mut writer =
            PartitionFileWriter::new(BufWriter::new(file), self.columns.clone(), &options)?;
        for group in rows.chunks(options.row_group_size) {
            writer.write_row_group(group)?;
        }
        let (sink, written) = writer.finish()?;
        sink.into_inner().map_err(|e| Error::Io(e.into_error()))?;

        tracing::trace!(path = %path.display(), rows = rows.len(), bytes = written.bytes, "run spilled");
        Ok((Run { partition, path }, written.bytes))
    }

    /// Merge the spilled runs into one file per partition and remove them.
    ///
    /// Files come back ordered by partition values.
    pub fn finish(mut self, observer: &dyn BuildObserver) -> Result<Vec<FileEntry>> {
        let mut partitions: Vec<(Vec<Value>, Vec<Run>)> = Vec::new();
        let mut slots: HashMap<Vec<PartitionKey>, usize> = HashMap::new();
        for run in std::mem::take(&mut self.runs) {
            let key: Vec<PartitionKey> = run.partition.iter().map(PartitionKey::from).collect();
            match slots.get(&key) {
                Some(&slot) => partitions[slot].1.push(run),
                None => {
                    slots.insert(key, partitions.len());
                    partitions.push((run.partition.clone(), vec![run]));
                }
            }
        }
        partitions.sort_by(|a, b| compare_keys(&a.0, &b.0));

        let mut files = Vec::with_capacity(partitions.len());
        for (partition, runs) in partitions {
            let entry = self.merge_partition(partition, &runs)?;
            observer.file_written(&entry);
            files.push(entry);
        }

        fs::remove_dir_all(self.root.join(RUNS_DIR))?;
        Ok(files)
    }

    fn merge_partition(&self, partition: Vec<Value>, runs: &[Run]) -> Result<FileEntry> {
        let mut cursors = runs
            .iter()
            .map(|run| RunCursor::open(&run.path))
            .collect::<Result<Vec<_>>>()?;
        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for (run, cursor) in cursors.iter_mut().enumerate() {
            if let Some(row) = cursor.next_row()? {
                heap.push(Pending::new(&self.key, row, run));
            }
        }

        let relative = self.relative_path(&partition);
        let path = relative
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part));
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = File::create(&path)?;
        let mut writer =
            PartitionFileWriter::new(BufWriter::new(file), self.columns.clone(), &self.options)?;

        let mut row_groups = Vec::new();
        let mut group = Vec::with_capacity(self.options.row_group_size);
        while let Some(Pending { row, run, .. }) = heap.pop() {
            if let Some(next) = cursors[run].next_row()? {
                heap.push(Pending::new(&self.key, next, run));
            }
            group.push(row);
            if group.len() == self.options.row_group_size {
                row_groups.push(self.write_group(&mut writer, &group)?);
                group.clear();
            }
        }
        if !group.is_empty() {
            row_groups.push(self.write_group(&mut writer, &group)?);
        }

        let record_count = writer.record_count();
        let (sink, written) = writer.finish()?;
        let file = sink.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;

        tracing::debug!(
            path = %path.display(),
            runs = runs.len(),
            rows = record_count,
            row_groups = row_groups.len(),
            bytes = written.bytes,
            "partition file written"
        );

        Ok(FileEntry {
            path: relative,
            partition: self
                .partition_columns
                .iter()
                .zip(partition)
                .map(|((column, _), value)| PartitionValue {
                    column: column.clone(),
                    value,
                })
                .collect(),
            record_count,
            size_bytes: written.bytes,
            crc32: written.crc32,
            row_groups,
        })
    }

    fn write_group<W: Write + Send>(
        &self,
        writer: &mut PartitionFileWriter<W>,
        rows: &[Row],
    ) -> Result<RowGroupMeta> {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(Error::Serialization("cannot write an empty row group".to_string()));
        };
        let summary = writer.write_row_group(rows)?;
        Ok(RowGroupMeta {
            rows: summary.rows,
            first_pk: summary.first_pk,
            stats: summary
                .stats
                .into_iter()
                .map(|(column, range)| ColumnStats {
                    column: self.columns[column].name.clone(),
                    range,
                })
                .collect(),
            first_key: self.key.key_of(first),
            last_key: self.key.key_of(last),
        })
    }

    /// `/`-separated path of a partition's file, relative to the root.
    fn relative_path(&self, partition: &[Value]) -> String {
        let mut parts = vec![DATA_DIR.to_string()];
        for ((name, _), value) in self.partition_columns.iter().zip(partition) {
            parts.push(format!("{name}={}", escape_partition_value(value)));
        }
        parts.push(format!("part-00000.{FILE_EXTENSION}"));
        parts.join("/")
    }

    pub fn chunks_written(&self) -> u32 {
        self.chunks
    }

    pub fn runs_written(&self) -> usize {
        self.runs.len()
    }
}

/// Sequential reader over one run, one row group at a time.
struct RunCursor {
    reader: PartitionFileReader,
    next_group: usize,
    buffered: std::vec::IntoIter<Row>,
}

impl RunCursor {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reader: PartitionFileReader::open(path)?,
            next_group: 0,
            buffered: Vec::new().into_iter(),
        })
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffered.next() {
                return Ok(Some(row));
            }
            if self.next_group >= self.reader.row_group_count() {
                return Ok(None);
            }
            let columns = self.reader.read_row_group(self.next_group)?;
            self.next_group += 1;
            self.buffered = rows_from_columns(columns).into_iter();
        }
    }
}

/// Head row of a run waiting in the merge heap.
struct Pending {
    key: Vec<Value>,
    row: Row,
    run: usize,
}

impl Pending {
    fn new(key: &SortKey, row: Row, run: usize) -> Self {
        Self {
            key: key.key_of(&row),
            row,
            run,
        }
    }
}

// BinaryHeap pops the greatest, so the order is reversed to pop the least key.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&other.key, &self.key)
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

/// Hashable form of a partition value. Partition columns are never float.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PartitionKey {
    Null,
    Int(i64),
    Str(String),
    Float(u64),
}

impl From<&Value> for PartitionKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => PartitionKey::Null,
            Value::Int(v) => PartitionKey::Int(*v),
            Value::Float(v) => PartitionKey::Float(v.to_bits()),
            Value::Str(s) => PartitionKey::Str(s.clone()),
        }
    }
}

/// Directory-safe rendering of a partition value.
pub fn escape_partition_value(value: &Value) -> String {
    let text = match value {
        Value::Null => return NULL_PARTITION.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Str(s) => s.clone(),
    };
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
