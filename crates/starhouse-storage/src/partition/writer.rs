//! Partition File Writer
//!
//! `PartitionFileWriter` streams sorted row groups into a Parquet file:
//!
//! 1. **Builds a record batch** of Arrow arrays, one per stored column
//! 2. **Writes it** through `ArrowWriter` and flushes, so every call is
//!    exactly one Parquet row group
//! 3. **Summarizes** the group: row count, first `pk`, key column ranges
//!
//! Bytes pass through a `Digest` on the way to the sink, which counts them
//! and keeps a CRC32 of the whole file for the manifest.
//!
//! ```ignore
//! let mut writer = PartitionFileWriter::new(file, columns, &options)?;
//! for group in rows.chunks(options.row_group_size) {
//!     writer.write_row_group(group)?;
//! }
//! let (file, written) = writer.finish()?;
//! ```

use std::io::Write;
use std::sync::Arc;

use arrow::array::{ArrayRef, DictionaryArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Int32Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};
use parquet::format::SortingColumn;
use starhouse_core::{Codec, Error, FieldType, Result, Value};

use super::{arrow_schema, compression_of, ColumnRange, ColumnSpec, BUILD_ID_KEY};
use crate::pipeline::Row;

/// How a partition file is written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    pub codec: Codec,
    pub row_group_size: usize,
    /// Stored column indexes of the sort key, most significant first. These
    /// become the file's sorting columns and get a [`ColumnRange`] in every
    /// [`RowGroupSummary`].
    pub key_columns: Vec<usize>,
    pub build_id: String,
}

impl WriteOptions {
    fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(compression_of(self.codec))
            .set_max_row_group_size(self.row_group_size)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .set_sorting_columns(Some(
                self.key_columns
                    .iter()
                    .map(|&column| SortingColumn {
                        column_idx: column as i32,
                        descending: false,
                        nulls_first: true,
                    })
                    .collect(),
            ))
            .set_key_value_metadata(Some(vec![KeyValue::new(
                BUILD_ID_KEY.to_string(),
                self.build_id.clone(),
            )]))
            .set_created_by(format!("starhouse {}", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

/// What a written row group looks like from the outside.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroupSummary {
    pub rows: u32,
    pub first_pk: u64,
    /// `(stored column, range)` for each key column
    pub stats: Vec<(usize, ColumnRange)>,
}

/// Size and checksum of a finished file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    pub bytes: u64,
    pub crc32: u32,
}

/// Counts and checksums everything written to the inner sink.
struct Digest<W> {
    inner: W,
    bytes: u64,
    hasher: crc32fast::Hasher,
}

impl<W: Write> Digest<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            bytes: 0,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn into_parts(self) -> (W, Written) {
        (
            self.inner,
            Written {
                bytes: self.bytes,
                crc32: self.hasher.finalize(),
            },
        )
    }
}

impl<W: Write> Write for Digest<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Builds a partition file from row groups
pub struct PartitionFileWriter<W: Write + Send> {
    inner: ArrowWriter<Digest<W>>,
    schema: SchemaRef,
    columns: Vec<ColumnSpec>,
    key_columns: Vec<usize>,
    row_group_size: usize,
    row_groups: usize,
    records: u64,
}

impl<W: Write + Send> PartitionFileWriter<W> {
    pub fn new(sink: W, columns: Vec<ColumnSpec>, options: &WriteOptions) -> Result<Self> {
        let schema = arrow_schema(&columns);
        let inner =
            ArrowWriter::try_new(Digest::new(sink), Arc::clone(&schema), Some(options.properties()))
                .map_err(|e| Error::Serialization(format!("open partition writer: {e}")))?;
        Ok(Self {
            inner,
            schema,
            columns,
            key_columns: options.key_columns.clone(),
            row_group_size: options.row_group_size,
            row_groups: 0,
            records: 0,
        })
    }

    /// Append one row group. Rows must be in stored column layout.
    pub fn write_row_group(&mut self, rows: &[Row]) -> Result<RowGroupSummary> {
        let first = rows
            .first()
            .ok_or_else(|| Error::Serialization("cannot write an empty row group".to_string()))?;
        if rows.len() > self.row_group_size {
            return Err(Error::Serialization(format!(
                "row group of {} rows exceeds the limit of {}",
                rows.len(),
                self.row_group_size
            )));
        }
        let row_count = u32::try_from(rows.len()).map_err(|_| {
            Error::Serialization(format!("row group of {} rows is too large", rows.len()))
        })?;
        if let Some(bad) = rows.iter().find(|r| r.values().len() != self.columns.len()) {
            return Err(Error::Serialization(format!(
                "row has {} values but the file has {} columns",
                bad.values().len(),
                self.columns.len()
            )));
        }

        let arrays = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| column_array(column, index, rows))
            .collect::<Result<Vec<_>>>()?;
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), arrays)
            .map_err(|e| Error::Serialization(format!("build record batch: {e}")))?;
        self.inner.write(&batch).map_err(write_error)?;
        self.inner.flush().map_err(write_error)?;

        self.row_groups += 1;
        self.records += rows.len() as u64;

        Ok(RowGroupSummary {
            rows: row_count,
            first_pk: first.pk(),
            stats: self
                .key_columns
                .iter()
                .map(|&column| (column, ColumnRange::of(rows.iter().map(|r| r.value(column)))))
                .collect(),
        })
    }

    pub fn row_group_count(&self) -> usize {
        self.row_groups
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Write the footer and hand back the sink.
    pub fn finish(self) -> Result<(W, Written)> {
        let digest = self.inner.into_inner().map_err(write_error)?;
        Ok(digest.into_parts())
    }
}

fn write_error(e: parquet::errors::ParquetError) -> Error {
    match e {
        parquet::errors::ParquetError::External(inner) => match inner.downcast::<std::io::Error>() {
            Ok(io) => Error::Io(*io),
            Err(other) => Error::Serialization(format!("write partition file: {other}")),
        },
        other => Error::Serialization(format!("write partition file: {other}")),
    }
}

fn column_array(spec: &ColumnSpec, index: usize, rows: &[Row]) -> Result<ArrayRef> {
    let values = rows.iter().map(|r| r.value(index));
    let mismatch = |value: &Value| {
        Error::Serialization(format!(
            "column `{}` is {} but holds `{value}`",
            spec.name, spec.field_type
        ))
    };

    Ok(match spec.field_type {
        FieldType::Int64 => Arc::new(
            values
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int(i) => Ok(Some(*i)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Int64Array>>()?,
        ),
        FieldType::Float64 => Arc::new(
            values
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Float(f) => Ok(Some(*f)),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<Float64Array>>()?,
        ),
        FieldType::Utf8 => Arc::new(
            values
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Str(s) => Ok(Some(s.as_str())),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<StringArray>>()?,
        ),
        FieldType::Category => Arc::new(
            values
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Str(s) => Ok(Some(s.as_str())),
                    other => Err(mismatch(other)),
                })
                .collect::<Result<DictionaryArray<Int32Type>>>()?,
        ),
    })
}
