//! Partition File Reader
//!
//! `PartitionFileReader` loads a partition file's Parquet footer once, then
//! decodes individual columns of individual row groups on demand.
//!
//! ## Opening
//! 1. Parse the footer (`ArrowReaderMetadata::load`), including the embedded
//!    Arrow schema
//! 2. Map every Arrow field back to a [`ColumnSpec`]; a type we never write
//!    makes the file corrupt
//!
//! Statistics, codecs, sorting columns and footer key/values are answered
//! from the footer without touching data pages.
//!
//! ## Decoding
//!
//! Each read builds a `ParquetRecordBatchReader` restricted to one row group
//! and the requested columns, over a fresh handle from [`Source::duplicate`],
//! so a query that only needs `name` never decodes the other columns.
//!
//! Every Parquet or Arrow failure is reported as `CorruptCatalog`. The reader
//! never panics on malformed input.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use arrow::array::{Array, DictionaryArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::Int32Type;
use bytes::Bytes;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::arrow::ProjectionMask;
use parquet::file::reader::{ChunkReader, Length};
use starhouse_core::{Codec, Error, FieldType, Result, Value};

use super::{codec_of, ColumnRange, ColumnSpec, BUILD_ID_KEY};

fn corrupt(msg: impl Into<String>) -> Error {
    Error::CorruptCatalog(msg.into())
}

/// Bytes a partition file can be read from.
pub trait Source: ChunkReader + Sized + 'static {
    /// An independent handle on the same bytes.
    fn duplicate(&self) -> Result<Self>;
}

impl Source for File {
    fn duplicate(&self) -> Result<Self> {
        Ok(self.try_clone()?)
    }
}

impl Source for Bytes {
    fn duplicate(&self) -> Result<Self> {
        Ok(self.clone())
    }
}

/// Reads row groups from a partition file
pub struct PartitionFileReader<S = File> {
    source: S,
    meta: ArrowReaderMetadata,
    columns: Vec<ColumnSpec>,
}

impl PartitionFileReader<File> {
    /// Open a partition file on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => corrupt(format!("missing partition file {}", path.display())),
            _ => Error::Io(e),
        })?;
        Self::new(file).map_err(|e| match e {
            Error::CorruptCatalog(msg) => corrupt(format!("{}: {msg}", path.display())),
            other => other,
        })
    }
}

impl<S: Source> PartitionFileReader<S> {
    pub fn new(source: S) -> Result<Self> {
        let meta = ArrowReaderMetadata::load(&source, ArrowReaderOptions::new())
            .map_err(|e| corrupt(format!("unreadable footer: {e}")))?;
        let columns = meta
            .schema()
            .fields()
            .iter()
            .map(|field| {
                ColumnSpec::from_arrow(field).ok_or_else(|| {
                    corrupt(format!(
                        "column `{}` has unsupported type {}",
                        field.name(),
                        field.data_type()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if meta.parquet_schema().num_columns() != columns.len() {
            return Err(corrupt("nested columns are not supported"));
        }

        Ok(Self {
            source,
            meta,
            columns,
        })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn file_size(&self) -> u64 {
        self.source.len()
    }

    pub fn row_group_count(&self) -> usize {
        self.meta.metadata().num_row_groups()
    }

    /// Rows in `group`, as the footer lists them.
    pub fn row_group_rows(&self, group: usize) -> Option<u64> {
        self.meta
            .metadata()
            .row_groups()
            .get(group)
            .map(|g| g.num_rows().max(0) as u64)
    }

    pub fn record_count(&self) -> u64 {
        (0..self.row_group_count())
            .filter_map(|g| self.row_group_rows(g))
            .sum()
    }

    /// The codec every column chunk was written with. `None` for a file
    /// without row groups.
    pub fn codec(&self) -> Result<Option<Codec>> {
        let mut found = None;
        for group in self.meta.metadata().row_groups() {
            for chunk in group.columns() {
                let codec = codec_of(chunk.compression()).ok_or_else(|| {
                    corrupt(format!("unsupported compression {}", chunk.compression()))
                })?;
                match found {
                    None => found = Some(codec),
                    Some(seen) if seen != codec => {
                        return Err(corrupt(format!("column chunks mix {seen} and {codec}")))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(found)
    }

    pub fn key_value(&self, key: &str) -> Option<&str> {
        self.meta
            .metadata()
            .file_metadata()
            .key_value_metadata()?
            .iter()
            .find(|kv| kv.key == key)?
            .value
            .as_deref()
    }

    /// Id of the build that wrote the file.
    pub fn build_id(&self) -> Option<&str> {
        self.key_value(BUILD_ID_KEY)
    }

    /// Stored column indexes `group` declares itself sorted by.
    pub fn sorting_columns(&self, group: usize) -> Vec<usize> {
        self.meta
            .metadata()
            .row_groups()
            .get(group)
            .and_then(|g| g.sorting_columns())
            .map(|columns| {
                columns
                    .iter()
                    .map(|c| c.column_idx.max(0) as usize)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Footer statistics of one column chunk.
    pub fn column_range(&self, group: usize, column: usize) -> Option<ColumnRange> {
        let group = self.meta.metadata().row_groups().get(group)?;
        if column >= group.num_columns() {
            return None;
        }
        ColumnRange::from_parquet(group.column(column).statistics()?)
    }

    /// Decode one column of one row group.
    pub fn read_column(&self, group: usize, column: usize) -> Result<Vec<Value>> {
        let mut values = self.decode(group, &[column])?;
        values
            .pop()
            .ok_or_else(|| corrupt(format!("row group {group} column {column} is missing")))
    }

    /// Decode some columns of one row group, in the order asked for.
    pub fn read_columns(&self, group: usize, columns: &[usize]) -> Result<Vec<Vec<Value>>> {
        let mut wanted = columns.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        let decoded = self.decode(group, &wanted)?;
        if wanted == columns {
            return Ok(decoded);
        }
        columns
            .iter()
            .map(|column| {
                wanted
                    .iter()
                    .position(|w| w == column)
                    .and_then(|i| decoded.get(i))
                    .cloned()
                    .ok_or_else(|| corrupt(format!("column {column} was not decoded")))
            })
            .collect()
    }

    /// Decode every column of one row group, column-major.
    pub fn read_row_group(&self, group: usize) -> Result<Vec<Vec<Value>>> {
        let all: Vec<usize> = (0..self.columns.len()).collect();
        self.decode(group, &all)
    }

    /// `wanted` must be ascending and free of duplicates.
    fn decode(&self, group: usize, wanted: &[usize]) -> Result<Vec<Vec<Value>>> {
        let rows = self
            .row_group_rows(group)
            .ok_or_else(|| corrupt(format!("row group {group} out of range")))?
            as usize;
        if let Some(column) = wanted.iter().find(|&&c| c >= self.columns.len()) {
            return Err(corrupt(format!("column {column} out of range")));
        }

        let mask = ProjectionMask::roots(self.meta.parquet_schema(), wanted.iter().copied());
        let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(
            self.source.duplicate()?,
            self.meta.clone(),
        );
        let batches = builder
            .with_row_groups(vec![group])
            .with_projection(mask)
            .with_batch_size(rows.max(1))
            .build()
            .map_err(|e| corrupt(format!("row group {group}: {e}")))?;

        let mut out: Vec<Vec<Value>> = wanted.iter().map(|_| Vec::with_capacity(rows)).collect();
        for batch in batches {
            let batch = batch.map_err(|e| corrupt(format!("row group {group}: {e}")))?;
            if batch.num_columns() != wanted.len() {
                return Err(corrupt(format!(
                    "row group {group} decoded {} columns, expected {}",
                    batch.num_columns(),
                    wanted.len()
                )));
            }
            for ((values, &column), array) in out.iter_mut().zip(wanted).zip(batch.columns()) {
                decode_array(&self.columns[column], array.as_ref(), values)?;
            }
        }

        if let Some(short) = out.iter().find(|values| values.len() != rows) {
            return Err(corrupt(format!(
                "row group {group} decoded {} rows, footer lists {rows}",
                short.len()
            )));
        }
        Ok(out)
    }
}

fn decode_array(spec: &ColumnSpec, array: &dyn Array, out: &mut Vec<Value>) -> Result<()> {
    let unexpected = || {
        corrupt(format!(
            "column `{}` decoded as {}, expected {}",
            spec.name,
            array.data_type(),
            spec.field_type
        ))
    };

    match spec.field_type {
        FieldType::Int64 => {
            let array = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(unexpected)?;
            out.extend(array.iter().map(|v| v.map_or(Value::Null, Value::Int)));
        }
        FieldType::Float64 => {
            let array = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(unexpected)?;
            out.extend(array.iter().map(|v| v.map_or(Value::Null, Value::Float)));
        }
        FieldType::Utf8 => {
            let array = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(unexpected)?;
            out.extend(array.iter().map(|v| v.map_or(Value::Null, Value::from)));
        }
        FieldType::Category => {
            let dict = array
                .as_any()
                .downcast_ref::<DictionaryArray<Int32Type>>()
                .ok_or_else(unexpected)?;
            let labels = dict
                .values()
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(unexpected)?;
            for key in dict.keys().iter() {
                let Some(key) = key else {
                    out.push(Value::Null);
                    continue;
                };
                let label = usize::try_from(key)
                    .ok()
                    .filter(|&k| k < labels.len())
                    .ok_or_else(|| {
                        corrupt(format!(
                            "column `{}` has dictionary key {key} out of range",
                            spec.name
                        ))
                    })?;
                out.push(if labels.is_null(label) {
                    Value::Null
                } else {
                    Value::from(labels.value(label))
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{PartitionFileWriter, WriteOptions};
    use crate::pipeline::Row;

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("pk", FieldType::Int64, false),
            ColumnSpec::new("healpix_index", FieldType::Int64, false),
            ColumnSpec::new("magnitude", FieldType::Float64, false),
            ColumnSpec::new("constellation_id", FieldType::Category, true),
            ColumnSpec::new("name", FieldType::Utf8, true),
        ]
    }

    fn sample_file(codec: Codec) -> Bytes {
        let rows: Vec<Row> = (1..=25)
            .map(|i| {
                Row::new(vec![
                    Value::Int(i),
                    Value::Int(1000 + i * 3),
                    Value::Float(i as f64 / 4.0),
                    if i % 5 == 0 {
                        Value::Null
                    } else {
                        Value::from(["ori", "cma", "lyr"][i as usize % 3])
                    },
                    Value::from(format!("star-{i:02}")),
                ])
            })
            .collect();
        let options = WriteOptions {
            codec,
            row_group_size: 10,
            key_columns: vec![2, 1, 0],
            build_id: "b-1".to_string(),
        };
        let mut writer = PartitionFileWriter::new(Vec::new(), columns(), &options).unwrap();
        for group in rows.chunks(10) {
            writer.write_row_group(group).unwrap();
        }
        Bytes::from(writer.finish().unwrap().0)
    }

    #[test]
    fn test_reader_roundtrip_all_codecs() {
        for codec in Codec::ALL {
            let reader = PartitionFileReader::new(sample_file(codec)).unwrap();

            assert_eq!(reader.codec().unwrap(), Some(codec));
            assert_eq!(reader.columns(), columns().as_slice());
            assert_eq!(reader.record_count(), 25);
            assert_eq!(reader.build_id(), Some("b-1"));
            let rows: Vec<u64> = (0..reader.row_group_count())
                .filter_map(|g| reader.row_group_rows(g))
                .collect();
            assert_eq!(rows, vec![10, 10, 5]);

            let last = reader.read_row_group(2).unwrap();
            assert_eq!(last[0], (21..=25).map(Value::Int).collect::<Vec<_>>());
            assert_eq!(last[2][0], Value::Float(21.0 / 4.0));
            assert_eq!(last[3][0], Value::from("ori"));
            assert_eq!(last[3][4], Value::Null);
            assert_eq!(last[4][1], Value::from("star-22"));
        }
    }

    #[test]
    fn test_footer_statistics_and_sorting_columns() {
        let reader = PartitionFileReader::new(sample_file(Codec::Lz4)).unwrap();

        let magnitude = reader.column_range(0, 2).unwrap();
        assert_eq!(magnitude.min, Value::Float(0.25));
        assert_eq!(magnitude.max, Value::Float(2.5));
        assert_eq!(magnitude.null_count, 0);

        let constellation = reader.column_range(0, 3).unwrap();
        assert_eq!(constellation.min, Value::from("cma"));
        assert_eq!(constellation.max, Value::from("ori"));
        assert_eq!(constellation.null_count, 2);

        let name = reader.column_range(2, 4).unwrap();
        assert_eq!(name.min, Value::from("star-21"));
        assert_eq!(name.max, Value::from("star-25"));

        assert_eq!(reader.sorting_columns(1), vec![2, 1, 0]);
        assert!(reader.column_range(3, 0).is_none());
        assert!(reader.column_range(0, 9).is_none());
    }

    #[test]
    fn test_read_columns_in_requested_order() {
        let reader = PartitionFileReader::new(sample_file(Codec::Snappy)).unwrap();
        let columns = reader.read_columns(0, &[4, 0, 4]).unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0][0], Value::from("star-01"));
        assert_eq!(columns[1][0], Value::Int(1));
        assert_eq!(columns[2], columns[0]);

        let pk = reader.read_column(1, 0).unwrap();
        assert_eq!(pk.first(), Some(&Value::Int(11)));
        assert!(matches!(reader.read_column(3, 0), Err(Error::CorruptCatalog(_))));
        assert!(matches!(reader.read_column(0, 7), Err(Error::CorruptCatalog(_))));
    }

    #[test]
    fn test_damaged_files_are_corrupt() {
        let bytes = sample_file(Codec::None).to_vec();

        let mut bad_magic = bytes.clone();
        let end = bad_magic.len();
        bad_magic[end - 1] = b'X';
        assert!(matches!(
            PartitionFileReader::new(Bytes::from(bad_magic)),
            Err(Error::CorruptCatalog(_))
        ));

        let truncated = bytes[..bytes.len() - 5].to_vec();
        assert!(matches!(
            PartitionFileReader::new(Bytes::from(truncated)),
            Err(Error::CorruptCatalog(_))
        ));

        assert!(PartitionFileReader::new(Bytes::from(vec![0u8; 10])).is_err());
    }

    #[test]
    fn test_missing_file_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            PartitionFileReader::open(&dir.path().join("part-00000.parquet")),
            Err(Error::CorruptCatalog(_))
        ));
    }
}
