//! Partition Files
//!
//! A partition file is an Apache Parquet file holding the rows that share one
//! set of partition column values, in key order, cut into row groups of at
//! most `row_group_size` rows.
//!
//! ## What the Files Carry
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ "PAR1"                                                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Row group 0: one column chunk per stored column             │
//! │   pages compressed with the catalog codec                   │
//! │ Row group 1: ...                                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (thrift FileMetaData)                                │
//! │ - Parquet schema + embedded Arrow schema                    │
//! │ - Per row group, per column: codec, min/max, null count     │
//! │ - sorting_columns: the sort key, ascending, nulls first     │
//! │ - key/value "starhouse.build_id" = manifest build id        │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer length (4 bytes) + "PAR1"                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Column types map onto Arrow as follows:
//!
//! | Field type | Arrow type |
//! |------------|------------|
//! | `int64`    | `Int64` |
//! | `float64`  | `Float64` |
//! | `utf8`     | `Utf8` |
//! | `category` | `Dictionary(Int32, Utf8)` |
//!
//! The footer statistics drive row-group pruning; the manifest keeps a copy
//! for the key columns and the two are compared whenever a file is opened.
//!
//! ## Stored Columns
//!
//! Column 0 is `pk`, column 1 is `healpix_index`, then the schema fields in
//! declaration order.

mod reader;
mod stats;
mod writer;

pub use reader::{PartitionFileReader, Source};
pub use stats::ColumnRange;
pub use writer::{PartitionFileWriter, RowGroupSummary, WriteOptions, Written};

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef};
use parquet::basic::Compression;
use serde::{Deserialize, Serialize};
use starhouse_core::{Codec, FieldType, Schema, HEALPIX_COLUMN, PK_COLUMN};

pub const FILE_EXTENSION: &str = "parquet";

/// Footer key holding the id of the build that wrote the file.
pub const BUILD_ID_KEY: &str = "starhouse.build_id";

/// Stored column index of `pk`
pub const PK_INDEX: usize = 0;
/// Stored column index of `healpix_index`
pub const HEALPIX_INDEX: usize = 1;
/// Stored column index of the first schema field
pub const USER_COLUMNS_START: usize = 2;

/// A stored column: name, type and nullability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }

    pub fn arrow_type(&self) -> DataType {
        match self.field_type {
            FieldType::Int64 => DataType::Int64,
            FieldType::Float64 => DataType::Float64,
            FieldType::Utf8 => DataType::Utf8,
            FieldType::Category => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
        }
    }

    /// The column an Arrow field describes, if its type is one we store.
    pub fn from_arrow(field: &Field) -> Option<Self> {
        let field_type = match field.data_type() {
            DataType::Int64 => FieldType::Int64,
            DataType::Float64 => FieldType::Float64,
            DataType::Utf8 => FieldType::Utf8,
            DataType::Dictionary(key, value)
                if **key == DataType::Int32 && **value == DataType::Utf8 =>
            {
                FieldType::Category
            }
            _ => return None,
        };
        Some(Self::new(field.name().clone(), field_type, field.is_nullable()))
    }
}

/// Stored column list for `schema`: `pk`, `healpix_index`, then the fields.
pub fn stored_columns(schema: &Schema) -> Vec<ColumnSpec> {
    let mut columns = Vec::with_capacity(schema.len() + USER_COLUMNS_START);
    columns.push(ColumnSpec::new(PK_COLUMN, FieldType::Int64, false));
    columns.push(ColumnSpec::new(HEALPIX_COLUMN, FieldType::Int64, false));
    columns.extend(
        schema
            .fields()
            .iter()
            .map(|f| ColumnSpec::new(f.name.clone(), f.field_type, f.nullable)),
    );
    columns
}

/// Arrow schema for a stored column list.
pub fn arrow_schema(columns: &[ColumnSpec]) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        columns
            .iter()
            .map(|c| Field::new(c.name.clone(), c.arrow_type(), c.nullable))
            .collect::<Vec<_>>(),
    ))
}

pub(crate) fn compression_of(codec: Codec) -> Compression {
    match codec {
        Codec::None => Compression::UNCOMPRESSED,
        Codec::Lz4 => Compression::LZ4_RAW,
        Codec::Snappy => Compression::SNAPPY,
    }
}

pub(crate) fn codec_of(compression: Compression) -> Option<Codec> {
    match compression {
        Compression::UNCOMPRESSED => Some(Codec::None),
        Compression::LZ4_RAW => Some(Codec::Lz4),
        Compression::SNAPPY => Some(Codec::Snappy),
        _ => None,
    }
}
