//! Build Configuration
//!
//! This module defines [`BuildConfig`], everything a catalog build needs to know
//! before it reads its first record.
//!
//! ## BuildConfig
//!
//! - **output_path**: directory the catalog is written to (must be absent or empty)
//! - **chunk_size**: records buffered, sorted and spilled together as runs
//! - **schema**: user fields every stored record carries
//! - **partition_columns**: columns whose values split the catalog into one file each
//! - **sorting_columns**: leading sort columns, ahead of `healpix_index` and `pk`
//! - **compression**: Parquet page codec (`none`, `lz4`, `snappy`)
//! - **row_group_size**: maximum rows per row group
//! - **resolution**: HEALPix depth used for `healpix_index`
//! - **strict**: abort on the first bad record (default: false)
//!
//! Every field except `strict` is required. A missing value is a configuration
//! error whether the config comes from JSON or from [`BuildConfigBuilder`];
//! nothing is silently defaulted.
//!
//! ## Usage
//!
//! ```ignore
//! use starhouse_core::{Codec, Star};
//! use starhouse_storage::BuildConfig;
//!
//! let config = BuildConfig::builder()
//!     .output_path("catalogs/bright-stars/v1")
//!     .chunk_size(100_000)
//!     .schema(Star::schema())
//!     .partition_columns(Vec::<String>::new())
//!     .sorting_columns(["magnitude"])
//!     .compression(Codec::Lz4)
//!     .row_group_size(10_000)
//!     .resolution(10)
//!     .build()?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use starhouse_core::healpix::MAX_DEPTH;
use starhouse_core::{Codec, Error, FieldType, Result, Schema, HEALPIX_COLUMN, PK_COLUMN};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Catalog directory
    pub output_path: PathBuf,

    /// Records per sorted chunk, spilled as one run per partition
    pub chunk_size: usize,

    /// User fields, in stored order
    pub schema: Schema,

    /// Columns whose values split the catalog into partition files
    pub partition_columns: Vec<String>,

    /// Leading sort columns
    pub sorting_columns: Vec<String>,

    /// Parquet page codec
    pub compression: Codec,

    /// Maximum rows per row group
    pub row_group_size: usize,

    /// HEALPix depth
    pub resolution: u8,

    /// Abort on the first record-level error
    #[serde(default)]
    pub strict: bool,
}

impl BuildConfig {
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BuildConfig = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid build config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read build config {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Check the configuration without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be positive".to_string()));
        }
        if self.row_group_size == 0 {
            return Err(Error::Configuration(
                "row_group_size must be positive".to_string(),
            ));
        }
        if self.resolution > MAX_DEPTH {
            return Err(Error::Configuration(format!(
                "resolution {} exceeds the maximum of {MAX_DEPTH}",
                self.resolution
            )));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(Error::Configuration("output_path is empty".to_string()));
        }
        self.schema.validate()?;

        self.check_columns("partition", &self.partition_columns)?;
        self.check_columns("sorting", &self.sorting_columns)?;

        for name in &self.partition_columns {
            if let Some(field) = self.schema.field(name) {
                if field.field_type == FieldType::Float64 {
                    return Err(Error::Configuration(format!(
                        "partition column `{name}` is float64; only int64, utf8 and category can partition"
                    )));
                }
            }
            if self.sorting_columns.contains(name) {
                return Err(Error::Configuration(format!(
                    "`{name}` cannot be both a partition and a sorting column"
                )));
            }
        }
        Ok(())
    }

    fn check_columns(&self, role: &str, columns: &[String]) -> Result<()> {
        for (i, name) in columns.iter().enumerate() {
            if name == PK_COLUMN || name == HEALPIX_COLUMN {
                return Err(Error::Configuration(format!(
                    "`{name}` is reserved and cannot be a {role} column"
                )));
            }
            if self.schema.field(name).is_none() {
                return Err(Error::Configuration(format!(
                    "unknown {role} column `{name}`"
                )));
            }
            if columns[..i].contains(name) {
                return Err(Error::Configuration(format!(
                    "duplicate {role} column `{name}`"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`BuildConfig`]. `build()` fails on any unset required field.
#[derive(Debug, Clone, Default)]
pub struct BuildConfigBuilder {
    output_path: Option<PathBuf>,
    chunk_size: Option<usize>,
    schema: Option<Schema>,
    partition_columns: Option<Vec<String>>,
    sorting_columns: Option<Vec<String>>,
    compression: Option<Codec>,
    row_group_size: Option<usize>,
    resolution: Option<u8>,
    strict: bool,
}

impl BuildConfigBuilder {
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn partition_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn sorting_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sorting_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn compression(mut self, codec: Codec) -> Self {
        self.compression = Some(codec);
        self
    }

    pub fn row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = Some(rows);
        self
    }

    pub fn resolution(mut self, depth: u8) -> Self {
        self.resolution = Some(depth);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Result<BuildConfig> {
        let config = BuildConfig {
            output_path: required(self.output_path, "output_path")?,
            chunk_size: required(self.chunk_size, "chunk_size")?,
            schema: required(self.schema, "schema")?,
            partition_columns: required(self.partition_columns, "partition_columns")?,
            sorting_columns: required(self.sorting_columns, "sorting_columns")?,
            compression: required(self.compression, "compression")?,
            row_group_size: required(self.row_group_size, "row_group_size")?,
            resolution: required(self.resolution, "resolution")?,
            strict: self.strict,
        };
        config.validate()?;
        Ok(config)
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::Configuration(format!("missing required option `{name}`")))
}
