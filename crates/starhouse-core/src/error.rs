//! Error Types for Starhouse
//!
//! This module defines every error that can surface while building or querying
//! a catalog.
//!
//! ## Error Categories
//!
//! ### Record-Level Errors
//! Raised for a single input record. A build counts them and keeps going unless
//! strict mode is enabled.
//! - `InvalidCoordinate`: `ra`/`dec` outside `[0,360) x [-90,90]` or non-finite
//! - `MalformedRecord`: missing required field, wrong value type, non-finite float
//!
//! ### Build-Level Errors
//! Fatal to the build. No manifest is written.
//! - `Configuration`: missing or contradictory build options (raised before any I/O)
//! - `StrictAbort`: strict mode hit its first record-level error
//! - `Io`: the output directory could not be created or written
//! - `Serialization`: a partition file or the manifest could not be encoded
//!
//! ### Query-Level Errors
//! Fatal to one call only. The store is never modified by a query.
//! - `IncompatibleCatalog`: resolution or format version mismatch, or no catalog at the path
//! - `CorruptCatalog`: statistics, checksums or structure disagree with stored data
//! - `SchemaMismatch`: the query names a field the manifest schema does not have
//!
//! A record that fails a filter is *not* an error. It is counted as rejected.
//!
//! ## Usage
//! All fallible functions return `Result<T>`, aliased to `Result<T, Error>`, so
//! errors propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid coordinate: ra={ra}, dec={dec}")]
    InvalidCoordinate { ra: f64, dec: f64 },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Incompatible catalog: {0}")]
    IncompatibleCatalog(String),

    #[error("Corrupt catalog: {0}")]
    CorruptCatalog(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Strict mode aborted the build at input record {position}: {source}")]
    StrictAbort {
        position: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for errors attributable to a single input record.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Error::InvalidCoordinate { .. } | Error::MalformedRecord(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_level_classification() {
        assert!(Error::InvalidCoordinate { ra: 400.0, dec: 0.0 }.is_record_level());
        assert!(Error::MalformedRecord("x".into()).is_record_level());
        assert!(!Error::Configuration("x".into()).is_record_level());
        assert!(!Error::CorruptCatalog("x".into()).is_record_level());
    }

    #[test]
    fn test_strict_abort_keeps_source() {
        let err = Error::StrictAbort {
            position: 7,
            source: Box::new(Error::InvalidCoordinate { ra: f64::NAN, dec: 0.0 }),
        };
        let text = err.to_string();
        assert!(text.contains("input record 7"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
