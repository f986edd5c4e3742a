//! Command handlers for starctl
//!
//! This module contains handlers for different command categories:
//! - Build: new catalogs from NDJSON input, one per magnitude limit
//! - Inspect: catalog properties and integrity checks
//! - Query: scans, exact-match lookups and cone searches

pub mod build;
pub mod inspect;
pub mod query;

use std::path::Path;

use anyhow::{Context, Result};
use starhouse_storage::Catalog;

/// Open the catalog at `path`, checking the resolution when one is given.
pub fn open_catalog(path: &Path, resolution: Option<u8>) -> Result<Catalog> {
    let catalog = match resolution {
        Some(resolution) => Catalog::open(path, resolution),
        None => Catalog::open_any(path),
    };
    catalog.with_context(|| format!("Failed to open catalog at {}", path.display()))
}

/// Stored column names in catalog order.
pub fn column_names(catalog: &Catalog) -> Vec<String> {
    catalog
        .manifest()
        .columns
        .iter()
        .map(|c| c.name.clone())
        .collect()
}
