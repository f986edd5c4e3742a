//! Catalog inspection: `info` and `verify`.

use anyhow::{Context, Result};
use starhouse_storage::Catalog;

use crate::format::Formatter;

/// Catalog properties as ordered key/value pairs.
pub fn info_pairs(catalog: &Catalog) -> Vec<(String, String)> {
    let manifest = catalog.manifest();
    let list = |items: &[String]| {
        if items.is_empty() {
            "-".to_string()
        } else {
            items.join(", ")
        }
    };
    let bytes: u64 = manifest.files.iter().map(|f| f.size_bytes).sum();

    vec![
        ("path".to_string(), catalog.path().display().to_string()),
        ("build_id".to_string(), manifest.build_id.to_string()),
        ("format_version".to_string(), manifest.format_version.to_string()),
        ("engine_version".to_string(), manifest.engine_version.clone()),
        ("created_at_ms".to_string(), manifest.created_at_ms.to_string()),
        ("records".to_string(), manifest.record_count.to_string()),
        ("files".to_string(), manifest.files.len().to_string()),
        ("row_groups".to_string(), manifest.row_group_count().to_string()),
        ("bytes".to_string(), bytes.to_string()),
        ("resolution".to_string(), manifest.resolution.to_string()),
        ("compression".to_string(), manifest.compression.name().to_string()),
        ("sorting_columns".to_string(), list(&manifest.sorting_columns)),
        ("partition_columns".to_string(), list(&manifest.partition_columns)),
        ("filter".to_string(), manifest.filter.clone()),
        (
            "columns".to_string(),
            manifest
                .columns
                .iter()
                .map(|c| format!("{}:{}", c.name, c.field_type))
                .collect::<Vec<_>>()
                .join(", "),
        ),
    ]
}

/// Per-file listing for `info --files`.
pub fn file_pairs(catalog: &Catalog) -> Vec<(String, String)> {
    catalog
        .manifest()
        .files
        .iter()
        .map(|f| {
            (
                f.path.clone(),
                format!(
                    "{} records, {} row groups, {} bytes, crc32 {:08x}",
                    f.record_count,
                    f.row_groups.len(),
                    f.size_bytes,
                    f.crc32
                ),
            )
        })
        .collect()
}

pub fn handle_info(catalog: &Catalog, files: bool, formatter: &Formatter) -> Result<()> {
    let pairs = if files {
        file_pairs(catalog)
    } else {
        info_pairs(catalog)
    };
    println!("{}", formatter.pairs(&pairs)?);
    Ok(())
}

pub fn handle_verify(catalog: &Catalog, formatter: &Formatter) -> Result<()> {
    let report = catalog
        .verify()
        .with_context(|| format!("Verification of {} failed", catalog.path().display()))?;
    println!("{}", formatter.report(&report)?);
    Ok(())
}
