//! Catalog building: `build`.
//!
//! One input, one catalog per magnitude limit. Each catalog lands in its own
//! directory under the parent given with `--catalog`:
//!
//! ```text
//! <parent>/stars.<name>.<version>.mag<limit>/
//! ```
//!
//! `<version>` is this tool's version and `<limit>` is printed the shortest
//! way that reads back as the same number (`6.5`, `9`, `-1.5`).

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use starhouse_core::Record;
use starhouse_storage::{BuildConfig, BuildReport, Catalog, MaxValue, TracingObserver};

use crate::format::Formatter;

/// Column the `--max-magnitude` limits apply to.
pub const MAGNITUDE_COLUMN: &str = "magnitude";

/// Directory name of the catalog built at `limit`.
pub fn catalog_dir_name(name: &str, limit: f64) -> String {
    format!("stars.{name}.{}.mag{limit}", env!("CARGO_PKG_VERSION"))
}

/// Read newline-delimited JSON records from `input`, or stdin for `-`.
///
/// Blank lines are skipped. A line that is not a JSON object fails the
/// whole read with its line number.
pub fn read_records(input: &Path) -> Result<Vec<Record>> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input)
            .with_context(|| format!("Failed to open input {}", input.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("Input line {} is not a JSON record", index + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Build one catalog per limit from the same records.
pub fn build_catalogs(
    parent: &Path,
    config: &BuildConfig,
    records: &[Record],
    name: &str,
    limits: &[f64],
) -> Result<Vec<BuildReport>> {
    if let Some(bad) = limits.iter().find(|l| !l.is_finite()) {
        bail!("--max-magnitude must be a finite number, got {bad}");
    }
    if name.is_empty() || name.contains(['/', '\\']) {
        bail!("catalog name `{name}` cannot be used in a directory name");
    }

    let mut reports = Vec::with_capacity(limits.len());
    for &limit in limits {
        let output: PathBuf = parent.join(catalog_dir_name(name, limit));
        let config = BuildConfig {
            output_path: output.clone(),
            ..config.clone()
        };
        tracing::info!(path = %output.display(), limit, "building catalog");

        let report = Catalog::build(
            &config,
            records.iter().cloned(),
            &MaxValue::new(MAGNITUDE_COLUMN, limit),
            &TracingObserver,
        )
        .with_context(|| format!("Failed to build catalog at {}", output.display()))?;
        reports.push(report);
    }
    Ok(reports)
}

pub fn handle_build(
    parent: &Path,
    config_path: &Path,
    input: &Path,
    limits: &[f64],
    name: &str,
    formatter: &Formatter,
) -> Result<()> {
    let config = BuildConfig::from_file(config_path)
        .with_context(|| format!("Invalid build config {}", config_path.display()))?;
    let records = read_records(input)?;

    for report in build_catalogs(parent, &config, &records, name, limits)? {
        println!("{}", formatter.report(&report)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhouse_core::{Codec, Star};
    use tempfile::TempDir;

    fn config(root: &Path) -> BuildConfig {
        BuildConfig::builder()
            .output_path(root.join("ignored"))
            .chunk_size(10)
            .schema(Star::schema())
            .partition_columns(Vec::<String>::new())
            .sorting_columns(["magnitude"])
            .compression(Codec::None)
            .row_group_size(4)
            .resolution(6)
            .build()
            .unwrap()
    }

    #[test]
    fn test_catalog_dir_name() {
        let version = env!("CARGO_PKG_VERSION");
        assert_eq!(
            catalog_dir_name("bigsky", 6.5),
            format!("stars.bigsky.{version}.mag6.5")
        );
        assert_eq!(catalog_dir_name("bigsky", 9.0), format!("stars.bigsky.{version}.mag9"));
    }

    #[test]
    fn test_read_records_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stars.ndjson");
        std::fs::write(
            &path,
            "{\"ra\": 101.287155, \"dec\": -16.716116, \"magnitude\": -1.44, \"name\": \"Sirius\"}\n\
             \n\
             {\"ra\": 37.954561, \"dec\": 89.264109, \"magnitude\": 1.97}\n",
        )
        .unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("name"), Some("Sirius"));

        std::fs::write(&path, "{\"ra\": 1.0}\nnot json\n").unwrap();
        let err = read_records(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_one_catalog_per_limit() {
        let dir = TempDir::new().unwrap();
        let records: Vec<Record> = [-1.44, 0.45, 3.0, 7.5]
            .into_iter()
            .map(|magnitude| {
                Record::from(Star {
                    ra: 88.79,
                    dec: 7.41,
                    magnitude,
                    epoch_year: 1991,
                    ..Star::default()
                })
            })
            .collect();

        let reports =
            build_catalogs(dir.path(), &config(dir.path()), &records, "bigsky", &[1.0, 6.5])
                .unwrap();
        assert_eq!(reports.iter().map(|r| r.accepted).collect::<Vec<_>>(), vec![2, 3]);
        assert!(dir.path().join(catalog_dir_name("bigsky", 6.5)).join("manifest.json").is_file());
        assert!(!dir.path().join("ignored").exists());

        assert!(build_catalogs(dir.path(), &config(dir.path()), &records, "x", &[f64::NAN]).is_err());
        assert!(build_catalogs(dir.path(), &config(dir.path()), &records, "a/b", &[1.0]).is_err());
    }
}
