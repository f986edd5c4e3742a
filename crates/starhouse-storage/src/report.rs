//! Build and Verification Reports

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Per-record errors kept in a [`BuildReport`]; the rest are only counted.
pub const ERROR_SAMPLE_LIMIT: usize = 16;

/// A record-level error, captured for the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    /// Zero-based position in the input stream
    pub position: u64,
    pub message: String,
}

/// One sorted chunk, spilled as runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub chunk: u32,
    pub rows: usize,
    /// One run per partition present in the chunk
    pub runs: usize,
    pub bytes: u64,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub output_path: PathBuf,
    /// Records pulled from the input stream
    pub records_seen: u64,
    /// Records stored; also the highest `pk`
    pub accepted: u64,
    /// Records dropped by the filter
    pub rejected: u64,
    /// Records dropped as malformed or out of domain
    pub errored: u64,
    /// First [`ERROR_SAMPLE_LIMIT`] record errors
    pub errors: Vec<RecordError>,
    pub chunks: u32,
    pub files: usize,
    pub row_groups: usize,
    pub bytes_written: u64,
    pub duration: Duration,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build {} at {}: {} accepted, {} rejected, {} errored of {} records; \
             {} chunks, {} files, {} row groups, {} bytes in {:.3}s",
            self.build_id,
            self.output_path.display(),
            self.accepted,
            self.rejected,
            self.errored,
            self.records_seen,
            self.chunks,
            self.files,
            self.row_groups,
            self.bytes_written,
            self.duration.as_secs_f64()
        )
    }
}

/// Outcome of [`Catalog::verify`](crate::Catalog::verify).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub files: usize,
    pub row_groups: usize,
    pub records: u64,
    /// Stored `healpix_index` values recomputed from `ra`/`dec`
    pub cells_checked: u64,
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok: {} records in {} files, {} row groups; {} cells recomputed",
            self.records, self.files, self.row_groups, self.cells_checked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_report_display() {
        let report = BuildReport {
            build_id: Uuid::nil(),
            output_path: PathBuf::from("/data/stars"),
            records_seen: 20,
            accepted: 16,
            rejected: 3,
            errored: 1,
            errors: vec![],
            chunks: 2,
            files: 2,
            row_groups: 4,
            bytes_written: 4096,
            duration: Duration::from_millis(1500),
        };
        let text = report.to_string();
        assert!(text.contains("16 accepted, 3 rejected, 1 errored of 20 records"));
        assert!(text.contains("1.500s"));
    }
}
