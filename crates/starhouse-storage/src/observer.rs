//! Build Observers
//!
//! The engine never logs on its own behalf. Everything worth reporting during a
//! build goes through a [`BuildObserver`] supplied by the caller:
//!
//! - `record_failed`: a record was malformed or out of domain
//! - `record_rejected`: a record was dropped by the filter
//! - `chunk_written`: a sorted chunk was spilled as runs
//! - `file_written`: a partition file was merged from its runs
//! - `build_finished` / `build_failed`: the build is over
//!
//! Chunks are written on a worker thread, so observers must be `Send + Sync`.
//! [`TracingObserver`] forwards everything to `tracing`; [`NoopObserver`]
//! discards it.

use starhouse_core::Error;

use crate::manifest::FileEntry;
use crate::report::{BuildReport, ChunkSummary};

pub trait BuildObserver: Send + Sync {
    fn record_failed(&self, _position: u64, _error: &Error) {}

    fn record_rejected(&self, _position: u64) {}

    fn chunk_written(&self, _chunk: &ChunkSummary) {}

    fn file_written(&self, _file: &FileEntry) {}

    fn build_finished(&self, _report: &BuildReport) {}

    fn build_failed(&self, _error: &Error) {}
}

/// Logs build progress with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn record_failed(&self, position: u64, error: &Error) {
        tracing::warn!(position, error = %error, "skipping record");
    }

    fn record_rejected(&self, position: u64) {
        tracing::trace!(position, "record rejected by filter");
    }

    fn chunk_written(&self, chunk: &ChunkSummary) {
        tracing::info!(
            chunk = chunk.chunk,
            rows = chunk.rows,
            runs = chunk.runs,
            bytes = chunk.bytes,
            "chunk spilled"
        );
    }

    fn file_written(&self, file: &FileEntry) {
        tracing::info!(
            path = %file.path,
            records = file.record_count,
            row_groups = file.row_groups.len(),
            bytes = file.size_bytes,
            "partition file written"
        );
    }

    fn build_finished(&self, report: &BuildReport) {
        tracing::info!(
            build_id = %report.build_id,
            accepted = report.accepted,
            rejected = report.rejected,
            errored = report.errored,
            duration_ms = report.duration.as_millis() as u64,
            "catalog build finished"
        );
    }

    fn build_failed(&self, error: &Error) {
        tracing::error!(error = %error, "catalog build failed");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}
