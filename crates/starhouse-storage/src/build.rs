//! Catalog Build
//!
//! Drives one build from record stream to manifest.
//!
//! ## Threads
//!
//! ```text
//!  caller thread                         worker thread
//! ┌──────────────────────┐  sync(1)    ┌──────────────────────┐
//! │ conform, locate,     │ ──chunk───► │ sort (rayon),        │
//! │ filter, admit        │             │ partition, spill     │
//! │ buffer chunk N+1     │             │ runs of chunk N      │
//! └──────────────────────┘             └──────────────────────┘
//!            │
//!            ▼ input exhausted, worker joined
//! ┌──────────────────────────────────────────────────────────┐
//! │ k-way merge of each partition's runs into its file       │
//! │ persist manifest                                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The hand-off channel holds one chunk, so at most one chunk is being
//! spilled, one is queued and one is filling. The worker is the only consumer
//! and spills chunks in arrival order, so run names are deterministic. The
//! merge runs on the caller thread once the worker hands its writer back.
//!
//! ## Failure
//!
//! Any build-level error (including a strict-mode abort) discards the staged
//! output directory and returns before a manifest exists. If the worker fails,
//! its channel closes, the producer stops at its next hand-off and the
//! worker's error is returned.

use std::sync::mpsc;
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use starhouse_core::{Error, Record, Result, SpatialIndexer};
use uuid::Uuid;

use crate::config::BuildConfig;
use crate::filter::RecordFilter;
use crate::manifest::{Manifest, FORMAT_VERSION};
use crate::observer::BuildObserver;
use crate::partition::stored_columns;
use crate::pipeline::{Admission, Pipeline, Row};
use crate::report::{BuildReport, RecordError, ERROR_SAMPLE_LIMIT};
use crate::writer::{CatalogLayout, CatalogWriter};

/// Producer-side counters.
#[derive(Debug, Default)]
struct Tally {
    seen: u64,
    accepted: u64,
    rejected: u64,
    errored: u64,
    errors: Vec<RecordError>,
}

pub(crate) fn build_catalog<I>(
    config: &BuildConfig,
    records: I,
    filter: &dyn RecordFilter,
    observer: &dyn BuildObserver,
) -> Result<BuildReport>
where
    I: IntoIterator<Item = Record>,
{
    let result = run(config, records, filter, observer);
    match &result {
        Ok(report) => observer.build_finished(report),
        Err(e) => observer.build_failed(e),
    }
    result
}

fn run<I>(
    config: &BuildConfig,
    records: I,
    filter: &dyn RecordFilter,
    observer: &dyn BuildObserver,
) -> Result<BuildReport>
where
    I: IntoIterator<Item = Record>,
{
    let started = Instant::now();

    // Everything that can be checked without I/O is checked first.
    config.validate()?;
    let indexer = SpatialIndexer::new(config.resolution)?;
    let pipeline = Pipeline::new(&config.schema, indexer, filter, config.chunk_size)?;
    let build_id = Uuid::new_v4();
    let writer = CatalogWriter::new(config, build_id)?;

    let layout = CatalogLayout::prepare(&config.output_path)?;
    tracing::info!(
        %build_id,
        path = %config.output_path.display(),
        resolution = config.resolution,
        chunk_size = config.chunk_size,
        "catalog build started"
    );

    let merged = pipelined(config, records, pipeline, writer, observer).and_then(
        |(tally, writer)| {
            let chunks = writer.chunks_written();
            let files = writer.finish(observer)?;
            Ok((tally, chunks, files))
        },
    );
    let (tally, chunks, files) = match merged {
        Ok(out) => out,
        Err(e) => {
            layout.discard();
            return Err(e);
        }
    };
    let bytes_written: u64 = files.iter().map(|f| f.size_bytes).sum();

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        build_id,
        created_at_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        schema: config.schema.clone(),
        columns: stored_columns(&config.schema),
        sorting_columns: config.sorting_columns.clone(),
        partition_columns: config.partition_columns.clone(),
        compression: config.compression,
        chunk_size: config.chunk_size,
        row_group_size: config.row_group_size,
        resolution: config.resolution,
        filter: filter.describe(),
        record_count: tally.accepted,
        files,
    };
    if let Err(e) = manifest.persist(layout.root()) {
        layout.discard();
        return Err(e);
    }

    Ok(BuildReport {
        build_id,
        output_path: config.output_path.clone(),
        records_seen: tally.seen,
        accepted: tally.accepted,
        rejected: tally.rejected,
        errored: tally.errored,
        errors: tally.errors,
        chunks,
        files: manifest.files.len(),
        row_groups: manifest.row_group_count(),
        bytes_written,
        duration: started.elapsed(),
    })
}

/// Run the producer on this thread and the sort/spill worker beside it.
///
/// Hands the writer back once every chunk is spilled.
fn pipelined<I>(
    config: &BuildConfig,
    records: I,
    mut pipeline: Pipeline<'_>,
    mut writer: CatalogWriter,
    observer: &dyn BuildObserver,
) -> Result<(Tally, CatalogWriter)>
where
    I: IntoIterator<Item = Record>,
{
    thread::scope(|scope| -> Result<(Tally, CatalogWriter)> {
        let (tx, rx) = mpsc::sync_channel::<Vec<Row>>(1);

        let worker = thread::Builder::new()
            .name("starhouse-writer".to_string())
            .spawn_scoped(scope, move || -> Result<CatalogWriter> {
                for chunk in rx {
                    let summary = writer.write_chunk(chunk)?;
                    observer.chunk_written(&summary);
                }
                Ok(writer)
            })?;

        let produced = produce(config, records, &mut pipeline, &tx, observer);
        drop(tx);

        let spilled = match worker.join() {
            Ok(spilled) => spilled,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        let mut tally = produced?;
        let writer = spilled?;

        tally.accepted = pipeline.accepted();
        tally.rejected = pipeline.rejected();
        Ok((tally, writer))
    })
}

fn produce<I>(
    config: &BuildConfig,
    records: I,
    pipeline: &mut Pipeline<'_>,
    tx: &mpsc::SyncSender<Vec<Row>>,
    observer: &dyn BuildObserver,
) -> Result<Tally>
where
    I: IntoIterator<Item = Record>,
{
    let mut tally = Tally::default();

    for (position, record) in records.into_iter().enumerate() {
        let position = position as u64;
        tally.seen += 1;

        match pipeline.admit(&record) {
            Ok(Admission::Accepted { .. }) => {}
            Ok(Admission::Rejected) => observer.record_rejected(position),
            Err(e) if e.is_record_level() => {
                observer.record_failed(position, &e);
                if config.strict {
                    return Err(Error::StrictAbort {
                        position,
                        source: Box::new(e),
                    });
                }
                tally.errored += 1;
                if tally.errors.len() < ERROR_SAMPLE_LIMIT {
                    tally.errors.push(RecordError {
                        position,
                        message: e.to_string(),
                    });
                }
            }
            Err(e) => return Err(e),
        }

        if let Some(chunk) = pipeline.take_full_chunk() {
            if tx.send(chunk).is_err() {
                // worker gone; its error is reported by the caller
                return Ok(tally);
            }
        }
    }

    if let Some(chunk) = pipeline.take_remainder() {
        let _ = tx.send(chunk);
    }
    Ok(tally)
}
