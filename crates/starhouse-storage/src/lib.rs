//! Starhouse Storage Layer
//!
//! This crate turns a stream of star records into an on-disk columnar catalog
//! and answers queries against it.
//!
//! ## What is the Storage Layer?
//!
//! It sits between whatever produces records (a CSV loader, a test fixture)
//! and whatever asks questions about them (the `starctl` CLI, a renderer). It
//! handles:
//!
//! 1. **Admission**: schema conformance, spatial indexing, filtering, dense `pk`
//! 2. **Chunked sorting**: bounded-memory chunks sorted by a composite key
//! 3. **Columnar writing**: sorted runs per chunk, k-way merged into one Parquet
//!    file per partition
//! 4. **Manifest**: one atomically written JSON file that makes a build visible
//! 5. **Reading**: full scans, exact-match lookups with pruning, cone searches
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐
//! │  Record stream  │
//! └────────┬────────┘
//!          │ records
//!          ▼
//! ┌─────────────────┐
//! │ Pipeline        │
//! │ - Conforms      │
//! │ - Indexes       │
//! │ - Filters       │
//! └────────┬────────┘
//!          │ chunks (bounded channel)
//!          ▼
//! ┌─────────────────┐
//! │ CatalogWriter   │
//! │ - Sorts         │
//! │ - Spills runs   │
//! │ - Merges        │
//! └────────┬────────┘
//!          │ data/**.parquet + manifest.json
//!          ▼
//! ┌─────────────────┐
//! │ Catalog         │
//! │ - all()         │
//! │ - get()         │
//! │ - cone()        │
//! └─────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ### Building a Catalog
//! ```ignore
//! use starhouse_core::{Codec, Record, Star};
//! use starhouse_storage::{BuildConfig, Catalog, MaxValue, TracingObserver};
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
//!
//! let stars = load_stars()?.into_iter().map(Record::from);
//! let report = Catalog::build(&config, stars, &MaxValue::new("magnitude", 9.0), &TracingObserver)?;
//! println!("{report}");
//! ```
//!
//! ### Querying
//! ```ignore
//! use starhouse_storage::{Catalog, Predicate};
//!
//! let catalog = Catalog::open("catalogs/bright-stars/v1", 10)?;
//! let sirius = catalog.get(&Predicate::eq("name", "Sirius"))?;
//! let nearby = catalog.cone(101.287, -16.716, 5.0)?;
//! ```
//!
//! ## Design Decisions
//!
//! ### Why a Manifest Instead of Listing the Directory?
//! - **Atomic visibility**: the rename of `manifest.json` is the commit point
//! - **Pruning without I/O**: partition values and row-group stats live in it
//! - **Integrity**: stats are stored twice (manifest and Parquet footer) and
//!   checked; each file's size and CRC32 are recorded
//!
//! ### Why Parquet?
//! - **Lookups read little**: `get(name = ..)` decodes `name` first and the rest
//!   only for the matching group
//! - **Better compression**: similar values sit together; categories are
//!   dictionary encoded
//! - **Readable elsewhere**: any Parquet reader can open a partition file

mod build;
pub mod catalog;
pub mod config;
pub mod filter;
pub mod manifest;
pub mod observer;
pub mod partition;
pub mod pipeline;
pub mod predicate;
pub mod reader;
pub mod report;
pub mod writer;

pub use catalog::Catalog;
pub use config::{BuildConfig, BuildConfigBuilder};
pub use filter::{AcceptAll, MaxValue, RecordFilter, RowView};
pub use manifest::{ColumnStats, FileEntry, Manifest, RowGroupMeta};
pub use observer::{BuildObserver, NoopObserver, TracingObserver};
pub use partition::{ColumnRange, PartitionFileReader, PartitionFileWriter, WriteOptions};
pub use pipeline::{Admission, Pipeline, Row, SortKey};
pub use predicate::Predicate;
pub use reader::RecordIter;
pub use report::{BuildReport, ChunkSummary, RecordError, VerifyReport};
pub use writer::{CatalogLayout, CatalogWriter};
