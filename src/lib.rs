//! `flightdata-core` is the ingestion and visualization core of a
//! multi-tenant flight / wind-tunnel / CFD data platform.
//!
//! Uploaded tabular and MATLAB datasets are parsed into a canonical columnar
//! parquet artifact, profiled, and rendered as interactive charts that zoom
//! from coarse level-of-detail aggregates down to raw point windows.
//!
//! ## Pipelines
//!
//! - **Ingestion** ([`ingestion`]): streams a raw upload from object storage,
//!   dispatches on format (CSV, Excel sheet, whitespace TXT/DAT/C,
//!   wind-tunnel TXT, MAT), materializes the columnar artifact and records
//!   per-column stats plus sample rows on the job document.
//! - **Visualization** ([`viz`]): plans a chart from one or more series,
//!   materializes multi-resolution tiles over the X axis for tiled chart
//!   families, samples raw subsets for the rest, and emits a self-contained
//!   HTML artifact with an embedded zoom loader.
//! - **Deep zoom** ([`viz::query`]): serves tile frames and raw windowed
//!   points back to the rendered artifact at runtime.
//!
//! ## Quick example: ingest a CSV upload end to end
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use flightdata_core::config::Settings;
//! use flightdata_core::ingestion::IngestionCoordinator;
//! use flightdata_core::store::{FsObjectStore, MemoryJobStore, ProgressChannel};
//!
//! # fn main() -> Result<(), flightdata_core::CoreError> {
//! let settings = Settings::from_env();
//! let objects = Arc::new(FsObjectStore::new(&settings.data_root));
//! let jobs = Arc::new(MemoryJobStore::new());
//! let progress = Arc::new(ProgressChannel::new());
//!
//! let coordinator =
//!     IngestionCoordinator::new(objects, jobs, progress, settings);
//! coordinator.run("job-id")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: environment-derived settings, read once at startup
//! - [`types`]: job documents and the chart model
//! - [`frame`]: in-memory column frames shared by every pipeline stage
//! - [`store`]: object storage, job documents, progress fan-out
//! - [`artifact`]: parquet artifact read/write with projection and pushdown
//! - [`ingestion`]: format parsers and the ingestion coordinator
//! - [`derived`]: the derived-column expression engine
//! - [`viz`]: planner, tiles, sampler, figure builder, zoom query surface
//! - [`mat`]: MAT container indexing and N-D slicing
//! - [`worker`]: the autoscaled job pool
//! - [`error`]: the crate-wide error type

pub mod artifact;
pub mod config;
pub mod derived;
pub mod error;
pub mod frame;
pub mod ingestion;
pub mod mat;
pub mod store;
pub mod types;
pub mod viz;
pub mod worker;

pub use error::{CoreError, CoreResult};
