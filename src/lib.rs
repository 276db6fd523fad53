//! # scrubline - tabular data cleaning pipeline
//!
//! scrubline takes a CSV, Excel or Parquet file through a fixed sequence of
//! stages and produces cleaned outputs with a machine-readable report:
//!
//! ```text
//! ingest ─> profile ─> clean ─> advise ─> validate ─> export
//! ```
//!
//! Each stage is a plain function over a polars [`DataFrame`](polars::prelude::DataFrame),
//! so they can be used on their own:
//!
//! ```no_run
//! use scrubline::cleaning::{CleaningConfig, clean};
//! use scrubline::ingest::{IngestOptions, SourceFormat, ingest_file};
//! use scrubline::profiling::profile;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut df = ingest_file("orders.csv".as_ref(), SourceFormat::Csv, &IngestOptions::default())?;
//! let report = profile(&df)?;
//! println!("{} rows, {} duplicates", report.number_rows, report.duplicate_rows);
//!
//! let cleaning = clean(&mut df, &CleaningConfig::default())?;
//! println!("{} cleaning actions", cleaning.actions.len());
//! # Ok(())
//! # }
//! ```
//!
//! For whole-file runs use [`pipeline::run_pipeline`] directly, or submit
//! work to a [`task::Orchestrator`] to run it in the background and poll for
//! progress.
//!
//! ## Modules
//!
//! - [`ingest`]: format and encoding checks, parsing, type inference
//! - [`profiling`]: per-column statistics, correlations and optional SVG visuals
//! - [`cleaning`]: text standardization, duplicate removal, imputation, outlier handling
//! - [`advisor`]: feature engineering suggestions
//! - [`validation`]: schema checks over the cleaned table
//! - [`export`]: CSV, Excel and Parquet writers plus the JSON report
//! - [`pipeline`]: stage sequencing and configuration
//! - [`task`]: background tasks, progress and result retrieval
//! - [`config`], [`logging`]: process settings and tracing setup

#![warn(clippy::all, rust_2018_idioms)]

pub mod advisor;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod integrity;
pub mod logging;
pub mod pipeline;
pub mod profiling;
pub mod table;
pub mod task;
pub mod utils;
pub mod validation;
