//! The pipeline: ingestion, profiling, cleaning, feature advice, validation
//! and export, run in that order over one in-memory table.
//!
//! [`PipelineConfig`] composes the per-stage option structs and is what a
//! submission carries. Every field has a default, so an empty JSON object is a
//! valid configuration.
//!
//! ```no_run
//! use scrubline::ingest::SourceFormat;
//! use scrubline::pipeline::{PipelineConfig, PipelineInput, run_pipeline};
//! use std::path::Path;
//!
//! let config = PipelineConfig::from_json(r#"{"cleaning": {"outliers": {"enabled": true}}}"#)?;
//! let input = PipelineInput {
//!     source: Path::new("survey.csv"),
//!     format: SourceFormat::Csv,
//!     schema: None,
//!     output_dir: Path::new("out"),
//!     artifacts_dir: Path::new("out/artifacts"),
//! };
//! let report = run_pipeline(&input, &config, &mut |stage| println!("{stage} done"))?;
//! println!("{} suggestions", report.suggestions.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod report;
pub mod runner;

pub use report::{PipelineReport, ReportDocument};
pub use runner::{PipelineInput, Stage, StageFailure, run_pipeline};

use crate::advisor::FeaturesConfig;
use crate::cleaning::CleaningConfig;
use crate::error::{PipelineError, ResultExt as _};
use crate::export::ExportConfig;
use crate::ingest::IngestOptions;
use crate::profiling::ProfilingConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestOptions,
    pub profiling: ProfilingConfig,
    pub cleaning: CleaningConfig,
    pub features: FeaturesConfig,
    pub validation: ValidationConfig,
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for malformed JSON or unknown enum values.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).context("Invalid pipeline config")
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read and
    /// [`PipelineError::Config`] if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
