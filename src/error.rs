//! Error types for the scrubline pipeline.
//!
//! Stage internals use `anyhow` for convenience and are classified into a
//! [`PipelineError`] variant at the stage boundary. The variant decides how a
//! task fails: its kind and stage are copied into the task record.
//!
//! ```
//! use scrubline::error::PipelineError;
//!
//! let err = PipelineError::Ingestion("declared csv but content looks like parquet".to_owned());
//! assert_eq!(err.kind(), "IngestionError");
//! assert!(err.to_string().starts_with("ingestion failed"));
//! ```

use thiserror::Error;

/// Fatal errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unreadable, malformed or empty input.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The table cannot be profiled (zero rows).
    #[error("profiling failed: {0}")]
    Profiling(String),

    /// A mandatory cleaning technique found no eligible data.
    #[error("cleaning failed: {0}")]
    Cleaning(String),

    /// Schema validation failed and the run was configured to stop on violations.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Every requested export format failed.
    #[error("export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Error class name recorded on failed tasks.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingestion(_) => "IngestionError",
            Self::Profiling(_) => "ProfilingError",
            Self::Cleaning(_) => "CleaningError",
            Self::Validation(_) => "ValidationError",
            Self::Export(_) => "ExportError",
            Self::Io(_) => "IoError",
            Self::Config(_) => "ConfigError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// The message without the class prefix of the `Display` form.
    pub fn detail(&self) -> String {
        match self {
            Self::Ingestion(m)
            | Self::Profiling(m)
            | Self::Cleaning(m)
            | Self::Validation(m)
            | Self::Export(m)
            | Self::Config(m)
            | Self::Internal(m) => m.clone(),
            Self::Io(e) => e.to_string(),
        }
    }

    /// Wraps an `anyhow` error chain as an ingestion failure.
    pub fn ingestion(err: &anyhow::Error) -> Self {
        Self::Ingestion(format!("{err:#}"))
    }

    pub fn cleaning(err: &anyhow::Error) -> Self {
        Self::Cleaning(format!("{err:#}"))
    }

    pub fn internal(err: &anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results while keeping the error class.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| prefix(e.into(), &msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| prefix(e.into(), &f()))
    }
}

fn prefix(err: PipelineError, msg: &str) -> PipelineError {
    match err {
        PipelineError::Ingestion(m) => PipelineError::Ingestion(format!("{msg}: {m}")),
        PipelineError::Profiling(m) => PipelineError::Profiling(format!("{msg}: {m}")),
        PipelineError::Cleaning(m) => PipelineError::Cleaning(format!("{msg}: {m}")),
        PipelineError::Validation(m) => PipelineError::Validation(format!("{msg}: {m}")),
        PipelineError::Export(m) => PipelineError::Export(format!("{msg}: {m}")),
        PipelineError::Config(m) => PipelineError::Config(format!("{msg}: {m}")),
        PipelineError::Io(e) => PipelineError::Internal(format!("{msg}: {e}")),
        PipelineError::Internal(m) => PipelineError::Internal(format!("{msg}: {m}")),
    }
}
