//! Sequential execution of the pipeline stages.
//!
//! Each stage reports completion through a callback so the caller can move a
//! progress bar or a task record. A fatal error stops the run and is tagged
//! with the stage that raised it.

use super::{PipelineConfig, PipelineReport, ReportDocument};
use crate::error::PipelineError;
use crate::ingest::{SourceFormat, ingest_file};
use crate::validation::{ValidationSchema, validate};
use crate::{advisor, cleaning, export, profiling};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, info_span, warn};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Profiling,
    Cleaning,
    FeatureAdvice,
    Validation,
    Export,
}

impl Stage {
    pub const ALL: [Self; 6] = [
        Self::Ingestion,
        Self::Profiling,
        Self::Cleaning,
        Self::FeatureAdvice,
        Self::Validation,
        Self::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Profiling => "profiling",
            Self::Cleaning => "cleaning",
            Self::FeatureAdvice => "feature advice",
            Self::Validation => "validation",
            Self::Export => "export",
        }
    }

    /// Task progress once this stage has finished.
    pub fn checkpoint(&self) -> u8 {
        match self {
            Self::Ingestion => 10,
            Self::Profiling => 30,
            Self::Cleaning => 60,
            Self::FeatureAdvice => 75,
            Self::Validation => 90,
            Self::Export => 100,
        }
    }

    /// Task message once this stage has finished.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ingestion => "Dataset loaded",
            Self::Profiling => "Profile computed",
            Self::Cleaning => "Cleaning applied",
            Self::FeatureAdvice => "Feature suggestions ready",
            Self::Validation => "Validation finished",
            Self::Export => "Export complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fatal error and the stage it stopped.
#[derive(Debug, Error)]
#[error("{stage} failed: {}", .source.detail())]
pub struct StageFailure {
    pub stage: Stage,
    pub source: PipelineError,
}

impl StageFailure {
    fn new(stage: Stage, source: PipelineError) -> Self {
        Self { stage, source }
    }

    /// Error class recorded on the failed task. Failures outside the stage
    /// taxonomy are internal.
    pub fn kind(&self) -> &'static str {
        match &self.source {
            PipelineError::Io(_) | PipelineError::Config(_) => "InternalError",
            other => other.kind(),
        }
    }
}

/// Where a run reads from and writes to.
#[derive(Clone, Copy, Debug)]
pub struct PipelineInput<'a> {
    pub source: &'a Path,
    pub format: SourceFormat,
    pub schema: Option<&'a ValidationSchema>,
    /// Receives the exported tables and `report.json`.
    pub output_dir: &'a Path,
    /// Receives visual artifacts.
    pub artifacts_dir: &'a Path,
}

/// Runs every stage over `input`, calling `on_stage` after each one completes.
///
/// # Errors
///
/// Returns the first fatal error together with the stage that raised it.
/// Stages that completed before it have already been reported to `on_stage`.
pub fn run_pipeline(
    input: &PipelineInput<'_>,
    config: &PipelineConfig,
    on_stage: &mut dyn FnMut(Stage),
) -> Result<PipelineReport, StageFailure> {
    let span = info_span!("pipeline", source = %input.source.display());
    let _enter = span.enter();

    let mut df = ingest_file(input.source, input.format, &config.ingest)
        .map_err(|e| StageFailure::new(Stage::Ingestion, e))?;
    info!(rows = df.height(), columns = df.width(), "Ingested");
    on_stage(Stage::Ingestion);

    let profile =
        profiling::profile(&df).map_err(|e| StageFailure::new(Stage::Profiling, e))?;
    let visuals = config
        .profiling
        .include_visuals
        .then(|| profiling::visuals::render_visuals(&df, &profile, input.artifacts_dir));
    on_stage(Stage::Profiling);

    let cleaning = cleaning::clean(&mut df, &config.cleaning)
        .map_err(|e| StageFailure::new(Stage::Cleaning, e))?;
    on_stage(Stage::Cleaning);

    let suggestions = if config.features.enabled {
        advisor::suggest(&df, &profile, config.features.target_column.as_deref())
            .map_err(|e| StageFailure::new(Stage::FeatureAdvice, PipelineError::internal(&e)))?
    } else {
        Vec::new()
    };
    on_stage(Stage::FeatureAdvice);

    let validation = match input.schema {
        Some(schema) => {
            let result = validate(&df, schema).map_err(|e| {
                StageFailure::new(Stage::Validation, PipelineError::internal(&e))
            })?;
            if !result.passed {
                if config.validation.fail_on_violation {
                    return Err(StageFailure::new(
                        Stage::Validation,
                        PipelineError::Validation(result.summary()),
                    ));
                }
                warn!(violations = result.violations.len(), "Validation reported violations");
            }
            Some(result)
        }
        None => None,
    };
    on_stage(Stage::Validation);

    let document = ReportDocument {
        profile: &profile,
        cleaning: &cleaning,
        suggestions: &suggestions,
        validation: validation.as_ref(),
    };
    let manifest = export::export(&df, &document, input.output_dir, &config.export)
        .map_err(|e| StageFailure::new(Stage::Export, e))?;

    let report = PipelineReport {
        profile,
        visuals,
        cleaning,
        suggestions,
        validation,
        export: manifest,
    };
    info!(summary = %report.summary(), "Pipeline finished");
    on_stage(Stage::Export);
    Ok(report)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::indexing_slicing)]
    use super::*;
    use anyhow::Result;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        source: PathBuf,
        output: PathBuf,
        artifacts: PathBuf,
    }

    impl Fixture {
        fn with_csv(content: &str) -> Result<Self> {
            let dir = TempDir::new()?;
            let source = dir.path().join("input.csv");
            std::fs::write(&source, content)?;
            Ok(Self {
                output: dir.path().join("output"),
                artifacts: dir.path().join("artifacts"),
                source,
                dir,
            })
        }

        fn input<'a>(&'a self, schema: Option<&'a ValidationSchema>) -> PipelineInput<'a> {
            PipelineInput {
                source: &self.source,
                format: SourceFormat::Csv,
                schema,
                output_dir: &self.output,
                artifacts_dir: &self.artifacts,
            }
        }
    }

    const CSV: &str = "id,amount,city\n1,10.5,Paris\n2,,Lyon\n3,12.0,Paris\n4,11.0,\n";

    #[test]
    fn test_stages_report_in_order() -> Result<()> {
        let fixture = Fixture::with_csv(CSV)?;
        let mut seen = Vec::new();
        let report = run_pipeline(&fixture.input(None), &PipelineConfig::default(), &mut |s| {
            seen.push(s);
        })?;
        assert_eq!(seen, Stage::ALL.to_vec());
        assert_eq!(report.profile.number_rows, 4);
        assert_eq!(report.profile.missing_values("amount"), Some(1));
        assert!(report.validation.is_none());
        assert_eq!(report.export.files.len(), 3);
        Ok(())
    }

    #[test]
    fn test_checkpoints_increase_to_100() {
        let points: Vec<u8> = Stage::ALL.iter().map(Stage::checkpoint).collect();
        assert!(points.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(points.last().copied(), Some(100));
    }

    #[test]
    fn test_fail_on_violation_stops_before_export() -> Result<()> {
        let fixture = Fixture::with_csv(CSV)?;
        let schema = ValidationSchema::from_json(r#"{"missing": {"type": "text"}}"#)?;
        let mut config = PipelineConfig::default();
        config.validation.fail_on_violation = true;

        let mut seen = Vec::new();
        let err = run_pipeline(&fixture.input(Some(&schema)), &config, &mut |s| seen.push(s))
            .err()
            .map(|e| (e.stage, e.kind(), e.to_string()));
        let (stage, kind, message) = err.unwrap_or((Stage::Export, "", String::new()));
        assert_eq!(stage, Stage::Validation);
        assert_eq!(kind, "ValidationError");
        assert!(message.starts_with("validation failed: "), "{message}");
        assert_eq!(seen.last(), Some(&Stage::FeatureAdvice));
        assert!(!fixture.output.exists());
        assert!(fixture.dir.path().join("input.csv").exists());
        Ok(())
    }

    #[test]
    fn test_violations_without_fail_flag_complete() -> Result<()> {
        let fixture = Fixture::with_csv(CSV)?;
        let schema = ValidationSchema::from_json(r#"{"city": {"type": "integer"}}"#)?;
        let report =
            run_pipeline(&fixture.input(Some(&schema)), &PipelineConfig::default(), &mut |_| {})?;
        let validation = report.validation.unwrap_or_default();
        assert!(!validation.passed);
        assert_eq!(validation.violations[0].column, "city");
        Ok(())
    }

    #[test]
    fn test_ingestion_failure_is_tagged() -> Result<()> {
        let fixture = Fixture::with_csv("")?;
        let mut seen = Vec::new();
        let err = run_pipeline(&fixture.input(None), &PipelineConfig::default(), &mut |s| {
            seen.push(s);
        })
        .err();
        assert_eq!(err.as_ref().map(|e| e.stage), Some(Stage::Ingestion));
        assert_eq!(err.as_ref().map(StageFailure::kind), Some("IngestionError"));
        assert!(seen.is_empty());
        Ok(())
    }
}
