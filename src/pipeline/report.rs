//! Accumulated results of one pipeline run.

use crate::advisor::FeatureSuggestion;
use crate::cleaning::CleaningReport;
use crate::export::ExportManifest;
use crate::profiling::ProfileReport;
use crate::profiling::visuals::VisualManifest;
use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};

/// Everything a completed run produced. This is the `result` of a completed task.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineReport {
    pub profile: ProfileReport,
    pub visuals: Option<VisualManifest>,
    pub cleaning: CleaningReport,
    pub suggestions: Vec<FeatureSuggestion>,
    /// Present when a schema was supplied.
    pub validation: Option<ValidationResult>,
    pub export: ExportManifest,
}

/// The part of a run written to `report.json`.
///
/// Holds no paths or timestamps, so identical inputs give identical bytes.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub profile: &'a ProfileReport,
    pub cleaning: &'a CleaningReport,
    pub suggestions: &'a [FeatureSuggestion],
    pub validation: Option<&'a ValidationResult>,
}

impl PipelineReport {
    /// One line for logs and task messages.
    pub fn summary(&self) -> String {
        format!(
            "{} rows ({} after cleaning), {} cleaning actions, {} suggestions, {} files exported{}",
            self.profile.number_rows,
            self.cleaning.rows_after,
            self.cleaning.actions.len(),
            self.suggestions.len(),
            self.export.files.len(),
            match &self.validation {
                Some(v) if v.passed => ", validation passed".to_owned(),
                Some(v) => format!(", {} validation violations", v.violations.len()),
                None => String::new(),
            }
        )
    }
}
