//! Cleaning stages applied to the working table.
//!
//! Each stage implements [`CleaningStage`] and mutates the table in place,
//! appending one [`CleaningAction`] per transformation it actually executed.
//! Column-level failures never abort a run: they are logged and recorded in
//! [`CleaningReport::skipped`].
//!
//! Stages run in a fixed order: text standardization when enabled, duplicate
//! removal, imputation, outlier treatment.

pub mod duplicates;
pub mod imputation;
pub mod isolation;
pub mod iterative;
pub mod knn;
pub mod outliers;
pub mod standardize;

use crate::error::PipelineError;
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use imputation::{CategoricalStrategy, ImputationConfig, NumericStrategy};
pub use outliers::{OutlierAction, OutlierConfig, OutlierMethod};
pub use standardize::{StandardizeConfig, TextCase};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleaningConfig {
    pub enabled: bool,
    /// Fail with a cleaning error when an enabled numeric technique finds no
    /// numeric columns, instead of skipping it.
    pub strict: bool,
    pub standardize: StandardizeConfig,
    pub remove_duplicates: bool,
    pub imputation: ImputationConfig,
    pub outliers: OutlierConfig,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
            standardize: StandardizeConfig::default(),
            remove_duplicates: true,
            imputation: ImputationConfig::default(),
            outliers: OutlierConfig::default(),
        }
    }
}

/// One executed transformation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CleaningAction {
    pub stage: String,
    pub columns: Vec<String>,
    pub technique: String,
    pub parameters: IndexMap<String, serde_json::Value>,
    pub rows_affected: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedColumn {
    pub stage: String,
    pub column: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CleaningReport {
    pub actions: Vec<CleaningAction>,
    pub skipped: Vec<SkippedColumn>,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl CleaningReport {
    pub fn record(&mut self, action: CleaningAction) {
        info!(
            stage = %action.stage,
            technique = %action.technique,
            columns = ?action.columns,
            rows = action.rows_affected,
            "Cleaning action"
        );
        self.actions.push(action);
    }

    pub fn skip(&mut self, stage: &str, column: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(stage, column, reason = %reason, "Skipped column");
        self.skipped.push(SkippedColumn {
            stage: stage.to_owned(),
            column: column.to_owned(),
            reason,
        });
    }
}

/// A single cleaning step over the whole table.
pub trait CleaningStage: Send + Sync {
    /// Stage name recorded on actions and skips.
    fn name(&self) -> &'static str;

    /// Mutate `df`, recording every executed transformation in `report`.
    ///
    /// # Errors
    ///
    /// Only for conditions that must stop the run, such as strict mode finding
    /// no eligible columns.
    fn apply(&self, df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), PipelineError>;
}

/// Ordered list of stages built from a [`CleaningConfig`].
pub struct Cleaner {
    stages: Vec<Box<dyn CleaningStage>>,
}

impl Cleaner {
    pub fn new(stages: Vec<Box<dyn CleaningStage>>) -> Self {
        Self { stages }
    }

    pub fn from_config(config: &CleaningConfig) -> Self {
        let mut stages: Vec<Box<dyn CleaningStage>> = Vec::new();
        if config.standardize.enabled {
            stages.push(Box::new(standardize::TextStandardization::new(
                config.standardize.clone(),
            )));
        }
        if config.remove_duplicates {
            stages.push(Box::new(duplicates::DuplicateRemoval));
        }
        if config.imputation.enabled {
            stages.push(Box::new(imputation::Imputation::new(
                config.imputation.clone(),
                config.strict,
            )));
        }
        if config.outliers.enabled {
            stages.push(Box::new(outliers::OutlierTreatment::new(
                config.outliers.clone(),
                config.strict,
            )));
        }
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal stage error.
    pub fn run(&self, df: &mut DataFrame) -> Result<CleaningReport, PipelineError> {
        let mut report = CleaningReport {
            rows_before: df.height(),
            ..CleaningReport::default()
        };
        for stage in &self.stages {
            stage.apply(df, &mut report)?;
        }
        report.rows_after = df.height();
        info!(
            actions = report.actions.len(),
            skipped = report.skipped.len(),
            rows_before = report.rows_before,
            rows_after = report.rows_after,
            "Cleaning finished"
        );
        Ok(report)
    }
}

/// Cleans `df` in place according to `config`.
///
/// # Errors
///
/// Returns [`PipelineError::Cleaning`] when a strict technique has no
/// eligible columns.
pub fn clean(df: &mut DataFrame, config: &CleaningConfig) -> Result<CleaningReport, PipelineError> {
    if !config.enabled {
        return Ok(CleaningReport {
            rows_before: df.height(),
            rows_after: df.height(),
            ..CleaningReport::default()
        });
    }
    Cleaner::from_config(config).run(df)
}

/// Builds an ordered parameter map for a [`CleaningAction`].
pub(crate) fn params<const N: usize>(
    entries: [(&str, serde_json::Value); N],
) -> IndexMap<String, serde_json::Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}
