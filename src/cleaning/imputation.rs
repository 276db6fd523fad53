//! Missing value imputation.

use super::iterative::{IterativeConfig, iterative_impute};
use super::knn::knn_impute;
use super::{CleaningAction, CleaningReport, CleaningStage, params};
use crate::error::PipelineError;
use crate::ingest::infer::parse_bool;
use crate::profiling::{ranked_counts, stats};
use crate::table::{ColumnKind, missing_count, numeric_values, text_values};
use anyhow::{Context as _, Result, anyhow};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const STAGE: &str = "imputation";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NumericStrategy {
    /// Iterative when enabled in the config, median otherwise.
    Auto,
    Mean,
    Median,
    Knn,
    Iterative,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategoricalStrategy {
    Mode,
    Constant,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImputationConfig {
    pub enabled: bool,
    /// Columns are imputed only when their missing percentage exceeds this.
    pub missing_threshold: f64,
    pub numeric_strategy: NumericStrategy,
    pub categorical_strategy: CategoricalStrategy,
    pub fill_value: String,
    pub knn_neighbors: usize,
    pub iterative: IterativeConfig,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            missing_threshold: 0.0,
            numeric_strategy: NumericStrategy::Auto,
            categorical_strategy: CategoricalStrategy::Mode,
            fill_value: "missing".to_owned(),
            knn_neighbors: 5,
            iterative: IterativeConfig::default(),
        }
    }
}

impl ImputationConfig {
    fn resolved_numeric(&self) -> NumericStrategy {
        match self.numeric_strategy {
            NumericStrategy::Auto if self.iterative.enabled => NumericStrategy::Iterative,
            NumericStrategy::Auto => NumericStrategy::Median,
            other => other,
        }
    }
}

pub struct Imputation {
    config: ImputationConfig,
    strict: bool,
}

impl Imputation {
    pub fn new(config: ImputationConfig, strict: bool) -> Self {
        Self { config, strict }
    }

    fn needs_imputation(&self, column: &Column, rows: usize) -> Result<bool> {
        if rows == 0 {
            return Ok(false);
        }
        let missing = missing_count(column)?;
        let pct = missing as f64 / rows as f64 * 100.0;
        Ok(missing > 0 && pct > self.config.missing_threshold)
    }

    fn impute_numeric(&self, df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), PipelineError> {
        let numeric: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|c| ColumnKind::of(c).is_numeric())
            .map(|c| c.name().to_string())
            .collect();
        if numeric.is_empty() {
            if self.strict {
                return Err(PipelineError::Cleaning(
                    "numeric imputation found no numeric columns".to_owned(),
                ));
            }
            debug!("No numeric columns to impute");
            return Ok(());
        }

        let rows = df.height();
        let mut targets = Vec::new();
        for name in &numeric {
            let needed = df
                .column(name)
                .map_err(anyhow::Error::from)
                .and_then(|c| self.needs_imputation(c, rows));
            match needed {
                Ok(true) => targets.push(name.clone()),
                Ok(false) => {}
                Err(e) => report.skip(STAGE, name, format!("{e:#}")),
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        match self.config.resolved_numeric() {
            NumericStrategy::Iterative => self.impute_iterative(df, &numeric, &targets, report),
            strategy => {
                let matrix = if strategy == NumericStrategy::Knn {
                    numeric_matrix(df, &numeric).map_err(|e| PipelineError::cleaning(&e))?
                } else {
                    Vec::new()
                };
                for name in &targets {
                    let k = self.config.knn_neighbors;
                    match impute_simple(df, name, strategy, &numeric, &matrix, k) {
                        Ok(action) => report.record(action),
                        Err(e) => report.skip(STAGE, name, format!("{e:#}")),
                    }
                }
                Ok(())
            }
        }
    }

    fn impute_iterative(
        &self,
        df: &mut DataFrame,
        numeric: &[String],
        targets: &[String],
        report: &mut CleaningReport,
    ) -> Result<(), PipelineError> {
        // Columns with no observed value cannot take part in the regression.
        let mut usable = Vec::new();
        for name in numeric {
            let values = df
                .column(name)
                .map_err(anyhow::Error::from)
                .and_then(numeric_values);
            match values {
                Ok(values) if values.iter().any(Option::is_some) => {
                    usable.push((name.clone(), values));
                }
                Ok(_) => {
                    if targets.contains(name) {
                        report.skip(STAGE, name, "column has no observed values");
                    }
                }
                Err(e) => report.skip(STAGE, name, format!("{e:#}")),
            }
        }

        if usable.len() < 2 {
            for (name, _) in &usable {
                if !targets.contains(name) {
                    continue;
                }
                match impute_simple(df, name, NumericStrategy::Median, numeric, &[], 0) {
                    Ok(mut action) => {
                        action.parameters.insert("fallback_from".to_owned(), "iterative".into());
                        report.record(action);
                    }
                    Err(e) => report.skip(STAGE, name, format!("{e:#}")),
                }
            }
            return Ok(());
        }

        let matrix: Vec<Vec<Option<f64>>> = usable.iter().map(|(_, v)| v.clone()).collect();
        let outcome = match iterative_impute(&matrix, &self.config.iterative) {
            Ok(outcome) => outcome,
            Err(e) => {
                for name in targets {
                    report.skip(STAGE, name, format!("{e:#}"));
                }
                return Ok(());
            }
        };

        for ((name, original), filled) in usable.iter().zip(outcome.columns) {
            if !targets.contains(name) {
                continue;
            }
            let filled_cells = original.iter().filter(|v| v.is_none()).count();
            let values: Vec<Option<f64>> = filled.into_iter().map(Some).collect();
            match replace_numeric(df, name, values) {
                Ok(()) => report.record(CleaningAction {
                    stage: STAGE.to_owned(),
                    columns: vec![name.clone()],
                    technique: "iterative".to_owned(),
                    parameters: params([
                        ("max_iter", self.config.iterative.max_iter.into()),
                        ("tol", self.config.iterative.tol.into()),
                        ("iterations", outcome.iterations.into()),
                        ("converged", outcome.converged.into()),
                    ]),
                    rows_affected: filled_cells,
                }),
                Err(e) => report.skip(STAGE, name, format!("{e:#}")),
            }
        }
        Ok(())
    }

    fn impute_categorical(&self, df: &mut DataFrame, report: &mut CleaningReport) {
        let rows = df.height();
        let names: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|c| ColumnKind::of(c).is_categorical())
            .map(|c| c.name().to_string())
            .collect();

        for name in names {
            let needed = df
                .column(&name)
                .map_err(anyhow::Error::from)
                .and_then(|c| self.needs_imputation(c, rows));
            let result = match needed {
                Ok(true) => impute_category(df, &name, &self.config).map(Some),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };
            match result {
                Ok(Some(action)) => report.record(action),
                Ok(None) => {}
                Err(e) => report.skip(STAGE, &name, format!("{e:#}")),
            }
        }
    }
}

impl CleaningStage for Imputation {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), PipelineError> {
        self.impute_numeric(df, report)?;
        self.impute_categorical(df, report);
        Ok(())
    }
}

fn numeric_matrix(df: &DataFrame, names: &[String]) -> Result<Vec<Vec<Option<f64>>>> {
    names
        .iter()
        .map(|name| numeric_values(df.column(name)?))
        .collect()
}

/// Mean, median or KNN fill for one column.
fn impute_simple(
    df: &mut DataFrame,
    name: &str,
    strategy: NumericStrategy,
    numeric: &[String],
    matrix: &[Vec<Option<f64>>],
    k: usize,
) -> Result<CleaningAction> {
    let values = numeric_values(df.column(name)?)?;
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let missing = values.len() - present.len();
    let median = stats::median(&present).ok_or_else(|| anyhow!("column has no observed values"))?;

    let (technique, filled, parameters): (&str, Vec<Option<f64>>, _) = match strategy {
        NumericStrategy::Mean => {
            let mean = stats::mean(&present).unwrap_or(median);
            let filled = values.iter().map(|v| Some(v.unwrap_or(mean))).collect();
            ("mean", filled, params([("value", mean.into())]))
        }
        NumericStrategy::Knn => {
            let target = numeric
                .iter()
                .position(|n| n == name)
                .context("column missing from numeric matrix")?;
            let knn = knn_impute(matrix, target, k);
            let fallbacks = knn.iter().filter(|v| v.is_none()).count();
            let filled = knn.into_iter().map(|v| Some(v.unwrap_or(median))).collect();
            (
                "knn",
                filled,
                params([
                    ("k", k.into()),
                    ("metric", "nan_euclidean".into()),
                    ("median_fallbacks", fallbacks.into()),
                ]),
            )
        }
        NumericStrategy::Median | NumericStrategy::Auto | NumericStrategy::Iterative => {
            let filled = values.iter().map(|v| Some(v.unwrap_or(median))).collect();
            ("median", filled, params([("value", median.into())]))
        }
    };

    replace_numeric(df, name, filled)?;
    Ok(CleaningAction {
        stage: STAGE.to_owned(),
        columns: vec![name.to_owned()],
        technique: technique.to_owned(),
        parameters,
        rows_affected: missing,
    })
}

/// Writes filled values back, rounding into integer columns.
fn replace_numeric(df: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> Result<()> {
    let kind = ColumnKind::of(df.column(name)?);
    let series = if kind == ColumnKind::Integer {
        let ints: Vec<Option<i64>> = values.into_iter().map(|v| v.map(|x| x.round() as i64)).collect();
        Series::new(name.into(), ints)
    } else {
        Series::new(name.into(), values)
    };
    df.replace(name, series)?;
    Ok(())
}

fn impute_category(df: &mut DataFrame, name: &str, config: &ImputationConfig) -> Result<CleaningAction> {
    let column = df.column(name)?;
    let kind = ColumnKind::of(column);
    let values = text_values(column)?;
    let missing = values.iter().filter(|v| v.is_none()).count();

    let (technique, fill) = match config.categorical_strategy {
        CategoricalStrategy::Mode => {
            let mode = ranked_counts(&values)
                .into_iter()
                .next()
                .map(|c| c.value)
                .ok_or_else(|| anyhow!("column has no observed values"))?;
            ("mode", mode)
        }
        CategoricalStrategy::Constant => ("constant", config.fill_value.clone()),
    };

    let series = if kind == ColumnKind::Boolean {
        let flag = parse_bool(&fill)
            .ok_or_else(|| anyhow!("fill value '{fill}' is not a boolean"))?;
        let filled: Vec<Option<bool>> = column
            .bool()?
            .into_iter()
            .map(|v| Some(v.unwrap_or(flag)))
            .collect();
        Series::new(name.into(), filled)
    } else {
        let filled: Vec<String> = values
            .into_iter()
            .map(|v| v.unwrap_or_else(|| fill.clone()))
            .collect();
        Series::new(name.into(), filled)
    };
    df.replace(name, series)?;

    Ok(CleaningAction {
        stage: STAGE.to_owned(),
        columns: vec![name.to_owned()],
        technique: technique.to_owned(),
        parameters: params([("value", fill.into())]),
        rows_affected: missing,
    })
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;

    fn run(df: &mut DataFrame, config: ImputationConfig, strict: bool) -> Result<CleaningReport, PipelineError> {
        let mut report = CleaningReport::default();
        Imputation::new(config, strict).apply(df, &mut report)?;
        Ok(report)
    }

    #[test]
    fn test_median_is_default() -> anyhow::Result<()> {
        let mut df = df!("x" => [Some(1.0), None, Some(3.0), Some(100.0)])?;
        let report = run(&mut df, ImputationConfig::default(), false)?;
        let x: Vec<Option<f64>> = df.column("x")?.f64()?.into_iter().collect();
        assert_eq!(x[1], Some(3.0));
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].technique, "median");
        assert_eq!(report.actions[0].rows_affected, 1);
        Ok(())
    }

    #[test]
    fn test_integer_column_stays_integer() -> anyhow::Result<()> {
        let mut df = df!("n" => [Some(1i64), None, Some(2)])?;
        let config = ImputationConfig {
            numeric_strategy: NumericStrategy::Mean,
            ..ImputationConfig::default()
        };
        run(&mut df, config, false)?;
        assert_eq!(df.column("n")?.dtype(), &DataType::Int64);
        assert_eq!(df.column("n")?.null_count(), 0);
        Ok(())
    }

    #[test]
    fn test_threshold_excludes_low_missingness() -> anyhow::Result<()> {
        let mut df = df!("x" => [Some(1.0), None, Some(3.0), Some(4.0)])?;
        let config = ImputationConfig {
            missing_threshold: 30.0,
            ..ImputationConfig::default()
        };
        let report = run(&mut df, config, false)?;
        assert!(report.actions.is_empty());
        Ok(())
    }

    #[test]
    fn test_knn_strategy() -> anyhow::Result<()> {
        let mut df = df!(
            "a" => [Some(1.0), Some(1.1), Some(9.0), Some(9.1), Some(1.05)],
            "b" => [Some(10.0), Some(12.0), Some(90.0), Some(92.0), None],
        )?;
        let config = ImputationConfig {
            numeric_strategy: NumericStrategy::Knn,
            knn_neighbors: 2,
            ..ImputationConfig::default()
        };
        let report = run(&mut df, config, false)?;
        let b: Vec<Option<f64>> = df.column("b")?.f64()?.into_iter().collect();
        assert_eq!(b[4], Some(11.0));
        assert_eq!(report.actions[0].technique, "knn");
        Ok(())
    }

    #[test]
    fn test_iterative_falls_back_to_median_with_one_column() -> anyhow::Result<()> {
        let mut df = df!(
            "x" => [Some(1.0), None, Some(5.0)],
            "label" => ["a", "b", "c"],
        )?;
        let config = ImputationConfig {
            numeric_strategy: NumericStrategy::Iterative,
            ..ImputationConfig::default()
        };
        let report = run(&mut df, config, false)?;
        assert_eq!(report.actions[0].technique, "median");
        assert_eq!(report.actions[0].parameters["fallback_from"], "iterative");
        Ok(())
    }

    #[test]
    fn test_auto_with_iterative_enabled() -> anyhow::Result<()> {
        let a: Vec<f64> = (0..20).map(f64::from).collect();
        let b: Vec<Option<f64>> = (0..20)
            .map(|i| if i == 7 { None } else { Some(3.0 * f64::from(i)) })
            .collect();
        let mut df = df!("a" => a, "b" => b)?;
        let mut config = ImputationConfig::default();
        config.iterative.enabled = true;
        let report = run(&mut df, config, false)?;
        let b: Vec<Option<f64>> = df.column("b")?.f64()?.into_iter().collect();
        assert!((b[7].unwrap() - 21.0).abs() < 0.1);
        assert_eq!(report.actions[0].technique, "iterative");
        Ok(())
    }

    #[test]
    fn test_mode_and_constant_for_text() -> anyhow::Result<()> {
        let mut df = df!("c" => [Some("x"), Some("y"), Some("y"), None])?;
        run(&mut df, ImputationConfig::default(), false)?;
        let c: Vec<Option<&str>> = df.column("c")?.str()?.into_iter().collect();
        assert_eq!(c[3], Some("y"));

        let mut df = df!("c" => [Some("x"), None])?;
        let config = ImputationConfig {
            categorical_strategy: CategoricalStrategy::Constant,
            ..ImputationConfig::default()
        };
        run(&mut df, config, false)?;
        let c: Vec<Option<&str>> = df.column("c")?.str()?.into_iter().collect();
        assert_eq!(c[1], Some("missing"));
        Ok(())
    }

    #[test]
    fn test_all_missing_column_is_skipped() -> anyhow::Result<()> {
        let mut df = df!(
            "empty" => [None::<f64>, None],
            "ok" => [Some(1.0), None],
        )?;
        let report = run(&mut df, ImputationConfig::default(), false)?;
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].column, "empty");
        assert_eq!(report.actions.len(), 1);
        Ok(())
    }

    #[test]
    fn test_strict_without_numeric_columns() {
        let mut df = df!("c" => ["a", "b"]).unwrap();
        let err = run(&mut df, ImputationConfig::default(), true).unwrap_err();
        assert_eq!(err.kind(), "CleaningError");
    }

    #[test]
    fn test_datetime_left_untouched() -> anyhow::Result<()> {
        let dt = crate::table::datetime_series("when", vec![Some(0), None])?;
        let mut df = DataFrame::new(vec![dt.into()])?;
        let report = run(&mut df, ImputationConfig::default(), false)?;
        assert!(report.actions.is_empty());
        assert_eq!(df.column("when")?.null_count(), 1);
        Ok(())
    }
}
