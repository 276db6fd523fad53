//! Outlier detection and treatment for numeric columns.

use super::isolation::{self, IsolationConfig};
use super::{CleaningAction, CleaningReport, CleaningStage, params};
use crate::error::PipelineError;
use crate::profiling::stats;
use crate::table::{ColumnKind, numeric_column_names, numeric_values};
use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

const STAGE: &str = "outliers";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    Iqr,
    Zscore,
    IsolationForest,
}

impl OutlierMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iqr => "iqr",
            Self::Zscore => "zscore",
            Self::IsolationForest => "isolation_forest",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutlierAction {
    Cap,
    Remove,
    Flag,
}

impl OutlierAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cap => "cap",
            Self::Remove => "remove",
            Self::Flag => "flag",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutlierConfig {
    pub enabled: bool,
    pub method: OutlierMethod,
    pub action: OutlierAction,
    pub iqr_factor: f64,
    pub zscore_threshold: f64,
    pub isolation: IsolationConfig,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: OutlierMethod::Iqr,
            action: OutlierAction::Cap,
            iqr_factor: 1.5,
            zscore_threshold: 3.0,
            isolation: IsolationConfig::default(),
        }
    }
}

/// Rows flagged in one column and the bounds a cap would clip to.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub flags: Vec<bool>,
    pub lower: f64,
    pub upper: f64,
}

impl Detection {
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }
}

/// Detects outliers among `values`; missing cells are never flagged.
pub fn detect(values: &[Option<f64>], config: &OutlierConfig) -> Result<Detection> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return Err(anyhow!("column has no observed values"));
    }

    let (lower, upper) = match config.method {
        OutlierMethod::Iqr => {
            let sorted = stats::sorted(&present);
            let q1 = stats::quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
            let q3 = stats::quantile_sorted(&sorted, 0.75).unwrap_or(0.0);
            let iqr = q3 - q1;
            (q1 - config.iqr_factor * iqr, q3 + config.iqr_factor * iqr)
        }
        OutlierMethod::Zscore => {
            let mean = stats::mean(&present).unwrap_or(0.0);
            let std = stats::sample_std(&present)
                .filter(|s| *s > 0.0)
                .ok_or_else(|| anyhow!("zero or undefined standard deviation"))?;
            (
                mean - config.zscore_threshold * std,
                mean + config.zscore_threshold * std,
            )
        }
        OutlierMethod::IsolationForest => {
            let flags = isolation::detect(&present, &config.isolation);
            let inliers: Vec<f64> = present
                .iter()
                .zip(&flags)
                .filter(|(_, f)| !**f)
                .map(|(v, _)| *v)
                .collect();
            let lower = inliers.iter().copied().fold(f64::INFINITY, f64::min);
            let upper = inliers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !lower.is_finite() || !upper.is_finite() {
                return Err(anyhow!("every value was flagged"));
            }
            // Scatter the flags of present values back onto all rows.
            let mut flag_iter = flags.into_iter();
            let all = values
                .iter()
                .map(|v| v.is_some() && flag_iter.next().unwrap_or(false))
                .collect();
            return Ok(Detection {
                flags: all,
                lower,
                upper,
            });
        }
    };

    let flags = values
        .iter()
        .map(|v| v.is_some_and(|x| x < lower || x > upper))
        .collect();
    Ok(Detection { flags, lower, upper })
}

pub struct OutlierTreatment {
    config: OutlierConfig,
    strict: bool,
}

impl OutlierTreatment {
    pub fn new(config: OutlierConfig, strict: bool) -> Self {
        Self { config, strict }
    }

    fn action(&self, column: &str, detection: &Detection, rows: usize) -> CleaningAction {
        CleaningAction {
            stage: STAGE.to_owned(),
            columns: vec![column.to_owned()],
            technique: format!("{}_{}", self.config.method.as_str(), self.config.action.as_str()),
            parameters: self.parameters(detection),
            rows_affected: rows,
        }
    }

    fn parameters(&self, detection: &Detection) -> IndexMap<String, serde_json::Value> {
        let mut map = params([
            ("method", self.config.method.as_str().into()),
            ("action", self.config.action.as_str().into()),
            ("lower", detection.lower.into()),
            ("upper", detection.upper.into()),
        ]);
        match self.config.method {
            OutlierMethod::Iqr => {
                map.insert("factor".to_owned(), self.config.iqr_factor.into());
            }
            OutlierMethod::Zscore => {
                map.insert("threshold".to_owned(), self.config.zscore_threshold.into());
            }
            OutlierMethod::IsolationForest => {
                let iso = &self.config.isolation;
                map.insert("trees".to_owned(), iso.trees.into());
                map.insert("subsample".to_owned(), iso.subsample.into());
                map.insert("contamination".to_owned(), iso.contamination.into());
                map.insert("seed".to_owned(), iso.seed.into());
            }
        }
        map
    }
}

impl CleaningStage for OutlierTreatment {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), PipelineError> {
        let numeric = numeric_column_names(df);
        if numeric.is_empty() {
            if self.strict {
                return Err(PipelineError::Cleaning(
                    "outlier treatment found no numeric columns".to_owned(),
                ));
            }
            return Ok(());
        }

        let mut removal_mask = vec![false; df.height()];
        let mut removal_actions = Vec::new();

        for name in &numeric {
            let detection = match df
                .column(name)
                .map_err(anyhow::Error::from)
                .and_then(numeric_values)
                .and_then(|values| detect(&values, &self.config).map(|d| (values, d)))
            {
                Ok(found) => found,
                Err(e) => {
                    report.skip(STAGE, name, format!("{e:#}"));
                    continue;
                }
            };
            let (values, detection) = detection;
            let count = detection.count();
            if count == 0 {
                continue;
            }

            match self.config.action {
                OutlierAction::Cap => match cap_column(df, name, &values, &detection) {
                    Ok(0) => {}
                    Ok(changed) => report.record(self.action(name, &detection, changed)),
                    Err(e) => report.skip(STAGE, name, format!("{e:#}")),
                },
                OutlierAction::Flag => match flag_column(df, name, &detection) {
                    Ok(flag_name) => {
                        let mut action = self.action(name, &detection, count);
                        action
                            .parameters
                            .insert("flag_column".to_owned(), flag_name.into());
                        report.record(action);
                    }
                    Err(e) => report.skip(STAGE, name, format!("{e:#}")),
                },
                OutlierAction::Remove => {
                    for (slot, flag) in removal_mask.iter_mut().zip(&detection.flags) {
                        *slot |= *flag;
                    }
                    removal_actions.push(self.action(name, &detection, count));
                }
            }
        }

        if !removal_actions.is_empty() {
            let keep: Vec<bool> = removal_mask.iter().map(|r| !r).collect();
            let removed = removal_mask.iter().filter(|r| **r).count();
            let mask = BooleanChunked::from_slice("keep".into(), &keep);
            *df = df.filter(&mask)?;
            for mut action in removal_actions {
                action
                    .parameters
                    .insert("rows_removed_total".to_owned(), removed.into());
                report.record(action);
            }
        }
        Ok(())
    }
}

/// Clips values to the detection bounds; returns the number changed.
///
/// Integer columns clip to the integers inside the bounds, so a capped value
/// never lands outside them.
fn cap_column(
    df: &mut DataFrame,
    name: &str,
    values: &[Option<f64>],
    detection: &Detection,
) -> Result<usize> {
    let mut changed = 0;
    let series = if ColumnKind::of(df.column(name)?) == ColumnKind::Integer {
        let lower = detection.lower.ceil();
        let upper = detection.upper.floor();
        if lower > upper {
            return Err(anyhow!("no integer lies within [{}, {}]", detection.lower, detection.upper));
        }
        let ints: Vec<Option<i64>> = values
            .iter()
            .map(|v| {
                v.map(|x| {
                    let clipped = x.clamp(lower, upper);
                    if clipped != x {
                        changed += 1;
                    }
                    clipped as i64
                })
            })
            .collect();
        Series::new(name.into(), ints)
    } else {
        let capped: Vec<Option<f64>> = values
            .iter()
            .map(|v| {
                v.map(|x| {
                    let clipped = x.clamp(detection.lower, detection.upper);
                    if clipped != x {
                        changed += 1;
                    }
                    clipped
                })
            })
            .collect();
        Series::new(name.into(), capped)
    };
    if changed > 0 {
        df.replace(name, series)?;
    }
    Ok(changed)
}

/// Adds a boolean `<name>_outlier` column, suffixed until it collides with
/// no existing column.
fn flag_column(df: &mut DataFrame, name: &str, detection: &Detection) -> Result<String> {
    let base = format!("{name}_outlier");
    let mut flag_name = base.clone();
    let mut count = 0;
    while df.get_column_index(&flag_name).is_some() {
        count += 1;
        flag_name = format!("{base}_{count}");
    }
    let series = Series::new(flag_name.as_str().into(), detection.flags.as_slice());
    df.with_column(series)?;
    Ok(flag_name)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, clippy::indexing_slicing)]
    use super::*;

    fn values() -> Vec<f64> {
        vec![10.0, 11.0, 12.0, 11.5, 10.5, 12.5, 11.0, 200.0]
    }

    fn run(df: &mut DataFrame, config: OutlierConfig) -> Result<CleaningReport, PipelineError> {
        let mut report = CleaningReport::default();
        OutlierTreatment::new(config, false).apply(df, &mut report)?;
        Ok(report)
    }

    #[test]
    fn test_iqr_detects_extreme() {
        let v: Vec<Option<f64>> = values().into_iter().map(Some).collect();
        let detection = detect(&v, &OutlierConfig::default()).unwrap();
        assert_eq!(detection.count(), 1);
        assert!(detection.flags[7]);
    }

    #[test]
    fn test_missing_values_never_flagged() {
        let v = vec![Some(1.0), None, Some(1.2), Some(0.9), Some(1.1), Some(50.0)];
        let detection = detect(&v, &OutlierConfig::default()).unwrap();
        assert!(!detection.flags[1]);
    }

    #[test]
    fn test_cap_clips_to_upper_bound() -> anyhow::Result<()> {
        let mut df = df!("x" => values())?;
        let report = run(&mut df, OutlierConfig::default())?;
        let x: Vec<f64> = df.column("x")?.f64()?.into_no_null_iter().collect();
        assert!(x[7] < 200.0);
        assert_eq!(df.height(), 8);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].technique, "iqr_cap");
        Ok(())
    }

    #[test]
    fn test_remove_drops_union_once() -> anyhow::Result<()> {
        let mut df = df!(
            "a" => values(),
            "b" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, -80.0, 7.0],
        )?;
        let config = OutlierConfig {
            action: OutlierAction::Remove,
            ..OutlierConfig::default()
        };
        let report = run(&mut df, config)?;
        assert_eq!(df.height(), 6);
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.actions[0].parameters["rows_removed_total"], 2);
        Ok(())
    }

    #[test]
    fn test_flag_adds_boolean_column() -> anyhow::Result<()> {
        let mut df = df!("x" => values())?;
        let config = OutlierConfig {
            action: OutlierAction::Flag,
            ..OutlierConfig::default()
        };
        run(&mut df, config)?;
        let flags: Vec<Option<bool>> = df.column("x_outlier")?.bool()?.into_iter().collect();
        assert_eq!(flags[7], Some(true));
        assert_eq!(flags[0], Some(false));
        Ok(())
    }

    #[test]
    fn test_flag_column_does_not_overwrite_existing() -> anyhow::Result<()> {
        let mut df = df!(
            "x" => values(),
            "x_outlier" => ["keep"; 8],
        )?;
        let config = OutlierConfig {
            action: OutlierAction::Flag,
            ..OutlierConfig::default()
        };
        let report = run(&mut df, config)?;
        assert_eq!(df.column("x_outlier")?.str()?.get(0), Some("keep"));
        assert_eq!(df.column("x_outlier_1")?.bool()?.get(7), Some(true));
        assert_eq!(report.actions[0].parameters["flag_column"], "x_outlier_1");
        Ok(())
    }

    #[test]
    fn test_integer_cap_stays_inside_bounds() -> anyhow::Result<()> {
        let values: Vec<Option<f64>> = vec![Some(0.0), Some(5.0), Some(10.0)];
        let detection = Detection {
            flags: vec![true, false, true],
            lower: 0.6,
            upper: 9.4,
        };
        let mut df = df!("n" => [0i64, 5, 10])?;
        let changed = cap_column(&mut df, "n", &values, &detection)?;
        let n: Vec<i64> = df.column("n")?.i64()?.into_no_null_iter().collect();
        assert_eq!(n, vec![1, 5, 9]);
        assert_eq!(changed, 2);
        Ok(())
    }

    #[test]
    fn test_cap_of_flagged_inlier_changes_nothing() -> anyhow::Result<()> {
        // An isolation forest can flag a value that already lies inside the
        // inlier range.
        let values: Vec<Option<f64>> = vec![Some(1.0), Some(5.0), Some(9.0)];
        let detection = Detection {
            flags: vec![false, true, false],
            lower: 1.0,
            upper: 9.0,
        };
        let mut df = df!("x" => [1.0, 5.0, 9.0])?;
        assert_eq!(cap_column(&mut df, "x", &values, &detection)?, 0);
        let x: Vec<f64> = df.column("x")?.f64()?.into_no_null_iter().collect();
        assert_eq!(x, vec![1.0, 5.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_zscore_constant_column_is_skipped() -> anyhow::Result<()> {
        let mut df = df!("x" => [2.0, 2.0, 2.0])?;
        let config = OutlierConfig {
            method: OutlierMethod::Zscore,
            ..OutlierConfig::default()
        };
        let report = run(&mut df, config)?;
        assert!(report.actions.is_empty());
        assert_eq!(report.skipped.len(), 1);
        Ok(())
    }

    #[test]
    fn test_isolation_forest_caps_to_inlier_range() -> anyhow::Result<()> {
        let mut v: Vec<f64> = (0..99).map(|i| 50.0 + f64::from(i % 10)).collect();
        v.push(10_000.0);
        let mut df = df!("x" => v)?;
        let config = OutlierConfig {
            method: OutlierMethod::IsolationForest,
            ..OutlierConfig::default()
        };
        run(&mut df, config)?;
        let max = df.column("x")?.f64()?.max().unwrap();
        assert!(max <= 59.0);
        Ok(())
    }

    #[test]
    fn test_strict_requires_numeric_columns() {
        let mut df = df!("c" => ["a"]).unwrap();
        let mut report = CleaningReport::default();
        let err = OutlierTreatment::new(OutlierConfig::default(), true)
            .apply(&mut df, &mut report)
            .unwrap_err();
        assert_eq!(err.kind(), "CleaningError");
    }
}
