//! Statistical profiling of the working table.
//!
//! A [`ProfileReport`] records the table shape, per-column missingness, exact
//! duplicate rows, moments for numeric columns, frequency tables for
//! categorical columns, ranges of datetime columns, pairwise Pearson
//! correlations and text columns whose values mix several types. Numeric statistics follow the sample convention
//! (n - 1 denominators, bias-corrected skewness and kurtosis); statistics
//! that are undefined for the data at hand are `None` and serialise as null.
//!
//! Rendering of visual artifacts lives in [`visuals`] and is optional.

pub mod stats;
pub mod temporal;
pub mod visuals;

use crate::error::PipelineError;
use crate::ingest::infer::{parse_any_datetime, parse_bool, parse_float};
use crate::table::{ColumnKind, missing_count, numeric_values, text_values};
use anyhow::Result;
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Number of categories kept per categorical column.
pub const TOP_CATEGORIES: usize = 5;

/// Example values kept for a mixed-type column.
const MIXED_SAMPLES: usize = 5;

pub use temporal::{DatetimeSummary, TemporalDistribution};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Render the missingness heatmap, histograms and bar plots.
    pub include_visuals: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: ColumnKind,
    pub missing_values: usize,
    pub percent_missing: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub sample_std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub sample_skewness: Option<f64>,
    pub sample_excess_kurtosis: Option<f64>,
    pub percent_missing: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CategoricalSummary {
    pub unique_count: usize,
    pub top_categories: Vec<CategoryCount>,
    pub percent_missing: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Correlation {
    pub left: String,
    pub right: String,
    pub pearson: f64,
}

/// Text column whose values parse as more than one type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MixedType {
    /// In order of first appearance.
    pub detected_types: Vec<ColumnKind>,
    pub sample_values: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfileReport {
    pub number_rows: usize,
    pub number_columns: usize,
    pub columns: Vec<ColumnProfile>,
    pub duplicate_rows: usize,
    pub numeric: IndexMap<String, NumericSummary>,
    pub categorical: IndexMap<String, CategoricalSummary>,
    pub datetime: IndexMap<String, DatetimeSummary>,
    /// Every pair of numeric columns with a defined coefficient, in table order.
    pub correlations: Vec<Correlation>,
    pub mixed_types: IndexMap<String, MixedType>,
}

impl ProfileReport {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn missing_values(&self, name: &str) -> Option<usize> {
        self.column(name).map(|c| c.missing_values)
    }

    pub fn percent_missing(&self, name: &str) -> Option<f64> {
        self.column(name).map(|c| c.percent_missing)
    }
}

/// Profiles every column of `df`.
///
/// # Errors
///
/// Returns [`PipelineError::Profiling`] for a table with zero rows, or when a
/// column cannot be read.
pub fn profile(df: &DataFrame) -> Result<ProfileReport, PipelineError> {
    if df.height() == 0 {
        return Err(PipelineError::Profiling("table has zero rows".to_owned()));
    }
    build_report(df).map_err(|e| PipelineError::Profiling(format!("{e:#}")))
}

fn build_report(df: &DataFrame) -> Result<ProfileReport> {
    let rows = df.height();
    let mut columns = Vec::with_capacity(df.width());
    let mut numeric = IndexMap::new();
    let mut categorical = IndexMap::new();
    let mut datetime = IndexMap::new();
    let mut mixed_types = IndexMap::new();

    for column in df.get_columns() {
        let name = column.name().to_string();
        let kind = ColumnKind::of(column);
        let missing = missing_count(column)?;
        let percent = percent(missing, rows);

        columns.push(ColumnProfile {
            name: name.clone(),
            dtype: kind,
            missing_values: missing,
            percent_missing: percent,
        });

        match kind {
            ColumnKind::Integer | ColumnKind::Float => {
                numeric.insert(name, summarize_numeric(column, percent)?);
            }
            ColumnKind::Text => {
                let values = text_values(column)?;
                if let Some(mixed) = detect_mixed_type(&values) {
                    mixed_types.insert(name.clone(), mixed);
                }
                categorical.insert(name, summarize_categorical(&values, percent));
            }
            ColumnKind::Boolean => {
                categorical.insert(name, summarize_categorical(&text_values(column)?, percent));
            }
            ColumnKind::Datetime => {
                if let Some(summary) = temporal::summarize_datetime(column, percent)? {
                    datetime.insert(name, summary);
                }
            }
        }
    }

    let correlations = correlate(df)?;
    let duplicate_rows = count_duplicate_rows(df)?;
    info!(
        rows,
        columns = df.width(),
        duplicate_rows,
        "Profiled table"
    );

    Ok(ProfileReport {
        number_rows: rows,
        number_columns: df.width(),
        columns,
        duplicate_rows,
        numeric,
        categorical,
        datetime,
        correlations,
        mixed_types,
    })
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn summarize_numeric(column: &Column, percent_missing: f64) -> Result<NumericSummary> {
    let values: Vec<f64> = numeric_values(column)?.into_iter().flatten().collect();
    let sorted = stats::sorted(&values);
    Ok(NumericSummary {
        count: values.len(),
        mean: stats::mean(&values),
        median: stats::quantile_sorted(&sorted, 0.5),
        sample_std: stats::sample_std(&values),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        q1: stats::quantile_sorted(&sorted, 0.25),
        q3: stats::quantile_sorted(&sorted, 0.75),
        sample_skewness: stats::sample_skewness(&values),
        sample_excess_kurtosis: stats::sample_excess_kurtosis(&values),
        percent_missing,
    })
}

/// Frequency table in first-occurrence order.
pub fn value_counts(values: &[Option<String>]) -> Vec<CategoryCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<CategoryCount> = Vec::new();
    for value in values.iter().flatten() {
        if let Some(&pos) = index.get(value.as_str()) {
            if let Some(entry) = counts.get_mut(pos) {
                entry.count += 1;
            }
        } else {
            index.insert(value.as_str(), counts.len());
            counts.push(CategoryCount {
                value: value.clone(),
                count: 1,
            });
        }
    }
    counts
}

/// Frequency table sorted by descending count; the sort is stable so ties
/// keep first-occurrence order.
pub fn ranked_counts(values: &[Option<String>]) -> Vec<CategoryCount> {
    let mut counts = value_counts(values);
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

fn summarize_categorical(values: &[Option<String>], percent_missing: f64) -> CategoricalSummary {
    let mut counts = ranked_counts(values);
    let unique_count = counts.len();
    counts.truncate(TOP_CATEGORIES);
    CategoricalSummary {
        unique_count,
        top_categories: counts,
        percent_missing,
    }
}

fn value_kind(value: &str) -> ColumnKind {
    if parse_float(value).is_some() {
        ColumnKind::Float
    } else if parse_bool(value).is_some() {
        ColumnKind::Boolean
    } else if parse_any_datetime(value).is_some() {
        ColumnKind::Datetime
    } else {
        ColumnKind::Text
    }
}

/// Types seen across the present values of a text column; integers and
/// floats both count as `float`. `None` unless at least two types appear.
pub fn detect_mixed_type(values: &[Option<String>]) -> Option<MixedType> {
    let mut detected_types: Vec<ColumnKind> = Vec::new();
    let mut sample_values = Vec::new();
    for value in values.iter().flatten() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let kind = value_kind(value);
        if !detected_types.contains(&kind) {
            detected_types.push(kind);
            if sample_values.len() < MIXED_SAMPLES {
                sample_values.push(value.to_owned());
            }
        }
    }
    (detected_types.len() > 1).then_some(MixedType {
        detected_types,
        sample_values,
    })
}

fn correlate(df: &DataFrame) -> Result<Vec<Correlation>> {
    let columns: Vec<(String, Vec<Option<f64>>)> = df
        .get_columns()
        .iter()
        .filter(|c| ColumnKind::of(c).is_numeric())
        .map(|c| Ok((c.name().to_string(), numeric_values(c)?)))
        .collect::<Result<_>>()?;

    let mut correlations = Vec::new();
    for (i, (left, x)) in columns.iter().enumerate() {
        for (right, y) in columns.iter().skip(i + 1) {
            if let Some(pearson) = stats::pearson(x, y) {
                correlations.push(Correlation {
                    left: left.clone(),
                    right: right.clone(),
                    pearson,
                });
            }
        }
    }
    Ok(correlations)
}

/// Rows exactly equal to an earlier row, compared cell by cell.
fn count_duplicate_rows(df: &DataFrame) -> Result<usize> {
    let columns: Vec<Vec<Option<String>>> = df
        .get_columns()
        .iter()
        .map(text_values)
        .collect::<Result<_>>()?;

    let mut seen: HashSet<Vec<Option<&str>>> = HashSet::with_capacity(df.height());
    let mut duplicates = 0;
    for row in 0..df.height() {
        let key: Vec<Option<&str>> = columns
            .iter()
            .map(|col| col.get(row).and_then(|v| v.as_deref()))
            .collect();
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    Ok(duplicates)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, clippy::indexing_slicing)]
    use super::*;

    #[test]
    fn test_profile_shape_and_missing() -> Result<()> {
        let df = df!(
            "age" => [Some(30.0), None, Some(f64::NAN), Some(41.0)],
            "city" => [Some("Oslo"), Some("Lima"), Some("Oslo"), None],
        )?;
        let report = profile(&df)?;
        assert_eq!(report.number_rows, 4);
        assert_eq!(report.number_columns, 2);
        assert_eq!(report.missing_values("age"), Some(2));
        assert_eq!(report.percent_missing("age"), Some(50.0));
        assert_eq!(report.missing_values("city"), Some(1));
        assert_eq!(report.numeric["age"].count, 2);
        Ok(())
    }

    #[test]
    fn test_top_categories_tie_break_by_first_occurrence() -> Result<()> {
        let df = df!("c" => ["b", "a", "a", "b", "c", "d", "e", "f"])?;
        let report = profile(&df)?;
        let summary = &report.categorical["c"];
        assert_eq!(summary.unique_count, 6);
        let values: Vec<&str> = summary
            .top_categories
            .iter()
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(values, vec!["b", "a", "c", "d", "e"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_rows_are_exact() -> Result<()> {
        let df = df!(
            "id" => [1i64, 1, 1],
            "name" => ["Ann", "Ann", "ann"],
        )?;
        assert_eq!(profile(&df)?.duplicate_rows, 1);
        Ok(())
    }

    #[test]
    fn test_degenerate_stats_are_none() -> Result<()> {
        let df = df!("x" => [5.0, 5.0])?;
        let report = profile(&df)?;
        let summary = &report.numeric["x"];
        assert_eq!(summary.sample_std, Some(0.0));
        assert!(summary.sample_skewness.is_none());
        assert!(summary.sample_excess_kurtosis.is_none());
        Ok(())
    }

    #[test]
    fn test_correlations_cover_numeric_pairs() -> Result<()> {
        let df = df!(
            "a" => [1.0, 2.0, 3.0, 4.0],
            "b" => [2i64, 4, 6, 8],
            "label" => ["w", "x", "y", "z"],
            "c" => [4.0, 3.0, 2.0, 1.0],
        )?;
        let report = profile(&df)?;
        let pairs: Vec<(&str, &str)> = report
            .correlations
            .iter()
            .map(|c| (c.left.as_str(), c.right.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "c")]);
        assert!((report.correlations[0].pearson - 1.0).abs() < 1e-9);
        assert!((report.correlations[1].pearson + 1.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_mixed_type_text_column() -> Result<()> {
        let df = df!(
            "code" => ["12", "abc", "3.5", "yes", "def"],
            "name" => ["Ann", "Bob", "Cy", "Di", "Ed"],
        )?;
        let report = profile(&df)?;
        let mixed = &report.mixed_types["code"];
        assert_eq!(
            mixed.detected_types,
            vec![ColumnKind::Float, ColumnKind::Text, ColumnKind::Boolean]
        );
        assert_eq!(mixed.sample_values, vec!["12", "abc", "yes"]);
        assert!(!report.mixed_types.contains_key("name"));
        Ok(())
    }

    #[test]
    fn test_datetime_columns_are_summarized() -> Result<()> {
        let ts = crate::table::datetime_series("ts", vec![Some(0), Some(2 * 86_400_000)])?;
        let df = DataFrame::new(vec![ts.into(), Column::new("n".into(), [1i64, 2])])?;
        let report = profile(&df)?;
        assert_eq!(report.datetime["ts"].range_days, 2);
        assert_eq!(report.datetime["ts"].min, "1970-01-01T00:00:00.000");
        assert!(!report.categorical.contains_key("ts"));
        Ok(())
    }

    #[test]
    fn test_empty_table_is_profiling_error() {
        let df = DataFrame::new(vec![Column::new("x".into(), Vec::<f64>::new())]).unwrap();
        let err = profile(&df).unwrap_err();
        assert_eq!(err.kind(), "ProfilingError");
    }

    #[test]
    fn test_report_serializes_null_statistics() -> Result<()> {
        let df = df!("x" => [1.0])?;
        let json = serde_json::to_value(profile(&df)?)?;
        assert!(json["numeric"]["x"]["sample_skewness"].is_null());
        Ok(())
    }
}
