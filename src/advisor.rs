//! Feature engineering suggestions.
//!
//! The advisor reads the cleaned table and its profile and proposes
//! transformations through a fixed rule table. It never modifies the table.

use crate::ingest::infer::parse_any_datetime;
use crate::profiling::ProfileReport;
use crate::table::{ColumnKind, text_values};
use anyhow::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Share of non-null text values that must parse as dates.
const DATE_LIKE_SHARE: f64 = 0.8;
const SKEW_THRESHOLD: f64 = 1.0;
const ONE_HOT_MAX_DISTINCT: usize = 10;
const HIGH_CARDINALITY: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeaturesConfig {
    pub enabled: bool,
    /// Column the caller intends to predict; excluded from transform advice.
    pub target_column: Option<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_column: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    Schema,
    Math,
    Logic,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureSuggestion {
    pub title: String,
    pub category: SuggestionCategory,
    pub columns: Vec<String>,
    pub rationale: String,
    pub impact: Impact,
}

impl FeatureSuggestion {
    fn new(
        title: impl Into<String>,
        category: SuggestionCategory,
        column: &str,
        rationale: String,
        impact: Impact,
    ) -> Self {
        Self {
            title: title.into(),
            category,
            columns: vec![column.to_owned()],
            rationale,
            impact,
        }
    }
}

/// Suggestions for every column, highest impact first.
///
/// # Errors
///
/// Fails only when a column cannot be read.
pub fn suggest(
    df: &DataFrame,
    profile: &ProfileReport,
    target: Option<&str>,
) -> Result<Vec<FeatureSuggestion>> {
    let mut suggestions = Vec::new();
    let rows = df.height();

    if let Some(target) = target {
        match df.column(target) {
            Ok(column) if ColumnKind::of(column) == ColumnKind::Text => {
                suggestions.push(FeatureSuggestion::new(
                    "Label-encode target",
                    SuggestionCategory::Logic,
                    target,
                    "text target must be mapped to integer class labels for modelling".to_owned(),
                    Impact::High,
                ));
            }
            Ok(_) => {}
            Err(_) => warn!(target, "Target column not found in table"),
        }
    }

    for column in df.get_columns() {
        let name = column.name().as_str();
        if Some(name) == target {
            continue;
        }
        match ColumnKind::of(column) {
            ColumnKind::Text => suggest_text(column, profile, rows, &mut suggestions)?,
            ColumnKind::Datetime => suggestions.push(FeatureSuggestion::new(
                "Extract temporal components",
                SuggestionCategory::Logic,
                name,
                "year, month, weekday and hour often carry signal a raw timestamp hides"
                    .to_owned(),
                Impact::Low,
            )),
            ColumnKind::Integer | ColumnKind::Float => suggest_numeric(name, profile, &mut suggestions),
            ColumnKind::Boolean => {}
        }
    }

    suggestions.sort_by_key(|s| s.impact);
    debug!(count = suggestions.len(), "Feature suggestions ready");
    Ok(suggestions)
}

fn suggest_numeric(name: &str, profile: &ProfileReport, out: &mut Vec<FeatureSuggestion>) {
    let Some(summary) = profile.numeric.get(name) else {
        return;
    };
    match summary.sample_skewness {
        Some(skew) if skew > SKEW_THRESHOLD => {
            let shift = if summary.min.is_some_and(|m| m <= 0.0) {
                " (shift or use log1p: column has non-positive values)"
            } else {
                ""
            };
            out.push(FeatureSuggestion::new(
                "Log-scale skewed column",
                SuggestionCategory::Math,
                name,
                format!("sample skewness {skew:.2} exceeds {SKEW_THRESHOLD}{shift}"),
                Impact::Medium,
            ));
        }
        _ => {
            if summary.sample_std.is_some_and(|s| s > 0.0) {
                out.push(FeatureSuggestion::new(
                    "Standardize column",
                    SuggestionCategory::Math,
                    name,
                    "centre to zero mean and unit variance for scale-sensitive models".to_owned(),
                    Impact::Low,
                ));
            }
        }
    }
}

fn suggest_text(
    column: &Column,
    profile: &ProfileReport,
    rows: usize,
    out: &mut Vec<FeatureSuggestion>,
) -> Result<()> {
    let name = column.name().as_str();
    let values = text_values(column)?;
    let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
    if present.is_empty() {
        return Ok(());
    }

    let parsed: Vec<_> = present.iter().filter_map(|v| parse_any_datetime(v)).collect();
    let share = parsed.len() as f64 / present.len() as f64;
    if share >= DATE_LIKE_SHARE {
        let distinct: HashSet<&str> = present.iter().copied().collect();
        let key_like = distinct.len() == present.len();
        let sorted = parsed.windows(2).all(|w| matches!(w, [a, b] if a <= b));
        let impact = if key_like || sorted {
            Impact::High
        } else {
            Impact::Medium
        };
        out.push(FeatureSuggestion::new(
            "Standardize dates to ISO-8601",
            SuggestionCategory::Schema,
            name,
            format!(
                "{:.0}% of values parse as dates in non-uniform text formats",
                share * 100.0
            ),
            impact,
        ));
        return Ok(());
    }

    let distinct = profile
        .categorical
        .get(name)
        .map_or_else(|| present.iter().collect::<HashSet<_>>().len(), |c| c.unique_count);
    if (2..=ONE_HOT_MAX_DISTINCT).contains(&distinct) && distinct * 2 <= rows {
        out.push(FeatureSuggestion::new(
            "One-hot encode",
            SuggestionCategory::Logic,
            name,
            format!("{distinct} distinct categories"),
            Impact::Low,
        ));
    } else if distinct > HIGH_CARDINALITY {
        out.push(FeatureSuggestion::new(
            "Frequency-encode high-cardinality column",
            SuggestionCategory::Logic,
            name,
            format!("{distinct} distinct values are too many for one-hot expansion"),
            Impact::Low,
        ));
    }
    Ok(())
}
