//! Schema validation of the cleaned table.
//!
//! A [`ValidationSchema`] maps column names to expected types, nullability and
//! domain constraints, in the order the caller wrote them. Validation never
//! stops at the first problem: every mismatch becomes a [`Violation`] and the
//! result is returned as data. Turning a failed result into an error is the
//! caller's decision.
//!
//! ```
//! use scrubline::validation::{ValidationSchema, validate};
//! use polars::prelude::*;
//!
//! let schema = ValidationSchema::from_json(r#"{"age": {"type": "integer", "domain": {"min": 0}}}"#)?;
//! let df = df!("age" => [34i64, -1])?;
//! let result = validate(&df, &schema)?;
//! assert!(!result.passed);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::ingest::infer::{parse_any_datetime, parse_bool, parse_float, parse_int};
use crate::table::{ColumnKind, numeric_values, text_values};
use crate::utils::sanitize_name;
use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Row indices kept per violation.
pub const MAX_REPORTED_ROWS: usize = 20;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Turn a failed validation into a fatal pipeline error.
    pub fail_on_violation: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Domain {
    pub allowed: Option<Vec<serde_json::Value>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ColumnRule {
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub domain: Option<Domain>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ValidationSchema {
    pub columns: IndexMap<String, ColumnRule>,
}

impl ValidationSchema {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse validation schema")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    MissingColumn,
    Dtype,
    Nullability,
    Domain,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub column: String,
    pub check: CheckKind,
    pub expected: String,
    pub actual: String,
    /// First offending rows, at most [`MAX_REPORTED_ROWS`].
    pub row_indices: Vec<usize>,
    /// Total offending rows.
    pub count: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn summary(&self) -> String {
        let columns: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{} ({:?})", v.column, v.check))
            .collect();
        format!("{} violation(s): {}", self.violations.len(), columns.join(", "))
    }
}

/// Offending rows collected while scanning a column.
#[derive(Default)]
struct Offenders {
    rows: Vec<usize>,
    count: usize,
}

impl Offenders {
    fn push(&mut self, row: usize) {
        if self.rows.len() < MAX_REPORTED_ROWS {
            self.rows.push(row);
        }
        self.count += 1;
    }

    fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let mut out = Self::default();
        for (row, bad) in flags.into_iter().enumerate() {
            if bad {
                out.push(row);
            }
        }
        out
    }

    fn into_violation(
        self,
        column: &str,
        check: CheckKind,
        expected: String,
        actual: String,
    ) -> Option<Violation> {
        (self.count > 0).then(|| Violation {
            column: column.to_owned(),
            check,
            expected,
            actual,
            row_indices: self.rows,
            count: self.count,
        })
    }
}

/// Checks `df` against every rule of `schema`, in schema order.
///
/// # Errors
///
/// Fails only when a column cannot be read; mismatches are reported in the result.
pub fn validate(df: &DataFrame, schema: &ValidationSchema) -> Result<ValidationResult> {
    let mut violations = Vec::new();

    for (name, rule) in &schema.columns {
        let Some(column) = lookup(df, name) else {
            violations.push(Violation {
                column: name.clone(),
                check: CheckKind::MissingColumn,
                expected: "present".to_owned(),
                actual: "absent".to_owned(),
                row_indices: Vec::new(),
                count: 0,
            });
            continue;
        };

        violations.extend(check_dtype(name, column, rule.kind)?);

        if !rule.nullable {
            let missing = missing_flags(column)?;
            violations.extend(Offenders::from_flags(missing).into_violation(
                name,
                CheckKind::Nullability,
                "no missing values".to_owned(),
                "missing values".to_owned(),
            ));
        }

        if let Some(domain) = &rule.domain {
            violations.extend(check_domain(name, column, domain)?);
        }
    }

    let result = ValidationResult {
        passed: violations.is_empty(),
        violations,
    };
    info!(
        passed = result.passed,
        violations = result.violations.len(),
        "Validation finished"
    );
    Ok(result)
}

/// Exact name first, then the normalised form the ingestor produces.
fn lookup<'a>(df: &'a DataFrame, name: &str) -> Option<&'a Column> {
    df.column(name).ok().or_else(|| {
        let normalized = sanitize_name(name);
        debug!(name, normalized = %normalized, "Falling back to normalized column name");
        df.column(&normalized).ok()
    })
}

fn missing_flags(column: &Column) -> Result<Vec<bool>> {
    if ColumnKind::of(column) == ColumnKind::Float {
        Ok(numeric_values(column)?.iter().map(Option::is_none).collect())
    } else {
        Ok(column
            .is_null()
            .into_iter()
            .map(|v| v.unwrap_or(true))
            .collect())
    }
}

fn text_parses_as(value: &str, kind: ColumnKind) -> bool {
    match kind {
        ColumnKind::Integer => parse_int(value).is_some(),
        ColumnKind::Float => parse_float(value).is_some(),
        ColumnKind::Boolean => parse_bool(value).is_some(),
        ColumnKind::Datetime => parse_any_datetime(value).is_some(),
        ColumnKind::Text => true,
    }
}

fn check_dtype(name: &str, column: &Column, expected: ColumnKind) -> Result<Option<Violation>> {
    let actual = ColumnKind::of(column);
    let offenders = match (actual, expected) {
        (a, e) if a == e => return Ok(None),
        (_, ColumnKind::Text)
        | (ColumnKind::Integer, ColumnKind::Float)
        | (ColumnKind::Boolean, ColumnKind::Integer) => return Ok(None),
        // Integral floats coerce only when nothing is missing.
        (ColumnKind::Float, ColumnKind::Integer) => Offenders::from_flags(
            numeric_values(column)?
                .into_iter()
                .map(|v| v.is_none_or(|x| x.fract() != 0.0)),
        ),
        (ColumnKind::Integer, ColumnKind::Boolean) => Offenders::from_flags(
            numeric_values(column)?
                .into_iter()
                .map(|v| v.is_some_and(|x| x != 0.0 && x != 1.0)),
        ),
        (ColumnKind::Text, target) => Offenders::from_flags(
            text_values(column)?
                .into_iter()
                .map(|v| v.is_some_and(|s| !text_parses_as(&s, target))),
        ),
        _ => Offenders::from_flags(
            column
                .is_not_null()
                .into_iter()
                .map(|v| v.unwrap_or(false)),
        ),
    };

    Ok(offenders.into_violation(
        name,
        CheckKind::Dtype,
        expected.as_str().to_owned(),
        actual.as_str().to_owned(),
    ))
}

fn value_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe_domain(domain: &Domain) -> String {
    let mut parts = Vec::new();
    if let Some(allowed) = &domain.allowed {
        let labels: Vec<String> = allowed.iter().map(value_label).collect();
        parts.push(format!("one of [{}]", labels.join(", ")));
    }
    if let Some(min) = domain.min {
        parts.push(format!(">= {min}"));
    }
    if let Some(max) = domain.max {
        parts.push(format!("<= {max}"));
    }
    parts.join(", ")
}

/// Numeric columns compare allowed values numerically, the rest by label.
/// Bounds apply to any value that reads as a number. Missing values are
/// the nullability check's concern.
fn check_domain(name: &str, column: &Column, domain: &Domain) -> Result<Option<Violation>> {
    let numeric = ColumnKind::of(column).is_numeric();
    let texts = text_values(column)?;
    let numbers: Vec<Option<f64>> = if numeric {
        numeric_values(column)?
    } else {
        texts
            .iter()
            .map(|v| v.as_deref().and_then(parse_float))
            .collect()
    };

    let allowed_numbers: Option<Vec<f64>> = domain.allowed.as_ref().map(|a| {
        a.iter()
            .filter_map(|v| v.as_f64().or_else(|| v.as_str().and_then(parse_float)))
            .collect()
    });
    let allowed_labels: Option<Vec<String>> = domain
        .allowed
        .as_ref()
        .map(|a| a.iter().map(value_label).collect());
    let out_of_range =
        |x: f64| domain.min.is_some_and(|m| x < m) || domain.max.is_some_and(|m| x > m);

    let flags = texts.iter().zip(&numbers).map(|(text, number)| {
        let Some(text) = text else {
            return false;
        };
        let disallowed = if numeric {
            match (number, &allowed_numbers) {
                (Some(x), Some(allowed)) => !allowed.iter().any(|a| (a - x).abs() < 1e-9),
                _ => false,
            }
        } else {
            allowed_labels
                .as_ref()
                .is_some_and(|allowed| !allowed.iter().any(|a| a == text))
        };
        disallowed || number.is_some_and(out_of_range)
    });

    Ok(Offenders::from_flags(flags).into_violation(
        name,
        CheckKind::Domain,
        describe_domain(domain),
        "out of domain".to_owned(),
    ))
}

#[cfg(test)]
mod tests {
    #![expect(clippy::indexing_slicing)]
    use super::*;

    fn schema(json: &str) -> ValidationSchema {
        ValidationSchema::from_json(json).unwrap_or_default()
    }

    #[test]
    fn test_schema_keeps_declaration_order_and_defaults() -> Result<()> {
        let schema = ValidationSchema::from_json(
            r#"{"b": {"type": "float"}, "a": {"type": "string", "nullable": false}}"#,
        )?;
        let names: Vec<&str> = schema.columns.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(schema.columns["b"].nullable);
        assert!(!schema.columns["a"].nullable);
        assert_eq!(schema.columns["a"].kind, ColumnKind::Text);
        Ok(())
    }

    #[test]
    fn test_float_with_missing_against_integer_is_one_dtype_violation() -> Result<()> {
        let df = df!("age" => [Some(30.0), None, Some(41.0), Some(f64::NAN)])?;
        let result = validate(&df, &schema(r#"{"age": {"type": "integer"}}"#))?;
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        let v = &result.violations[0];
        assert_eq!(v.check, CheckKind::Dtype);
        assert_eq!(v.expected, "integer");
        assert_eq!(v.actual, "float");
        assert_eq!(v.row_indices, vec![1, 3]);
        assert_eq!(v.count, 2);
        Ok(())
    }

    #[test]
    fn test_accepted_coercions() -> Result<()> {
        let df = df!(
            "i" => [1i64, 0, 1],
            "f" => [1.0, 2.0, 3.0],
            "b" => [true, false, true],
            "t" => ["4", "5", "6"],
            "d" => ["2024-01-01", "2024-02-01", "2024-03-01"],
        )?;
        let result = validate(
            &df,
            &schema(
                r#"{
                    "i": {"type": "float"},
                    "f": {"type": "integer"},
                    "b": {"type": "integer"},
                    "t": {"type": "integer"},
                    "d": {"type": "datetime"}
                }"#,
            ),
        )?;
        assert!(result.passed, "{}", result.summary());

        let result = validate(&df, &schema(r#"{"i": {"type": "boolean"}, "f": {"type": "text"}}"#))?;
        assert!(result.passed);
        Ok(())
    }

    #[test]
    fn test_every_mismatched_column_is_reported() -> Result<()> {
        let df = df!(
            "a" => ["x", "y"],
            "b" => [true, false],
            "c" => [1.5, 2.5],
        )?;
        let result = validate(
            &df,
            &schema(
                r#"{
                    "a": {"type": "integer"},
                    "b": {"type": "datetime"},
                    "c": {"type": "integer"},
                    "gone": {"type": "text"}
                }"#,
            ),
        )?;
        let columns: Vec<&str> = result.violations.iter().map(|v| v.column.as_str()).collect();
        assert_eq!(columns, vec!["a", "b", "c", "gone"]);
        assert_eq!(result.violations[3].check, CheckKind::MissingColumn);
        Ok(())
    }

    #[test]
    fn test_nullability_and_domain() -> Result<()> {
        let df = df!(
            "score" => [Some(5i64), None, Some(120), Some(-3)],
            "color" => [Some("red"), Some("blue"), Some("mauve"), None],
        )?;
        let result = validate(
            &df,
            &schema(
                r#"{
                    "score": {"type": "integer", "nullable": false, "domain": {"min": 0, "max": 100}},
                    "color": {"type": "text", "domain": {"allowed": ["red", "blue"]}}
                }"#,
            ),
        )?;
        let checks: Vec<(&str, CheckKind, Vec<usize>)> = result
            .violations
            .iter()
            .map(|v| (v.column.as_str(), v.check, v.row_indices.clone()))
            .collect();
        assert_eq!(
            checks,
            vec![
                ("score", CheckKind::Nullability, vec![1]),
                ("score", CheckKind::Domain, vec![2, 3]),
                ("color", CheckKind::Domain, vec![2]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_numeric_allowed_values() -> Result<()> {
        let df = df!("rating" => [1.0, 2.0, 3.0, 2.5])?;
        let result = validate(
            &df,
            &schema(r#"{"rating": {"type": "float", "domain": {"allowed": [1, 2, 3]}}}"#),
        )?;
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].row_indices, vec![3]);
        Ok(())
    }

    #[test]
    fn test_row_indices_are_capped() -> Result<()> {
        let values: Vec<i64> = (0..50).map(|_| -1).collect();
        let df = df!("n" => values)?;
        let result = validate(&df, &schema(r#"{"n": {"type": "integer", "domain": {"min": 0}}}"#))?;
        let v = &result.violations[0];
        assert_eq!(v.row_indices.len(), MAX_REPORTED_ROWS);
        assert_eq!(v.count, 50);
        Ok(())
    }

    #[test]
    fn test_lookup_falls_back_to_normalized_name() -> Result<()> {
        let df = df!("first_name" => ["Ada", "Grace"])?;
        let result = validate(&df, &schema(r#"{"First Name": {"type": "text"}}"#))?;
        assert!(result.passed);
        Ok(())
    }
}
