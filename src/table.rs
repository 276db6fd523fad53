//! Semantic column types and value extraction over polars columns.
//!
//! The working table of a pipeline run is a plain polars [`DataFrame`]. This
//! module maps polars dtypes onto the five semantic kinds the pipeline reasons
//! about and provides the small set of accessors every stage shares: numeric
//! values as `Option<f64>` (NaN counted as missing), text values, and missing
//! counts.

use anyhow::{Context as _, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Semantic type of a column.
#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[serde(alias = "int", alias = "int64")]
    Integer,
    #[serde(alias = "double", alias = "float64", alias = "number")]
    Float,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "string", alias = "str", alias = "categorical", alias = "category")]
    Text,
    #[serde(alias = "date", alias = "timestamp")]
    Datetime,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Datetime => "datetime",
        }
    }

    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Boolean => Self::Boolean,
            dt if dt.is_float() => Self::Float,
            dt if dt.is_integer() => Self::Integer,
            DataType::Datetime(_, _) | DataType::Date => Self::Datetime,
            _ => Self::Text,
        }
    }

    pub fn of(column: &Column) -> Self {
        Self::from_dtype(column.dtype())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Text and boolean columns are profiled and imputed as categories.
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::Text | Self::Boolean)
    }
}

/// Names of the integer and float columns, in table order.
pub fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| ColumnKind::of(c).is_numeric())
        .map(|c| c.name().to_string())
        .collect()
}

/// Numeric values of a column with nulls and NaN mapped to `None`.
pub fn numeric_values(column: &Column) -> Result<Vec<Option<f64>>> {
    let casted = column
        .as_materialized_series()
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' is not numeric", column.name()))?;
    let ca = casted.f64()?;
    Ok(ca
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Present values only, in row order.
pub fn present_numeric_values(column: &Column) -> Result<Vec<f64>> {
    Ok(numeric_values(column)?.into_iter().flatten().collect())
}

/// Values rendered as strings (datetimes as ISO-8601), nulls as `None`.
pub fn text_values(column: &Column) -> Result<Vec<Option<String>>> {
    let series = column.as_materialized_series();
    if let DataType::Datetime(unit, _) = series.dtype() {
        let unit = *unit;
        let raw = series.cast(&DataType::Int64)?;
        return Ok(raw
            .i64()?
            .into_iter()
            .map(|v| v.and_then(|t| format_timestamp(t, unit)))
            .collect());
    }
    if ColumnKind::of(column) == ColumnKind::Float {
        return Ok(numeric_values(column)?
            .into_iter()
            .map(|v| v.map(|x| x.to_string()))
            .collect());
    }
    let casted = series
        .cast(&DataType::String)
        .with_context(|| format!("Column '{}' cannot be rendered as text", column.name()))?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect())
}

/// Nulls plus NaN for float columns.
pub fn missing_count(column: &Column) -> Result<usize> {
    if ColumnKind::of(column) == ColumnKind::Float {
        Ok(numeric_values(column)?.iter().filter(|v| v.is_none()).count())
    } else {
        Ok(column.null_count())
    }
}

/// Datetime values as milliseconds since the Unix epoch.
pub fn timestamp_millis(column: &Column) -> Result<Vec<Option<i64>>> {
    let series = column
        .as_materialized_series()
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    let raw = series.cast(&DataType::Int64)?;
    Ok(raw.i64()?.into_iter().collect())
}

pub fn format_timestamp(value: i64, unit: TimeUnit) -> Option<String> {
    let dt = match unit {
        TimeUnit::Milliseconds => chrono::DateTime::from_timestamp_millis(value),
        TimeUnit::Microseconds => chrono::DateTime::from_timestamp_micros(value),
        TimeUnit::Nanoseconds => Some(chrono::DateTime::from_timestamp_nanos(value)),
    }?;
    Some(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
}

/// Builds a millisecond datetime series from epoch values.
pub fn datetime_series(name: &str, millis: Vec<Option<i64>>) -> PolarsResult<Series> {
    Series::new(name.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, clippy::indexing_slicing)]
    use super::*;

    #[test]
    fn test_kind_from_dtype() {
        assert_eq!(ColumnKind::from_dtype(&DataType::Int32), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_dtype(&DataType::Float32), ColumnKind::Float);
        assert_eq!(ColumnKind::from_dtype(&DataType::Boolean), ColumnKind::Boolean);
        assert_eq!(ColumnKind::from_dtype(&DataType::String), ColumnKind::Text);
        assert_eq!(
            ColumnKind::from_dtype(&DataType::Datetime(TimeUnit::Milliseconds, None)),
            ColumnKind::Datetime
        );
    }

    #[test]
    fn test_kind_aliases_deserialize() {
        let kind: ColumnKind = serde_json::from_str("\"int\"").unwrap();
        assert_eq!(kind, ColumnKind::Integer);
        let kind: ColumnKind = serde_json::from_str("\"categorical\"").unwrap();
        assert_eq!(kind, ColumnKind::Text);
        assert_eq!(serde_json::to_string(&ColumnKind::Float).unwrap(), "\"float\"");
    }

    #[test]
    fn test_nan_counts_as_missing() -> anyhow::Result<()> {
        let s = Series::new("x".into(), vec![Some(1.0), None, Some(f64::NAN), Some(4.0)]);
        let col = Column::from(s);
        assert_eq!(missing_count(&col)?, 2);
        assert_eq!(present_numeric_values(&col)?, vec![1.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_datetime_text_roundtrip() -> anyhow::Result<()> {
        let s = datetime_series("ts", vec![Some(86_400_000), None])?;
        let values = text_values(&Column::from(s))?;
        assert_eq!(values[0].as_deref(), Some("1970-01-02T00:00:00.000"));
        assert!(values[1].is_none());
        Ok(())
    }
}
