//! Column type inference and value parsers shared with validation and advice.
//!
//! Text columns are coerced in priority order: integer, float, boolean,
//! datetime (a single ISO-8601 layout across every value), then text.

use crate::table::datetime_series;
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, warn};

const NULL_TOKENS: &[&str] = &["", "na", "n/a", "#n/a", "nan", "null", "none", "-"];

/// ISO-8601 layouts accepted for typed datetime columns.
const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d"];

/// Common non-ISO layouts recognised when advising standardisation.
const LOOSE_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const LOOSE_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

pub fn is_null_token(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    NULL_TOKENS.contains(&lowered.as_str())
}

pub fn parse_int(value: &str) -> Option<i64> {
    let v = value.trim();
    v.strip_prefix('+').unwrap_or(v).parse::<i64>().ok()
}

pub fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    DateTime(&'static str),
    Date(&'static str),
}

impl Layout {
    fn parse(self, value: &str) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(fmt) => NaiveDateTime::parse_from_str(value, fmt).ok(),
            Self::Date(fmt) => NaiveDate::parse_from_str(value, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        }
    }
}

fn iso_layouts() -> impl Iterator<Item = Layout> {
    ISO_DATETIME_FORMATS
        .iter()
        .copied()
        .map(Layout::DateTime)
        .chain(ISO_DATE_FORMATS.iter().copied().map(Layout::Date))
}

fn loose_layouts() -> impl Iterator<Item = Layout> {
    LOOSE_DATETIME_FORMATS
        .iter()
        .copied()
        .map(Layout::DateTime)
        .chain(LOOSE_DATE_FORMATS.iter().copied().map(Layout::Date))
}

/// Parses an ISO-8601 timestamp or date.
pub fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let v = value.trim();
    iso_layouts().find_map(|layout| layout.parse(v))
}

/// Parses a date in any recognised layout, ISO or not.
pub fn parse_any_datetime(value: &str) -> Option<NaiveDateTime> {
    let v = value.trim();
    parse_iso_datetime(v).or_else(|| loose_layouts().find_map(|layout| layout.parse(v)))
}

/// The single ISO layout every value parses with, if there is one.
fn consistent_iso_layout(values: &[&str]) -> Option<Layout> {
    let first = values.first()?;
    iso_layouts()
        .filter(|layout| layout.parse(first).is_some())
        .find(|layout| values.iter().all(|v| layout.parse(v).is_some()))
}

/// Converts raw text cells into the narrowest typed series.
pub fn infer_text_series(name: &str, raw: Vec<Option<String>>) -> Result<Series> {
    let cleaned: Vec<Option<String>> = raw
        .into_iter()
        .map(|v| {
            v.map(|s| s.trim().to_owned())
                .filter(|s| !is_null_token(s))
        })
        .collect();
    let present: Vec<&str> = cleaned.iter().flatten().map(String::as_str).collect();

    if present.is_empty() {
        return Ok(Series::new(name.into(), cleaned));
    }

    if present.iter().all(|v| parse_int(v).is_some()) {
        let values: Vec<Option<i64>> = cleaned
            .iter()
            .map(|v| v.as_deref().and_then(parse_int))
            .collect();
        return Ok(Series::new(name.into(), values));
    }

    if present.iter().all(|v| parse_float(v).is_some()) {
        let values: Vec<Option<f64>> = cleaned
            .iter()
            .map(|v| v.as_deref().and_then(parse_float))
            .collect();
        return Ok(Series::new(name.into(), values));
    }

    if present.iter().all(|v| parse_bool(v).is_some()) {
        let values: Vec<Option<bool>> = cleaned
            .iter()
            .map(|v| v.as_deref().and_then(parse_bool))
            .collect();
        return Ok(Series::new(name.into(), values));
    }

    if let Some(layout) = consistent_iso_layout(&present) {
        debug!(column = name, ?layout, "Inferred datetime column");
        let millis: Vec<Option<i64>> = cleaned
            .iter()
            .map(|v| {
                v.as_deref()
                    .and_then(|s| layout.parse(s))
                    .map(|dt| dt.and_utc().timestamp_millis())
            })
            .collect();
        return Ok(datetime_series(name, millis)?);
    }

    Ok(Series::new(name.into(), cleaned))
}

/// Normalises every column to one of the five semantic dtypes.
///
/// Text columns go through [`infer_text_series`]; numeric widths are widened
/// to 64 bits; dates become millisecond datetimes. Columns that cannot be
/// represented as text (nested types) are dropped with a warning.
pub fn infer_column_types(df: DataFrame) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let name = column.name().to_string();
        let series = column.as_materialized_series();
        let typed = match series.dtype() {
            DataType::Boolean | DataType::Int64 | DataType::Float64 => series.clone(),
            DataType::Datetime(TimeUnit::Milliseconds, None) => series.clone(),
            dt if dt.is_integer() => series.cast(&DataType::Int64)?,
            dt if dt.is_float() => series.cast(&DataType::Float64)?,
            DataType::Date | DataType::Datetime(_, _) => {
                series.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            }
            _ => match series.cast(&DataType::String) {
                Ok(text) => {
                    let raw: Vec<Option<String>> = text
                        .str()?
                        .into_iter()
                        .map(|v| v.map(str::to_owned))
                        .collect();
                    infer_text_series(&name, raw)?
                }
                Err(e) => {
                    warn!(column = %name, error = %e, "Dropping column with unsupported type");
                    continue;
                }
            },
        };
        columns.push(Column::from(typed));
    }

    Ok(DataFrame::new(columns)?)
}
