//! Range and calendar distribution of datetime columns.

use crate::table::{format_timestamp, timestamp_millis};
use anyhow::Result;
use chrono::{DateTime, Datelike as _, Timelike as _};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemporalDistribution {
    pub year: BTreeMap<i32, usize>,
    pub month: BTreeMap<u32, usize>,
    /// Monday is 0.
    pub weekday: BTreeMap<u32, usize>,
    pub hour: BTreeMap<u32, usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DatetimeSummary {
    pub count: usize,
    pub min: String,
    pub max: String,
    pub range_days: i64,
    pub distribution: TemporalDistribution,
    pub percent_missing: f64,
}

/// Summary of a datetime column, `None` when it holds no values.
///
/// # Errors
///
/// Fails when the column cannot be cast to a millisecond datetime.
pub fn summarize_datetime(column: &Column, percent_missing: f64) -> Result<Option<DatetimeSummary>> {
    let millis: Vec<i64> = timestamp_millis(column)?.into_iter().flatten().collect();
    let (Some(&min), Some(&max)) = (millis.iter().min(), millis.iter().max()) else {
        return Ok(None);
    };

    let mut distribution = TemporalDistribution::default();
    for dt in millis.iter().filter_map(|ms| DateTime::from_timestamp_millis(*ms)) {
        *distribution.year.entry(dt.year()).or_default() += 1;
        *distribution.month.entry(dt.month()).or_default() += 1;
        *distribution
            .weekday
            .entry(dt.weekday().num_days_from_monday())
            .or_default() += 1;
        *distribution.hour.entry(dt.hour()).or_default() += 1;
    }

    Ok(Some(DatetimeSummary {
        count: millis.len(),
        min: format_timestamp(min, TimeUnit::Milliseconds).unwrap_or_default(),
        max: format_timestamp(max, TimeUnit::Milliseconds).unwrap_or_default(),
        range_days: (max - min) / MILLIS_PER_DAY,
        distribution,
        percent_missing,
    }))
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::table::datetime_series;

    #[test]
    fn test_range_and_distribution() -> Result<()> {
        // 2024-01-01T00:00 (Monday), 2024-03-01T12:00 (Friday), missing.
        let series = datetime_series(
            "ts",
            vec![Some(1_704_067_200_000), Some(1_709_294_400_000), None],
        )?;
        let summary = summarize_datetime(&series.into(), 33.3)?.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.min, "2024-01-01T00:00:00.000");
        assert_eq!(summary.max, "2024-03-01T12:00:00.000");
        assert_eq!(summary.range_days, 60);
        assert_eq!(summary.distribution.year.get(&2024), Some(&2));
        assert_eq!(summary.distribution.month.get(&3), Some(&1));
        assert_eq!(summary.distribution.weekday.get(&0), Some(&1));
        assert_eq!(summary.distribution.weekday.get(&4), Some(&1));
        assert_eq!(summary.distribution.hour.get(&12), Some(&1));
        Ok(())
    }

    #[test]
    fn test_all_missing_has_no_summary() -> Result<()> {
        let series = datetime_series("ts", vec![None, None])?;
        assert!(summarize_datetime(&series.into(), 100.0)?.is_none());
        Ok(())
    }
}
