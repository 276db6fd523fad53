//! Duplicate row removal with light text normalisation.

use super::{CleaningAction, CleaningReport, CleaningStage, params};
use crate::error::PipelineError;
use crate::table::{ColumnKind, text_values};
use anyhow::Result;
use polars::prelude::*;
use std::collections::HashSet;

/// Trims, collapses inner whitespace and lowercases.
pub fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Per-row comparison keys; text cells are normalised, other cells compared exactly.
pub fn row_keys(df: &DataFrame) -> Result<Vec<Vec<Option<String>>>> {
    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let values = text_values(column)?;
        let values = if ColumnKind::of(column) == ColumnKind::Text {
            values
                .into_iter()
                .map(|v| v.map(|s| normalize_text(&s)))
                .collect()
        } else {
            values
        };
        columns.push(values);
    }

    Ok((0..df.height())
        .map(|row| {
            columns
                .iter()
                .map(|col| col.get(row).cloned().flatten())
                .collect()
        })
        .collect())
}

/// Keeps the first row of every group of normalised duplicates.
pub fn keep_first_mask(df: &DataFrame) -> Result<Vec<bool>> {
    let keys = row_keys(df)?;
    let mut seen = HashSet::with_capacity(keys.len());
    Ok(keys.into_iter().map(|key| seen.insert(key)).collect())
}

pub struct DuplicateRemoval;

impl CleaningStage for DuplicateRemoval {
    fn name(&self) -> &'static str {
        "duplicates"
    }

    fn apply(&self, df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), PipelineError> {
        let mask = keep_first_mask(df).map_err(|e| PipelineError::cleaning(&e))?;
        let removed = mask.iter().filter(|keep| !**keep).count();
        if removed == 0 {
            return Ok(());
        }

        let mask = BooleanChunked::from_slice("keep".into(), &mask);
        *df = df.filter(&mask)?;
        report.record(CleaningAction {
            stage: self.name().to_owned(),
            columns: df
                .get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect(),
            technique: "drop_duplicates".to_owned(),
            parameters: params([
                ("keep", "first".into()),
                ("normalize_text", true.into()),
            ]),
            rows_affected: removed,
        });
        Ok(())
    }
}
