//! Round-robin regression imputation.
//!
//! Missing cells start at the column median. Each round regresses every
//! incomplete column on all other columns (ordinary least squares over the
//! rows where the column was observed) and replaces its missing cells with the
//! predictions. Rounds stop when the largest change to an imputed cell falls
//! below `tol` times the largest observed magnitude, or after `max_iter`.

use crate::profiling::stats;
use anyhow::{Result, anyhow, bail};
use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IterativeConfig {
    /// Makes `auto` resolve to iterative imputation.
    pub enabled: bool,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_iter: 10,
            tol: 1e-3,
        }
    }
}

#[derive(Debug)]
pub struct IterativeOutcome {
    pub columns: Vec<Vec<f64>>,
    pub iterations: usize,
    pub converged: bool,
}

/// Imputes every missing cell of `columns` (all of equal length).
///
/// # Errors
///
/// Fails when fewer than two columns are given, a column has no observed
/// value, or the columns differ in length.
pub fn iterative_impute(
    columns: &[Vec<Option<f64>>],
    config: &IterativeConfig,
) -> Result<IterativeOutcome> {
    if columns.len() < 2 {
        bail!("iterative imputation needs at least two numeric columns");
    }
    let rows = columns.first().map_or(0, Vec::len);
    if columns.iter().any(|c| c.len() != rows) {
        bail!("columns differ in length");
    }

    let mut filled: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    let mut scale = 0.0f64;
    for (idx, column) in columns.iter().enumerate() {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        let Some(median) = stats::median(&present) else {
            bail!("column {idx} has no observed values");
        };
        scale = present.iter().fold(scale, |m, v| m.max(v.abs()));
        filled.push(column.iter().map(|v| v.unwrap_or(median)).collect());
    }

    let threshold = config.tol * scale.max(f64::EPSILON);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;
        let mut max_change = 0.0f64;

        for (target, column) in columns.iter().enumerate() {
            if column.iter().all(Option::is_some) {
                continue;
            }
            let updates = match predict_missing(&filled, column, target) {
                Ok(updates) => updates,
                Err(e) => {
                    debug!(column = target, error = %e, "Keeping previous fill for column");
                    continue;
                }
            };
            if let Some(cells) = filled.get_mut(target) {
                for (row, prediction) in updates {
                    if let Some(cell) = cells.get_mut(row) {
                        max_change = max_change.max((prediction - *cell).abs());
                        *cell = prediction;
                    }
                }
            }
        }

        if max_change < threshold {
            converged = true;
            break;
        }
    }

    Ok(IterativeOutcome {
        columns: filled,
        iterations,
        converged,
    })
}

/// Feature matrix of `rows` built from every column except `target`.
fn feature_matrix(filled: &[Vec<f64>], target: usize, rows: &[usize]) -> Result<Array2<f64>> {
    let predictors: Vec<&Vec<f64>> = filled
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != target)
        .map(|(_, c)| c)
        .collect();
    let flat: Vec<f64> = rows
        .iter()
        .flat_map(|&row| {
            predictors
                .iter()
                .map(move |c| c.get(row).copied().unwrap_or(0.0))
        })
        .collect();
    Ok(Array2::from_shape_vec((rows.len(), predictors.len()), flat)?)
}

/// Fits `y` on `x` by least squares.
fn fit_linear(x: Array2<f64>, y: Array1<f64>) -> Result<FittedLinearRegression<f64>> {
    let dataset = Dataset::new(x, y);
    LinearRegression::default()
        .fit(&dataset)
        .map_err(|e| anyhow!("Linear regression failed: {e}"))
}

/// Fits `target` on the other columns and predicts its missing rows.
/// Non-finite predictions are dropped so the previous fill stays.
fn predict_missing(
    filled: &[Vec<f64>],
    column: &[Option<f64>],
    target: usize,
) -> Result<Vec<(usize, f64)>> {
    let (observed, y): (Vec<usize>, Vec<f64>) = column
        .iter()
        .enumerate()
        .filter_map(|(row, v)| v.map(|v| (row, v)))
        .unzip();
    let missing: Vec<usize> = column
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_none())
        .map(|(row, _)| row)
        .collect();
    if observed.is_empty() || missing.is_empty() {
        return Ok(Vec::new());
    }

    let model = fit_linear(feature_matrix(filled, target, &observed)?, Array1::from(y))?;
    let predictions = model.predict(&feature_matrix(filled, target, &missing)?);

    Ok(missing
        .into_iter()
        .zip(predictions.iter().copied())
        .filter(|(_, p)| p.is_finite())
        .collect())
}
