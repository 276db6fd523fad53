//! Nearest-neighbour imputation over numeric columns.
//!
//! Feature columns are z-scored first so no column dominates by scale alone.
//! Distances use the NaN-Euclidean metric: coordinates missing in either row
//! are ignored and the squared sum is scaled up by the share of coordinates
//! that were usable.

use crate::profiling::stats;

/// Distance between two rows over the coordinates both have.
///
/// `None` when the rows share no present coordinate.
pub fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let total = a.len().min(b.len());
    if total == 0 {
        return None;
    }
    let (sum, shared) = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some((*x)? - (*y)?))
        .fold((0.0, 0usize), |(s, n), d| (s + d * d, n + 1));
    if shared == 0 {
        return None;
    }
    Some((sum * total as f64 / shared as f64).sqrt())
}

/// Column rescaled to zero mean and unit sample deviation. A constant column
/// maps every present value to 0.
pub fn z_scores(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let mean = stats::mean(&present).unwrap_or(0.0);
    let std = stats::sample_std(&present).filter(|s| *s > 0.0);
    values
        .iter()
        .map(|v| v.map(|x| std.map_or(0.0, |s| (x - mean) / s)))
        .collect()
}

/// Fills the missing cells of `columns[target]` with the mean of the `k`
/// nearest donor rows, measured on the other columns.
///
/// A donor is a row where the target is present and at least one other
/// coordinate is shared. Cells with no donor stay `None`.
pub fn knn_impute(columns: &[Vec<Option<f64>>], target: usize, k: usize) -> Vec<Option<f64>> {
    let Some(target_values) = columns.get(target) else {
        return Vec::new();
    };
    let rows = target_values.len();
    let scaled: Vec<Vec<Option<f64>>> = columns
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != target)
        .map(|(_, col)| z_scores(col))
        .collect();
    let features: Vec<Vec<Option<f64>>> = (0..rows)
        .map(|row| {
            scaled
                .iter()
                .map(|col| col.get(row).copied().flatten())
                .collect()
        })
        .collect();

    let donors: Vec<(usize, f64)> = target_values
        .iter()
        .enumerate()
        .filter_map(|(row, v)| v.map(|v| (row, v)))
        .collect();

    let k = k.max(1);
    target_values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            if value.is_some() {
                return *value;
            }
            let own = features.get(row)?;
            let mut nearest: Vec<(f64, f64)> = donors
                .iter()
                .filter_map(|&(donor, donor_value)| {
                    let dist = nan_euclidean(own, features.get(donor)?)?;
                    Some((dist, donor_value))
                })
                .collect();
            if nearest.is_empty() {
                return None;
            }
            nearest.sort_by(|a, b| a.0.total_cmp(&b.0));
            nearest.truncate(k);
            Some(nearest.iter().map(|(_, v)| v).sum::<f64>() / nearest.len() as f64)
        })
        .collect()
}
