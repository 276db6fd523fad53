//! Sample statistics over present (non-missing) values.

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Linear-interpolated quantile of already sorted values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b) = (sorted.get(lo)?, sorted.get(hi)?);
    Some(a + (b - a) * (pos - lo as f64))
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile_sorted(&sorted(values), 0.5)
}

/// Sum of squared, cubed and fourth-power deviations from the mean.
fn central_sums(values: &[f64], mean: f64) -> (f64, f64, f64) {
    values.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), &x| {
        let d = x - mean;
        let d2 = d * d;
        (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
    })
}

/// Standard deviation with Bessel's correction (n - 1).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let (m2, _, _) = central_sums(values, m);
    Some((m2 / (n - 1) as f64).sqrt())
}

/// Adjusted Fisher-Pearson skewness (G1). Needs three values and non-zero spread.
pub fn sample_skewness(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let m = mean(values)?;
    let (m2, m3, _) = central_sums(values, m);
    let var = m2 / nf;
    if var <= f64::EPSILON * m.abs().max(1.0) {
        return None;
    }
    let g1 = (m3 / nf) / var.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}

/// Bias-corrected excess kurtosis (G2). Needs four values and non-zero spread.
pub fn sample_excess_kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let nf = n as f64;
    let m = mean(values)?;
    let (m2, _, m4) = central_sums(values, m);
    let var = m2 / nf;
    if var <= f64::EPSILON * m.abs().max(1.0) {
        return None;
    }
    let g2 = (m4 / nf) / (var * var) - 3.0;
    Some(((nf + 1.0) * g2 + 6.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0)))
}

/// Histogram with Freedman-Diaconis bin width, clamped to 5..=50 bins.
///
/// Pearson correlation over the rows where both values are present.
/// `None` with fewer than two such rows or when either side is constant.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((sxy / denom).clamp(-1.0, 1.0))
}

/// Returns `(bin_start, count)` pairs and the bin width. A constant column
/// yields a single bin, as does one whose range overflows `f64`.
pub fn histogram(values: &[f64]) -> (f64, Vec<(f64, usize)>) {
    let sorted = sorted(values);
    let (Some(&min_v), Some(&max_v)) = (sorted.first(), sorted.last()) else {
        return (0.0, Vec::new());
    };
    let range = max_v - min_v;
    if range.abs() < f64::EPSILON {
        return (1.0, vec![(min_v, sorted.len())]);
    }
    if !range.is_finite() {
        return (range, vec![(min_v, sorted.len())]);
    }

    let n = sorted.len() as f64;
    let q1 = quantile_sorted(&sorted, 0.25).unwrap_or(min_v);
    let q3 = quantile_sorted(&sorted, 0.75).unwrap_or(max_v);
    let iqr = q3 - q1;
    let h = if iqr > 0.0 {
        2.0 * iqr / n.cbrt()
    } else {
        range / n.sqrt()
    };
    let raw_bins = (range / h).ceil();
    if !raw_bins.is_finite() {
        return (range, vec![(min_v, sorted.len())]);
    }

    let num_bins = raw_bins.clamp(5.0, 50.0) as usize;
    let bin_width = range / num_bins as f64;
    let mut bins = vec![0usize; num_bins];
    for &val in &sorted {
        let idx = (((val - min_v) / bin_width).floor() as usize).min(num_bins - 1);
        if let Some(bin) = bins.get_mut(idx) {
            *bin += 1;
        }
    }

    let histogram = bins
        .into_iter()
        .enumerate()
        .map(|(i, count)| (min_v + i as f64 * bin_width, count))
        .collect();
    (bin_width, histogram)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_sample_std_uses_n_minus_one() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // population std is 2.0; sample std is sqrt(32/7)
        assert!(close(sample_std(&v).unwrap(), (32.0f64 / 7.0).sqrt()));
        assert!(sample_std(&[1.0]).is_none());
    }

    #[test]
    fn test_skewness_matches_reference() {
        let v = [1.0, 2.0, 3.0, 4.0, 10.0];
        let g1 = sample_skewness(&v).unwrap();
        assert!((g1 - 1.697_056).abs() < 1e-3, "got {g1}");
        assert!(sample_skewness(&[1.0, 2.0]).is_none());
        assert!(sample_skewness(&[3.0, 3.0, 3.0]).is_none());
    }

    #[test]
    fn test_kurtosis_requires_four_values() {
        assert!(sample_excess_kurtosis(&[1.0, 2.0, 3.0]).is_none());
        let k = sample_excess_kurtosis(&[1.0, 2.0, 3.0, 4.0, 10.0]).unwrap();
        assert!((k - 3.152).abs() < 1e-3, "got {k}");
    }

    #[test]
    fn test_median_and_quantiles() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        let s = sorted(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(quantile_sorted(&s, 0.25), Some(2.0));
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let v: Vec<f64> = (0..200).map(f64::from).collect();
        let (width, bins) = histogram(&v);
        assert!(width > 0.0);
        assert!((5..=50).contains(&bins.len()));
        assert_eq!(bins.iter().map(|(_, c)| c).sum::<usize>(), 200);

        let (_, constant) = histogram(&[7.0, 7.0, 7.0]);
        assert_eq!(constant, vec![(7.0, 3)]);
    }

    #[test]
    fn test_pearson_uses_complete_pairs() {
        let x = [Some(1.0), Some(2.0), Some(3.0), None, Some(4.0)];
        let y = [Some(2.0), Some(4.0), Some(6.0), Some(100.0), Some(8.0)];
        assert!(close(pearson(&x, &y).unwrap(), 1.0));

        let inverse = [Some(4.0), Some(3.0), Some(2.0), None, Some(1.0)];
        assert!(close(pearson(&x, &inverse).unwrap(), -1.0));

        let constant = [Some(5.0); 5];
        assert_eq!(pearson(&x, &constant), None);
        assert_eq!(pearson(&[Some(1.0)], &[Some(2.0)]), None);
    }

    #[test]
    fn test_histogram_overflowing_range_is_single_bin() {
        let (width, bins) = histogram(&[-1e308, -1e308, 1e308, 1e308]);
        assert!(width.is_infinite());
        assert_eq!(bins, vec![(-1e308, 4)]);
    }
}
