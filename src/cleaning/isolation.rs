//! Univariate isolation forest.
//!
//! Trees split on a uniformly random threshold between the current minimum and
//! maximum until a point is isolated or the height limit is reached. Anomalies
//! isolate early, so a short average path means a high score.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng as _, SeedableRng as _};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IsolationConfig {
    pub trees: usize,
    pub subsample: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            subsample: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

enum Node {
    Leaf { size: usize },
    Split { threshold: f64, left: Box<Node>, right: Box<Node> },
}

/// Average path length of an unsuccessful search in a binary search tree of `n` points.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build(values: &mut [f64], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    let size = values.len();
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if depth >= limit || size <= 1 || max - min <= f64::EPSILON {
        return Node::Leaf { size };
    }

    let threshold = rng.gen_range(min..max);
    values.sort_by(f64::total_cmp);
    let split = values.partition_point(|v| *v < threshold);
    let (left, right) = values.split_at_mut(split);
    Node::Split {
        threshold,
        left: Box::new(build(left, depth + 1, limit, rng)),
        right: Box::new(build(right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, value: f64, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path(*size),
        Node::Split { threshold, left, right } => {
            if value < *threshold {
                path_length(left, value, depth + 1)
            } else {
                path_length(right, value, depth + 1)
            }
        }
    }
}

/// Anomaly scores in `(0, 1]`; higher is more anomalous.
pub fn anomaly_scores(values: &[f64], config: &IsolationConfig) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let psi = config.subsample.clamp(2, n);
    let limit = (psi as f64).log2().ceil() as usize;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let trees: Vec<Node> = (0..config.trees.max(1))
        .map(|_| {
            let mut subset: Vec<f64> = sample(&mut rng, n, psi)
                .into_iter()
                .filter_map(|i| values.get(i).copied())
                .collect();
            build(&mut subset, 0, limit, &mut rng)
        })
        .collect();

    let norm = average_path(psi);
    values
        .iter()
        .map(|v| {
            let mean_path =
                trees.iter().map(|t| path_length(t, *v, 0)).sum::<f64>() / trees.len() as f64;
            2f64.powf(-mean_path / norm)
        })
        .collect()
}

/// Flags the `contamination` share of values with the highest scores.
pub fn detect(values: &[f64], config: &IsolationConfig) -> Vec<bool> {
    let scores = anomaly_scores(values, config);
    let flagged = ((values.len() as f64) * config.contamination.clamp(0.0, 0.5)).round() as usize;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| {
        let sa = scores.get(*a).copied().unwrap_or(0.0);
        let sb = scores.get(*b).copied().unwrap_or(0.0);
        sb.total_cmp(&sa)
    });

    let mut flags = vec![false; values.len()];
    for idx in order.into_iter().take(flagged) {
        if let Some(flag) = flags.get_mut(idx) {
            *flag = true;
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    #![expect(clippy::indexing_slicing)]
    use super::*;

    #[test]
    fn test_extreme_value_is_flagged() {
        let mut values: Vec<f64> = (0..99).map(|i| 50.0 + f64::from(i % 10)).collect();
        values.push(10_000.0);
        let config = IsolationConfig {
            contamination: 0.01,
            ..IsolationConfig::default()
        };
        let flags = detect(&values, &config);
        assert!(flags[99]);
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn test_scores_are_deterministic() {
        let values: Vec<f64> = (0..300).map(|i| f64::from(i * i % 97)).collect();
        let config = IsolationConfig::default();
        assert_eq!(anomaly_scores(&values, &config), anomaly_scores(&values, &config));
    }

    #[test]
    fn test_average_path() {
        assert_eq!(average_path(1), 0.0);
        assert_eq!(average_path(2), 1.0);
        assert!(average_path(256) > 9.0);
    }
}
