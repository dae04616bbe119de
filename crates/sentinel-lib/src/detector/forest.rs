//! Isolation forest outlier estimator
//!
//! Rows that can be isolated with few random axis-aligned cuts get short
//! average path lengths and therefore high anomaly scores. The decision
//! offset is fitted so that roughly `contamination` of the training rows
//! fall on the anomalous side.

use crate::models::NUM_FEATURES;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Sub-sample size cap per tree
pub const MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_9;

pub type Row = [f64; NUM_FEATURES];

/// Estimator hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Expected fraction of anomalous training rows
    pub contamination: f64,
    /// RNG seed
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree stored as a flat node arena, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(rows: &[Row], indices: Vec<usize>, height_limit: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.build(rows, indices, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        rows: &[Row],
        indices: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });

        if depth >= height_limit || indices.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can separate rows
        let candidates: Vec<(usize, f64, f64)> = (0..NUM_FEATURES)
            .filter_map(|feature| {
                let (min, max) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(rows[i][feature]), hi.max(rows[i][feature])),
                );
                (min < max).then_some((feature, min, max))
            })
            .collect();

        if candidates.is_empty() {
            return id;
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(min..max);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| rows[i][feature] <= threshold);

        let left = self.build(rows, left_idx, depth + 1, height_limit, rng);
        let right = self.build(rows, right_idx, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, row: &Row) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }
}

/// Fitted isolation forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sub_sample_size: usize,
    /// Scores below this value are anomalous
    offset: f64,
}

impl IsolationForest {
    /// Fit a forest on the given rows
    pub fn fit(rows: &[Row], params: &ForestParams) -> Result<Self, String> {
        if rows.is_empty() {
            return Err("cannot fit on an empty sample".to_string());
        }
        if params.n_estimators == 0 {
            return Err("n_estimators must be positive".to_string());
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(format!(
                "contamination must be in (0, 0.5], got {}",
                params.contamination
            ));
        }
        if let Some(i) = rows.iter().position(|r| r.iter().any(|v| !v.is_finite())) {
            return Err(format!("non-finite feature value in row {}", i));
        }

        let sub_sample_size = rows.len().min(MAX_SAMPLES);
        let height_limit = (sub_sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let indices = sample(&mut rng, rows.len(), sub_sample_size).into_vec();
                IsolationTree::grow(rows, indices, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sub_sample_size,
            offset: 0.0,
        };

        let scores = forest.score_samples(rows);
        forest.offset = percentile(&scores, params.contamination * 100.0);
        Ok(forest)
    }

    /// Anomaly score per row, in (-1, 0]; lower is more anomalous
    pub fn score_samples(&self, rows: &[Row]) -> Vec<f64> {
        let normaliser = average_path_length(self.sub_sample_size);
        rows.iter()
            .map(|row| {
                let mean_path = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(row))
                    .sum::<f64>()
                    / self.trees.len() as f64;
                if normaliser > 0.0 {
                    -(2f64.powf(-mean_path / normaliser))
                } else {
                    -1.0
                }
            })
            .collect()
    }

    /// Signed distance to the decision offset; negative means anomalous
    pub fn decision_function(&self, rows: &[Row]) -> Vec<f64> {
        self.score_samples(rows)
            .into_iter()
            .map(|s| s - self.offset)
            .collect()
    }

    /// True for each anomalous row
    pub fn predict(&self, rows: &[Row]) -> Vec<bool> {
        self.decision_function(rows)
            .into_iter()
            .map(|d| d < 0.0)
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in [0, 100]
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
