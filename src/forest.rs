//! Seeded regression tree ensemble backing the forecaster.
//!
//! Trees are grown on bootstrap samples with variance-reduction midpoint
//! splits; the ensemble prediction is the average of the per-tree leaf
//! means. Growth is fully deterministic for a given seed.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Ensemble configuration.
#[derive(Debug, Clone)]
pub struct ForestConfig {
    /// Number of trees in the forest.
    pub n_trees: usize,
    /// Maximum depth of each tree.
    pub max_depth: usize,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split.
    pub min_samples_leaf: usize,
    /// Features considered per split (None = all).
    pub max_features: Option<usize>,
    /// Draw a bootstrap sample per tree instead of the full set.
    pub bootstrap: bool,
    /// Seed; tree `i` derives its RNG from `seed.wrapping_add(i)`.
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Node-impurity floor under which a node becomes a leaf.
const MIN_IMPURITY: f64 = 1e-10;

enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    fn grow(
        features: &[Vec<f64>],
        labels: &[f64],
        indices: &[usize],
        config: &ForestConfig,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        Self {
            root: build_node(features, labels, indices, 0, config, rng),
        }
    }

    fn predict_one(&self, features: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn build_node(
    features: &[Vec<f64>],
    labels: &[f64],
    indices: &[usize],
    depth: usize,
    config: &ForestConfig,
    rng: &mut ChaCha8Rng,
) -> Node {
    let node_labels: Vec<f64> = indices.iter().map(|&i| labels[i]).collect();
    let impurity = variance(&node_labels);

    if depth >= config.max_depth
        || indices.len() < config.min_samples_split
        || impurity < MIN_IMPURITY
    {
        return Node::Leaf {
            value: mean(&node_labels),
        };
    }

    match best_split(features, labels, indices, impurity, config, rng) {
        Some(split)
            if split.left.len() >= config.min_samples_leaf
                && split.right.len() >= config.min_samples_leaf =>
        {
            let left = build_node(features, labels, &split.left, depth + 1, config, rng);
            let right = build_node(features, labels, &split.right, depth + 1, config, rng);
            Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        _ => Node::Leaf {
            value: mean(&node_labels),
        },
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Best variance-reduction split over a (possibly subsampled) feature set,
/// trying the midpoints between consecutive distinct values as thresholds.
fn best_split(
    features: &[Vec<f64>],
    labels: &[f64],
    indices: &[usize],
    parent_impurity: f64,
    config: &ForestConfig,
    rng: &mut ChaCha8Rng,
) -> Option<SplitCandidate> {
    let n_features = features.first().map(Vec::len).unwrap_or(0);
    let mut considered: Vec<usize> = (0..n_features).collect();
    considered.shuffle(rng);
    if let Some(max_features) = config.max_features {
        considered.truncate(max_features.max(1));
    }

    let mut best_gain = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for &feature in &considered {
        let mut values: Vec<f64> = indices.iter().map(|&i| features[i][feature]).collect();
        values.sort_by(f64::total_cmp);
        values.dedup();

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .copied()
                .partition(|&i| features[i][feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }

            let left_labels: Vec<f64> = left.iter().map(|&i| labels[i]).collect();
            let right_labels: Vec<f64> = right.iter().map(|&i| labels[i]).collect();
            let weighted = (left.len() as f64 * variance(&left_labels)
                + right.len() as f64 * variance(&right_labels))
                / indices.len() as f64;

            let gain = parent_impurity - weighted;
            if gain > best_gain {
                best_gain = gain;
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    left,
                    right,
                });
            }
        }
    }

    best
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let center = mean(values);
    values.iter().map(|v| (v - center).powi(2)).sum::<f64>() / values.len() as f64
}

/// Regression forest: averaged bootstrap trees.
pub struct RegressionForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
}

impl RegressionForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    /// Fit the ensemble from scratch, discarding any previous trees.
    /// `features` and `labels` must have equal length.
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[f64]) {
        self.trees.clear();
        let n = features.len().min(labels.len());
        if n == 0 {
            return;
        }

        for i in 0..self.config.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
            let indices: Vec<usize> = if self.config.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            self.trees
                .push(RegressionTree::grow(features, labels, &indices, &self.config, &mut rng));
        }
    }

    /// Average of the per-tree predictions; 0.0 before any fit.
    pub fn predict_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
        total / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
