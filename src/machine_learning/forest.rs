use crate::error::{DetectorError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Feature values closer than this are treated as equal when searching splits.
const FEATURE_THRESHOLD: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        proba: [f64; 2],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Unnormalized impurity decrease per feature.
    impurity_decrease: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    weighted_child_impurity: f64,
}

impl DecisionTree {
    /// Grows a Gini tree on `samples` (row indices, duplicates allowed) until
    /// every leaf is pure or no split separates the remaining rows.
    fn grow(
        x: &[Vec<f64>],
        y: &[u8],
        samples: Vec<usize>,
        max_features: usize,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map(|row| row.len()).unwrap_or(0);
        let mut nodes = vec![Node::Leaf { proba: [0.0; 2] }];
        let mut impurity_decrease = vec![0.0; n_features];
        let mut pending = vec![(0usize, samples)];

        while let Some((slot, samples)) = pending.pop() {
            let counts = class_counts(y, &samples);
            let n = samples.len() as f64;
            let impurity = gini(counts);

            let split = if impurity > 0.0 {
                best_split(x, y, &samples, counts, n_features, max_features, rng)
            } else {
                None
            };

            let Some(split) = split else {
                nodes[slot] = Node::Leaf {
                    proba: [counts[0] as f64 / n, counts[1] as f64 / n],
                };
                continue;
            };

            impurity_decrease[split.feature] += n * impurity - split.weighted_child_impurity;

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .partition(|&&i| x[i][split.feature] <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::Leaf { proba: [0.0; 2] });
            let right = nodes.len();
            nodes.push(Node::Leaf { proba: [0.0; 2] });
            nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            pending.push((right, right_samples));
            pending.push((left, left_samples));
        }

        Self {
            nodes,
            impurity_decrease,
        }
    }

    pub fn predict_proba(&self, row: &[f64]) -> [f64; 2] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    index = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Per-feature importance summing to 1, or `None` for a single-leaf tree.
    fn normalized_importance(&self) -> Option<Vec<f64>> {
        let total: f64 = self.impurity_decrease.iter().sum();
        if self.nodes.len() <= 1 || total <= 0.0 {
            return None;
        }
        Some(self.impurity_decrease.iter().map(|v| v / total).collect())
    }
}

fn class_counts(y: &[u8], samples: &[usize]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &i in samples {
        counts[y[i] as usize] += 1;
    }
    counts
}

fn gini(counts: [usize; 2]) -> f64 {
    let n = (counts[0] + counts[1]) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / n;
    let p1 = counts[1] as f64 / n;
    1.0 - p0 * p0 - p1 * p1
}

/// Visits features in random order. Constant features do not stop the
/// search: it ends once `max_features` have been visited and at least one of
/// them could be split.
fn best_split(
    x: &[Vec<f64>],
    y: &[u8],
    samples: &[usize],
    counts: [usize; 2],
    n_features: usize,
    max_features: usize,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);

    let n = samples.len();
    let mut best: Option<SplitCandidate> = None;
    let mut visited = 0;
    let mut found_splittable = false;
    let mut column: Vec<(f64, u8)> = Vec::with_capacity(n);

    for feature in features {
        if visited >= max_features && found_splittable {
            break;
        }
        visited += 1;

        column.clear();
        column.extend(samples.iter().map(|&i| (x[i][feature], y[i])));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        if column[n - 1].0 <= column[0].0 + FEATURE_THRESHOLD {
            continue;
        }
        found_splittable = true;

        let mut left = [0usize; 2];
        for pos in 1..n {
            left[column[pos - 1].1 as usize] += 1;
            if column[pos].0 <= column[pos - 1].0 + FEATURE_THRESHOLD {
                continue;
            }

            let right = [counts[0] - left[0], counts[1] - left[1]];
            let weighted = pos as f64 * gini(left) + (n - pos) as f64 * gini(right);

            if best
                .as_ref()
                .map_or(true, |b| weighted < b.weighted_child_impurity)
            {
                let (low, high) = (column[pos - 1].0, column[pos].0);
                let mut threshold = low / 2.0 + high / 2.0;
                if threshold == high || !threshold.is_finite() {
                    threshold = low;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    weighted_child_impurity: weighted,
                });
            }
        }
    }

    best
}

/// Bagged ensemble of Gini trees, each split drawing `sqrt(d)` candidate
/// features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_estimators: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
    importances: Option<Vec<f64>>,
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            n_features: 0,
            trees: Vec::new(),
            importances: None,
        }
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[u8], seed: u64) -> Result<()> {
        if x.is_empty() {
            return Err(DetectorError::InvalidInput(
                "cannot fit a forest on zero samples".to_string(),
            ));
        }
        if x.len() != y.len() {
            return Err(DetectorError::InvalidInput(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if y.iter().any(|&label| label > 1) {
            return Err(DetectorError::InvalidInput(
                "labels must be 0 or 1".to_string(),
            ));
        }

        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(DetectorError::InvalidInput(
                "feature rows have differing lengths".to_string(),
            ));
        }

        let n = x.len();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let mut master = StdRng::seed_from_u64(seed);

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(master.gen::<u64>());
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::grow(x, y, bootstrap, max_features, &mut rng)
            })
            .collect();

        let importances = average_importances(&trees, n_features);

        log::debug!(
            "Fitted {} trees on {} samples x {} features (importance {})",
            trees.len(),
            n,
            n_features,
            if importances.is_some() { "available" } else { "unavailable" }
        );

        self.n_features = n_features;
        self.trees = trees;
        self.importances = importances;
        Ok(())
    }

    /// Mean of the per-tree class probabilities.
    pub fn predict_proba(&self, row: &[f64]) -> [f64; 2] {
        if self.trees.is_empty() {
            return [0.5, 0.5];
        }
        let mut sum = [0.0; 2];
        for tree in &self.trees {
            let p = tree.predict_proba(row);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let count = self.trees.len() as f64;
        [sum[0] / count, sum[1] / count]
    }

    pub fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

fn average_importances(trees: &[DecisionTree], n_features: usize) -> Option<Vec<f64>> {
    let mut total = vec![0.0; n_features];
    let mut contributing = 0usize;

    for importance in trees.iter().filter_map(DecisionTree::normalized_importance) {
        for (acc, value) in total.iter_mut().zip(importance) {
            *acc += value;
        }
        contributing += 1;
    }

    if contributing == 0 {
        return None;
    }

    let sum: f64 = total.iter().sum();
    if sum <= 0.0 {
        return None;
    }
    Some(total.into_iter().map(|v| v / sum).collect())
}
