//! # Gradient-Boosted Regression Trees
//!
//! Least-squares gradient boosting for a single target column. Each round fits a
//! regression tree to the current residuals and adds a shrunken copy of it to the
//! ensemble. Trees grow leaf-wise: the open leaf with the largest reduction in
//! squared error is split next, until the leaf budget is spent or no leaf has a
//! valid split left.
//!
//! With fewer than `2 × min_samples_leaf` samples no tree can split, so tiny
//! ensembles collapse to the mean of the target.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::SurrogateError;
use crate::regressor::{SingleOutputModel, SingleOutputRegressor, check_training_shapes};

/// Hyper-parameters of the boosted ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to every tree.
    pub learning_rate: f64,
    /// Maximum number of leaves per tree.
    pub max_leaves: usize,
    /// Maximum depth per tree; unlimited when absent.
    pub max_depth: Option<usize>,
    /// Minimum number of samples in each child of a split.
    pub min_samples_leaf: usize,
    /// A split must reduce the squared error by more than this.
    pub min_split_gain: f64,
    /// Fraction of rows drawn (without replacement) for each tree.
    pub subsample: f64,
    /// Fraction of features drawn for each tree.
    pub colsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_samples_leaf: 20,
            min_split_gain: 0.0,
            subsample: 1.0,
            colsample: 1.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), SurrogateError> {
        let invalid = |message: String| Err(SurrogateError::InvalidSetting(message));

        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            ));
        }
        if self.max_leaves < 2 {
            return invalid(format!(
                "max_leaves must be at least 2, got {}",
                self.max_leaves
            ));
        }
        if self.max_depth == Some(0) {
            return invalid("max_depth must be at least 1 when given".to_string());
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be at least 1".to_string());
        }
        if !(self.min_split_gain.is_finite() && self.min_split_gain >= 0.0) {
            return invalid(format!(
                "min_split_gain must be non-negative, got {}",
                self.min_split_gain
            ));
        }
        for (name, fraction) in [("subsample", self.subsample), ("colsample", self.colsample)] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return invalid(format!("{name} must lie in (0, 1], got {fraction}"));
            }
        }
        Ok(())
    }

    fn subsampling(&self) -> bool {
        self.subsample < 1.0 || self.colsample < 1.0
    }
}

/// Least-squares boosting of leaf-wise regression trees.
pub struct GradientBoosting {
    params: BoostingParams,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams) -> Self {
        Self { params }
    }
}

impl SingleOutputRegressor for GradientBoosting {
    type Fitted = BoostedTrees;

    fn fit_column(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<BoostedTrees, SurrogateError> {
        check_training_shapes("GradientBoosting::fit_column", x, y.insert_axis(Axis(1)))?;
        self.params.validate()?;

        let (n_samples, n_features) = x.dim();
        let base = y.sum() / n_samples as f64;
        let mut residuals: Vec<f64> = y.iter().map(|&v| v - base).collect();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            let rows = sample_indices(&mut rng, n_samples, self.params.subsample);
            let features = sample_indices(&mut rng, n_features, self.params.colsample);
            let tree = RegressionTree::grow(x, &residuals, rows, &features, &self.params);

            if tree.is_single_leaf() && !self.params.subsampling() {
                log::debug!("Boosting stopped after {round} rounds: no split reduces the residuals");
                break;
            }

            for (i, residual) in residuals.iter_mut().enumerate() {
                *residual -= self.params.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }

        Ok(BoostedTrees {
            base,
            learning_rate: self.params.learning_rate,
            trees,
        })
    }
}

/// Draws `fraction` of `0..n` without replacement, in ascending order.
fn sample_indices(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..n).collect();
    }
    let amount = ((n as f64 * fraction).round() as usize).clamp(1, n);
    let mut indices = rand::seq::index::sample(rng, n, amount).into_vec();
    indices.sort_unstable();
    indices
}

/// A fitted boosted ensemble for one output.
#[derive(Debug)]
pub struct BoostedTrees {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl SingleOutputModel for BoostedTrees {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base
            + self.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf {
        value: f64,
    },
    /// Samples with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug)]
struct RegressionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: SplitCandidate,
}

impl RegressionTree {
    fn grow(
        x: ArrayView2<f64>,
        residuals: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        params: &BoostingParams,
    ) -> Self {
        let depth_limit = params.max_depth.unwrap_or(usize::MAX);
        let mut nodes = vec![Node::Leaf {
            value: mean_of(residuals, &rows),
        }];
        let mut open = Vec::new();
        if let Some(split) = best_split(x, residuals, &rows, features, params) {
            open.push(OpenLeaf {
                node: 0,
                rows,
                depth: 0,
                split,
            });
        }

        let mut leaves = 1;
        while leaves < params.max_leaves {
            let Some(position) = position_of_best(&open) else {
                break;
            };
            let OpenLeaf {
                node,
                rows,
                depth,
                split,
            } = open.remove(position);

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .iter()
                .partition(|&&r| x[[r, split.feature]] <= split.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf {
                value: mean_of(residuals, &left_rows),
            });
            nodes.push(Node::Leaf {
                value: mean_of(residuals, &right_rows),
            });
            nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            leaves += 1;

            if depth + 1 < depth_limit {
                for (child, child_rows) in [(left, left_rows), (right, right_rows)] {
                    if let Some(split) = best_split(x, residuals, &child_rows, features, params) {
                        open.push(OpenLeaf {
                            node: child,
                            rows: child_rows,
                            depth: depth + 1,
                            split,
                        });
                    }
                }
            }
        }

        Self { nodes }
    }

    fn is_single_leaf(&self) -> bool {
        self.nodes.len() == 1
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// First open leaf with the strictly largest gain.
fn position_of_best(open: &[OpenLeaf]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (position, leaf) in open.iter().enumerate() {
        if best.is_none_or(|(_, gain)| leaf.split.gain > gain) {
            best = Some((position, leaf.split.gain));
        }
    }
    best.map(|(position, _)| position)
}

fn mean_of(values: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&r| values[r]).sum::<f64>() / rows.len() as f64
}

/// Exhaustive search over midpoints between consecutive distinct values.
///
/// The gain is the reduction in squared error, `sL²/nL + sR²/nR - s²/n`. Ties
/// keep the first feature and the lowest threshold.
fn best_split(
    x: ArrayView2<f64>,
    residuals: &[f64],
    rows: &[usize],
    features: &[usize],
    params: &BoostingParams,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let min_leaf = params.min_samples_leaf;
    if n < 2 * min_leaf {
        return None;
    }

    let total: f64 = rows.iter().map(|&r| residuals[r]).sum();
    let parent_score = total * total / n as f64;
    let mut order = rows.to_vec();
    let mut best: Option<SplitCandidate> = None;

    for &feature in features {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += residuals[order[k]];
            let left_count = k + 1;
            let right_count = n - left_count;
            if left_count < min_leaf {
                continue;
            }
            if right_count < min_leaf {
                break;
            }

            let lo = x[[order[k], feature]];
            let hi = x[[order[k + 1], feature]];
            if lo == hi {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_count as f64
                + right_sum * right_sum / right_count as f64
                - parent_score;
            if gain <= params.min_split_gain {
                continue;
            }
            if best.is_none_or(|current| gain > current.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: midpoint(lo, hi),
                    gain,
                });
            }
        }
    }

    best
}

fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi { mid } else { lo }
}
