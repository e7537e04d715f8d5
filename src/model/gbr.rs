//! Least-squares gradient-boosted regression trees
//!
//! Each stage fits a depth-limited regression tree to the residuals of the
//! current ensemble and adds it scaled by the learning rate. The initial
//! prediction is the mean of the targets. Split search is exhaustive and
//! deterministic: candidate thresholds are midpoints between consecutive
//! distinct values, ties keep the first candidate found.

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Number of boosting stages
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        BoostingParams {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        let invalid = |parameter: &str, value: String| TrainingError::InvalidParameter {
            parameter: parameter.to_string(),
            value,
        };

        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", self.n_estimators.to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(invalid("learning_rate", self.learning_rate.to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(invalid("min_samples_split", self.min_samples_split.to_string()));
        }
        if self.min_samples_leaf == 0 {
            return Err(invalid("min_samples_leaf", self.min_samples_leaf.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary regression tree stored as a flat node list, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl RegressionTree {
    fn fit(x: ArrayView2<'_, f64>, residuals: &[f64], params: &BoostingParams) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        let indices: Vec<usize> = (0..residuals.len()).collect();
        tree.grow(x, residuals, indices, 0, params);
        tree
    }

    /// Build the subtree for `indices` and return its node index
    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        residuals: &[f64],
        indices: Vec<usize>,
        depth: usize,
        params: &BoostingParams,
    ) -> usize {
        let node_index = self.nodes.len();
        let value = mean_of(residuals, &indices);
        self.nodes.push(Node::Leaf { value });

        if depth >= params.max_depth || indices.len() < params.min_samples_split {
            return node_index;
        }

        let Some(split) = best_split(x, residuals, &indices, params.min_samples_leaf) else {
            return node_index;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);

        let left = self.grow(x, residuals, left_indices, depth + 1, params);
        let right = self.grow(x, residuals, right_indices, depth + 1, params);
        self.nodes[node_index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_index
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    index = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], index: usize) -> usize {
            match nodes.get(index) {
                Some(Node::Split { left, right, .. }) => {
                    1 + depth_of(nodes, *left).max(depth_of(nodes, *right))
                }
                _ => 0,
            }
        }
        depth_of(&self.nodes, 0)
    }
}

fn mean_of(values: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| values[i]).sum::<f64>() / indices.len() as f64
}

/// Split minimizing the summed squared error of both children
fn best_split(
    x: ArrayView2<'_, f64>,
    residuals: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| residuals[i] * residuals[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();

    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for position in 0..n - 1 {
            let r = residuals[order[position]];
            left_sum += r;
            left_sq += r * r;

            let left_count = position + 1;
            let right_count = n - left_count;
            if left_count < min_samples_leaf || right_count < min_samples_leaf {
                continue;
            }

            let current = x[[order[position], feature]];
            let next = x[[order[position + 1], feature]];
            if next <= current {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_count as f64)
                + (right_sq - right_sum * right_sum / right_count as f64);

            if best.as_ref().map_or(true, |b| sse < b.sse) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: current + (next - current) / 2.0,
                    sse,
                });
            }
        }
    }

    best.filter(|b| b.sse < parent_sse - f64::EPSILON * parent_sse.abs().max(1.0))
}

/// Fitted boosting ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    init: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostingParams,
    ) -> Result<Self, TrainingError> {
        Self::fit_with_progress(x, y, params, |_| {})
    }

    /// Fit, calling `on_stage` with the stage index after each tree
    pub fn fit_with_progress<F>(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostingParams,
        mut on_stage: F,
    ) -> Result<Self, TrainingError>
    where
        F: FnMut(usize),
    {
        params.validate()?;
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(TrainingError::InsufficientRows {
                required: 1,
                actual: x.nrows().min(y.len()),
            });
        }

        let init = y.mean().unwrap_or(0.0);
        let mut predictions = vec![init; y.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for stage in 0..params.n_estimators {
            let residuals: Vec<f64> = y
                .iter()
                .zip(&predictions)
                .map(|(target, predicted)| target - predicted)
                .collect();

            let tree = RegressionTree::fit(x, &residuals, params);
            for (i, prediction) in predictions.iter_mut().enumerate() {
                *prediction += params.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
            on_stage(stage);
        }

        Ok(Self {
            params: params.clone(),
            init,
            trees,
        })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.trees.iter().fold(self.init, |acc, tree| {
            acc + self.params.learning_rate * tree.predict_row(row)
        })
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }

    pub fn initial_prediction(&self) -> f64 {
        self.init
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    #[test]
    fn test_single_split_on_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let residuals = [0.0, 0.0, 0.0, 6.0, 6.0, 6.0];
        let params = BoostingParams {
            max_depth: 1,
            ..Default::default()
        };
        let tree = RegressionTree::fit(x.view(), &residuals, &params);

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_row(array![2.5].view()), 0.0);
        assert_eq!(tree.predict_row(array![11.5].view()), 6.0);
        // threshold sits halfway between 3 and 10
        assert_eq!(tree.predict_row(array![6.4].view()), 0.0);
        assert_eq!(tree.predict_row(array![6.6].view()), 6.0);
    }

    #[test]
    fn test_depth_and_leaf_limits() {
        let x = Array2::from_shape_fn((16, 2), |(i, j)| (i * (j + 1)) as f64);
        let residuals: Vec<f64> = (0..16).map(|i| (i as f64).powi(2)).collect();
        let params = BoostingParams {
            max_depth: 2,
            min_samples_leaf: 3,
            ..Default::default()
        };
        let tree = RegressionTree::fit(x.view(), &residuals, &params);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_constant_target_does_not_split() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = Array1::from_vec(vec![7.0, 7.0, 7.0]);
        let model = GradientBoostedTrees::fit(x.view(), y.view(), &BoostingParams::default()).unwrap();
        assert_eq!(model.initial_prediction(), 7.0);
        assert!(model.trees().iter().all(|t| t.node_count() == 1));
        assert_eq!(model.predict_row(array![100.0].view()), 7.0);
    }

    #[test]
    fn test_boosting_reduces_training_error() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(40, |i| 3.0 * i as f64 + if i % 2 == 0 { 1.0 } else { -1.0 });

        let few = BoostingParams {
            n_estimators: 5,
            ..Default::default()
        };
        let weak = GradientBoostedTrees::fit(x.view(), y.view(), &few).unwrap();
        let strong = GradientBoostedTrees::fit(x.view(), y.view(), &BoostingParams::default()).unwrap();

        let mae = |m: &GradientBoostedTrees| {
            (0..40)
                .map(|i| (m.predict_row(x.row(i)) - y[i]).abs())
                .sum::<f64>()
                / 40.0
        };
        assert_eq!(strong.n_stages(), 100);
        assert!(mae(&strong) < mae(&weak));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x = Array2::from_shape_fn((25, 3), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y = Array1::from_shape_fn(25, |i| (i % 5) as f64 * 2.5);
        let a = GradientBoostedTrees::fit(x.view(), y.view(), &BoostingParams::default()).unwrap();
        let b = GradientBoostedTrees::fit(x.view(), y.view(), &BoostingParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0];
        let params = BoostingParams {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            GradientBoostedTrees::fit(x.view(), y.view(), &params),
            Err(TrainingError::InvalidParameter { .. })
        ));
    }
}
