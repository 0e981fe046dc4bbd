//! Gradient boosting with early stopping

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::tree::{self, GrowthParams, RegressionTree};
use crate::Result;
use crate::error::ComfortError;
use crate::features::FEATURE_COUNT;

/// Booster hyperparameters. Defaults are the fixed production settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoosterParams {
    /// Upper bound on boosting rounds
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// Fraction of rows sampled per tree
    pub subsample: f64,
    /// Fraction of features sampled per tree
    pub colsample_bytree: f64,
    /// L1 penalty on leaf weights
    pub reg_alpha: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// Stop after this many rounds without validation improvement
    pub early_stopping_rounds: usize,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 6000,
            learning_rate: 0.03,
            max_depth: 3,
            min_child_weight: 6.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_alpha: 0.1,
            reg_lambda: 5.0,
            early_stopping_rounds: 150,
            seed: 42,
        }
    }
}

impl BoosterParams {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 || self.max_depth == 0 || self.early_stopping_rounds == 0 {
            return Err(ComfortError::training(
                "n_estimators, max_depth and early_stopping_rounds must be positive",
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ComfortError::training("learning_rate must be positive"));
        }
        let ratio = 0.0..=1.0;
        if !ratio.contains(&self.subsample)
            || !ratio.contains(&self.colsample_bytree)
            || self.subsample == 0.0
            || self.colsample_bytree == 0.0
        {
            return Err(ComfortError::training(
                "subsample and colsample_bytree must be in (0, 1]",
            ));
        }
        if !(self.min_child_weight >= 0.0 && self.reg_alpha >= 0.0 && self.reg_lambda >= 0.0) {
            return Err(ComfortError::training(
                "min_child_weight, reg_alpha and reg_lambda must be non-negative",
            ));
        }
        Ok(())
    }

    fn growth(&self) -> GrowthParams {
        GrowthParams {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            reg_alpha: self.reg_alpha,
            reg_lambda: self.reg_lambda,
            learning_rate: self.learning_rate,
        }
    }

    fn columns_per_tree(&self) -> usize {
        ((FEATURE_COUNT as f64 * self.colsample_bytree).floor() as usize).clamp(1, FEATURE_COUNT)
    }
}

/// Fitted additive tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl Booster {
    #[must_use]
    pub fn new(base_score: f64, trees: Vec<RegressionTree>) -> Self {
        Self { base_score, trees }
    }

    #[must_use]
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Base score plus every tree's output, summed in tree order
    #[must_use]
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.predict(features))
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if !self.base_score.is_finite() {
            return Err("base score is not finite".to_string());
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.check().map_err(|e| format!("tree {index}: {e}"))?;
        }
        Ok(())
    }
}

/// Outcome of the boosting loop
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Rounds actually run before stopping
    pub rounds_trained: usize,
    /// Trees kept, i.e. best iteration + 1
    pub best_tree_count: usize,
    pub best_validation_rmse: f64,
}

/// Fit a squared-error booster, keeping the trees up to the best validation round
pub fn fit(
    params: &BoosterParams,
    train_x: &[[f64; FEATURE_COUNT]],
    train_y: &[f64],
    valid_x: &[[f64; FEATURE_COUNT]],
    valid_y: &[f64],
) -> Result<(Booster, FitReport)> {
    params.validate()?;
    if train_x.is_empty() || valid_x.is_empty() {
        return Err(ComfortError::training(
            "training and validation partitions must both be non-empty",
        ));
    }
    if train_x.len() != train_y.len() || valid_x.len() != valid_y.len() {
        return Err(ComfortError::training("feature and label counts differ"));
    }
    let all_finite = train_x
        .iter()
        .chain(valid_x)
        .flatten()
        .chain(train_y.iter().chain(valid_y))
        .all(|v| v.is_finite());
    if !all_finite {
        return Err(ComfortError::training("dataset contains non-finite values"));
    }

    let growth = params.growth();
    let columns = params.columns_per_tree();
    let mut rng = StdRng::seed_from_u64(params.seed);

    let base_score = train_y.iter().sum::<f64>() / train_y.len() as f64;
    let mut train_pred = vec![base_score; train_x.len()];
    let mut valid_pred = vec![base_score; valid_x.len()];
    let mut gradients = vec![0.0; train_x.len()];
    let mut feature_pool: Vec<usize> = (0..FEATURE_COUNT).collect();

    let mut trees = Vec::new();
    let mut best_rmse = f64::INFINITY;
    let mut best_tree_count = 0;

    for round in 0..params.n_estimators {
        for ((g, p), y) in gradients.iter_mut().zip(&train_pred).zip(train_y) {
            *g = p - y;
        }

        let mut sample: Vec<usize> = (0..train_x.len())
            .filter(|_| rng.random::<f64>() < params.subsample)
            .collect();
        if sample.is_empty() {
            sample = (0..train_x.len()).collect();
        }

        feature_pool.shuffle(&mut rng);
        let mut features = feature_pool[..columns].to_vec();
        features.sort_unstable();

        let tree = tree::grow(train_x, &gradients, &mut sample, &features, &growth);
        for (p, x) in train_pred.iter_mut().zip(train_x) {
            *p += tree.predict(x);
        }
        for (p, x) in valid_pred.iter_mut().zip(valid_x) {
            *p += tree.predict(x);
        }
        trees.push(tree);

        let score = rmse(&valid_pred, valid_y);
        if score < best_rmse {
            best_rmse = score;
            best_tree_count = trees.len();
        } else if trees.len() - best_tree_count >= params.early_stopping_rounds {
            debug!(round, best_tree_count, "Early stopping");
            break;
        }

        if (round + 1) % 500 == 0 {
            debug!(
                round = round + 1,
                validation_rmse = score,
                "Boosting progress"
            );
        }
    }

    let rounds_trained = trees.len();
    trees.truncate(best_tree_count);
    info!(
        rounds_trained,
        best_tree_count,
        best_validation_rmse = best_rmse,
        "Boosting finished"
    );

    Ok((
        Booster::new(base_score, trees),
        FitReport {
            rounds_trained,
            best_tree_count,
            best_validation_rmse: best_rmse,
        },
    ))
}

/// Root mean squared error
#[must_use]
pub fn rmse(predictions: &[f64], labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y) * (p - y))
        .sum();
    (sum / labels.len() as f64).sqrt()
}
