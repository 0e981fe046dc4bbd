//! Gradient-boosted regression trees
//!
//! This module provides the regression engine that learns to approximate the
//! comfort formula:
//! - Exact greedy tree growth with L1/L2 leaf penalties and min child weight
//! - Boosting with row/column subsampling and early stopping on a validation set
//! - A versioned binary artifact bound to the shared feature schema

pub mod artifact;
pub mod booster;
pub mod tree;

pub use artifact::ComfortModel;
pub use booster::{Booster, BoosterParams, FitReport, fit, rmse};
pub use tree::{Node, RegressionTree};
