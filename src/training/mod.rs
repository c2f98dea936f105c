//! Model training module
//!
//! Provides the pieces a search needs to train and evaluate models:
//! - K-Nearest Neighbors (classifier and regressor) as terminal stages
//! - Cross-validation splitters (KFold, StratifiedKFold)
//! - Evaluation metrics for scoring held-out folds

pub mod cross_validation;
pub mod knn;
pub mod metrics;

pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, KNNRegressor, WeightScheme};
