//! Data preprocessing stages
//!
//! Transformers usable as intermediate pipeline steps:
//! - Feature scaling (StandardScaler, MinMaxScaler)
//! - Variance-based feature selection
//! - PCA dimensionality reduction

mod scaler;
pub mod feature_selection;
pub mod pca;

pub use scaler::{MinMaxScaler, StandardScaler};
pub use feature_selection::VarianceThreshold;
pub use pca::Pca;
