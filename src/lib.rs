//! Kolosal Tune - pipelines and cross-validated grid search
//!
//! This crate provides:
//! - A uniform stage contract (transformers, resamplers, estimators)
//! - Sequential pipelines presented as a single estimator
//! - Parameter grids with deterministic enumeration
//! - Parallel grid search driven by stratified cross-validation
//!
//! # Modules
//!
//! ## Core
//! - [`stage`] - The stage contract and the [`Stage`](stage::Stage) enum
//! - [`params`] - Hyperparameter values and get/set introspection
//! - [`pipeline`] - Ordered stage chains with `stage__param` addressing
//! - [`optimizer`] - Parameter grids and the grid search driver
//!
//! ## Built-in stages
//! - [`preprocessing`] - Scaling, variance selection, PCA
//! - [`synthetic`] - Fit-time resampling (SMOTE, random over/under-sampling)
//! - [`training`] - KNN estimators, cross-validation splitters, metrics
//!
//! ## Services
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core
pub mod data;
pub mod params;
pub mod stage;
pub mod pipeline;
pub mod optimizer;

// Built-in stages
pub mod preprocessing;
pub mod synthetic;
pub mod training;

// Services
pub mod cli;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ErrorKind, KolosalError, Result};

    // Contract
    pub use crate::data::Dataset;
    pub use crate::params::{HasParams, ParamMap, ParamValue};
    pub use crate::pipeline::Pipeline;
    pub use crate::stage::{Estimator, Resampler, Stage, Transformer};

    // Search
    pub use crate::optimizer::{
        ErrorPolicy, GridPoint, GridSearch, ParamGrid, ParamSpace, Scoring, SearchConfig, SearchResult,
    };

    // Stages
    pub use crate::preprocessing::{MinMaxScaler, Pca, StandardScaler, VarianceThreshold};
    pub use crate::synthetic::{RandomOverSampler, RandomUnderSampler, SMOTE};
    pub use crate::training::{CVStrategy, CrossValidator, KNNClassifier, KNNRegressor};
}
