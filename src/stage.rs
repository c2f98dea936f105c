//! The stage contract
//!
//! A pipeline is built from three capability variants:
//! - [`Transformer`] - learns state in `fit`, maps features in `transform`
//! - [`Resampler`] - applied only while fitting; may add or drop rows
//! - [`Estimator`] - terminal stage that predicts and scores
//!
//! Trait objects are cloned through `clone_box`, so a cloned stage never shares
//! parameters or fitted state with its source.

use crate::error::Result;
use crate::params::{HasParams, ParamMap, ParamValue};
use crate::training::metrics;
use ndarray::{Array1, Array2};
use std::fmt;

/// Feature transformer (scaler, selector, reducer, ...)
pub trait Transformer: HasParams + fmt::Debug + Send + Sync {
    /// Learn state from `x` (labels are available for supervised transforms)
    fn fit(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()>;

    /// Apply the learned state; must preserve row count
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Fit then transform with the just-learned state
    fn fit_transform(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    /// Width seen during the last `fit`
    fn n_features_in(&self) -> Option<usize>;

    fn clone_box(&self) -> Box<dyn Transformer>;
}

/// Fit-time sampler (over/under-sampling)
pub trait Resampler: HasParams + fmt::Debug + Send + Sync {
    /// Returns resampled features and labels, index-aligned
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>)>;

    fn clone_box(&self) -> Box<dyn Resampler>;
}

/// Supervised estimator
pub trait Estimator: HasParams + fmt::Debug + Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Higher is better. Defaults to classification accuracy.
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let predictions = self.predict(x)?;
        metrics::accuracy(y, &predictions)
    }

    /// Width seen during the last `fit`
    fn n_features_in(&self) -> Option<usize> {
        None
    }

    fn clone_box(&self) -> Box<dyn Estimator>;
}

impl Clone for Box<dyn Transformer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn Resampler> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn Estimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Capability of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Transformer,
    Resampler,
    Estimator,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Transformer => write!(f, "transformer"),
            StageKind::Resampler => write!(f, "resampler"),
            StageKind::Estimator => write!(f, "estimator"),
        }
    }
}

/// A pipeline member
#[derive(Debug, Clone)]
pub enum Stage {
    Transformer(Box<dyn Transformer>),
    Resampler(Box<dyn Resampler>),
    Estimator(Box<dyn Estimator>),
}

impl Stage {
    pub fn transformer(t: impl Transformer + 'static) -> Self {
        Stage::Transformer(Box::new(t))
    }

    pub fn resampler(r: impl Resampler + 'static) -> Self {
        Stage::Resampler(Box::new(r))
    }

    pub fn estimator(e: impl Estimator + 'static) -> Self {
        Stage::Estimator(Box::new(e))
    }

    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Transformer(_) => StageKind::Transformer,
            Stage::Resampler(_) => StageKind::Resampler,
            Stage::Estimator(_) => StageKind::Estimator,
        }
    }

    /// Width the stage was fitted on, if it tracks one
    pub fn n_features_in(&self) -> Option<usize> {
        match self {
            Stage::Transformer(t) => t.n_features_in(),
            Stage::Resampler(_) => None,
            Stage::Estimator(e) => e.n_features_in(),
        }
    }

    pub fn param_names(&self) -> Vec<String> {
        match self {
            Stage::Transformer(t) => t.param_names(),
            Stage::Resampler(r) => r.param_names(),
            Stage::Estimator(e) => e.param_names(),
        }
    }

    pub fn get_params(&self) -> ParamMap {
        match self {
            Stage::Transformer(t) => t.get_params(),
            Stage::Resampler(r) => r.get_params(),
            Stage::Estimator(e) => e.get_params(),
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match self {
            Stage::Transformer(t) => t.set_param(name, value),
            Stage::Resampler(r) => r.set_param(name, value),
            Stage::Estimator(e) => e.set_param(name, value),
        }
    }
}
