//! Scoring rules for held-out folds (larger is better)

use crate::error::{KolosalError, Result};
use crate::stage::Estimator;
use crate::training::metrics;
use ndarray::{Array1, Array2};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// User-supplied `(y_true, y_pred) -> score`
pub type ScoreFn = Arc<dyn Fn(&Array1<f64>, &Array1<f64>) -> f64 + Send + Sync>;

#[derive(Clone, Default)]
pub enum Scoring {
    /// The terminal stage's own `score`
    #[default]
    Estimator,
    Accuracy,
    BalancedAccuracy,
    /// Binary F1 with label 1 as positive
    F1,
    NegMeanSquaredError,
    R2,
    Custom { name: String, func: ScoreFn },
}

impl Scoring {
    pub fn custom(
        name: impl Into<String>,
        func: impl Fn(&Array1<f64>, &Array1<f64>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Scoring::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scoring::Estimator => "estimator",
            Scoring::Accuracy => "accuracy",
            Scoring::BalancedAccuracy => "balanced_accuracy",
            Scoring::F1 => "f1",
            Scoring::NegMeanSquaredError => "neg_mean_squared_error",
            Scoring::R2 => "r2",
            Scoring::Custom { name, .. } => name,
        }
    }

    /// Score a fitted estimator on `(x, y)`
    pub fn score(&self, estimator: &dyn Estimator, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        match self {
            Scoring::Estimator => estimator.score(x, y),
            Scoring::Accuracy => metrics::accuracy(y, &estimator.predict(x)?),
            Scoring::BalancedAccuracy => metrics::balanced_accuracy(y, &estimator.predict(x)?),
            Scoring::F1 => metrics::f1_score(y, &estimator.predict(x)?),
            Scoring::NegMeanSquaredError => {
                metrics::mean_squared_error(y, &estimator.predict(x)?).map(|mse| -mse)
            }
            Scoring::R2 => metrics::r2_score(y, &estimator.predict(x)?),
            Scoring::Custom { func, .. } => Ok(func(y, &estimator.predict(x)?)),
        }
    }
}

impl fmt::Debug for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scoring({})", self.name())
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scoring {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "estimator" | "default" | "score" => Ok(Scoring::Estimator),
            "accuracy" => Ok(Scoring::Accuracy),
            "balanced_accuracy" => Ok(Scoring::BalancedAccuracy),
            "f1" => Ok(Scoring::F1),
            "neg_mean_squared_error" | "neg_mse" => Ok(Scoring::NegMeanSquaredError),
            "r2" => Ok(Scoring::R2),
            _ => Err(KolosalError::ConfigError(format!(
                "unknown scoring '{}' (expected estimator, accuracy, balanced_accuracy, f1, neg_mean_squared_error or r2)",
                s
            ))),
        }
    }
}
