//! Grid search configuration

use crate::error::{KolosalError, Result};
use crate::training::CVStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when a fold's fit or score fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the whole search with the first failure
    #[default]
    Raise,
    /// Drop the failed fold from its point's mean and keep going
    Tolerate,
}

/// Configuration for a grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fold strategy (stratified 5-fold by default)
    pub cv: CVStrategy,

    /// Seed for shuffled splits
    pub random_state: Option<u64>,

    /// Worker threads; 0 uses every core
    pub n_jobs: usize,

    pub error_policy: ErrorPolicy,

    /// Ceiling on total fits, refit included
    pub max_fits: Option<usize>,

    /// Stop starting new fold tasks after this many seconds
    pub timeout_secs: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cv: CVStrategy::default(),
            random_state: Some(42),
            n_jobs: 0,
            error_policy: ErrorPolicy::Raise,
            max_fits: None,
            timeout_secs: None,
        }
    }
}

impl SearchConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_cv(mut self, cv: CVStrategy) -> Self {
        self.cv = cv;
        self
    }

    /// Keep the fold strategy, change the fold count
    pub fn with_cv_folds(mut self, n_splits: usize) -> Self {
        self.cv = self.cv.with_n_splits(n_splits);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_max_fits(mut self, max_fits: usize) -> Self {
        self.max_fits = Some(max_fits);
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn n_folds(&self) -> usize {
        self.cv.n_splits()
    }

    /// Checks that do not depend on the grid
    pub fn validate(&self) -> Result<()> {
        let k = self.n_folds();
        if k < 2 {
            return Err(KolosalError::ConfigError(format!(
                "cross-validation needs at least 2 folds, got {}",
                k
            )));
        }
        if let Some(max_fits) = self.max_fits {
            if max_fits < k + 1 {
                return Err(KolosalError::ConfigError(format!(
                    "max_fits ({}) cannot cover one grid point ({} folds + refit)",
                    max_fits, k
                )));
            }
        }
        if let Some(secs) = self.timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(KolosalError::ConfigError(format!(
                    "timeout must be a positive number of seconds, got {}",
                    secs
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.n_folds(), 5);
        assert_eq!(config.error_policy, ErrorPolicy::Raise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SearchConfig::new()
            .with_cv_folds(3)
            .with_n_jobs(4)
            .with_error_policy(ErrorPolicy::Tolerate)
            .with_max_fits(10);

        assert_eq!(config.n_folds(), 3);
        assert!(matches!(config.cv, CVStrategy::StratifiedKFold { n_splits: 3, .. }));
        assert_eq!(config.n_jobs, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid() {
        assert!(SearchConfig::new().with_cv_folds(1).validate().is_err());
        assert!(SearchConfig::new().with_cv_folds(3).with_max_fits(3).validate().is_err());
        assert!(SearchConfig::new().with_timeout(0.0).validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"n_jobs": 2, "error_policy": "tolerate"}"#).unwrap();
        assert_eq!(config.n_jobs, 2);
        assert_eq!(config.error_policy, ErrorPolicy::Tolerate);
        assert_eq!(config.n_folds(), 5);
    }
}
