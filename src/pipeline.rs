//! Sequential stage pipeline
//!
//! A [`Pipeline`] chains transformers and resamplers in front of a terminal
//! estimator and presents the whole chain as one [`Estimator`].
//!
//! Fit and inference are deliberately asymmetric: resamplers run only while
//! fitting (features and labels are threaded together), and are skipped at
//! inference, where labels are absent and the row count must not change.

use crate::data::check_aligned;
use crate::error::{KolosalError, Result};
use crate::params::{HasParams, ParamMap, ParamValue};
use crate::stage::{Estimator, Stage, StageKind};
use ndarray::{Array1, Array2};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Separator between stage name and parameter name
pub const PARAM_SEPARATOR: &str = "__";

/// Where a qualified parameter name points
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParamTarget {
    stage: usize,
    local: String,
}

/// Ordered chain of named stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<(String, Stage)>,
    /// `stage__param` → target, built once at construction
    param_table: BTreeMap<String, ParamTarget>,
    n_features_in: Option<usize>,
}

impl Pipeline {
    /// Build a pipeline, validating names and stage capabilities
    pub fn new<S: Into<String>>(steps: Vec<(S, Stage)>) -> Result<Self> {
        let steps: Vec<(String, Stage)> = steps.into_iter().map(|(n, s)| (n.into(), s)).collect();
        Self::validate(&steps)?;
        let param_table = Self::build_param_table(&steps);
        Ok(Self {
            steps,
            param_table,
            n_features_in: None,
        })
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    fn validate(steps: &[(String, Stage)]) -> Result<()> {
        if steps.is_empty() {
            return Err(KolosalError::ConfigError("pipeline has no stages".to_string()));
        }

        let mut seen = HashSet::new();
        for (name, _) in steps {
            if name.is_empty() {
                return Err(KolosalError::ConfigError("stage names must be non-empty".to_string()));
            }
            if name.contains(PARAM_SEPARATOR) {
                return Err(KolosalError::ConfigError(format!(
                    "stage name '{}' must not contain '{}'",
                    name, PARAM_SEPARATOR
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(KolosalError::ConfigError(format!("duplicate stage name '{}'", name)));
            }
        }

        let last = steps.len() - 1;
        for (i, (name, stage)) in steps.iter().enumerate() {
            match (i == last, stage.kind()) {
                (false, StageKind::Estimator) => {
                    return Err(KolosalError::ContractError {
                        stage: name.clone(),
                        reason: "is an estimator and cannot transform; only the last stage may predict"
                            .to_string(),
                    });
                }
                (true, kind) if kind != StageKind::Estimator => {
                    return Err(KolosalError::ContractError {
                        stage: name.clone(),
                        reason: format!("is a {} and cannot predict; the last stage must be an estimator", kind),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn build_param_table(steps: &[(String, Stage)]) -> BTreeMap<String, ParamTarget> {
        let mut table = BTreeMap::new();
        for (i, (name, stage)) in steps.iter().enumerate() {
            for local in stage.param_names() {
                table.insert(
                    format!("{}{}{}", name, PARAM_SEPARATOR, local),
                    ParamTarget { stage: i, local },
                );
            }
        }
        table
    }

    pub fn steps(&self) -> &[(String, Stage)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a stage by name
    pub fn step(&self, name: &str) -> Option<&Stage> {
        self.steps.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn is_fitted(&self) -> bool {
        self.n_features_in.is_some()
    }

    fn final_estimator(&self) -> Result<&dyn Estimator> {
        match self.steps.last() {
            Some((_, Stage::Estimator(e))) => Ok(e.as_ref()),
            Some((name, _)) => Err(KolosalError::ContractError {
                stage: name.clone(),
                reason: "cannot predict".to_string(),
            }),
            None => Err(KolosalError::ConfigError("pipeline has no stages".to_string())),
        }
    }

    fn check_width(stage: &str, expected: Option<usize>, actual: usize) -> Result<()> {
        match expected {
            Some(n) if n != actual => Err(KolosalError::ShapeError {
                stage: stage.to_string(),
                expected: format!("{} features", n),
                actual: format!("{} features", actual),
            }),
            _ => Ok(()),
        }
    }

    /// Apply the inference-time chain (every stage but the last)
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(KolosalError::ModelNotFitted);
        }
        Self::check_width("<input>", self.n_features_in, x.ncols())?;

        let mut current = x.to_owned();
        for (name, stage) in &self.steps[..self.steps.len() - 1] {
            match stage {
                Stage::Transformer(t) => {
                    Self::check_width(name, t.n_features_in(), current.ncols())?;
                    let out = t.transform(&current)?;
                    if out.nrows() != current.nrows() {
                        return Err(KolosalError::ContractError {
                            stage: name.clone(),
                            reason: format!(
                                "changed row count from {} to {} at inference",
                                current.nrows(),
                                out.nrows()
                            ),
                        });
                    }
                    current = out;
                }
                Stage::Resampler(_) => {
                    debug!(stage = %name, "Skipping resampler at inference");
                }
                Stage::Estimator(_) => {
                    return Err(KolosalError::ContractError {
                        stage: name.clone(),
                        reason: "is an estimator in a non-terminal position".to_string(),
                    });
                }
            }
        }
        Ok(current)
    }
}

impl HasParams for Pipeline {
    fn param_names(&self) -> Vec<String> {
        self.param_table.keys().cloned().collect()
    }

    fn get_params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        for (name, stage) in &self.steps {
            for (local, value) in stage.get_params() {
                params.insert(format!("{}{}{}", name, PARAM_SEPARATOR, local), value);
            }
        }
        params
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let target = match self.param_table.get(name) {
            Some(t) => t.clone(),
            None => {
                return Err(match name.split_once(PARAM_SEPARATOR) {
                    Some((stage, _)) if self.step(stage).is_none() => {
                        KolosalError::ConfigError(format!("unknown stage '{}' in parameter '{}'", stage, name))
                    }
                    _ => KolosalError::unknown_param("Pipeline", name),
                });
            }
        };
        self.steps[target.stage].1.set_param(&target.local, value)
    }
}

impl Estimator for Pipeline {
    /// Fit every stage in order; replaces all previously fitted state.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_aligned(x, y)?;
        self.n_features_in = None;

        let last = self.steps.len() - 1;
        let mut xt = x.to_owned();
        let mut yt = y.to_owned();

        for (name, stage) in self.steps.iter_mut() {
            match stage {
                Stage::Transformer(t) => {
                    let out = t.fit_transform(&xt, Some(&yt))?;
                    if out.nrows() != xt.nrows() {
                        return Err(KolosalError::ContractError {
                            stage: name.clone(),
                            reason: format!(
                                "is a transformer but changed row count from {} to {}",
                                xt.nrows(),
                                out.nrows()
                            ),
                        });
                    }
                    if out.ncols() == 0 {
                        return Err(KolosalError::ShapeError {
                            stage: name.clone(),
                            expected: "at least 1 output feature".to_string(),
                            actual: "0 features".to_string(),
                        });
                    }
                    xt = out;
                }
                Stage::Resampler(r) => {
                    let (xr, yr) = r.fit_resample(&xt, &yt)?;
                    if xr.nrows() != yr.len() {
                        return Err(KolosalError::ContractError {
                            stage: name.clone(),
                            reason: format!(
                                "returned {} feature rows but {} labels",
                                xr.nrows(),
                                yr.len()
                            ),
                        });
                    }
                    if xr.ncols() != xt.ncols() {
                        return Err(KolosalError::ShapeError {
                            stage: name.clone(),
                            expected: format!("{} features", xt.ncols()),
                            actual: format!("{} features", xr.ncols()),
                        });
                    }
                    debug!(stage = %name, before = xt.nrows(), after = xr.nrows(), "Resampled");
                    xt = xr;
                    yt = yr;
                }
                Stage::Estimator(e) => e.fit(&xt, &yt)?,
            }
        }
        debug!(stages = last + 1, rows = xt.nrows(), features = xt.ncols(), "Pipeline fitted");

        self.n_features_in = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let xt = self.transform(x)?;
        let (name, _) = &self.steps[self.steps.len() - 1];
        let estimator = self.final_estimator()?;
        Self::check_width(name, estimator.n_features_in(), xt.ncols())?;
        estimator.predict(&xt)
    }

    /// Score with the terminal stage's own rule on transformed features
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        check_aligned(x, y)?;
        let xt = self.transform(x)?;
        let (name, _) = &self.steps[self.steps.len() - 1];
        let estimator = self.final_estimator()?;
        Self::check_width(name, estimator.n_features_in(), xt.ncols())?;
        estimator.score(&xt, y)
    }

    fn n_features_in(&self) -> Option<usize> {
        self.n_features_in
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

/// Incremental pipeline construction
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    steps: Vec<(String, Stage)>,
}

impl PipelineBuilder {
    pub fn step(mut self, name: impl Into<String>, stage: Stage) -> Self {
        self.steps.push((name.into(), stage));
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.steps)
    }
}
