//! Feature scaling implementations

use crate::error::{KolosalError, Result};
use crate::params::{expect_bool, expect_f64, HasParams, ParamMap, ParamValue};
use crate::stage::Transformer;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Parameters for one fitted column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ScalerParams {
    center: f64,
    scale: f64,
}

fn check_fitted_width<'a>(params: &'a Option<Vec<ScalerParams>>, x: &Array2<f64>) -> Result<&'a Vec<ScalerParams>> {
    let params = params.as_ref().ok_or(KolosalError::ModelNotFitted)?;
    if params.len() != x.ncols() {
        return Err(KolosalError::ShapeError {
            stage: "scaler".to_string(),
            expected: format!("{} features", params.len()),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(params)
}

fn apply(x: &Array2<f64>, params: &[ScalerParams]) -> Array2<f64> {
    let mut out = x.to_owned();
    for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(params) {
        col.mapv_inplace(|v| (v - p.center) / p.scale);
    }
    out
}

fn unapply(x: &Array2<f64>, params: &[ScalerParams]) -> Array2<f64> {
    let mut out = x.to_owned();
    for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(params) {
        col.mapv_inplace(|v| v * p.scale + p.center);
    }
    out
}

/// Standard scaling (z-score normalization): (x - mean) / std
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    with_mean: bool,
    with_std: bool,
    params: Option<Vec<ScalerParams>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self {
            with_mean: true,
            with_std: true,
            params: None,
        }
    }

    pub fn with_mean(mut self, on: bool) -> Self {
        self.with_mean = on;
        self
    }

    pub fn with_std(mut self, on: bool) -> Self {
        self.with_std = on;
        self
    }

    /// Map scaled values back to the original units
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = check_fitted_width(&self.params, x)?;
        Ok(unapply(x, params))
    }
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl HasParams for StandardScaler {
    fn param_names(&self) -> Vec<String> {
        vec!["with_mean".to_string(), "with_std".to_string()]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("with_mean".to_string(), ParamValue::Bool(self.with_mean)),
            ("with_std".to_string(), ParamValue::Bool(self.with_std)),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "with_mean" => self.with_mean = expect_bool(name, value)?,
            "with_std" => self.with_std = expect_bool(name, value)?,
            _ => return Err(KolosalError::unknown_param("StandardScaler", name)),
        }
        Ok(())
    }
}

impl Transformer for StandardScaler {
    fn fit(&mut self, x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(KolosalError::DataError("cannot fit scaler on zero rows".to_string()));
        }
        let n = x.nrows() as f64;
        let params = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.sum() / n;
                // population std, matching the usual scaler convention
                let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                ScalerParams {
                    center: if self.with_mean { mean } else { 0.0 },
                    scale: if !self.with_std || std == 0.0 { 1.0 } else { std },
                }
            })
            .collect();
        self.params = Some(params);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = check_fitted_width(&self.params, x)?;
        Ok(apply(x, params))
    }

    fn n_features_in(&self) -> Option<usize> {
        self.params.as_ref().map(Vec::len)
    }

    fn clone_box(&self) -> Box<dyn Transformer> {
        Box::new(self.clone())
    }
}

/// Min-Max scaling: (x - min) / (max - min), mapped onto `[feature_min, feature_max]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    feature_min: f64,
    feature_max: f64,
    params: Option<Vec<ScalerParams>>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self {
            feature_min: 0.0,
            feature_max: 1.0,
            params: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.feature_min = min;
        self.feature_max = max;
        self
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = check_fitted_width(&self.params, x)?;
        Ok(unapply(x, params))
    }
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl HasParams for MinMaxScaler {
    fn param_names(&self) -> Vec<String> {
        vec!["feature_min".to_string(), "feature_max".to_string()]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("feature_min".to_string(), ParamValue::Float(self.feature_min)),
            ("feature_max".to_string(), ParamValue::Float(self.feature_max)),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "feature_min" => self.feature_min = expect_f64(name, value)?,
            "feature_max" => self.feature_max = expect_f64(name, value)?,
            _ => return Err(KolosalError::unknown_param("MinMaxScaler", name)),
        }
        Ok(())
    }
}

impl Transformer for MinMaxScaler {
    fn fit(&mut self, x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(KolosalError::DataError("cannot fit scaler on zero rows".to_string()));
        }
        if self.feature_min >= self.feature_max {
            return Err(KolosalError::invalid_value(
                "feature_min",
                self.feature_min,
                "must be smaller than feature_max",
            ));
        }
        let span = self.feature_max - self.feature_min;
        let params = x
            .axis_iter(Axis(1))
            .map(|col| {
                let min = col.iter().copied().fold(f64::INFINITY, f64::min);
                let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let range = if max > min { max - min } else { 1.0 };
                // (v - min) / range * span + feature_min, folded into center/scale
                let scale = range / span;
                ScalerParams {
                    center: min - self.feature_min * scale,
                    scale,
                }
            })
            .collect();
        self.params = Some(params);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = check_fitted_width(&self.params, x)?;
        Ok(apply(x, params))
    }

    fn n_features_in(&self) -> Option<usize> {
        self.params.as_ref().map(Vec::len)
    }

    fn clone_box(&self) -> Box<dyn Transformer> {
        Box::new(self.clone())
    }
}
