//! Variance threshold feature selection

use crate::error::{KolosalError, Result};
use crate::params::{expect_f64, HasParams, ParamMap, ParamValue};
use crate::stage::Transformer;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Drops features whose variance is not above `threshold`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceThreshold {
    threshold: f64,
    variances: Option<Vec<f64>>,
    selected_features: Option<Vec<usize>>,
}

impl VarianceThreshold {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            variances: None,
            selected_features: None,
        }
    }

    /// Indices of the retained columns
    pub fn selected_features(&self) -> Option<&[usize]> {
        self.selected_features.as_deref()
    }

    pub fn variances(&self) -> Option<&[f64]> {
        self.variances.as_deref()
    }
}

impl Default for VarianceThreshold {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl HasParams for VarianceThreshold {
    fn param_names(&self) -> Vec<String> {
        vec!["threshold".to_string()]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([("threshold".to_string(), ParamValue::Float(self.threshold))])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "threshold" => {
                let t = expect_f64(name, value)?;
                if t < 0.0 {
                    return Err(KolosalError::invalid_value(name, value, "must be >= 0"));
                }
                self.threshold = t;
            }
            _ => return Err(KolosalError::unknown_param("VarianceThreshold", name)),
        }
        Ok(())
    }
}

impl Transformer for VarianceThreshold {
    fn fit(&mut self, x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(KolosalError::DataError("cannot fit on zero rows".to_string()));
        }
        let n = x.nrows() as f64;
        let variances: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.sum() / n;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
            })
            .collect();

        let selected: Vec<usize> = variances
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > self.threshold)
            .map(|(i, _)| i)
            .collect();

        if selected.is_empty() {
            return Err(KolosalError::ValidationError(format!(
                "No feature meets the variance threshold {}",
                self.threshold
            )));
        }

        self.variances = Some(variances);
        self.selected_features = Some(selected);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let selected = self.selected_features.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        let n_in = self.variances.as_ref().map(Vec::len).unwrap_or(0);
        if x.ncols() != n_in {
            return Err(KolosalError::ShapeError {
                stage: "variance_threshold".to_string(),
                expected: format!("{} features", n_in),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.select(Axis(1), selected))
    }

    fn n_features_in(&self) -> Option<usize> {
        self.variances.as_ref().map(Vec::len)
    }

    fn clone_box(&self) -> Box<dyn Transformer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_drops_constant_columns() {
        let x = array![[1.0, 7.0, 0.0], [2.0, 7.0, 0.1], [3.0, 7.0, 0.0]];
        let mut selector = VarianceThreshold::default();
        let out = selector.fit_transform(&x, None).unwrap();
        assert_eq!(selector.selected_features(), Some(&[0usize, 2][..]));
        assert_eq!(out.ncols(), 2);
        assert_eq!(out.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_threshold_param() {
        let x = array![[1.0, 0.0], [2.0, 0.1], [3.0, 0.0]];
        let mut selector = VarianceThreshold::default();
        selector.set_param("threshold", &ParamValue::Float(0.1)).unwrap();
        let out = selector.fit_transform(&x, None).unwrap();
        assert_eq!(out.ncols(), 1);
        assert!(selector.set_param("threshold", &ParamValue::Float(-1.0)).is_err());
    }

    #[test]
    fn test_nothing_selected_is_error() {
        let x = array![[1.0, 1.0], [1.0, 1.0]];
        let mut selector = VarianceThreshold::default();
        assert!(selector.fit(&x, None).is_err());
    }
}
