//! Principal Component Analysis
//!
//! Linear dimensionality reduction as a pipeline transformer. Computes the
//! top-k eigenvectors of the covariance matrix using power iteration with
//! deflation, then projects centered rows onto them.

use crate::error::{KolosalError, Result};
use crate::params::{expect_seed, expect_usize, HasParams, ParamMap, ParamValue};
use crate::stage::Transformer;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const MAX_ITER: usize = 300;
const TOL: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PcaState {
    means: Array1<f64>,
    /// n_components x n_features
    components: Array2<f64>,
    explained_variance: Vec<f64>,
    total_variance: f64,
}

/// PCA dimensionality reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    n_components: usize,
    random_state: Option<u64>,
    state: Option<PcaState>,
}

impl Pca {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            random_state: Some(42),
            state: None,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Explained variance ratio for each fitted component
    pub fn explained_variance_ratio(&self) -> Option<Vec<f64>> {
        self.state.as_ref().map(|s| {
            s.explained_variance
                .iter()
                .map(|&ev| (ev / s.total_variance.max(1e-12)).max(0.0))
                .collect()
        })
    }

    /// Power iteration with deflation to extract top-k eigenvectors.
    fn power_iteration(&self, cov: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
        let d = cov.nrows();
        let mut work = cov.clone();
        let mut eigenvalues = Vec::with_capacity(k);
        let mut eigenvectors = Array2::zeros((k, d));

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        for component in 0..k {
            let mut v: Array1<f64> = Array1::from_iter((0..d).map(|_| rng.gen_range(-1.0..1.0)));
            let norm = v.dot(&v).sqrt().max(1e-12);
            v /= norm;

            let mut eigenvalue = 0.0f64;
            for _ in 0..MAX_ITER {
                let w = work.dot(&v);
                let new_eigenvalue = v.dot(&w);
                let w_norm = w.dot(&w).sqrt().max(1e-12);
                let new_v = w / w_norm;

                let diff = (&v - &new_v).mapv(|e| e * e).sum().sqrt();
                v = new_v;
                eigenvalue = new_eigenvalue;
                if diff < TOL {
                    break;
                }
            }

            // Fix the sign so projections are reproducible across seeds
            if let Some(&pivot) = v.iter().max_by(|a, b| a.abs().total_cmp(&b.abs())) {
                if pivot < 0.0 {
                    v.mapv_inplace(|e| -e);
                }
            }

            eigenvalue = eigenvalue.max(0.0);
            eigenvalues.push(eigenvalue);
            eigenvectors.row_mut(component).assign(&v);

            // Deflate: A = A - eigenvalue * v * v^T
            for i in 0..d {
                for j in 0..d {
                    work[[i, j]] -= eigenvalue * v[i] * v[j];
                }
            }
        }

        (eigenvalues, eigenvectors)
    }
}

impl HasParams for Pca {
    fn param_names(&self) -> Vec<String> {
        vec!["n_components".to_string(), "random_state".to_string()]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("n_components".to_string(), ParamValue::from(self.n_components)),
            (
                "random_state".to_string(),
                ParamValue::from(self.random_state.map(|s| s as i64)),
            ),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_components" => self.n_components = expect_usize(name, value, 1)?,
            "random_state" => self.random_state = expect_seed(name, value)?,
            _ => return Err(KolosalError::unknown_param("Pca", name)),
        }
        Ok(())
    }
}

impl Transformer for Pca {
    fn fit(&mut self, x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        let (n, d) = x.dim();
        if n < 2 {
            return Err(KolosalError::DataError("PCA requires at least 2 samples".to_string()));
        }
        if self.n_components > d.min(n) {
            return Err(KolosalError::invalid_value(
                "n_components",
                self.n_components,
                &format!("must be <= min(n_samples, n_features) = {}", d.min(n)),
            ));
        }

        let means = x.mean_axis(Axis(0)).ok_or_else(|| {
            KolosalError::DataError("cannot compute column means".to_string())
        })?;
        let centered = x - &means;
        let cov = centered.t().dot(&centered) / (n as f64 - 1.0);
        let total_variance = cov.diag().sum();

        let (explained_variance, components) = self.power_iteration(&cov, self.n_components);
        self.state = Some(PcaState {
            means,
            components,
            explained_variance,
            total_variance,
        });
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let state = self.state.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        if x.ncols() != state.means.len() {
            return Err(KolosalError::ShapeError {
                stage: "pca".to_string(),
                expected: format!("{} features", state.means.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let centered = x - &state.means;
        Ok(centered.dot(&state.components.t()))
    }

    fn n_features_in(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.means.len())
    }

    fn clone_box(&self) -> Box<dyn Transformer> {
        Box::new(self.clone())
    }
}
