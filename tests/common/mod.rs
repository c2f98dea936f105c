//! Shared fixtures for integration tests

#![allow(dead_code)]

use kolosal_tune::prelude::*;
use ndarray::{Array1, Array2};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Rows `0..n` with the row id in column 0, alternating labels 0/1
pub fn id_dataset(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
    let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);
    (x, y)
}

/// Two well-separated blobs, `n_per_class` rows each
pub fn blobs(n_per_class: usize) -> (Array2<f64>, Array1<f64>) {
    let n = 2 * n_per_class;
    let x = Array2::from_shape_fn((n, 2), |(i, j)| {
        let class = i % 2;
        let jitter = ((i * 7 + j * 3) % 5) as f64 * 0.1;
        class as f64 * 10.0 + jitter
    });
    let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);
    (x, y)
}

/// Twenty rows with overlapping classes, ten per class.
///
/// Column 0 carries the signal; column 1 is noise on a scale large enough to
/// dominate raw distances, so results depend on per-fold rescaling.
pub fn overlapping_20() -> (Array2<f64>, Array1<f64>) {
    let rows = [
        [1.0, 310.0], [2.0, 120.0], [2.5, 450.0], [3.0, 200.0], [3.5, 380.0],
        [4.0, 150.0], [4.5, 290.0], [5.0, 430.0], [5.5, 170.0], [6.0, 260.0],
        [4.2, 340.0], [5.2, 110.0], [5.8, 470.0], [6.5, 230.0], [7.0, 400.0],
        [7.5, 140.0], [8.0, 360.0], [8.5, 210.0], [9.0, 480.0], [9.5, 330.0],
    ];
    let x = Array2::from_shape_fn((20, 2), |(i, j)| rows[i][j]);
    let y = Array1::from_shape_fn(20, |i| if i < 10 { 0.0 } else { 1.0 });
    (x, y)
}

/// Instrumented estimator.
///
/// Its score depends only on `(a, b)`, peaking at `(2, 3)`. Fitting fails
/// when `a == fail_a`, restricted to training sets that lack `fail_without_row`
/// if that is set. Scoring fails if any test row was seen during fit.
#[derive(Debug, Clone)]
pub struct Recorder {
    pub a: i64,
    pub b: i64,
    pub fail_a: Option<i64>,
    pub fail_without_row: Option<i64>,
    pub sleep_ms: u64,
    pub fits: Arc<AtomicUsize>,
    seen: BTreeSet<i64>,
    fitted: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            a: 0,
            b: 0,
            fail_a: None,
            fail_without_row: None,
            sleep_ms: 0,
            fits: Arc::new(AtomicUsize::new(0)),
            seen: BTreeSet::new(),
            fitted: false,
        }
    }

    pub fn failing_at(mut self, a: i64) -> Self {
        self.fail_a = Some(a);
        self
    }

    pub fn only_without_row(mut self, row: i64) -> Self {
        self.fail_without_row = Some(row);
        self
    }

    pub fn sleeping(mut self, ms: u64) -> Self {
        self.sleep_ms = ms;
        self
    }

    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }

    pub fn expected_score(a: i64, b: i64) -> f64 {
        -(((a - 2) * (a - 2) + (b - 3) * (b - 3)) as f64)
    }

    fn row_ids(x: &Array2<f64>) -> impl Iterator<Item = i64> + '_ {
        x.column(0).into_iter().map(|v| v.round() as i64)
    }
}

impl HasParams for Recorder {
    fn param_names(&self) -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("a".to_string(), ParamValue::Int(self.a)),
            ("b".to_string(), ParamValue::Int(self.b)),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let v = value.as_i64().ok_or_else(|| KolosalError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected an integer".to_string(),
        })?;
        match name {
            "a" => self.a = v,
            "b" => self.b = v,
            _ => {
                return Err(KolosalError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "not a parameter of Recorder".to_string(),
                })
            }
        }
        Ok(())
    }
}

impl Estimator for Recorder {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        if self.sleep_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.sleep_ms));
        }
        self.seen = Self::row_ids(x).collect();
        let row_missing = self
            .fail_without_row
            .map_or(true, |row| !self.seen.contains(&row));
        if self.fail_a == Some(self.a) && row_missing {
            return Err(KolosalError::DataError(format!("recorder refuses a={}", self.a)));
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(KolosalError::ModelNotFitted);
        }
        Ok(Array1::zeros(x.nrows()))
    }

    fn score(&self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<f64> {
        if !self.fitted {
            return Err(KolosalError::ModelNotFitted);
        }
        if let Some(id) = Self::row_ids(x).find(|id| self.seen.contains(id)) {
            return Err(KolosalError::ValidationError(format!("test row {} was in the training set", id)));
        }
        Ok(Self::expected_score(self.a, self.b))
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}
