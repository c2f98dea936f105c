//! Fit-time resampling stages
//!
//! Provides techniques for rebalancing training data inside a pipeline:
//! - SMOTE (Synthetic Minority Over-sampling Technique)
//! - Random oversampling
//! - Random undersampling
//!
//! Resamplers only run while a pipeline is being fitted. At predict time they
//! are skipped, so held-out rows are never duplicated or dropped.

mod random_sampling;
mod smote;

pub use random_sampling::{RandomOverSampler, RandomUnderSampler};
pub use smote::SMOTE;

use crate::data::class_counts;
use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

pub(crate) fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Target size of each class after oversampling: `ratio * majority`, never below
/// the current count
pub(crate) fn oversample_targets(y: &Array1<f64>, ratio: f64) -> BTreeMap<i64, usize> {
    let counts = class_counts(y);
    let max_count = counts.values().copied().max().unwrap_or(0);
    let target = (max_count as f64 * ratio) as usize;
    counts
        .into_iter()
        .map(|(class, count)| (class, target.max(count)))
        .collect()
}

/// Original rows followed by `extra` (row-major, `x.ncols()` wide)
pub(crate) fn append_rows(
    x: &Array2<f64>,
    y: &Array1<f64>,
    extra: Vec<f64>,
    extra_y: Vec<f64>,
) -> Result<(Array2<f64>, Array1<f64>)> {
    if extra_y.is_empty() {
        return Ok((x.to_owned(), y.to_owned()));
    }
    let added = Array2::from_shape_vec((extra_y.len(), x.ncols()), extra)?;
    let x_out = ndarray::concatenate(Axis(0), &[x.view(), added.view()])?;
    let y_out = ndarray::concatenate(Axis(0), &[y.view(), Array1::from_vec(extra_y).view()])?;
    Ok((x_out, y_out))
}

pub(crate) fn check_ratio(name: &str, ratio: f64) -> Result<f64> {
    if ratio.is_finite() && ratio > 0.0 {
        Ok(ratio)
    } else {
        Err(KolosalError::invalid_value(name, ratio, "must be a positive ratio"))
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    use ndarray::{Array1, Array2};

    /// 30 rows of class 0 on a grid near the origin, 5 rows of class 1 near (10, 10)
    pub fn imbalanced() -> (Array2<f64>, Array1<f64>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..30 {
            data.push((i % 6) as f64);
            data.push((i / 6) as f64);
            labels.push(0.0);
        }

        for i in 0..5 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1.0);
        }

        let x = Array2::from_shape_vec((35, 2), data).unwrap();
        (x, Array1::from_vec(labels))
    }
}
