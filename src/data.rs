//! In-memory dataset: a feature matrix with index-aligned labels

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;

/// Feature matrix and labels, same number of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        check_aligned(&x, &y)?;
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Rows at `indices`, in the given order
    pub fn take(&self, indices: &[usize]) -> Dataset {
        Dataset {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Per-class counts ordered by label
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        class_counts(&self.y)
    }

    pub fn into_parts(self) -> (Array2<f64>, Array1<f64>) {
        (self.x, self.y)
    }
}

/// Reject empty inputs and misaligned features/labels
pub fn check_aligned(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(KolosalError::DataError(format!(
            "X has {} rows but y has {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(KolosalError::DataError("dataset has no rows".to_string()));
    }
    if x.ncols() == 0 {
        return Err(KolosalError::DataError("dataset has no features".to_string()));
    }
    Ok(())
}

/// Count labels (rounded to integer classes), ordered by class
pub fn class_counts(y: &Array1<f64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label.round() as i64).or_insert(0) += 1;
    }
    counts
}

/// Row indices of each class, ordered by class
pub fn class_indices(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label.round() as i64).or_default().push(i);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_misaligned_rejected() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = array![0.0, 1.0];
        assert!(Dataset::new(x, y).is_err());
    }

    #[test]
    fn test_take_keeps_alignment() {
        let x = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let y = array![0.0, 1.0, 0.0];
        let ds = Dataset::new(x, y).unwrap();
        let sub = ds.take(&[2, 1]);
        assert_eq!(sub.x(), &array![[2.0, 2.0], [1.0, 1.0]]);
        assert_eq!(sub.y(), &array![0.0, 1.0]);
    }

    #[test]
    fn test_class_counts_ordered() {
        let y = array![2.0, 0.0, 2.0, 1.0];
        let counts: Vec<(i64, usize)> = class_counts(&y).into_iter().collect();
        assert_eq!(counts, vec![(0, 1), (1, 1), (2, 2)]);
        assert_eq!(class_indices(&y)[&2], vec![0, 2]);
    }
}
