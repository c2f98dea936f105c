//! Evaluation metrics used for scoring held-out folds

use crate::error::{KolosalError, Result};
use ndarray::Array1;
use std::collections::BTreeMap;

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(KolosalError::DataError(format!(
            "y_true has {} samples but y_pred has {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(KolosalError::DataError("cannot score an empty sample".to_string()));
    }
    Ok(())
}

/// Fraction of predictions that match the true class
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Mean of per-class recall over the classes present in `y_true`
pub fn balanced_accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let mut per_class: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        let entry = per_class.entry(t.round() as i64).or_insert((0, 0));
        entry.1 += 1;
        if (t - p).abs() < 0.5 {
            entry.0 += 1;
        }
    }
    let recall_sum: f64 = per_class
        .values()
        .map(|&(hit, total)| hit as f64 / total as f64)
        .sum();
    Ok(recall_sum / per_class.len() as f64)
}

/// Binary F1 score with label `1` as the positive class
pub fn f1_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        match (*t > 0.5, *p > 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    Ok(if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    })
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let sum: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok(sum / y_true.len() as f64)
}

/// Coefficient of determination; 0.0 when `y_true` is constant
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len() as f64;
    let y_mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y = array![0.0, 1.0, 1.0, 0.0];
        let p = array![0.0, 1.0, 0.0, 0.0];
        assert_eq!(accuracy(&y, &p).unwrap(), 0.75);
    }

    #[test]
    fn test_length_mismatch() {
        let y = array![0.0, 1.0];
        let p = array![0.0];
        assert!(accuracy(&y, &p).is_err());
        assert!(accuracy(&Array1::zeros(0), &Array1::zeros(0)).is_err());
    }

    #[test]
    fn test_balanced_accuracy() {
        // class 0: 3/4 correct, class 1: 1/2 correct
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let p = array![0.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        assert!((balanced_accuracy(&y, &p).unwrap() - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_f1() {
        let y = array![1.0, 1.0, 0.0, 0.0];
        let p = array![1.0, 0.0, 1.0, 0.0];
        assert!((f1_score(&y, &p).unwrap() - 0.5).abs() < 1e-12);
        let none = array![0.0, 0.0, 0.0, 0.0];
        assert_eq!(f1_score(&y, &none).unwrap(), 0.0);
    }

    #[test]
    fn test_regression_metrics() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(mean_squared_error(&y, &y).unwrap(), 0.0);
        assert_eq!(r2_score(&y, &y).unwrap(), 1.0);
        let p = array![2.0, 2.0, 2.0];
        assert!((mean_squared_error(&y, &p).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!(r2_score(&y, &p).unwrap().abs() < 1e-12);
    }
}
