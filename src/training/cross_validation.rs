//! Cross-validation splitters

use crate::data;
use crate::error::{KolosalError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => *n_splits,
        }
    }

    /// Same strategy with a different fold count
    pub fn with_n_splits(&self, n: usize) -> Self {
        match self {
            CVStrategy::KFold { shuffle, .. } => CVStrategy::KFold { n_splits: n, shuffle: *shuffle },
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                CVStrategy::StratifiedKFold { n_splits: n, shuffle: *shuffle }
            }
        }
    }
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(KolosalError::ConfigError(format!(
                "n_splits must be at least 2, got {}",
                n_splits
            )));
        }
        if n_samples < n_splits {
            return Err(KolosalError::ConfigError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let folds = match &self.strategy {
            CVStrategy::KFold { shuffle, .. } => self.k_fold_assign(n_samples, n_splits, *shuffle),
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                let y = y.ok_or_else(|| {
                    KolosalError::ValidationError("StratifiedKFold requires target array".to_string())
                })?;
                if y.len() != n_samples {
                    return Err(KolosalError::DataError(format!(
                        "target has {} entries but n_samples is {}",
                        y.len(),
                        n_samples
                    )));
                }
                self.stratified_assign(y, n_splits, *shuffle)
            }
        };

        Ok(Self::splits_from_folds(folds))
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn k_fold_assign(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut folds = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            folds.push(indices[current..current + fold_size].to_vec());
            current += fold_size;
        }
        folds
    }

    /// Deal samples round-robin, class by class, with a counter that carries
    /// across classes so remainders do not pile up in the first fold.
    fn stratified_assign(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Vec<Vec<usize>> {
        let mut class_indices = data::class_indices(y);

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        for (class, indices) in &class_indices {
            if indices.len() < n_splits {
                warn!(
                    class = *class,
                    members = indices.len(),
                    n_splits,
                    "Least populated class has fewer members than folds"
                );
            }
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut counter = 0usize;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[counter % n_splits].push(idx);
                counter += 1;
            }
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }
        folds
    }

    fn splits_from_folds(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
        (0..folds.len())
            .map(|fold_idx| {
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect()
    }
}

/// Summary of fold scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores; `None` when there are no scores
    pub fn from_scores(scores: Vec<f64>) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Some(Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covers_all(splits: &[CVSplit], n: usize) {
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..n).collect::<Vec<_>>());
        for split in splits {
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
            }
            assert_eq!(split.train_indices.len() + split.test_indices.len(), n);
        }
    }

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }
        covers_all(&splits, 100);
    }

    #[test]
    fn test_k_fold_uneven() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: true }).with_random_state(7);
        let splits = cv.split(10, None).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        covers_all(&splits, 10);
    }

    #[test]
    fn test_stratified_30_70() {
        let y = Array1::from_iter((0..100).map(|i| if i % 10 < 3 { 1.0 } else { 0.0 }));
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, Some(&y)).unwrap();

        covers_all(&splits, 100);
        for split in &splits {
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            let size = split.test_indices.len();
            let ideal = size as f64 * 0.3;
            assert!((positives as f64 - ideal).abs() <= 1.0, "fold ratio off: {}/{}", positives, size);
        }
    }

    #[test]
    fn test_stratified_deals_by_class_then_index() {
        // class 0 at [1, 3, 4, 5] is dealt first, then class 1 at [0, 2]
        let y = Array1::from_vec(vec![1.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 2, shuffle: false });
        let splits = cv.split(6, Some(&y)).unwrap();
        assert_eq!(splits[0].test_indices, vec![0, 1, 4]);
        assert_eq!(splits[1].test_indices, vec![2, 3, 5]);
        assert_eq!(splits[0].train_indices, vec![2, 3, 5]);
    }

    #[test]
    fn test_stratified_uneven_classes_balanced_sizes() {
        // 7 of class 0, 4 of class 1, 3 folds
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true })
            .with_random_state(42);
        let splits = cv.split(11, Some(&y)).unwrap();
        covers_all(&splits, 11);

        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        assert!(max - min <= 1);
        for split in &splits {
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert!((1..=2).contains(&ones));
        }
    }

    #[test]
    fn test_stratified_deterministic_with_seed() {
        let y = Array1::from_iter((0..40).map(|i| (i % 3) as f64));
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })
            .with_random_state(3);
        assert_eq!(cv.split(40, Some(&y)).unwrap(), cv.split(40, Some(&y)).unwrap());
    }

    #[test]
    fn test_invalid_configurations() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 1, shuffle: false });
        assert!(cv.split(10, None).is_err());

        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(3, None).is_err());

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 2, shuffle: false });
        assert!(cv.split(10, None).is_err());
    }

    #[test]
    fn test_cv_results() {
        let r = CVResults::from_scores(vec![0.5, 1.0]).unwrap();
        assert_eq!(r.mean_score, 0.75);
        assert_eq!(r.std_score, 0.25);
        assert!(CVResults::from_scores(vec![]).is_none());
    }
}
