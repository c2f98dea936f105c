//! Random sampling methods

use super::{append_rows, check_ratio, oversample_targets, seeded_rng};
use crate::data::{check_aligned, class_counts, class_indices};
use crate::error::{KolosalError, Result};
use crate::params::{expect_bool, expect_f64, expect_seed, HasParams, ParamMap, ParamValue};
use crate::stage::Resampler;
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random oversampler (duplicates minority samples)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomOverSampler {
    /// Minority classes grow to this fraction of the majority count
    sampling_strategy: f64,
    seed: Option<u64>,
}

impl RandomOverSampler {
    pub fn new() -> Self {
        Self {
            sampling_strategy: 1.0,
            seed: None,
        }
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for RandomOverSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HasParams for RandomOverSampler {
    fn param_names(&self) -> Vec<String> {
        vec!["sampling_strategy".to_string(), "random_state".to_string()]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("sampling_strategy".to_string(), ParamValue::Float(self.sampling_strategy)),
            ("random_state".to_string(), ParamValue::from(self.seed.map(|s| s as i64))),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "sampling_strategy" => self.sampling_strategy = check_ratio(name, expect_f64(name, value)?)?,
            "random_state" => self.seed = expect_seed(name, value)?,
            _ => return Err(KolosalError::unknown_param("RandomOverSampler", name)),
        }
        Ok(())
    }
}

impl Resampler for RandomOverSampler {
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        check_aligned(x, y)?;
        check_ratio("sampling_strategy", self.sampling_strategy)?;

        let mut rng = seeded_rng(self.seed);
        let targets = oversample_targets(y, self.sampling_strategy);
        let counts = class_counts(y);
        let indices = class_indices(y);

        let mut extra = Vec::new();
        let mut extra_y = Vec::new();

        for (class, &target) in &targets {
            let n_to_add = target.saturating_sub(counts[class]);
            let class_idx = &indices[class];
            for _ in 0..n_to_add {
                let idx = class_idx[rng.gen_range(0..class_idx.len())];
                extra.extend(x.row(idx).iter().copied());
                extra_y.push(*class as f64);
            }
        }

        debug!(added = extra_y.len(), "Random oversampling");
        append_rows(x, y, extra, extra_y)
    }

    fn clone_box(&self) -> Box<dyn Resampler> {
        Box::new(self.clone())
    }
}

/// Random undersampler (removes majority samples)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomUnderSampler {
    /// Ratio of minority to majority after sampling
    sampling_strategy: f64,
    seed: Option<u64>,
    replacement: bool,
}

impl RandomUnderSampler {
    pub fn new() -> Self {
        Self {
            sampling_strategy: 1.0,
            seed: None,
            replacement: false,
        }
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_replacement(mut self, replacement: bool) -> Self {
        self.replacement = replacement;
        self
    }
}

impl Default for RandomUnderSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HasParams for RandomUnderSampler {
    fn param_names(&self) -> Vec<String> {
        vec![
            "sampling_strategy".to_string(),
            "random_state".to_string(),
            "replacement".to_string(),
        ]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("sampling_strategy".to_string(), ParamValue::Float(self.sampling_strategy)),
            ("random_state".to_string(), ParamValue::from(self.seed.map(|s| s as i64))),
            ("replacement".to_string(), ParamValue::Bool(self.replacement)),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "sampling_strategy" => self.sampling_strategy = check_ratio(name, expect_f64(name, value)?)?,
            "random_state" => self.seed = expect_seed(name, value)?,
            "replacement" => self.replacement = expect_bool(name, value)?,
            _ => return Err(KolosalError::unknown_param("RandomUnderSampler", name)),
        }
        Ok(())
    }
}

impl Resampler for RandomUnderSampler {
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        check_aligned(x, y)?;
        check_ratio("sampling_strategy", self.sampling_strategy)?;

        let mut rng = seeded_rng(self.seed);
        let indices = class_indices(y);
        let min_count = indices.values().map(Vec::len).min().unwrap_or(0);
        let target_count = ((min_count as f64 / self.sampling_strategy) as usize).max(1);

        let mut selected: Vec<usize> = Vec::new();
        for class_idx in indices.values() {
            let n_to_keep = target_count.min(class_idx.len());
            if self.replacement {
                for _ in 0..n_to_keep {
                    selected.push(class_idx[rng.gen_range(0..class_idx.len())]);
                }
            } else {
                let mut shuffled = class_idx.clone();
                shuffled.shuffle(&mut rng);
                selected.extend(shuffled.into_iter().take(n_to_keep));
            }
        }
        selected.sort_unstable();

        debug!(kept = selected.len(), of = y.len(), "Random undersampling");
        Ok((x.select(Axis(0), &selected), y.select(Axis(0), &selected)))
    }

    fn clone_box(&self) -> Box<dyn Resampler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::test_data::imbalanced;

    #[test]
    fn test_random_oversampler() {
        let (x, y) = imbalanced();

        let mut sampler = RandomOverSampler::new().with_seed(42);
        let (rx, ry) = sampler.fit_resample(&x, &y).unwrap();

        assert_eq!(rx.nrows(), ry.len());
        assert_eq!(rx.nrows(), 60);
        let counts = class_counts(&ry);
        assert_eq!(counts[&0], 30);
        assert_eq!(counts[&1], 30);
        // originals come first and untouched
        assert_eq!(rx.slice(ndarray::s![..35, ..]), x);
    }

    #[test]
    fn test_oversampler_is_seeded() {
        let (x, y) = imbalanced();
        let a = RandomOverSampler::new().with_seed(7).fit_resample(&x, &y).unwrap();
        let b = RandomOverSampler::new().with_seed(7).fit_resample(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_undersampler() {
        let (x, y) = imbalanced();

        let mut sampler = RandomUnderSampler::new().with_seed(42);
        let (rx, ry) = sampler.fit_resample(&x, &y).unwrap();

        assert_eq!(rx.nrows(), 10);
        let counts = class_counts(&ry);
        assert_eq!(counts[&0], 5);
        assert_eq!(counts[&1], 5);
    }

    #[test]
    fn test_sampler_params() {
        let mut sampler = RandomOverSampler::new();
        sampler.set_param("sampling_strategy", &ParamValue::Float(0.5)).unwrap();
        sampler.set_param("random_state", &ParamValue::Int(3)).unwrap();
        assert_eq!(sampler.get_params()["random_state"], ParamValue::Int(3));
        assert!(sampler.set_param("sampling_strategy", &ParamValue::Float(0.0)).is_err());

        let (x, y) = imbalanced();
        let (_, ry) = sampler.fit_resample(&x, &y).unwrap();
        assert_eq!(class_counts(&ry)[&1], 15);
    }
}
