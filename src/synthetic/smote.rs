//! SMOTE (Synthetic Minority Over-sampling Technique)

use super::{append_rows, check_ratio, oversample_targets, seeded_rng};
use crate::data::{check_aligned, class_counts, class_indices};
use crate::error::{KolosalError, Result};
use crate::params::{expect_f64, expect_seed, expect_usize, HasParams, ParamMap, ParamValue};
use crate::stage::Resampler;
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// Interpolates new minority rows between a sample and one of its
/// `k_neighbors` nearest same-class neighbors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    k_neighbors: usize,
    /// Minority classes grow to this fraction of the majority count
    sampling_strategy: f64,
    seed: Option<u64>,
}

impl SMOTE {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            sampling_strategy: 1.0,
            seed: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// k nearest rows among `candidates`, excluding `point` itself (O(n log k))
    fn find_neighbors(x: &Array2<f64>, point: usize, candidates: &[usize], k: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for &i in candidates {
            if i == point {
                continue;
            }
            let dist = Self::distance(x.row(point), x.row(i));
            if heap.len() < k {
                heap.push(DistIdx(dist, i));
            } else if let Some(&top) = heap.peek() {
                let candidate = DistIdx(dist, i);
                if candidate < top {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
    }

    fn generate_sample(point: ArrayView1<f64>, neighbor: ArrayView1<f64>, rng: &mut ChaCha8Rng) -> Vec<f64> {
        let gap: f64 = rng.gen();
        point
            .iter()
            .zip(neighbor.iter())
            .map(|(&p, &n)| p + gap * (n - p))
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl HasParams for SMOTE {
    fn param_names(&self) -> Vec<String> {
        vec![
            "k_neighbors".to_string(),
            "sampling_strategy".to_string(),
            "random_state".to_string(),
        ]
    }

    fn get_params(&self) -> ParamMap {
        ParamMap::from([
            ("k_neighbors".to_string(), ParamValue::from(self.k_neighbors)),
            ("sampling_strategy".to_string(), ParamValue::Float(self.sampling_strategy)),
            ("random_state".to_string(), ParamValue::from(self.seed.map(|s| s as i64))),
        ])
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "k_neighbors" => self.k_neighbors = expect_usize(name, value, 1)?,
            "sampling_strategy" => self.sampling_strategy = check_ratio(name, expect_f64(name, value)?)?,
            "random_state" => self.seed = expect_seed(name, value)?,
            _ => return Err(KolosalError::unknown_param("SMOTE", name)),
        }
        Ok(())
    }
}

impl Resampler for SMOTE {
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        check_aligned(x, y)?;
        check_ratio("sampling_strategy", self.sampling_strategy)?;

        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(KolosalError::ValidationError(
                "Need at least 2 classes for SMOTE".to_string(),
            ));
        }

        let mut rng = seeded_rng(self.seed);
        let targets = oversample_targets(y, self.sampling_strategy);
        let indices = class_indices(y);

        let mut extra = Vec::new();
        let mut extra_y = Vec::new();

        for (class, &target) in &targets {
            let n_to_generate = target.saturating_sub(counts[class]);
            if n_to_generate == 0 {
                continue;
            }

            let class_idx = &indices[class];
            let k = self.k_neighbors.min(class_idx.len().saturating_sub(1));

            for _ in 0..n_to_generate {
                let point = class_idx[rng.gen_range(0..class_idx.len())];
                let neighbors = Self::find_neighbors(x, point, class_idx, k);

                // A lone sample has nobody to interpolate towards
                let sample = match neighbors.choose(&mut rng) {
                    Some(&neighbor) => Self::generate_sample(x.row(point), x.row(neighbor), &mut rng),
                    None => x.row(point).to_vec(),
                };
                extra.extend(sample);
                extra_y.push(*class as f64);
            }
        }

        debug!(generated = extra_y.len(), k = self.k_neighbors, "SMOTE resampling");
        append_rows(x, y, extra, extra_y)
    }

    fn clone_box(&self) -> Box<dyn Resampler> {
        Box::new(self.clone())
    }
}
