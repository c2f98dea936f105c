//! K-Nearest Neighbors implementation
//!
//! KNN classifier and regressor with distance metrics, usable as the terminal
//! stage of a pipeline.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::str::FromStr;

use crate::error::{KolosalError, Result};
use crate::params::{expect_f64, expect_usize, HasParams, ParamMap, ParamValue};
use crate::stage::Estimator;
use crate::training::metrics;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
    /// Cosine similarity (converted to distance)
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Manhattan => write!(f, "manhattan"),
            DistanceMetric::Minkowski(_) => write!(f, "minkowski"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            "minkowski" => Ok(DistanceMetric::Minkowski(2.0)),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(KolosalError::invalid_value(
                "metric",
                other,
                "expected euclidean, manhattan, minkowski or cosine",
            )),
        }
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

impl fmt::Display for WeightScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightScheme::Uniform => write!(f, "uniform"),
            WeightScheme::Distance => write!(f, "distance"),
        }
    }
}

impl FromStr for WeightScheme {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(WeightScheme::Uniform),
            "distance" => Ok(WeightScheme::Distance),
            other => Err(KolosalError::invalid_value(
                "weights",
                other,
                "expected uniform or distance",
            )),
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Weighting scheme
    pub weights: WeightScheme,
    /// Minkowski exponent; only read when `metric` is minkowski
    pub p: f64,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
            p: 2.0,
        }
    }
}

impl KNNConfig {
    fn names() -> Vec<String> {
        ["metric", "n_neighbors", "p", "weights"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn params(&self) -> ParamMap {
        ParamMap::from([
            ("metric".to_string(), ParamValue::Str(self.metric.to_string())),
            ("n_neighbors".to_string(), ParamValue::from(self.n_neighbors)),
            ("p".to_string(), ParamValue::Float(self.p)),
            ("weights".to_string(), ParamValue::Str(self.weights.to_string())),
        ])
    }

    fn set(&mut self, owner: &str, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.n_neighbors = expect_usize(name, value, 1)?,
            "weights" => self.weights = expect_str(name, value)?.parse()?,
            "metric" => {
                self.metric = match expect_str(name, value)?.parse()? {
                    DistanceMetric::Minkowski(_) => DistanceMetric::Minkowski(self.p),
                    other => other,
                };
            }
            "p" => {
                let p = expect_f64(name, value)?;
                if p < 1.0 {
                    return Err(KolosalError::invalid_value(name, value, "must be >= 1"));
                }
                self.p = p;
                if let DistanceMetric::Minkowski(_) = self.metric {
                    self.metric = DistanceMetric::Minkowski(p);
                }
            }
            _ => return Err(KolosalError::unknown_param(owner, name)),
        }
        Ok(())
    }
}

fn expect_str<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| KolosalError::invalid_value(name, value, "expected a string"))
}

/// Training data memorised by `fit`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Memory {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Memory {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, k: usize) -> Result<Self> {
        crate::data::check_aligned(x, y)?;
        if k > x.nrows() {
            return Err(KolosalError::ValidationError(format!(
                "n_neighbors ({}) exceeds the number of training samples ({})",
                k,
                x.nrows()
            )));
        }
        Ok(Self {
            x: x.to_owned(),
            y: y.to_owned(),
        })
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.x.ncols() {
            return Err(KolosalError::ShapeError {
                stage: "knn".to_string(),
                expected: format!("{} features", self.x.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Apply `f` to the neighbor set of every query row (parallelized)
    fn map_neighbors<F>(&self, x: &Array2<f64>, config: &KNNConfig, f: F) -> Array1<f64>
    where
        F: Fn(&[(f64, f64)]) -> f64 + Sync,
    {
        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors =
                    find_k_nearest(x.row(i), &self.x, &self.y, config.n_neighbors, config.metric);
                f(&neighbors)
            })
            .collect();
        Array1::from_vec(predictions)
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    memory: Option<Memory>,
    classes: Vec<i64>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            memory: None,
            classes: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }

    /// Classes seen during fit, ascending
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Predict class probabilities, one column per entry of `classes()`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let memory = self.memory.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        memory.check_width(x)?;
        let n_classes = self.classes.len();

        let probs: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .flat_map_iter(|i| {
                let neighbors = find_k_nearest(
                    x.row(i),
                    &memory.x,
                    &memory.y,
                    self.config.n_neighbors,
                    self.config.metric,
                );
                class_probs_from(&neighbors, &self.classes, self.config.weights)
            })
            .collect();

        Ok(Array2::from_shape_vec((x.nrows(), n_classes), probs)?)
    }
}

impl HasParams for KNNClassifier {
    fn param_names(&self) -> Vec<String> {
        KNNConfig::names()
    }

    fn get_params(&self) -> ParamMap {
        self.config.params()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.config.set("KNNClassifier", name, value)
    }
}

impl Estimator for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let memory = Memory::fit(x, y, self.config.n_neighbors)?;
        let mut classes: Vec<i64> = y.iter().map(|&v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        self.classes = classes;
        self.memory = Some(memory);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        memory.check_width(x)?;
        let weights = self.config.weights;
        Ok(memory.map_neighbors(x, &self.config, |neighbors| vote_classify(neighbors, weights)))
    }

    fn n_features_in(&self) -> Option<usize> {
        self.memory.as_ref().map(|m| m.x.ncols())
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    memory: Option<Memory>,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            memory: None,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }
}

impl HasParams for KNNRegressor {
    fn param_names(&self) -> Vec<String> {
        KNNConfig::names()
    }

    fn get_params(&self) -> ParamMap {
        self.config.params()
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        self.config.set("KNNRegressor", name, value)
    }
}

impl Estimator for KNNRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.memory = Some(Memory::fit(x, y, self.config.n_neighbors)?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        memory.check_width(x)?;
        let weights = self.config.weights;
        Ok(memory.map_neighbors(x, &self.config, |neighbors| weighted_mean_from(neighbors, weights)))
    }

    /// Coefficient of determination
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let predictions = self.predict(x)?;
        metrics::r2_score(y, &predictions)
    }

    fn n_features_in(&self) -> Option<usize> {
        self.memory.as_ref().map(|m| m.x.ncols())
    }

    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Shared helpers (used by both Classifier and Regressor)
// ============================================================================

/// Max-heap entry for partial sort (keeps k smallest distances, ties by row)
struct DistRow(f64, usize);

impl PartialEq for DistRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistRow {}
impl PartialOrd for DistRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k). Returns `(distance, label)`.
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let candidate = DistRow(compute_distance(point, row, metric), i);
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(top) = heap.peek() {
            if candidate < *top {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|DistRow(d, i)| (d, y_train[i]))
        .collect()
}

/// Compute distance between two points using the specified metric
fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| {
                let d = ai - bi;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
        DistanceMetric::Cosine => {
            let mut dot = 0.0;
            let mut norm_a = 0.0;
            let mut norm_b = 0.0;
            for (ai, bi) in a.iter().zip(b.iter()) {
                dot += ai * bi;
                norm_a += ai * ai;
                norm_b += bi * bi;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom > 0.0 {
                1.0 - (dot / denom)
            } else {
                1.0
            }
        }
    }
}

fn neighbor_weight(dist: f64, weights: WeightScheme) -> f64 {
    match weights {
        WeightScheme::Uniform => 1.0,
        WeightScheme::Distance => 1.0 / (dist + 1e-10),
    }
}

/// Classify by weighted majority vote; tied votes go to the smallest class
fn vote_classify(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let mut votes: BTreeMap<i64, f64> = BTreeMap::new();
    for &(dist, label) in neighbors {
        *votes.entry(label.round() as i64).or_insert(0.0) += neighbor_weight(dist, weights);
    }
    let mut best: Option<(i64, f64)> = None;
    for (label, weight) in votes {
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((label, weight));
        }
    }
    best.map(|(label, _)| label as f64).unwrap_or(0.0)
}

/// Compute class probabilities
fn class_probs_from(neighbors: &[(f64, f64)], classes: &[i64], weights: WeightScheme) -> Vec<f64> {
    let mut counts = vec![0.0; classes.len()];
    let mut total = 0.0;
    for &(dist, label) in neighbors {
        let weight = neighbor_weight(dist, weights);
        if let Ok(class_idx) = classes.binary_search(&(label.round() as i64)) {
            counts[class_idx] += weight;
            total += weight;
        }
    }
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

/// Compute weighted mean for regression
fn weighted_mean_from(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for &(dist, y) in neighbors {
        let w = neighbor_weight(dist, weights);
        weighted_sum += w * y;
        weight_total += w;
    }
    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        // Create linearly separable data
        let x = Array2::from_shape_vec((20, 2), vec![
            // Class 0 (low values)
            1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0,
            1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
            // Class 1 (high values)
            8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0,
            8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
        ]).unwrap();

        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        ]);

        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        assert_eq!(predictions, y);
        assert_eq!(knn.score(&x, &y).unwrap(), 1.0);
        assert_eq!(knn.classes(), &[0, 1]);
    }

    #[test]
    fn test_knn_regressor() {
        let x = Array2::from_shape_vec((10, 2), (0..20).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = x.rows().into_iter().map(|row| row[0] + row[1]).collect();

        let mut knn = KNNRegressor::with_k(3);
        knn.fit(&x, &y).unwrap();

        let predictions = knn.predict(&x).unwrap();
        let mse = metrics::mean_squared_error(&y, &predictions).unwrap();
        assert!(mse < 10.0, "MSE ({}) should be low", mse);
        assert!(knn.score(&x, &y).unwrap() > 0.9);
    }

    #[test]
    fn test_distance_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Euclidean) - 5.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Manhattan) - 7.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Minkowski(1.0)) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_knn_and_proba() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::new(KNNConfig {
            n_neighbors: 5,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        knn.fit(&x, &y).unwrap();

        assert_eq!(knn.predict(&x).unwrap().len(), 20);
        let proba = knn.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (20, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_vote_tie_goes_to_smallest_class() {
        let neighbors = [(1.0, 1.0), (1.0, 0.0)];
        assert_eq!(vote_classify(&neighbors, WeightScheme::Uniform), 0.0);
    }

    #[test]
    fn test_params_roundtrip() {
        let mut knn = KNNClassifier::with_k(1);
        knn.set_param("weights", &ParamValue::from("distance")).unwrap();
        knn.set_param("metric", &ParamValue::from("manhattan")).unwrap();
        let params = knn.get_params();
        assert_eq!(params["weights"], ParamValue::from("distance"));
        assert_eq!(params["metric"], ParamValue::from("manhattan"));
        assert_eq!(params["p"], ParamValue::Float(2.0));

        knn.set_param("p", &ParamValue::Float(3.0)).unwrap();
        knn.set_param("metric", &ParamValue::from("minkowski")).unwrap();
        assert_eq!(knn.config().metric, DistanceMetric::Minkowski(3.0));

        assert!(knn.set_param("weights", &ParamValue::from("gaussian")).is_err());
        assert!(knn.set_param("n_neighbors", &ParamValue::Int(0)).is_err());
        assert!(knn.set_param("leaf_size", &ParamValue::Int(30)).is_err());
    }

    #[test]
    fn test_p_does_not_override_metric() {
        let apply = |order: [(&str, ParamValue); 2]| {
            let mut knn = KNNClassifier::with_k(1);
            for (name, value) in &order {
                knn.set_param(name, value).unwrap();
            }
            knn.config().metric
        };
        let metric = ("metric", ParamValue::from("manhattan"));
        let p = ("p", ParamValue::Float(3.0));
        assert_eq!(apply([metric.clone(), p.clone()]), DistanceMetric::Manhattan);
        assert_eq!(apply([p.clone(), metric]), DistanceMetric::Manhattan);

        let minkowski = ("metric", ParamValue::from("minkowski"));
        assert_eq!(apply([minkowski.clone(), p.clone()]), DistanceMetric::Minkowski(3.0));
        assert_eq!(apply([p, minkowski]), DistanceMetric::Minkowski(3.0));
    }

    #[test]
    fn test_errors() {
        let knn = KNNClassifier::with_k(1);
        assert!(matches!(knn.predict(&array![[1.0]]), Err(KolosalError::ModelNotFitted)));

        let mut knn = KNNClassifier::with_k(5);
        assert!(knn.fit(&array![[1.0], [2.0]], &array![0.0, 1.0]).is_err());

        let mut knn = KNNClassifier::with_k(1);
        knn.fit(&array![[1.0, 2.0], [2.0, 3.0]], &array![0.0, 1.0]).unwrap();
        let err = knn.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, KolosalError::ShapeError { .. }));
    }
}
