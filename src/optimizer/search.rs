//! Exhaustive grid search with cross-validation
//!
//! Every `(grid point, fold)` pair is an independent task. Tasks run on a
//! dedicated rayon pool and their outcomes are collected in enumeration
//! order, so aggregation and selection do not depend on scheduling.

use super::config::{ErrorPolicy, SearchConfig};
use super::grid::{GridPoint, ParamGrid};
use super::result::{CandidateStatus, CandidateSummary, CvFoldResult, SearchPlan, SearchResult};
use super::scoring::Scoring;
use crate::data::check_aligned;
use crate::error::{KolosalError, Result};
use crate::stage::Estimator;
use crate::training::{CVResults, CrossValidator};
use chrono::Utc;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Progress notifications, emitted from worker threads
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// The search size is known; no fit has started yet
    Planned(SearchPlan),
    /// A fold task finished (`score` is `None` on failure)
    FoldFinished {
        point: usize,
        fold: usize,
        score: Option<f64>,
        completed: usize,
        total: usize,
    },
    /// The winner was refitted on all rows
    Refitted { point: usize, fit_secs: f64 },
}

pub type ProgressFn = Arc<dyn Fn(&SearchEvent) + Send + Sync>;

/// Train/test arrays of one fold, shared read-only by every task
struct FoldData {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

enum FoldOutcome {
    Scored { score: f64, secs: f64 },
    Failed { error: KolosalError, secs: f64 },
    Skipped,
}

impl FoldOutcome {
    fn is_failed(&self) -> bool {
        matches!(self, FoldOutcome::Failed { .. })
    }
}

/// Grid search driver
#[derive(Clone, Default)]
pub struct GridSearch {
    config: SearchConfig,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for GridSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridSearch")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl GridSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Register a progress callback
    pub fn with_progress(mut self, f: impl Fn(&SearchEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn emit(&self, event: SearchEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    /// Validate the grid against `estimator` and count the fits a search would run.
    ///
    /// Every scheduled point is applied to a fresh clone, so unknown names and
    /// rejected values both fail here, before anything is fitted.
    pub fn plan(&self, estimator: &dyn Estimator, grid: &ParamGrid) -> Result<SearchPlan> {
        self.config.validate()?;
        grid.validate()?;
        grid.check_names(&estimator.param_names())?;

        let n_points = grid.len()?;
        let n_folds = self.config.n_folds();
        let n_scheduled = match self.config.max_fits {
            Some(max_fits) => n_points.min((max_fits - 1) / n_folds),
            None => n_points,
        };
        let total_fits = n_scheduled
            .checked_mul(n_folds)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| KolosalError::ConfigError("total fit count overflows usize".to_string()))?;

        // every value must be accepted by its stage before the first fit
        for (index, point) in grid.iter().take(n_scheduled).enumerate() {
            let mut candidate = estimator.clone_box();
            point.apply_to(candidate.as_mut()).map_err(|e| {
                KolosalError::ConfigError(format!("grid point {} [{}] rejected: {}", index, point, e))
            })?;
        }

        Ok(SearchPlan {
            n_points,
            n_scheduled,
            n_folds,
            total_fits,
        })
    }

    /// Score every grid point on every fold, pick the best mean and refit it on all of `(x, y)`
    pub fn search(
        &self,
        estimator: &dyn Estimator,
        grid: &ParamGrid,
        x: &Array2<f64>,
        y: &Array1<f64>,
        scoring: &Scoring,
    ) -> Result<SearchResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        check_aligned(x, y)?;
        let plan = self.plan(estimator, grid)?;
        if plan.n_scheduled < plan.n_points {
            info!(
                scheduled = plan.n_scheduled,
                total = plan.n_points,
                "max_fits budget truncates the grid"
            );
        }
        info!(
            points = plan.n_scheduled,
            folds = plan.n_folds,
            total_fits = plan.total_fits,
            scoring = %scoring,
            "Grid search planned"
        );
        self.emit(SearchEvent::Planned(plan));

        let mut cv = CrossValidator::new(self.config.cv.clone());
        if let Some(seed) = self.config.random_state {
            cv = cv.with_random_state(seed);
        }
        let folds: Vec<FoldData> = cv
            .split(x.nrows(), Some(y))?
            .into_iter()
            .map(|split| FoldData {
                x_train: x.select(Axis(0), &split.train_indices),
                y_train: y.select(Axis(0), &split.train_indices),
                x_test: x.select(Axis(0), &split.test_indices),
                y_test: y.select(Axis(0), &split.test_indices),
            })
            .collect();

        let points: Vec<GridPoint> = grid.iter().take(plan.n_scheduled).collect();
        let outcomes = self.run_tasks(estimator, &points, &folds, scoring, plan.total_fits)?;

        if self.config.error_policy == ErrorPolicy::Raise && outcomes.iter().any(FoldOutcome::is_failed) {
            return Err(first_failure(&points, outcomes, plan.n_folds));
        }

        let n_fits = outcomes
            .iter()
            .filter(|o| !matches!(o, FoldOutcome::Skipped))
            .count()
            + 1;
        let fold_results = fold_results(&outcomes, plan.n_folds);
        let candidates = summarize(&points, &fold_results, plan.n_folds);

        let best = select_best(&candidates).ok_or_else(|| {
            KolosalError::ValidationError(
                "no grid point produced a usable mean score".to_string(),
            )
        })?;
        let best_params = points[best].clone();
        let best_score = candidates[best].mean_score.unwrap_or(f64::NAN);

        let refit_start = Instant::now();
        let mut best_estimator = estimator.clone_box();
        best_params
            .apply_to(best_estimator.as_mut())
            .and_then(|_| best_estimator.fit(x, y))
            .map_err(|e| KolosalError::FitFailure {
                point: best,
                fold: None,
                params: best_params.to_string(),
                source: Box::new(e),
            })?;
        let fit_secs = refit_start.elapsed().as_secs_f64();
        self.emit(SearchEvent::Refitted { point: best, fit_secs });

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            best_index = best,
            best_score,
            params = %best_params,
            fits = n_fits,
            elapsed_secs,
            "Grid search finished"
        );

        Ok(SearchResult {
            best_index: best,
            best_params,
            best_score,
            candidates,
            fold_results,
            plan,
            n_fits,
            scoring: scoring.name().to_string(),
            started_at,
            elapsed_secs,
            best_estimator,
        })
    }

    fn run_tasks(
        &self,
        estimator: &dyn Estimator,
        points: &[GridPoint],
        folds: &[FoldData],
        scoring: &Scoring,
        total_fits: usize,
    ) -> Result<Vec<FoldOutcome>> {
        let n_folds = folds.len();
        let n_tasks = points.len() * n_folds;
        let deadline = self
            .config
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
        let completed = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let raise = self.config.error_policy == ErrorPolicy::Raise;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs)
            .build()
            .map_err(|e| KolosalError::ThreadPoolError(e.to_string()))?;

        let outcomes: Vec<FoldOutcome> = pool.install(|| {
            (0..n_tasks)
                .into_par_iter()
                .map(|task| {
                    let (point_idx, fold_idx) = (task / n_folds, task % n_folds);
                    if abort.load(Ordering::Relaxed)
                        || deadline.map_or(false, |d| Instant::now() >= d)
                    {
                        return FoldOutcome::Skipped;
                    }

                    let point = &points[point_idx];
                    let fold = &folds[fold_idx];
                    let task_start = Instant::now();
                    let result = fit_and_score(estimator, point, fold, scoring);
                    let secs = task_start.elapsed().as_secs_f64();
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                    let score = result.as_ref().ok().copied();
                    self.emit(SearchEvent::FoldFinished {
                        point: point_idx,
                        fold: fold_idx,
                        score,
                        completed: done,
                        total: total_fits,
                    });

                    match result {
                        Ok(score) => {
                            debug!(point = point_idx, fold = fold_idx, score, secs, "Fold scored");
                            FoldOutcome::Scored { score, secs }
                        }
                        Err(error) => {
                            if raise {
                                abort.store(true, Ordering::Relaxed);
                            }
                            warn!(
                                point = point_idx,
                                fold = fold_idx,
                                params = %point,
                                error = %error,
                                "Fold failed"
                            );
                            FoldOutcome::Failed { error, secs }
                        }
                    }
                })
                .collect()
        });

        Ok(outcomes)
    }
}

fn fit_and_score(estimator: &dyn Estimator, point: &GridPoint, fold: &FoldData, scoring: &Scoring) -> Result<f64> {
    let mut model = estimator.clone_box();
    point.apply_to(model.as_mut())?;
    model.fit(&fold.x_train, &fold.y_train)?;
    scoring.score(model.as_ref(), &fold.x_test, &fold.y_test)
}

/// Earliest failure in enumeration order, wrapped with its context
fn first_failure(points: &[GridPoint], outcomes: Vec<FoldOutcome>, n_folds: usize) -> KolosalError {
    for (task, outcome) in outcomes.into_iter().enumerate() {
        if let FoldOutcome::Failed { error, .. } = outcome {
            let point = task / n_folds;
            return KolosalError::FitFailure {
                point,
                fold: Some(task % n_folds),
                params: points[point].to_string(),
                source: Box::new(error),
            };
        }
    }
    KolosalError::ValidationError("search aborted without a recorded failure".to_string())
}

fn fold_results(outcomes: &[FoldOutcome], n_folds: usize) -> Vec<CvFoldResult> {
    outcomes
        .iter()
        .enumerate()
        .map(|(task, outcome)| {
            let (point, fold) = (task / n_folds, task % n_folds);
            match outcome {
                FoldOutcome::Scored { score, secs } => CvFoldResult {
                    point,
                    fold,
                    score: Some(*score),
                    error: None,
                    fit_secs: *secs,
                    skipped: false,
                },
                FoldOutcome::Failed { error, secs } => CvFoldResult {
                    point,
                    fold,
                    score: None,
                    error: Some(error.to_string()),
                    fit_secs: *secs,
                    skipped: false,
                },
                FoldOutcome::Skipped => CvFoldResult {
                    point,
                    fold,
                    score: None,
                    error: None,
                    fit_secs: 0.0,
                    skipped: true,
                },
            }
        })
        .collect()
}

fn summarize(points: &[GridPoint], results: &[CvFoldResult], n_folds: usize) -> Vec<CandidateSummary> {
    let mut candidates: Vec<CandidateSummary> = points
        .iter()
        .enumerate()
        .map(|(index, params)| {
            let folds = &results[index * n_folds..(index + 1) * n_folds];
            let fold_scores: Vec<Option<f64>> = folds.iter().map(|r| r.score).collect();
            let failed_folds: Vec<usize> = folds
                .iter()
                .filter(|r| r.error.is_some())
                .map(|r| r.fold)
                .collect();
            let ran: Vec<&CvFoldResult> = folds.iter().filter(|r| !r.skipped).collect();
            let mean_fit_secs = if ran.is_empty() {
                0.0
            } else {
                ran.iter().map(|r| r.fit_secs).sum::<f64>() / ran.len() as f64
            };

            let cv = CVResults::from_scores(fold_scores.iter().flatten().copied().collect());
            let status = if ran.len() < n_folds {
                CandidateStatus::Incomplete
            } else if cv.is_none() {
                CandidateStatus::Failed
            } else if !failed_folds.is_empty() {
                CandidateStatus::Degraded { failed_folds }
            } else {
                CandidateStatus::Complete
            };

            CandidateSummary {
                index,
                params: params.clone(),
                fold_scores,
                mean_score: cv.as_ref().map(|c| c.mean_score),
                std_score: cv.as_ref().map(|c| c.std_score),
                rank: None,
                status,
                mean_fit_secs,
            }
        })
        .collect();

    let eligible: Vec<f64> = candidates.iter().filter_map(selectable_mean).collect();
    for candidate in &mut candidates {
        if let Some(mean) = selectable_mean(candidate) {
            candidate.rank = Some(1 + eligible.iter().filter(|&&m| m > mean).count());
        }
    }
    candidates
}

fn selectable_mean(candidate: &CandidateSummary) -> Option<f64> {
    if !candidate.status.is_eligible() {
        return None;
    }
    candidate.mean_score.filter(|m| !m.is_nan())
}

/// Highest mean; exact ties keep the earliest point
fn select_best(candidates: &[CandidateSummary]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for candidate in candidates {
        if let Some(mean) = selectable_mean(candidate) {
            if best.map_or(true, |(_, b)| mean > b) {
                best = Some((candidate.index, mean));
            }
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ParamSpace;
    use crate::training::KNNClassifier;

    fn summary(index: usize, mean: Option<f64>, status: CandidateStatus) -> CandidateSummary {
        CandidateSummary {
            index,
            params: GridPoint::default(),
            fold_scores: vec![],
            mean_score: mean,
            std_score: None,
            rank: None,
            status,
            mean_fit_secs: 0.0,
        }
    }

    #[test]
    fn test_select_best_tie_goes_to_first() {
        let candidates = vec![
            summary(0, Some(0.5), CandidateStatus::Complete),
            summary(1, Some(0.9), CandidateStatus::Complete),
            summary(2, Some(0.9), CandidateStatus::Complete),
        ];
        assert_eq!(select_best(&candidates), Some(1));
    }

    #[test]
    fn test_select_best_skips_nan_and_ineligible() {
        let candidates = vec![
            summary(0, Some(f64::NAN), CandidateStatus::Complete),
            summary(1, Some(0.99), CandidateStatus::Incomplete),
            summary(2, None, CandidateStatus::Failed),
            summary(3, Some(0.2), CandidateStatus::Degraded { failed_folds: vec![1] }),
        ];
        assert_eq!(select_best(&candidates), Some(3));
        assert_eq!(select_best(&candidates[..3]), None);
    }

    #[test]
    fn test_plan_counts() {
        let grid: ParamGrid = ParamSpace::new().add("n_neighbors", [1, 3, 5]).into();
        let knn = KNNClassifier::with_k(1);

        let plan = GridSearch::new(SearchConfig::new().with_cv_folds(4))
            .plan(&knn, &grid)
            .unwrap();
        assert_eq!(plan.n_points, 3);
        assert_eq!(plan.total_fits, 13);

        let plan = GridSearch::new(SearchConfig::new().with_cv_folds(4).with_max_fits(10))
            .plan(&knn, &grid)
            .unwrap();
        assert_eq!(plan.n_scheduled, 2);
        assert_eq!(plan.total_fits, 9);
    }

    #[test]
    fn test_plan_rejects_unknown_names() {
        let grid: ParamGrid = ParamSpace::new().add("knn__n_neighbors", [1]).into();
        let err = GridSearch::default()
            .plan(&KNNClassifier::with_k(1), &grid)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_plan_rejects_invalid_values() {
        let grid: ParamGrid = ParamSpace::new().add("n_neighbors", [1, 0]).into();
        let err = GridSearch::default()
            .plan(&KNNClassifier::with_k(1), &grid)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("grid point 1"));

        // points cut by the fit budget are never checked
        let plan = GridSearch::new(SearchConfig::new().with_cv_folds(2).with_max_fits(3))
            .plan(&KNNClassifier::with_k(1), &grid)
            .unwrap();
        assert_eq!(plan.n_scheduled, 1);
    }
}
