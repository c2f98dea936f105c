//! Search results and the serialisable report

use super::grid::GridPoint;
use crate::error::Result;
use crate::stage::Estimator;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::path::Path;

/// Size of a search, known before any fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchPlan {
    /// Points in the full grid
    pub n_points: usize,
    /// Points that fit in the `max_fits` budget
    pub n_scheduled: usize,
    pub n_folds: usize,
    /// `n_scheduled * n_folds + 1` (the final refit included)
    pub total_fits: usize,
}

/// Outcome of one `(grid point, fold)` task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvFoldResult {
    pub point: usize,
    pub fold: usize,
    pub score: Option<f64>,
    pub error: Option<String>,
    pub fit_secs: f64,
    /// Never started (deadline passed or the search was aborted)
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Every fold scored
    Complete,
    /// Some folds failed and were left out of the mean
    Degraded { failed_folds: Vec<usize> },
    /// No fold scored
    Failed,
    /// Some folds never ran
    Incomplete,
}

impl CandidateStatus {
    /// Whether a point in this state may be selected
    pub fn is_eligible(&self) -> bool {
        matches!(self, CandidateStatus::Complete | CandidateStatus::Degraded { .. })
    }
}

/// Aggregated scores of one grid point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSummary {
    pub index: usize,
    pub params: GridPoint,
    /// One entry per fold; `None` where the fold failed or was skipped
    pub fold_scores: Vec<Option<f64>>,
    pub mean_score: Option<f64>,
    pub std_score: Option<f64>,
    /// 1 is best; `None` for points that cannot be selected
    pub rank: Option<usize>,
    #[serde(flatten)]
    pub status: CandidateStatus,
    pub mean_fit_secs: f64,
}

/// Everything a search produced, including the refitted winner
#[derive(Debug)]
pub struct SearchResult {
    pub best_index: usize,
    pub best_params: GridPoint,
    pub best_score: f64,
    pub candidates: Vec<CandidateSummary>,
    pub fold_results: Vec<CvFoldResult>,
    pub plan: SearchPlan,
    /// Fits actually started, refit included
    pub n_fits: usize,
    pub scoring: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub(crate) best_estimator: Box<dyn Estimator>,
}

impl SearchResult {
    /// The winning configuration, refitted on the full dataset
    pub fn best_estimator(&self) -> &dyn Estimator {
        self.best_estimator.as_ref()
    }

    pub fn into_best_estimator(self) -> Box<dyn Estimator> {
        self.best_estimator
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.best_estimator.predict(x)
    }

    /// Points that lost folds to failures
    pub fn degraded(&self) -> impl Iterator<Item = &CandidateSummary> {
        self.candidates
            .iter()
            .filter(|c| matches!(c.status, CandidateStatus::Degraded { .. }))
    }

    pub fn report(&self) -> SearchReport {
        SearchReport {
            started_at: self.started_at,
            elapsed_secs: self.elapsed_secs,
            scoring: self.scoring.clone(),
            plan: self.plan,
            n_fits: self.n_fits,
            best_index: self.best_index,
            best_params: self.best_params.clone(),
            best_score: self.best_score,
            candidates: self.candidates.clone(),
            fold_results: self.fold_results.clone(),
        }
    }
}

/// Serialisable view of a [`SearchResult`] (the estimator itself is left out)
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub scoring: String,
    pub plan: SearchPlan,
    pub n_fits: usize,
    pub best_index: usize,
    pub best_params: GridPoint,
    pub best_score: f64,
    pub candidates: Vec<CandidateSummary>,
    pub fold_results: Vec<CvFoldResult>,
}

impl SearchReport {
    /// Candidates ordered by rank; unranked ones last, in grid order
    pub fn ranked(&self) -> Vec<&CandidateSummary> {
        let mut ranked: Vec<&CandidateSummary> = self.candidates.iter().collect();
        ranked.sort_by_key(|c| (c.rank.unwrap_or(usize::MAX), c.index));
        ranked
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
