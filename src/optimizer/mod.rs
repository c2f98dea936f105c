//! Hyperparameter grid search
//!
//! Provides exhaustive search over parameter grids:
//! - Parameter grids (cartesian products and unions of them)
//! - Stratified cross-validated scoring of every grid point
//! - Parallel fold evaluation on a rayon pool
//! - Failure policies and fit/time budgets

mod config;
mod grid;
mod result;
mod scoring;
mod search;

pub use config::{ErrorPolicy, SearchConfig};
pub use grid::{GridIter, GridPoint, ParamGrid, ParamSpace};
pub use result::{CandidateStatus, CandidateSummary, CvFoldResult, SearchPlan, SearchReport, SearchResult};
pub use scoring::{ScoreFn, Scoring};
pub use search::{GridSearch, ProgressFn, SearchEvent};
