//! Kolosal Tune CLI Module
//!
//! Command-line interface for planning and running grid searches over the
//! demo pipeline on a synthetic dataset.

use clap::{Args, Parser, Subcommand};
use colored::*;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::Dataset;
use crate::optimizer::{
    CandidateStatus, ErrorPolicy, GridSearch, ParamGrid, ParamSpace, Scoring, SearchConfig, SearchEvent,
    SearchReport,
};
use crate::pipeline::Pipeline;
use crate::preprocessing::{Pca, StandardScaler, VarianceThreshold};
use crate::stage::Stage;
use crate::synthetic::RandomOverSampler;
use crate::training::KNNClassifier;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-tune")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pipeline grid search with stratified cross-validation")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a grid against the demo pipeline and print the fit count
    Plan {
        /// Grid JSON file (an object or an array of objects); defaults to the built-in grid
        #[arg(short, long)]
        grid: Option<PathBuf>,

        /// Number of cross-validation folds
        #[arg(long, default_value = "5")]
        cv_folds: usize,

        /// List every grid point in enumeration order
        #[arg(long)]
        show_points: bool,
    },

    /// Run a grid search on a synthetic imbalanced dataset
    Search(SearchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Grid JSON file; defaults to the built-in grid
    #[arg(short, long)]
    pub grid: Option<PathBuf>,

    /// Search configuration JSON file; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of synthetic samples
    #[arg(long, default_value = "300")]
    pub samples: usize,

    /// Seed for the synthetic data and the demo stages
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of cross-validation folds
    #[arg(long)]
    pub cv_folds: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(short = 'j', long)]
    pub n_jobs: Option<usize>,

    /// Scoring rule (estimator, accuracy, balanced_accuracy, f1, neg_mean_squared_error, r2)
    #[arg(short, long, default_value = "balanced_accuracy")]
    pub scoring: String,

    /// Record failing folds instead of aborting
    #[arg(long)]
    pub tolerate_failures: bool,

    /// Ceiling on total fits, refit included
    #[arg(long)]
    pub max_fits: Option<usize>,

    /// Stop starting fold tasks after this many seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Write the JSON report here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of ranked candidates to print
    #[arg(long, default_value = "10")]
    pub top: usize,
}

// ─── Demo data and pipeline ────────────────────────────────────────────────────

/// Two-class dataset with a 4:1 class imbalance.
///
/// Columns: three informative features, one noise feature, one constant
/// feature (removed by the variance stage) and one redundant copy of the first.
pub fn synthetic_dataset(n_samples: usize, seed: u64) -> crate::Result<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_features = 6;
    let mut data = Vec::with_capacity(n_samples * n_features);
    let mut labels = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let class = if i % 5 == 0 { 1.0 } else { 0.0 };
        let shift = class * 1.5;
        let f0 = shift + noise(&mut rng);
        let f1 = shift + noise(&mut rng);
        let f2 = -shift + noise(&mut rng);
        let f3 = noise(&mut rng);
        data.extend_from_slice(&[f0, f1, f2, f3, 1.0, 2.0 * f0 + 0.1 * noise(&mut rng)]);
        labels.push(class);
    }

    let x = Array2::from_shape_vec((n_samples, n_features), data)?;
    Dataset::new(x, Array1::from_vec(labels))
}

/// Approximately standard normal (Irwin-Hall with 12 uniforms)
fn noise(rng: &mut ChaCha8Rng) -> f64 {
    (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0
}

/// `scaler → variance → sampler → pca → knn`
pub fn demo_pipeline(seed: u64) -> crate::Result<Pipeline> {
    Pipeline::builder()
        .step("scaler", Stage::transformer(StandardScaler::new()))
        .step("variance", Stage::transformer(VarianceThreshold::default()))
        .step("sampler", Stage::resampler(RandomOverSampler::new().with_seed(seed)))
        .step("pca", Stage::transformer(Pca::new(2).with_random_state(seed)))
        .step("knn", Stage::estimator(KNNClassifier::with_k(5)))
        .build()
}

pub fn default_grid() -> ParamGrid {
    ParamSpace::new()
        .add("pca__n_components", [2, 3])
        .add("knn__n_neighbors", [1, 3, 5, 7])
        .add("knn__weights", ["uniform", "distance"])
        .into()
}

fn load_grid(path: Option<&Path>) -> anyhow::Result<ParamGrid> {
    Ok(match path {
        Some(path) => ParamGrid::from_json_file(path)?,
        None => default_grid(),
    })
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_plan(grid_path: Option<&Path>, cv_folds: usize, show_points: bool) -> anyhow::Result<()> {
    section("Plan");

    let grid = load_grid(grid_path)?;
    let pipeline = demo_pipeline(0)?;
    let search = GridSearch::new(SearchConfig::new().with_cv_folds(cv_folds));
    let plan = search.plan(&pipeline, &grid)?;

    kv("Grid points", &plan.n_points.to_string());
    kv("Folds", &plan.n_folds.to_string());
    kv("Total fits", &format!("{} ({} × {} + 1)", plan.total_fits, plan.n_scheduled, plan.n_folds));

    if show_points {
        println!();
        for (i, point) in grid.iter().enumerate() {
            println!("  {:>4}  {}", dim(&i.to_string()), point);
        }
    }
    println!();
    Ok(())
}

pub fn cmd_search(args: &SearchArgs) -> anyhow::Result<()> {
    section("Search");

    let mut config = match &args.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::new().with_random_state(args.seed),
    };
    if let Some(k) = args.cv_folds {
        config = config.with_cv_folds(k);
    }
    if let Some(n) = args.n_jobs {
        config = config.with_n_jobs(n);
    }
    if args.tolerate_failures {
        config = config.with_error_policy(ErrorPolicy::Tolerate);
    }
    if let Some(m) = args.max_fits {
        config = config.with_max_fits(m);
    }
    if let Some(t) = args.timeout {
        config = config.with_timeout(t);
    }
    let scoring: Scoring = args.scoring.parse()?;
    let grid = load_grid(args.grid.as_deref())?;

    step_run("Generating data");
    let dataset = synthetic_dataset(args.samples, args.seed)?;
    let counts = dataset.class_counts();
    step_done(&format!(
        "{} rows × {} cols, classes {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        counts
    ));

    let pipeline = demo_pipeline(args.seed)?;
    let search = GridSearch::new(config).with_progress(print_progress);

    let start = Instant::now();
    let result = search.search(&pipeline, &grid, dataset.x(), dataset.y(), &scoring)?;
    let report = result.report();

    print_ranking(&report, args.top);

    println!();
    println!(
        "  {} {} {} {:.4}",
        ok("best"),
        report.best_params.to_string().as_str().white().bold(),
        muted(&format!("{}:", report.scoring)),
        report.best_score
    );
    println!(
        "  {}",
        dim(&format!("{} fits in {:.2?}", report.n_fits, start.elapsed()))
    );

    if let Some(path) = &args.output {
        step_run(&format!("Saving report → {}", path.display()));
        report.save(path)?;
        step_done("");
    }
    println!();
    Ok(())
}

fn print_progress(event: &SearchEvent) {
    match event {
        SearchEvent::Planned(plan) => {
            kv("Grid points", &format!("{} of {}", plan.n_scheduled, plan.n_points));
            kv("Folds", &plan.n_folds.to_string());
            kv("Total fits", &plan.total_fits.to_string());
            println!();
        }
        SearchEvent::FoldFinished { completed, total, .. } => {
            let step = (total / 10).max(1);
            if completed % step == 0 {
                println!("  {} {}/{} fits", accent("›"), completed, total);
            }
        }
        SearchEvent::Refitted { fit_secs, .. } => {
            println!("  {} refit best on all rows {}", ok("✓"), dim(&format!("{:.3}s", fit_secs)));
        }
    }
}

fn print_ranking(report: &SearchReport, top: usize) {
    println!();
    println!(
        "  {:>4} {:>10} {:>8}  {:<10} {}",
        muted("rank"),
        muted("mean"),
        muted("std"),
        muted("status"),
        muted("params")
    );
    println!("  {}", dim(&"─".repeat(56)));

    for candidate in report.ranked().into_iter().take(top) {
        let rank = candidate.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
        let mean = candidate
            .mean_score
            .map(|m| format!("{:.4}", m))
            .unwrap_or_else(|| "-".to_string());
        let std = candidate
            .std_score
            .map(|s| format!("{:.4}", s))
            .unwrap_or_else(|| "-".to_string());
        let status = match &candidate.status {
            CandidateStatus::Complete => ok("ok"),
            CandidateStatus::Degraded { failed_folds } => {
                format!("{} failed", failed_folds.len()).as_str().yellow()
            }
            CandidateStatus::Failed => "failed".red(),
            CandidateStatus::Incomplete => "skipped".yellow(),
        };
        println!(
            "  {:>4} {:>10} {:>8}  {:<10} {}",
            rank, mean, std, status, candidate.params
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::HasParams;

    #[test]
    fn test_synthetic_dataset_shape() {
        let ds = synthetic_dataset(100, 1).unwrap();
        assert_eq!(ds.n_samples(), 100);
        assert_eq!(ds.n_features(), 6);
        let counts = ds.class_counts();
        assert_eq!(counts[&1], 20);
        assert_eq!(counts[&0], 80);
    }

    #[test]
    fn test_default_grid_resolves_on_demo_pipeline() {
        let pipeline = demo_pipeline(0).unwrap();
        let grid = default_grid();
        assert_eq!(grid.expand_for(&pipeline).unwrap().len(), 16);
        assert!(pipeline.param_names().contains(&"sampler__random_state".to_string()));
    }

    #[test]
    fn test_cli_parses_search_flags() {
        let cli = Cli::parse_from([
            "kolosal-tune",
            "search",
            "--cv-folds",
            "3",
            "-j",
            "2",
            "--tolerate-failures",
            "--max-fits",
            "20",
        ]);
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.cv_folds, Some(3));
                assert_eq!(args.n_jobs, Some(2));
                assert!(args.tolerate_failures);
                assert_eq!(args.max_fits, Some(20));
                assert_eq!(args.scoring, "balanced_accuracy");
            }
            _ => panic!("expected search"),
        }
    }
}
