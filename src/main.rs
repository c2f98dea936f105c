//! Kolosal Tune - Main Entry Point
//!
//! Plans and runs pipeline grid searches from the command line.

use clap::Parser;
use kolosal_tune::cli::{cmd_plan, cmd_search, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_tune=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { grid, cv_folds, show_points } => {
            cmd_plan(grid.as_deref(), cv_folds, show_points)?;
        }
        Commands::Search(args) => {
            cmd_search(&args)?;
        }
    }

    Ok(())
}
