//! CLI for the paceline batch scorer.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use paceline_core::config;
use std::path::PathBuf;

use commands::{run_batch, run_report, RunArgs};

/// Top-level CLI for the paceline batch scorer.
#[derive(Debug, Parser)]
#[command(name = "paceline")]
#[command(about = "paceline: budget-paced batch scoring for source files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Score files against the configured backend.
    Run {
        /// Files or directories to score.
        paths: Vec<PathBuf>,

        /// Re-score files even if their content is unchanged since the last report.
        #[arg(long)]
        refresh: bool,

        /// Exit non-zero if any task permanently failed.
        #[arg(long)]
        strict: bool,

        /// Override the per-minute cost budget from config.
        #[arg(long, value_name = "COST")]
        limit: Option<u64>,

        /// Override the worker pool ceiling from config.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Print the stored batch report.
    Report,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                paths,
                refresh,
                strict,
                limit,
                workers,
            } => {
                run_batch(
                    &cfg,
                    RunArgs {
                        paths,
                        refresh,
                        strict,
                        limit,
                        workers,
                    },
                )
                .await?;
            }
            CliCommand::Report => run_report(&cfg)?,
        }

        Ok(())
    }
}
