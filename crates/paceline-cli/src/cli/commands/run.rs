//! `paceline run` – score the given files against the configured backend.

use anyhow::Result;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use paceline_core::budget::BudgetTracker;
use paceline_core::config::PacelineConfig;
use paceline_core::scheduler::{ProgressSnapshot, Scheduler};
use paceline_core::service::ScoreClient;

use crate::files;
use crate::report::{default_report_path, BatchReport, FileEntry};

pub struct RunArgs {
    pub paths: Vec<PathBuf>,
    pub refresh: bool,
    pub strict: bool,
    pub limit: Option<u64>,
    pub workers: Option<usize>,
}

pub async fn run_batch(cfg: &PacelineConfig, args: RunArgs) -> Result<()> {
    let mut cfg = cfg.clone();
    if let Some(limit) = args.limit {
        cfg.budget_limit = limit;
    }
    if let Some(workers) = args.workers {
        cfg.max_workers = workers;
    }
    cfg.validate()?;

    if cfg.budget_limit == 0 {
        println!("Budget limit is 0; nothing to run.");
        return Ok(());
    }
    if args.paths.is_empty() {
        println!("No input paths given.");
        return Ok(());
    }

    let sources = files::collect_source_files(&args.paths, &cfg.ignore)?;
    if sources.is_empty() {
        println!("No scoreable files found.");
        return Ok(());
    }

    let report_path = cfg.report_path.clone().unwrap_or_else(default_report_path);
    let mut batch_report = BatchReport::load(&report_path)?;

    // Split intake into work, unchanged carry-overs, and oversize skips.
    let mut to_score = Vec::new();
    let mut unchanged = 0usize;
    let mut oversize = 0usize;
    for file in sources {
        let path_str = file.path.display().to_string();
        if file.cost > cfg.max_task_cost {
            oversize += 1;
            tracing::info!(path = %path_str, cost = file.cost, "over the task cost ceiling");
            batch_report.upsert(FileEntry {
                path: path_str,
                digest: file.digest,
                cost: file.cost,
                attempts: 0,
                score: None,
                error: None,
                skipped: Some(format!(
                    "cost {} exceeds max_task_cost {}",
                    file.cost, cfg.max_task_cost
                )),
            });
            continue;
        }
        if !args.refresh {
            if let Some(entry) = batch_report.find(&path_str) {
                if entry.is_current(&file.digest) {
                    unchanged += 1;
                    continue;
                }
            }
        }
        to_score.push(file);
    }

    println!(
        "Files: {} to score, {} unchanged, {} over the cost ceiling",
        to_score.len(),
        unchanged,
        oversize
    );

    if to_score.is_empty() {
        batch_report.save(&report_path)?;
        println!("Nothing to score.");
        return Ok(());
    }

    let client = ScoreClient::from_config(&cfg.service)?;
    let budget = Arc::new(BudgetTracker::per_minute(cfg.budget_limit));
    let mut scheduler = Scheduler::new(Arc::clone(&budget), cfg.retry_policy(), cfg.max_workers);

    let mut digests: HashMap<String, String> = HashMap::new();
    let task_count = to_score.len();
    for file in to_score {
        let label = file.path.display().to_string();
        digests.insert(label.clone(), file.digest);
        let client = client.clone();
        let payload = file.payload;
        scheduler.add_task(label, file.cost, move |guidance| {
            client.submit(&payload, guidance)
        });
    }

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressSnapshot>(16);
    let progress_handle = tokio::spawn(async move {
        while let Some(snapshot) = progress_rx.recv().await {
            let load = if snapshot.active_load {
                "  [window active]"
            } else {
                ""
            };
            eprint!(
                "\rProgress {:>3}% ({} / {} cost){}   ",
                snapshot.percent(),
                snapshot.completed_cost,
                snapshot.total_cost,
                load
            );
            let _ = std::io::stderr().flush();
        }
        eprintln!();
    });

    let start = Instant::now();
    let outcomes = scheduler.run_batch(Some(progress_tx)).await;
    let _ = progress_handle.await;

    let mut failed = 0usize;
    for outcome in outcomes {
        let digest = digests.remove(&outcome.label).unwrap_or_default();
        let (score, error) = match outcome.outcome {
            Ok(value) => (Some(value), None),
            Err(e) => {
                failed += 1;
                tracing::warn!(path = %outcome.label, "scoring failed: {e}");
                (None, Some(e.to_string()))
            }
        };
        batch_report.upsert(FileEntry {
            path: outcome.label,
            digest,
            cost: outcome.cost,
            attempts: outcome.attempts,
            score,
            error,
            skipped: None,
        });
    }
    batch_report.save(&report_path)?;

    println!(
        "Scored {} file(s) in {:.1}s, {} failed; report: {}",
        task_count,
        start.elapsed().as_secs_f64(),
        failed,
        report_path.display()
    );

    if failed > 0 && args.strict {
        anyhow::bail!("{failed} scoring task(s) failed");
    }
    Ok(())
}
