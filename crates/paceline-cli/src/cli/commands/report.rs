//! `paceline report` – print the stored batch report.

use anyhow::Result;
use paceline_core::config::PacelineConfig;

use crate::report::{default_report_path, BatchReport};

pub fn run_report(cfg: &PacelineConfig) -> Result<()> {
    let path = cfg.report_path.clone().unwrap_or_else(default_report_path);
    let report = BatchReport::load(&path)?;
    if report.files.is_empty() {
        println!("No report at {}.", path.display());
        return Ok(());
    }

    println!("{:<10} {:<9} {:<8} PATH", "COST", "ATTEMPTS", "STATUS");
    for f in &report.files {
        println!(
            "{:<10} {:<9} {:<8} {}",
            f.cost,
            f.attempts,
            f.status(),
            f.path
        );
    }
    println!(
        "{} file(s), {} failed",
        report.files.len(),
        report.failed_count()
    );
    Ok(())
}
