//! Batch report: one JSON document merged across runs.
//!
//! Each entry keeps the file's digest alongside its outcome, so the next
//! run can skip files whose content is unchanged instead of paying for a
//! fresh scoring call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one file in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub digest: String,
    pub cost: u64,
    #[serde(default)]
    pub attempts: u32,
    /// Opaque backend response; never interpreted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the file was never submitted (e.g. over the cost ceiling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl FileEntry {
    /// True when this entry already covers the given content and holds a
    /// usable score, so the file does not need re-scoring.
    pub fn is_current(&self, digest: &str) -> bool {
        self.digest == digest && self.error.is_none() && self.skipped.is_none()
    }

    pub fn status(&self) -> &'static str {
        if self.skipped.is_some() {
            "skipped"
        } else if self.error.is_some() {
            "failed"
        } else {
            "ok"
        }
    }
}

/// The merged report document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl BatchReport {
    /// Load the report, or an empty one if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("read report {}", path.display()))
            }
        };
        serde_json::from_str(&data).with_context(|| format!("parse report {}", path.display()))
    }

    /// Write the report, sorted by path for stable diffs.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.version = env!("CARGO_PKG_VERSION").to_string();
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        let data = serde_json::to_string_pretty(&self)?;
        fs::write(path, data).with_context(|| format!("write report {}", path.display()))?;
        Ok(())
    }

    pub fn find(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Insert or replace the entry for `entry.path`.
    pub fn upsert(&mut self, entry: FileEntry) {
        match self.files.iter_mut().find(|f| f.path == entry.path) {
            Some(existing) => *existing = entry,
            None => self.files.push(entry),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}

/// Default report location, next to where the batch was started.
pub fn default_report_path() -> PathBuf {
    PathBuf::from("paceline.report.json")
}
