//! Source file intake: read inputs, number their lines for the scorer,
//! estimate cost, and digest the content for incremental runs.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use paceline_core::digest;

/// One input ready for scoring.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Line-numbered content sent to the scoring backend.
    pub payload: String,
    /// Declared cost: the byte length of the raw content, which is a
    /// workable upper bound on token counts for code.
    pub cost: u64,
    /// SHA-256 of the raw content, used to skip unchanged files.
    pub digest: String,
}

/// Collect scoreable files from the given paths (directories are walked
/// recursively). Ignored paths, hidden entries, empty files, and
/// non-UTF-8 files are skipped. Results are sorted by path.
pub fn collect_source_files(paths: &[PathBuf], ignore: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut out = Vec::new();
    for path in paths {
        collect_into(path, ignore, &mut out)?;
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

fn collect_into(path: &Path, ignore: &[PathBuf], out: &mut Vec<SourceFile>) -> Result<()> {
    if is_ignored(path, ignore) {
        tracing::debug!(path = %path.display(), "ignored by config");
        return Ok(());
    }
    if path.is_dir() {
        let entries =
            fs::read_dir(path).with_context(|| format!("read directory {}", path.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("read directory {}", path.display()))?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            collect_into(&entry.path(), ignore, out)?;
        }
        return Ok(());
    }
    if let Some(file) = read_source_file(path)? {
        out.push(file);
    }
    Ok(())
}

fn read_source_file(path: &Path) -> Result<Option<SourceFile>> {
    let raw = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    if raw.is_empty() {
        return Ok(None);
    }
    let content = match String::from_utf8(raw) {
        Ok(s) => s,
        Err(_) => {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 file");
            return Ok(None);
        }
    };
    Ok(Some(SourceFile {
        payload: number_lines(&content),
        cost: content.len() as u64,
        digest: digest::sha256_hex(content.as_bytes()),
        path: path.to_path_buf(),
    }))
}

/// Prefix every line with its 1-based number so the scorer can reference
/// locations in its answer.
fn number_lines(code: &str) -> String {
    code.split('\n')
        .enumerate()
        .map(|(i, line)| format!("{} {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_ignored(path: &Path, ignore: &[PathBuf]) -> bool {
    ignore.iter().any(|ig| path == ig || path.starts_with(ig))
}
