//! Reclaims disk space from aged media files.
//!
//! `sweep` walks the output root without following symbolic links and
//! deletes only files whose name carries a targeted suffix, no protected
//! suffix, and whose modification time is older than the policy allows.
//! Transcripts, summaries, metadata and images are never touched.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::RetentionConfig;
use crate::error::FilesystemError;
use crate::sanitize;

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Which files a sweep may delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    /// Lowercase suffixes that are never deleted.
    pub protected_suffixes: Vec<String>,
    /// Lowercase suffixes eligible for deletion.
    pub targeted_suffixes: Vec<String>,
}

impl RetentionPolicy {
    pub fn new(
        max_age: Duration,
        protected_suffixes: &[String],
        targeted_suffixes: &[String],
    ) -> Self {
        Self {
            max_age,
            protected_suffixes: protected_suffixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            targeted_suffixes: targeted_suffixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Whether the file name alone makes a file eligible.
    pub fn is_targeted(&self, file_name: &str) -> bool {
        let name = file_name.to_ascii_lowercase();
        let protected = self.protected_suffixes.iter().any(|s| name.ends_with(s));
        !protected && self.targeted_suffixes.iter().any(|s| name.ends_with(s))
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.max_age_days.saturating_mul(SECONDS_PER_DAY)),
            &config.protected_suffixes,
            &config.targeted_suffixes,
        )
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a sweep. A dry run reports what a real run would delete.
///
/// `scanned == deleted + skipped + failures.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanned: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub reclaimed_bytes: u64,
    pub affected: Vec<PathBuf>,
    pub failures: Vec<SweepFailure>,
    pub dry_run: bool,
}

impl SweepReport {
    fn fail(&mut self, path: PathBuf, error: impl ToString) {
        self.scanned += 1;
        self.failures.push(SweepFailure {
            path,
            error: error.to_string(),
        });
    }
}

/// Deletes aged media under `root` according to `policy`.
///
/// Symbolic links are counted as scanned and skipped; they are never
/// deleted or descended into. With `dry_run` nothing is modified.
pub fn sweep(root: &Path, policy: &RetentionPolicy, dry_run: bool) -> SweepReport {
    let mut report = SweepReport {
        dry_run,
        ..Default::default()
    };

    if std::fs::symlink_metadata(root).is_err() {
        debug!("Sweep root {} does not exist", sanitize::redact_path(root));
        return report;
    }

    let now = SystemTime::now();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!("Sweep could not read {}: {}", sanitize::redact_path(&path), e);
                report.fail(path, e);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        report.scanned += 1;

        if file_type.is_symlink() || !file_type.is_file() {
            report.skipped += 1;
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !policy.is_targeted(&name) {
            report.skipped += 1;
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                report.scanned -= 1;
                report.fail(entry.path().to_path_buf(), e);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or_default();
        if age <= policy.max_age {
            report.skipped += 1;
            continue;
        }

        let size = metadata.len();
        let path = entry.path().to_path_buf();

        if dry_run {
            info!(
                "[dry-run] would delete {} ({:.1} MiB)",
                sanitize::redact_path(&path),
                size as f64 / 1_048_576.0
            );
        } else if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to delete {}: {}", sanitize::redact_path(&path), e);
            report.scanned -= 1;
            report.fail(path, e);
            continue;
        } else {
            debug!("Deleted {} ({} bytes)", sanitize::redact_path(&path), size);
        }

        report.deleted += 1;
        report.reclaimed_bytes += size;
        report.affected.push(path);
    }

    info!(
        "Sweep of {}{}: scanned {}, deleted {}, skipped {}, {} bytes, {} failures",
        sanitize::redact_path(root),
        if dry_run { " (dry run)" } else { "" },
        report.scanned,
        report.deleted,
        report.skipped,
        report.reclaimed_bytes,
        report.failures.len()
    );
    report
}

/// Deletes top-level regular files in `temp_dir` older than `max_age`.
/// `.gitkeep` and symbolic links are left alone. Returns how many files
/// were removed.
pub fn purge_orphans(temp_dir: &Path, max_age: Duration) -> Result<usize, FilesystemError> {
    let entries = match std::fs::read_dir(temp_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(FilesystemError {
                path: temp_dir.to_path_buf(),
                source: e,
            })
        }
    };

    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError {
            path: temp_dir.to_path_buf(),
            source: e,
        })?;
        if entry.file_name() == ".gitkeep" {
            continue;
        }

        let path = entry.path();
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) if m.file_type().is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot stat {}: {}", sanitize::redact_path(&path), e);
                continue;
            }
        };

        let stale = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .is_some_and(|age| age > max_age);
        if !stale {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed stale temp file {}", sanitize::redact_path(&path));
                deleted += 1;
            }
            Err(e) => warn!("Failed to remove orphan {}: {}", sanitize::redact_path(&path), e),
        }
    }

    if deleted > 0 {
        info!("Temp cleanup removed {} stale files", deleted);
    }
    Ok(deleted)
}
