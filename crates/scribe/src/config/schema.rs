use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub output_root: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub temp_dir: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default = "default_orphan_retention_hours")]
    pub orphan_retention_hours: u64,
}

fn default_worker_count() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_orphan_retention_hours() -> u64 {
    24
}

impl Config {
    /// Minimal configuration rooted at `output_root`, every other field at
    /// its default.
    pub fn new(output_root: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            output_root: output_root.into(),
            database_path: None,
            temp_dir: None,
            worker_count: default_worker_count(),
            log_level: default_log_level(),
            retention: RetentionConfig::default(),
            orphan_retention_hours: default_orphan_retention_hours(),
        }
    }

    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(&self.output_root)
    }

    /// The configured database path, or `~/.scribe/data/scribe.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }

    /// Directory for partial downloads, `<output_root>/.tmp` unless set.
    pub fn temp_dir(&self) -> PathBuf {
        match &self.temp_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.output_root().join(".tmp"),
        }
    }
}

/// Which media files the cleanup sweep may delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    #[serde(default = "default_protected_suffixes")]
    pub protected_suffixes: Vec<String>,
    #[serde(default = "default_targeted_suffixes")]
    pub targeted_suffixes: Vec<String>,
}

fn default_max_age_days() -> u64 {
    7
}

pub fn default_protected_suffixes() -> Vec<String> {
    [
        ".txt", ".json", ".md", ".pdf", ".srt", ".vtt", ".png", ".jpg", ".jpeg", ".gif", ".webp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_targeted_suffixes() -> Vec<String> {
    [
        // video
        ".mp4", ".mov", ".avi", ".mkv", ".webm", ".flv", ".wmv", ".m4v",
        // audio
        ".wav", ".ogg", ".mp3", ".aac", ".flac", ".m4a", ".opus", ".wma",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            protected_suffixes: default_protected_suffixes(),
            targeted_suffixes: default_targeted_suffixes(),
        }
    }
}
