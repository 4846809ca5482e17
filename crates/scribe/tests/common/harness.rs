//! Isolated environment: a temp dir holding the output root and the
//! database file, plus a scripted engine shared by every scheduler built
//! from the harness.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use scribe::db::Database;
use scribe::store::PathResolver;
use scribe::{Engines, JobEventBroadcaster, JobStore, Scheduler};

use super::ScriptedEngine;

/// Builds a private channel link.
pub fn link(channel: u64, message: u64) -> String {
    format!("https://t.me/c/{}/{}", channel, message)
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub output_root: PathBuf,
    pub db_path: PathBuf,
    pub engine: Arc<ScriptedEngine>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_root = temp_dir.path().join("output");
        std::fs::create_dir_all(&output_root).expect("Failed to create output root");
        let db_path = temp_dir.path().join("db").join("scribe.db");

        Self {
            temp_dir,
            output_root,
            db_path,
            engine: ScriptedEngine::new(),
        }
    }

    pub fn base(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn engines(&self) -> Engines {
        Engines::new(
            self.engine.clone(),
            self.engine.clone(),
            self.engine.clone(),
            self.engine.clone(),
        )
    }

    /// Opens a store on the harness database bound to `output_root`.
    pub fn store_at(&self, output_root: &Path) -> JobStore {
        let db = Database::open(&self.db_path).expect("Failed to open database");
        JobStore::new(db, PathResolver::new(output_root))
    }

    pub fn store(&self) -> JobStore {
        self.store_at(&self.output_root)
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler_with_events(JobEventBroadcaster::default())
    }

    pub fn scheduler_with_events(&self, events: JobEventBroadcaster) -> Scheduler {
        Scheduler::new(self.store(), self.engines(), events)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
