//! A fake collaborator that writes small files into the work directory and
//! fails or cancels on demand.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scribe::pipeline::{Exporter, Fetcher, StageContext, Summarizer, Transcriber};
use scribe::{Stage, StageError};

#[derive(Default)]
pub struct ScriptedEngine {
    failures: Mutex<HashSet<(String, Stage)>>,
    calls: Mutex<HashMap<(String, Stage), usize>>,
    cancel_after: Mutex<Option<(Stage, Arc<AtomicBool>)>>,
    fetch_delay: Mutex<Option<Duration>>,
    empty_fetch: AtomicBool,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `stage` fail for the reference with normalized `key`.
    pub fn fail_on(&self, key: &str, stage: Stage) {
        self.failures.lock().unwrap().insert((key.to_string(), stage));
    }

    pub fn heal(&self, key: &str, stage: Stage) {
        self.failures.lock().unwrap().remove(&(key.to_string(), stage));
    }

    /// Sets `flag` right after `stage` finishes for any job.
    pub fn cancel_after(&self, stage: Stage, flag: Arc<AtomicBool>) {
        *self.cancel_after.lock().unwrap() = Some((stage, flag));
    }

    /// Makes fetch succeed without producing any file.
    pub fn fetch_nothing(&self, enabled: bool) {
        self.empty_fetch.store(enabled, Ordering::SeqCst);
    }

    pub fn slow_fetch(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    /// How often `stage` ran for `key`.
    pub fn calls(&self, key: &str, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(key.to_string(), stage))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|((_, s), _)| *s == stage)
            .map(|(_, n)| n)
            .sum()
    }

    fn enter(&self, ctx: &StageContext, stage: Stage) -> Result<(), StageError> {
        let key = ctx.reference.key();
        *self
            .calls
            .lock()
            .unwrap()
            .entry((key.clone(), stage))
            .or_default() += 1;

        if self.failures.lock().unwrap().contains(&(key, stage)) {
            return Err(StageError::for_stage(stage, "scripted failure"));
        }
        Ok(())
    }

    fn leave(&self, stage: Stage) {
        if let Some((after, flag)) = self.cancel_after.lock().unwrap().as_ref() {
            if *after == stage {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn write(ctx: &StageContext, stage: Stage, name: &str, body: &str) -> Result<PathBuf, StageError> {
        let path = ctx.work_dir.join(name);
        std::fs::write(&path, body).map_err(|e| StageError::for_stage(stage, e.to_string()))?;
        Ok(path)
    }

    fn require(stage: Stage, input: &Path) -> Result<String, StageError> {
        std::fs::read_to_string(input)
            .map_err(|e| StageError::for_stage(stage, format!("{}: {}", input.display(), e)))
    }
}

impl Fetcher for ScriptedEngine {
    fn fetch(&self, ctx: &StageContext) -> Result<Vec<PathBuf>, StageError> {
        self.enter(ctx, Stage::Fetch)?;
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.empty_fetch.load(Ordering::SeqCst) {
            self.leave(Stage::Fetch);
            return Ok(vec![]);
        }
        let media = Self::write(ctx, Stage::Fetch, "media.mp4", &ctx.reference.key())?;
        let meta = Self::write(ctx, Stage::Fetch, "meta.json", "{}")?;
        self.leave(Stage::Fetch);
        Ok(vec![media, meta])
    }
}

impl Transcriber for ScriptedEngine {
    fn transcribe(&self, ctx: &StageContext, media: &Path) -> Result<PathBuf, StageError> {
        self.enter(ctx, Stage::Transcribe)?;
        let source = Self::require(Stage::Transcribe, media)?;
        let path = Self::write(ctx, Stage::Transcribe, "transcript.txt", &format!("heard {}", source))?;
        self.leave(Stage::Transcribe);
        Ok(path)
    }
}

impl Summarizer for ScriptedEngine {
    fn summarize(&self, ctx: &StageContext, transcript: &Path) -> Result<PathBuf, StageError> {
        self.enter(ctx, Stage::Summarize)?;
        let text = Self::require(Stage::Summarize, transcript)?;
        let path = Self::write(ctx, Stage::Summarize, "summary.md", &format!("# {}", text))?;
        self.leave(Stage::Summarize);
        Ok(path)
    }
}

impl Exporter for ScriptedEngine {
    fn export(
        &self,
        ctx: &StageContext,
        transcript: &Path,
        summary: &Path,
    ) -> Result<Vec<PathBuf>, StageError> {
        self.enter(ctx, Stage::Export)?;
        Self::require(Stage::Export, transcript)?;
        let summary = Self::require(Stage::Export, summary)?;
        let doc = Self::write(ctx, Stage::Export, "export.md", &summary)?;
        self.leave(Stage::Export);
        Ok(vec![doc])
    }
}
