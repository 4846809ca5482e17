//! Collaborator contracts for the four pipeline stages.
//!
//! Implementations wrap external services (the media client, speech-to-text,
//! the summarizer, the document renderer). They must write their outputs
//! somewhere durable, usually under `ctx.work_dir`, and return the paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StageError;

use super::context::StageContext;

/// Downloads the media referenced by the job.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, ctx: &StageContext) -> Result<Vec<PathBuf>, StageError>;
}

/// Produces a transcript from a media file.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, ctx: &StageContext, media: &Path) -> Result<PathBuf, StageError>;
}

/// Produces a summary from a transcript.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, ctx: &StageContext, transcript: &Path) -> Result<PathBuf, StageError>;
}

/// Renders the final documents from transcript and summary.
pub trait Exporter: Send + Sync {
    fn export(
        &self,
        ctx: &StageContext,
        transcript: &Path,
        summary: &Path,
    ) -> Result<Vec<PathBuf>, StageError>;
}

/// The set of engines a pipeline dispatches to.
#[derive(Clone)]
pub struct Engines {
    pub fetcher: Arc<dyn Fetcher>,
    pub transcriber: Arc<dyn Transcriber>,
    pub summarizer: Arc<dyn Summarizer>,
    pub exporter: Arc<dyn Exporter>,
}

impl Engines {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        exporter: Arc<dyn Exporter>,
    ) -> Self {
        Self {
            fetcher,
            transcriber,
            summarizer,
            exporter,
        }
    }
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines").finish_non_exhaustive()
    }
}
