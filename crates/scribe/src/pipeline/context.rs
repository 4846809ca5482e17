use std::path::{Path, PathBuf};

use crate::error::StageError;
use crate::reference::SourceRef;

use super::Stage;

/// Everything an engine needs to know about the job it is working on.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: String,
    pub reference: SourceRef,
    pub output_root: PathBuf,
    /// `<output_root>/collected/<channel>/<message>`
    pub work_dir: PathBuf,
}

impl StageContext {
    pub fn new(job_id: &str, reference: SourceRef, output_root: &Path) -> Self {
        Self {
            job_id: job_id.to_string(),
            reference,
            output_root: output_root.to_path_buf(),
            work_dir: work_dir_for(output_root, &reference),
        }
    }

    /// Creates the work directory. Failure is reported as an error of `stage`.
    pub fn ensure_work_dir(&self, stage: Stage) -> Result<(), StageError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|e| {
            StageError::for_stage(
                stage,
                format!(
                    "cannot create work directory {}: {}",
                    self.work_dir.display(),
                    e
                ),
            )
        })
    }
}

pub fn work_dir_for(output_root: &Path, reference: &SourceRef) -> PathBuf {
    output_root
        .join("collected")
        .join(reference.channel_id.to_string())
        .join(reference.message_id.to_string())
}
