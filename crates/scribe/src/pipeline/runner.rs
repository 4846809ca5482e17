use std::path::{Path, PathBuf};

use tracing::{debug, info_span};

use crate::error::StageError;
use crate::sanitize;
use crate::store::ResolvedJob;

use super::context::StageContext;
use super::engines::Engines;
use super::progress::{ProgressEvent, ProgressReporter};
use super::Stage;

pub struct Pipeline {
    engines: Engines,
    output_root: PathBuf,
}

impl Pipeline {
    pub fn new(engines: Engines, output_root: &Path) -> Self {
        Self {
            engines,
            output_root: output_root.to_path_buf(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Runs a single stage for a job.
    ///
    /// A stage that already has recorded artifacts is not re-run; its
    /// recorded (resolved) artifacts are returned instead. Inputs come from
    /// the artifacts recorded for earlier stages.
    pub fn run_stage(
        &self,
        resolved: &ResolvedJob,
        stage: Stage,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<PathBuf>, StageError> {
        let job = &resolved.job;
        let _span = info_span!("stage",
            job_id = %job.id,
            stage = %stage,
            reference = %job.source_reference,
        )
        .entered();

        if let Some(recorded) = resolved.artifacts_for(stage) {
            debug!("{} already recorded for job {}, reusing artifacts", stage, job.id);
            return Ok(recorded.to_vec());
        }

        progress.report(ProgressEvent::StageStarted { stage });

        let ctx = StageContext::new(&job.id, job.reference, &self.output_root);
        let inputs = resolved.inputs_for(stage);
        let result = ctx
            .ensure_work_dir(stage)
            .and_then(|()| stage.run(&self.engines, &ctx, &inputs));

        match &result {
            Ok(paths) => {
                debug!("{} produced [{}]", stage, sanitize::redact_paths(paths));
                progress.report(ProgressEvent::StageCompleted {
                    stage,
                    artifacts: paths.iter().map(|p| p.display().to_string()).collect(),
                });
            }
            Err(e) => {
                progress.report(ProgressEvent::Failed {
                    stage,
                    error: e.cause().to_string(),
                });
            }
        }

        result
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("output_root", &self.output_root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engines::{Exporter, Fetcher, Summarizer, Transcriber};
    use crate::pipeline::progress::NoopProgress;
    use crate::store::{Job, JobStatus};
    use crate::reference::SourceRef;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Writes one file per stage into the work directory and counts calls.
    #[derive(Default)]
    struct FileEngine {
        calls: AtomicUsize,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FileEngine {
        fn write(&self, ctx: &StageContext, name: &str) -> PathBuf {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = ctx.work_dir.join(name);
            std::fs::write(&path, name).unwrap();
            path
        }
    }

    impl Fetcher for FileEngine {
        fn fetch(&self, ctx: &StageContext) -> Result<Vec<PathBuf>, StageError> {
            Ok(vec![self.write(ctx, "video.mp4"), self.write(ctx, "cover.jpg")])
        }
    }

    impl Transcriber for FileEngine {
        fn transcribe(&self, ctx: &StageContext, media: &Path) -> Result<PathBuf, StageError> {
            self.seen.lock().unwrap().push(media.to_path_buf());
            Ok(self.write(ctx, "transcript.txt"))
        }
    }

    impl Summarizer for FileEngine {
        fn summarize(&self, _ctx: &StageContext, _t: &Path) -> Result<PathBuf, StageError> {
            Err(StageError::Summarize("quota exceeded".to_string()))
        }
    }

    impl Exporter for FileEngine {
        fn export(
            &self,
            ctx: &StageContext,
            _t: &Path,
            _s: &Path,
        ) -> Result<Vec<PathBuf>, StageError> {
            Ok(vec![self.write(ctx, "report.pdf")])
        }
    }

    fn setup() -> (TempDir, Arc<FileEngine>, Pipeline) {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FileEngine::default());
        let engines = Engines::new(engine.clone(), engine.clone(), engine.clone(), engine.clone());
        let pipeline = Pipeline::new(engines, dir.path());
        (dir, engine, pipeline)
    }

    fn resolved(artifacts: BTreeMap<Stage, Vec<PathBuf>>) -> ResolvedJob {
        let now = chrono::Utc::now();
        ResolvedJob {
            job: Job {
                id: "job-1".to_string(),
                source_reference: "t.me/c/7/8".to_string(),
                raw_reference: "https://t.me/c/7/8".to_string(),
                reference: SourceRef {
                    channel_id: 7,
                    message_id: 8,
                },
                status: JobStatus::InProgress,
                current_stage: None,
                stage_artifacts: BTreeMap::new(),
                error: None,
                retry_count: 0,
                created_at: now,
                updated_at: now,
                completed_at: None,
            },
            artifacts,
        }
    }

    #[test]
    fn test_fetch_writes_into_work_dir() {
        let (dir, _engine, pipeline) = setup();
        let paths = pipeline
            .run_stage(&resolved(BTreeMap::new()), Stage::Fetch, &NoopProgress)
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].starts_with(dir.path().join("collected").join("7").join("8")));
        assert!(paths[0].exists());
    }

    #[test]
    fn test_transcribe_consumes_first_fetched_file() {
        let (dir, engine, pipeline) = setup();
        let media = dir.path().join("first.mp4");
        let mut artifacts = BTreeMap::new();
        artifacts.insert(Stage::Fetch, vec![media.clone(), dir.path().join("second.mp4")]);

        pipeline
            .run_stage(&resolved(artifacts), Stage::Transcribe, &NoopProgress)
            .unwrap();
        assert_eq!(*engine.seen.lock().unwrap(), vec![media]);
    }

    #[test]
    fn test_missing_input_fails_the_stage() {
        let (_dir, engine, pipeline) = setup();
        let err = pipeline
            .run_stage(&resolved(BTreeMap::new()), Stage::Export, &NoopProgress)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Export);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recorded_stage_is_not_rerun() {
        let (dir, engine, pipeline) = setup();
        let recorded = vec![dir.path().join("old.mp4")];
        let mut artifacts = BTreeMap::new();
        artifacts.insert(Stage::Fetch, recorded.clone());

        let paths = pipeline
            .run_stage(&resolved(artifacts), Stage::Fetch, &NoopProgress)
            .unwrap();
        assert_eq!(paths, recorded);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_error_is_returned() {
        let (dir, _engine, pipeline) = setup();
        let mut artifacts = BTreeMap::new();
        artifacts.insert(Stage::Fetch, vec![dir.path().join("v.mp4")]);
        artifacts.insert(Stage::Transcribe, vec![dir.path().join("t.txt")]);

        let err = pipeline
            .run_stage(&resolved(artifacts), Stage::Summarize, &NoopProgress)
            .unwrap_err();
        assert_eq!(err, StageError::Summarize("quota exceeded".to_string()));
    }
}
