//! Job lifecycle: accepting references, driving jobs through the pipeline,
//! batch processing, retries and cleanup.

pub mod pool;
pub mod watch;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use log::{info, warn};
use serde::Serialize;
use tracing::info_span;

use crate::broadcast::job_progress::JobEventBroadcaster;
use crate::cleanup::{self, RetentionPolicy, SweepReport};
use crate::config::Config;
use crate::error::{ConfigError, FilesystemError, Result, StoreError, WorkerError};
use crate::pipeline::{BroadcastProgress, Engines, Pipeline, ProgressEvent, ProgressReporter, Stage};
use crate::reference::{parse_reference, references_from_text, SourceRef};
use crate::store::{ErrorInfo, Job, JobStatus, JobStore, RetryMode};

pub use pool::{PoolReport, WorkResult, WorkerPool};
pub use watch::{install_ctrlc_handler, spawn_line_reader, watch, WatchSummary};

/// Result of handling one submitted reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    SkippedAlreadyDone,
    Failed { stage: Stage, cause: String },
    /// Shutdown was requested; the job stopped before `stage` and can be resumed.
    Interrupted { stage: Option<Stage> },
    /// Another worker is driving the same job.
    Busy,
    Rejected { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed | Outcome::SkippedAlreadyDone)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::SkippedAlreadyDone => write!(f, "skipped-already-done"),
            Outcome::Failed { stage, cause } => write!(f, "failed: {}, {}", stage, cause),
            Outcome::Interrupted { stage: Some(stage) } => write!(f, "interrupted before {}", stage),
            Outcome::Interrupted { stage: None } => write!(f, "interrupted"),
            Outcome::Busy => write!(f, "busy"),
            Outcome::Rejected { reason } => write!(f, "rejected: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// The reference as submitted (trimmed).
    pub reference: String,
    pub job_id: Option<String>,
    pub outcome: Outcome,
}

impl ItemOutcome {
    fn new(reference: &str, job_id: Option<&str>, outcome: Outcome) -> Self {
        Self {
            reference: reference.to_string(),
            job_id: job_id.map(str::to_string),
            outcome,
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reference, self.outcome)
    }
}

/// Per-item outcomes of a batch in submission order. For text batches the
/// tokens rejected during extraction follow the processed references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
    /// References never started because shutdown was requested.
    pub abandoned: Vec<String>,
}

impl BatchReport {
    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| *o == Outcome::Completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == Outcome::SkippedAlreadyDone)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Rejected { .. }))
    }
}

/// Front-end view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub source_reference: String,
    pub status: JobStatus,
    pub current_stage: Option<Stage>,
    pub completed_stages: Vec<Stage>,
    pub error: Option<ErrorInfo>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            source_reference: job.source_reference.clone(),
            status: job.status,
            current_stage: job.current_stage,
            completed_stages: job.stage_artifacts.keys().copied().collect(),
            error: job.error.clone(),
            retry_count: job.retry_count,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

/// Removes the job id from the in-flight set when dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    job_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.job_id);
    }
}

pub struct Scheduler {
    store: JobStore,
    pipeline: Pipeline,
    events: JobEventBroadcaster,
    shutdown: Arc<AtomicBool>,
    in_flight: Mutex<HashSet<String>>,
    temp_dir: PathBuf,
    orphan_max_age: Duration,
}

impl Scheduler {
    pub fn new(store: JobStore, engines: Engines, events: JobEventBroadcaster) -> Self {
        let output_root = store.resolver().output_root().to_path_buf();
        Self {
            pipeline: Pipeline::new(engines, &output_root),
            temp_dir: output_root.join(".tmp"),
            store,
            events,
            shutdown: Arc::new(AtomicBool::new(false)),
            in_flight: Mutex::new(HashSet::new()),
            orphan_max_age: Duration::from_secs(24 * 3600),
        }
    }

    /// Opens the configured database and wires the pipeline to `engines`.
    pub fn from_config(config: &Config, engines: Engines) -> Result<Self> {
        let database_path = config.database_path().ok_or(ConfigError::NoDatabasePath)?;
        let store = JobStore::open(&database_path, &config.output_root())?;
        let mut scheduler = Self::new(store, engines, JobEventBroadcaster::default());
        scheduler.temp_dir = config.temp_dir();
        scheduler.orphan_max_age =
            Duration::from_secs(config.orphan_retention_hours.saturating_mul(3600));
        info!(
            "Scheduler ready (output root {}, database {})",
            config.output_root,
            database_path.display()
        );
        Ok(scheduler)
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn events(&self) -> &JobEventBroadcaster {
        &self.events
    }

    /// Shared cancellation flag; setting it stops acceptance and halts jobs
    /// between stages.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn cancel(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Registers a reference without driving it. Returns the job id.
    pub fn submit(&self, raw_reference: &str) -> Result<String> {
        let job = self.store.create_or_get(raw_reference)?;
        Ok(job.id)
    }

    /// Creates or finds the job for `raw_reference` and drives it to a
    /// terminal state, unless it is already done or failed.
    pub fn process(&self, raw_reference: &str) -> Result<ItemOutcome> {
        let raw = raw_reference.trim();
        match parse_reference(raw) {
            Ok(reference) => self.process_parsed(reference, raw),
            Err(e) => {
                warn!("Rejected reference {:?}: {}", raw, e);
                Ok(ItemOutcome::new(
                    raw,
                    None,
                    Outcome::Rejected {
                        reason: e.to_string(),
                    },
                ))
            }
        }
    }

    /// Processes references one after another. Stage failures and invalid
    /// references are reported per item and never stop the batch.
    pub fn process_batch<S: AsRef<str>>(&self, references: &[S]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let _span = info_span!("batch", size = references.len()).entered();

        for (idx, raw) in references.iter().enumerate() {
            if self.is_cancelled() {
                report.abandoned = references[idx..]
                    .iter()
                    .map(|r| r.as_ref().trim().to_string())
                    .collect();
                warn!("Batch cancelled, {} references abandoned", report.abandoned.len());
                break;
            }
            let item = self.process(raw.as_ref())?;
            info!("{}", item);
            report.items.push(item);
        }

        Ok(report)
    }

    /// Extracts references from free text and processes them as a batch.
    /// Invalid link-like tokens are reported as rejected.
    pub fn process_text(&self, text: &str) -> Result<BatchReport> {
        let parsed = references_from_text(text);
        if parsed.is_empty() {
            warn!("No valid references found in text ({} invalid)", parsed.invalid.len());
        }
        let raws: Vec<String> = parsed.references.into_iter().map(|(_, raw)| raw).collect();
        let mut report = self.process_batch(&raws)?;

        let rejected = parsed.invalid.into_iter().map(|invalid| {
            ItemOutcome::new(
                &invalid.token,
                None,
                Outcome::Rejected {
                    reason: format!("line {}: {}", invalid.line, invalid.error),
                },
            )
        });
        report.items.extend(rejected);
        Ok(report)
    }

    /// Re-drives one job. `Resume` keeps recorded artifacts; `Restart`
    /// discards them and starts again at fetch.
    pub fn retry(&self, job_id: &str, mode: RetryMode) -> Result<Job> {
        let _claim = self
            .claim(job_id)
            .ok_or_else(|| WorkerError::JobBusy(job_id.to_string()))?;

        let job = self.store.prepare_retry(job_id, mode)?;
        if job.is_done() {
            info!("Job {} already done, nothing to retry", job_id);
            return Ok(job);
        }

        let progress = BroadcastProgress::new(self.events.track(&job.id, &job.source_reference));
        progress.report(ProgressEvent::Accepted);
        let outcome = self.drive(job, &progress)?;
        info!("Retry of job {} finished: {}", job_id, outcome);

        Ok(self.store.get(job_id)?)
    }

    /// Summaries of all jobs, optionally filtered by status, oldest first.
    pub fn status(&self, filter: Option<JobStatus>) -> Result<Vec<JobSummary>> {
        let jobs = self.store.list(filter)?;
        Ok(jobs.iter().map(JobSummary::from).collect())
    }

    /// Sweeps aged media from the output root.
    pub fn cleanup(&self, policy: &RetentionPolicy, dry_run: bool) -> SweepReport {
        cleanup::sweep(self.pipeline.output_root(), policy, dry_run)
    }

    /// Removes stale partial downloads from the temp directory.
    pub fn purge_orphans(&self) -> std::result::Result<usize, FilesystemError> {
        cleanup::purge_orphans(&self.temp_dir, self.orphan_max_age)
    }

    /// Continuous ingestion from `input` on `worker_count` workers until the
    /// input closes or the scheduler is cancelled.
    pub fn watch<F>(
        self: &Arc<Self>,
        input: Receiver<String>,
        worker_count: usize,
        on_outcome: F,
    ) -> std::result::Result<WatchSummary, WorkerError>
    where
        F: FnMut(&ItemOutcome),
    {
        watch::watch(Arc::clone(self), input, worker_count, on_outcome)
    }

    fn process_parsed(&self, reference: SourceRef, raw: &str) -> Result<ItemOutcome> {
        let job = self.store.create_or_get_parsed(reference, raw)?;
        let progress = BroadcastProgress::new(self.events.track(&job.id, &job.source_reference));

        if let Some(outcome) = settled_outcome(&job) {
            report_settled(&progress, &outcome);
            return Ok(ItemOutcome::new(raw, Some(&job.id), outcome));
        }

        let Some(_claim) = self.claim(&job.id) else {
            info!("Job {} is already being processed", job.id);
            return Ok(ItemOutcome::new(raw, Some(&job.id), Outcome::Busy));
        };

        // Another worker may have finished the job between lookup and claim.
        let job = self.store.get(&job.id)?;
        if let Some(outcome) = settled_outcome(&job) {
            report_settled(&progress, &outcome);
            return Ok(ItemOutcome::new(raw, Some(&job.id), outcome));
        }

        progress.report(ProgressEvent::Accepted);
        let job_id = job.id.clone();
        let outcome = self.drive(job, &progress)?;
        Ok(ItemOutcome::new(raw, Some(&job_id), outcome))
    }

    /// Runs the remaining stages of a claimed job in order, persisting each
    /// result. Cancellation is checked between stages only.
    fn drive(&self, mut job: Job, progress: &dyn ProgressReporter) -> Result<Outcome> {
        let _span = info_span!("job",
            job_id = %job.id,
            reference = %job.source_reference,
        )
        .entered();

        while let Some(stage) = job.next_stage() {
            if self.is_cancelled() {
                info!("Job {} interrupted before {}", job.id, stage);
                progress.report(ProgressEvent::Interrupted { stage: Some(stage) });
                return Ok(Outcome::Interrupted { stage: Some(stage) });
            }

            job = self.store.begin_stage(&job.id, stage)?;
            let resolved = self.store.resolve_paths(&job);

            match self.pipeline.run_stage(&resolved, stage, progress) {
                Ok(artifacts) => {
                    job = self.store.record_stage_success(&job.id, stage, &artifacts)?;
                }
                Err(e) => {
                    self.store.record_stage_failure(&job.id, stage, e.cause())?;
                    return Ok(Outcome::Failed {
                        stage,
                        cause: e.cause().to_string(),
                    });
                }
            }
        }

        if !job.is_done() {
            return Err(StoreError::Corrupt {
                job_id: job.id.clone(),
                reason: format!("all stages recorded but status is {}", job.status),
            }
            .into());
        }

        info!("Job {} completed", job.id);
        progress.report(ProgressEvent::Completed);
        Ok(Outcome::Completed)
    }

    fn claim(&self, job_id: &str) -> Option<Claim<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if set.insert(job_id.to_string()) {
            Some(Claim {
                in_flight: &self.in_flight,
                job_id: job_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("store", &self.store)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Outcome for a job that must not be driven: done, or failed and waiting
/// for an explicit retry.
fn settled_outcome(job: &Job) -> Option<Outcome> {
    match job.status {
        JobStatus::Done => Some(Outcome::SkippedAlreadyDone),
        JobStatus::Error => Some(match &job.error {
            Some(info) => Outcome::Failed {
                stage: info.stage,
                cause: info.cause.clone(),
            },
            None => Outcome::Failed {
                stage: job.current_stage.unwrap_or(Stage::Fetch),
                cause: "unknown error".to_string(),
            },
        }),
        JobStatus::Pending | JobStatus::InProgress => None,
    }
}

fn report_settled(progress: &dyn ProgressReporter, outcome: &Outcome) {
    match outcome {
        Outcome::SkippedAlreadyDone => progress.report(ProgressEvent::Skipped {
            reason: "already done".to_string(),
        }),
        Outcome::Failed { stage, cause } => progress.report(ProgressEvent::Skipped {
            reason: format!("failed at {} ({}); use retry", stage, cause),
        }),
        _ => {}
    }
}
