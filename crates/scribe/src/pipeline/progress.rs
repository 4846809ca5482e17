use crate::broadcast::job_progress::JobTracker;

use super::Stage;

/// Events emitted while a job is driven through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Accepted,
    StageStarted { stage: Stage },
    StageCompleted { stage: Stage, artifacts: Vec<String> },
    Completed,
    Failed { stage: Stage, error: String },
    Skipped { reason: String },
    Interrupted { stage: Option<Stage> },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the job event broadcast channel.
pub struct BroadcastProgress {
    tracker: JobTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: JobTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Accepted => self.tracker.accepted(),
            ProgressEvent::StageStarted { stage } => self.tracker.stage_started(stage),
            ProgressEvent::StageCompleted { stage, artifacts } => {
                self.tracker.stage_completed(stage, &artifacts)
            }
            ProgressEvent::Completed => self.tracker.completed(),
            ProgressEvent::Failed { stage, error } => self.tracker.failed(stage, &error),
            ProgressEvent::Skipped { reason } => self.tracker.skipped(&reason),
            ProgressEvent::Interrupted { stage } => self.tracker.interrupted(stage),
        }
    }
}
