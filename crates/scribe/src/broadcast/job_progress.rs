//! Job event broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::Stage;

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Accepted,
    StageStarted,
    StageCompleted,
    Completed,
    Failed,
    Skipped,
    Interrupted,
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobEventKind::Accepted => write!(f, "Accepted"),
            JobEventKind::StageStarted => write!(f, "Stage started"),
            JobEventKind::StageCompleted => write!(f, "Stage completed"),
            JobEventKind::Completed => write!(f, "Completed"),
            JobEventKind::Failed => write!(f, "Failed"),
            JobEventKind::Skipped => write!(f, "Skipped"),
            JobEventKind::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    /// Normalized reference of the job.
    pub source_reference: String,
    pub kind: JobEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Artifact paths (set when a stage completes).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: &str, source_reference: &str, kind: JobEventKind, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            source_reference: source_reference.to_string(),
            kind,
            stage: None,
            message: message.to_string(),
            artifacts: vec![],
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker bound to one job.
    pub fn track(&self, job_id: &str, source_reference: &str) -> JobTracker {
        JobTracker::new(job_id, source_reference, Arc::clone(&self.sender))
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for JobEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEventBroadcaster")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Emits events for a single job.
pub struct JobTracker {
    job_id: String,
    source_reference: String,
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobTracker {
    pub fn new(
        job_id: &str,
        source_reference: &str,
        sender: Arc<broadcast::Sender<JobEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            source_reference: source_reference.to_string(),
            sender,
        }
    }

    fn event(&self, kind: JobEventKind, message: &str) -> JobEvent {
        JobEvent::new(&self.job_id, &self.source_reference, kind, message)
    }

    fn emit(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn accepted(&self) {
        self.emit(self.event(JobEventKind::Accepted, "Job accepted"));
    }

    pub fn stage_started(&self, stage: Stage) {
        let message = format!("Running {}", stage);
        self.emit(self.event(JobEventKind::StageStarted, &message).with_stage(stage));
    }

    pub fn stage_completed(&self, stage: Stage, artifacts: &[String]) {
        let message = format!("Finished {}", stage);
        let mut event = self
            .event(JobEventKind::StageCompleted, &message)
            .with_stage(stage);
        event.artifacts = artifacts.to_vec();
        self.emit(event);
    }

    pub fn completed(&self) {
        self.emit(self.event(JobEventKind::Completed, "Processing completed successfully"));
    }

    pub fn failed(&self, stage: Stage, error: &str) {
        let mut event = self
            .event(JobEventKind::Failed, "Processing failed")
            .with_stage(stage);
        event.error = Some(error.to_string());
        self.emit(event);
    }

    pub fn skipped(&self, reason: &str) {
        self.emit(self.event(JobEventKind::Skipped, reason));
    }

    pub fn interrupted(&self, stage: Option<Stage>) {
        let mut event = self.event(JobEventKind::Interrupted, "Shutdown requested");
        event.stage = stage;
        self.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = JobEventBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobEvent::new(
            "job-1",
            "t.me/c/1/2",
            JobEventKind::Accepted,
            "hello",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.kind, JobEventKind::Accepted);
        assert!(received.stage.is_none());
    }

    #[test]
    fn test_send_without_subscribers_is_ignored() {
        let broadcaster = JobEventBroadcaster::default();
        broadcaster.send(JobEvent::new("j", "r", JobEventKind::Skipped, "noop"));
    }

    #[test]
    fn test_tracker_stage_lifecycle() {
        let broadcaster = JobEventBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        let tracker = broadcaster.track("job-2", "t.me/c/3/4");

        tracker.stage_started(Stage::Fetch);
        tracker.stage_completed(Stage::Fetch, &["collected/3/4/v.mp4".to_string()]);
        tracker.failed(Stage::Transcribe, "model missing");

        let started = rx.try_recv().unwrap();
        assert_eq!(started.kind, JobEventKind::StageStarted);
        assert_eq!(started.stage, Some(Stage::Fetch));

        let completed = rx.try_recv().unwrap();
        assert_eq!(completed.artifacts, vec!["collected/3/4/v.mp4".to_string()]);

        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.kind, JobEventKind::Failed);
        assert_eq!(failed.error.as_deref(), Some("model missing"));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = JobEvent::new("job-3", "t.me/c/5/6", JobEventKind::StageCompleted, "ok")
            .with_stage(Stage::Export);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "job-3");
        assert_eq!(json["sourceReference"], "t.me/c/5/6");
        assert_eq!(json["kind"], "stage_completed");
        assert_eq!(json["stage"], "export");
        assert!(json.get("error").is_none());
    }
}
