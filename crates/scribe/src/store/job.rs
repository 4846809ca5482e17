use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::error::StoreError;
use crate::pipeline::Stage;
use crate::reference::SourceRef;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// The failing stage and cause of a job in `error` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub stage: Stage,
    pub cause: String,
}

/// Durable record of one reference moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    /// Normalized idempotency key, `t.me/c/<channel>/<message>`.
    pub source_reference: String,
    pub raw_reference: String,
    pub reference: SourceRef,
    pub status: JobStatus,
    pub current_stage: Option<Stage>,
    /// Stored path references per completed stage. Each entry is either
    /// absolute (legacy) or relative to the output root.
    pub stage_artifacts: BTreeMap<Stage, Vec<String>>,
    pub error: Option<ErrorInfo>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// First stage in execution order without recorded artifacts.
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ORDER
            .into_iter()
            .find(|s| !self.stage_artifacts.contains_key(s))
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }

    pub fn has_artifacts(&self, stage: Stage) -> bool {
        self.stage_artifacts.contains_key(&stage)
    }

    pub(crate) fn from_row(row: JobRow) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            job_id: row.id.clone(),
            reason,
        };

        let status = row.status.parse::<JobStatus>().map_err(&corrupt)?;
        let current_stage = row
            .current_stage
            .as_deref()
            .map(str::parse::<Stage>)
            .transpose()
            .map_err(&corrupt)?;
        let stage_artifacts: BTreeMap<Stage, Vec<String>> =
            serde_json::from_str(&row.stage_artifacts)
                .map_err(|e| corrupt(format!("stage_artifacts: {}", e)))?;

        let error = match (row.error_stage.as_deref(), row.error_cause.as_deref()) {
            (Some(stage), Some(cause)) => Some(ErrorInfo {
                stage: stage.parse().map_err(&corrupt)?,
                cause: cause.to_string(),
            }),
            _ => None,
        };

        let channel_id = u64::try_from(row.channel_id)
            .map_err(|_| corrupt(format!("channel_id {}", row.channel_id)))?;
        let message_id = u64::try_from(row.message_id)
            .map_err(|_| corrupt(format!("message_id {}", row.message_id)))?;

        let created_at = parse_timestamp(&row.created_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&row.updated_at).map_err(&corrupt)?;
        let completed_at = row
            .completed_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(&corrupt)?;

        Ok(Self {
            id: row.id.clone(),
            source_reference: row.source_reference.clone(),
            raw_reference: row.raw_reference.clone(),
            reference: SourceRef {
                channel_id,
                message_id,
            },
            status,
            current_stage,
            stage_artifacts,
            error,
            retry_count: row.retry_count,
            created_at,
            updated_at,
            completed_at,
        })
    }

    pub(crate) fn to_row(&self) -> Result<JobRow, StoreError> {
        let stage_artifacts =
            serde_json::to_string(&self.stage_artifacts).map_err(|e| StoreError::Corrupt {
                job_id: self.id.clone(),
                reason: format!("stage_artifacts: {}", e),
            })?;

        Ok(JobRow {
            id: self.id.clone(),
            source_reference: self.source_reference.clone(),
            raw_reference: self.raw_reference.clone(),
            channel_id: self.reference.channel_id as i64,
            message_id: self.reference.message_id as i64,
            status: self.status.as_str().to_string(),
            current_stage: self.current_stage.map(|s| s.as_str().to_string()),
            stage_artifacts,
            error_stage: self.error.as_ref().map(|e| e.stage.as_str().to_string()),
            error_cause: self.error.as_ref().map(|e| e.cause.clone()),
            retry_count: self.retry_count,
            created_at: format_timestamp(&self.created_at),
            updated_at: format_timestamp(&self.updated_at),
            completed_at: self.completed_at.as_ref().map(format_timestamp),
        })
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("timestamp '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Job {
        let now = Utc::now();
        Job {
            id: "job-1".to_string(),
            source_reference: "t.me/c/5/6".to_string(),
            raw_reference: "https://t.me/c/5/6?single".to_string(),
            reference: SourceRef {
                channel_id: 5,
                message_id: 6,
            },
            status: JobStatus::Pending,
            current_stage: None,
            stage_artifacts: BTreeMap::new(),
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_next_stage_follows_artifacts() {
        let mut job = sample();
        assert_eq!(job.next_stage(), Some(Stage::Fetch));
        job.stage_artifacts
            .insert(Stage::Fetch, vec!["collected/5/6/a.mp4".to_string()]);
        assert_eq!(job.next_stage(), Some(Stage::Transcribe));
        for stage in Stage::ORDER {
            job.stage_artifacts.insert(stage, vec![]);
        }
        assert_eq!(job.next_stage(), None);
    }

    #[test]
    fn test_row_conversion_preserves_fields() {
        let mut job = sample();
        job.status = JobStatus::Error;
        job.current_stage = Some(Stage::Transcribe);
        job.stage_artifacts
            .insert(Stage::Fetch, vec!["/legacy/abs.mp4".to_string()]);
        job.error = Some(ErrorInfo {
            stage: Stage::Transcribe,
            cause: "model unavailable".to_string(),
        });
        job.retry_count = 3;

        let row = job.to_row().unwrap();
        assert_eq!(row.status, "error");
        assert_eq!(row.current_stage.as_deref(), Some("transcribe"));
        assert_eq!(row.stage_artifacts, r#"{"fetch":["/legacy/abs.mp4"]}"#);

        let back = Job::from_row(row).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let mut row = sample().to_row().unwrap();
        row.status = "exploded".to_string();
        let err = Job::from_row(row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_corrupt_artifacts_are_reported() {
        let mut row = sample().to_row().unwrap();
        row.stage_artifacts = "not json".to_string();
        assert!(matches!(
            Job::from_row(row),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!("finished".parse::<JobStatus>().is_err());
    }
}
