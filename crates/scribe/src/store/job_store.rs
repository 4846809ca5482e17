//! Durable job store.
//!
//! Every mutation reads the job, validates the requested transition and
//! writes the result inside one connection lock and one SQLite transaction.
//! A rejected transition leaves the stored job untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::error_repo::{self, ErrorRow};
use crate::db::job_repo;
use crate::db::{Database, DatabaseError};
use crate::error::StoreError;
use crate::pipeline::{Stage, StageInputs};
use crate::reference::{parse_reference, SourceRef};

use super::job::{format_timestamp, ErrorInfo, Job, JobStatus};
use super::paths::PathResolver;

/// How a retry treats the work already recorded for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Re-enter at the first stage without artifacts, keeping earlier ones.
    Resume,
    /// Discard all artifacts and start again at fetch.
    Restart,
}

/// A job with every stored artifact reference resolved to a concrete path.
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub job: Job,
    pub artifacts: BTreeMap<Stage, Vec<PathBuf>>,
}

impl ResolvedJob {
    pub fn artifacts_for(&self, stage: Stage) -> Option<&[PathBuf]> {
        self.artifacts.get(&stage).map(Vec::as_slice)
    }

    /// Resolved artifacts of every stage before `stage`.
    pub fn inputs_for(&self, stage: Stage) -> StageInputs {
        Stage::ORDER
            .into_iter()
            .take_while(|s| *s < stage)
            .filter_map(|s| self.artifacts.get(&s).map(|p| (s, p.clone())))
            .fold(StageInputs::new(), |inputs, (s, p)| inputs.with(s, p))
    }
}

/// One entry of a job's failure history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub stage: Stage,
    pub cause: String,
    pub occurred_at: DateTime<Utc>,
}

pub struct JobStore {
    db: Database,
    resolver: PathResolver,
}

impl JobStore {
    pub fn new(db: Database, resolver: PathResolver) -> Self {
        Self { db, resolver }
    }

    /// Opens the database at `database_path` and binds it to `output_root`.
    pub fn open(database_path: &Path, output_root: &Path) -> Result<Self, StoreError> {
        let db = Database::open(database_path)?;
        Ok(Self::new(db, PathResolver::new(output_root)))
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Returns the job for `raw_reference`, creating it in `pending` state
    /// when no job with the same normalized reference exists yet.
    pub fn create_or_get(&self, raw_reference: &str) -> Result<Job, StoreError> {
        let reference = parse_reference(raw_reference)?;
        self.create_or_get_parsed(reference, raw_reference.trim())
    }

    pub fn create_or_get_parsed(
        &self,
        reference: SourceRef,
        raw_reference: &str,
    ) -> Result<Job, StoreError> {
        let key = reference.key();
        let now = Utc::now();
        let candidate = Job {
            id: Uuid::new_v4().to_string(),
            source_reference: key.clone(),
            raw_reference: raw_reference.to_string(),
            reference,
            status: JobStatus::Pending,
            current_stage: None,
            stage_artifacts: BTreeMap::new(),
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let row = candidate.to_row()?;

        let (inserted, stored) = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
            let inserted = job_repo::insert_if_absent(&tx, &row)?;
            let stored = job_repo::find_by_reference(&tx, &key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            tx.commit().map_err(DatabaseError::from)?;
            Ok::<_, StoreError>((inserted, stored))
        })?;

        let job = Job::from_row(stored)?;
        if inserted {
            log::info!("Created job {} for {}", job.id, job.source_reference);
        } else {
            log::debug!("Found existing job {} for {}", job.id, job.source_reference);
        }
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, StoreError> {
        let row = self
            .db
            .with_conn(|conn| job_repo::find_by_id(conn, job_id))?
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        Job::from_row(row)
    }

    /// Lists jobs oldest first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>, StoreError> {
        let rows = self
            .db
            .with_conn(|conn| job_repo::list(conn, status.map(|s| s.as_str())))?;
        rows.into_iter().map(Job::from_row).collect()
    }

    /// Marks `stage` as dispatched.
    pub fn begin_stage(&self, job_id: &str, stage: Stage) -> Result<Job, StoreError> {
        self.transition(job_id, |_, job| {
            ensure_advanceable(job, stage)?;
            job.status = JobStatus::InProgress;
            job.current_stage = Some(stage);
            Ok(true)
        })
    }

    /// Records the artifacts of a completed stage and advances the job.
    pub fn record_stage_success(
        &self,
        job_id: &str,
        stage: Stage,
        artifacts: &[PathBuf],
    ) -> Result<Job, StoreError> {
        let stored: Vec<String> = artifacts
            .iter()
            .map(|p| self.resolver.to_stored(p))
            .collect();

        let job = self.transition(job_id, |_, job| {
            ensure_advanceable(job, stage)?;
            job.stage_artifacts.insert(stage, stored);
            job.error = None;
            match stage.next() {
                Some(next) => {
                    job.status = JobStatus::InProgress;
                    job.current_stage = Some(next);
                }
                None => {
                    job.status = JobStatus::Done;
                    job.current_stage = None;
                    job.completed_at = Some(Utc::now());
                }
            }
            Ok(true)
        })?;

        log::debug!("Job {} recorded {} ({} artifacts)", job_id, stage, artifacts.len());
        Ok(job)
    }

    /// Moves the job to `error` at `stage`. Recording the same failure again
    /// changes nothing and appends no audit entry.
    pub fn record_stage_failure(
        &self,
        job_id: &str,
        stage: Stage,
        cause: &str,
    ) -> Result<Job, StoreError> {
        self.transition(job_id, |conn, job| {
            let repeated = job.status == JobStatus::Error
                && job.current_stage == Some(stage)
                && job
                    .error
                    .as_ref()
                    .is_some_and(|e| e.stage == stage && e.cause == cause);
            if repeated {
                return Ok(false);
            }

            if job.status == JobStatus::Done || job.next_stage() != Some(stage) {
                return Err(invalid_transition(job, stage));
            }

            job.status = JobStatus::Error;
            job.current_stage = Some(stage);
            job.error = Some(ErrorInfo {
                stage,
                cause: cause.to_string(),
            });

            error_repo::insert(
                conn,
                &ErrorRow {
                    id: Uuid::new_v4().to_string(),
                    job_id: job.id.clone(),
                    stage: stage.as_str().to_string(),
                    cause: cause.to_string(),
                    occurred_at: format_timestamp(&Utc::now()),
                },
            )?;
            log::warn!("Job {} failed at {}: {}", job.id, stage, cause);
            Ok(true)
        })
    }

    /// Prepares a job to be driven again.
    pub fn prepare_retry(&self, job_id: &str, mode: RetryMode) -> Result<Job, StoreError> {
        self.transition(job_id, |_, job| {
            match mode {
                RetryMode::Resume => {
                    if job.status == JobStatus::Done {
                        return Ok(false);
                    }
                    job.current_stage = job.next_stage();
                }
                RetryMode::Restart => {
                    job.stage_artifacts.clear();
                    job.current_stage = None;
                    job.completed_at = None;
                }
            }
            job.status = JobStatus::Pending;
            job.error = None;
            job.retry_count += 1;
            log::info!(
                "Job {} prepared for {:?} (retry #{})",
                job.id,
                mode,
                job.retry_count
            );
            Ok(true)
        })
    }

    /// Failure history of a job, oldest first.
    pub fn error_history(&self, job_id: &str) -> Result<Vec<ErrorRecord>, StoreError> {
        let rows = self
            .db
            .with_conn(|conn| error_repo::list_for_job(conn, job_id))?;
        rows.into_iter()
            .map(|row| {
                let corrupt = |reason: String| StoreError::Corrupt {
                    job_id: row.job_id.clone(),
                    reason,
                };
                let stage = row.stage.parse::<Stage>().map_err(corrupt)?;
                let occurred_at = DateTime::parse_from_rfc3339(&row.occurred_at)
                    .map_err(|e| StoreError::Corrupt {
                        job_id: row.job_id.clone(),
                        reason: format!("occurred_at: {}", e),
                    })?
                    .with_timezone(&Utc);
                Ok(ErrorRecord {
                    stage,
                    cause: row.cause,
                    occurred_at,
                })
            })
            .collect()
    }

    /// Resolves every stored artifact reference of `job` without touching
    /// the stored record.
    pub fn resolve_paths(&self, job: &Job) -> ResolvedJob {
        let artifacts = job
            .stage_artifacts
            .iter()
            .map(|(stage, refs)| {
                (
                    *stage,
                    refs.iter().map(|r| self.resolver.resolve(r)).collect(),
                )
            })
            .collect();
        ResolvedJob {
            job: job.clone(),
            artifacts,
        }
    }

    /// Loads, mutates and persists one job atomically. `apply` returns
    /// whether it changed the job; unchanged jobs are not rewritten.
    fn transition<F>(&self, job_id: &str, apply: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&Connection, &mut Job) -> Result<bool, StoreError>,
    {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
            let row = job_repo::find_by_id(&tx, job_id)?
                .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
            let mut job = Job::from_row(row)?;

            if apply(&tx, &mut job)? {
                job.updated_at = Utc::now();
                job_repo::update(&tx, &job.to_row()?)?;
            }

            tx.commit().map_err(DatabaseError::from)?;
            Ok(job)
        })
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("output_root", &self.resolver.output_root())
            .finish_non_exhaustive()
    }
}

fn ensure_advanceable(job: &Job, stage: Stage) -> Result<(), StoreError> {
    let active = matches!(job.status, JobStatus::Pending | JobStatus::InProgress);
    if active && job.next_stage() == Some(stage) {
        Ok(())
    } else {
        Err(invalid_transition(job, stage))
    }
}

fn invalid_transition(job: &Job, stage: Stage) -> StoreError {
    StoreError::InvalidTransition {
        job_id: job.id.clone(),
        stage,
        status: job.status,
        expected: job.next_stage(),
    }
}
