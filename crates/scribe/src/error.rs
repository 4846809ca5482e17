use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;
use crate::store::JobStatus;

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid environment override {key}='{value}': {reason}")]
    InvalidOverride {
        key: String,
        value: String,
        reason: String,
    },

    #[error("No database path configured and no home directory available")]
    NoDatabasePath,
}

/// Contract violations and persistence failures of the job store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(
        "Invalid transition for job {job_id}: cannot record {stage} while {status} \
         (expected next stage: {})",
        stage_name(.expected)
    )]
    InvalidTransition {
        job_id: String,
        stage: Stage,
        status: JobStatus,
        expected: Option<Stage>,
    },

    #[error("Invalid reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Corrupt job record {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

fn stage_name(stage: &Option<Stage>) -> &'static str {
    stage.map(|s| s.as_str()).unwrap_or("none")
}

/// Failure reported by one of the external stage engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("transcription failed: {0}")]
    Transcribe(String),

    #[error("summarization failed: {0}")]
    Summarize(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl StageError {
    /// Builds the error variant belonging to `stage`.
    pub fn for_stage(stage: Stage, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        match stage {
            Stage::Fetch => StageError::Fetch(cause),
            Stage::Transcribe => StageError::Transcribe(cause),
            Stage::Summarize => StageError::Summarize(cause),
            Stage::Export => StageError::Export(cause),
        }
    }

    /// The stage this error originated from.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Fetch(_) => Stage::Fetch,
            StageError::Transcribe(_) => Stage::Transcribe,
            StageError::Summarize(_) => Stage::Summarize,
            StageError::Export(_) => Stage::Export,
        }
    }

    /// The human-readable cause without the stage prefix.
    pub fn cause(&self) -> &str {
        match self {
            StageError::Fetch(c)
            | StageError::Transcribe(c)
            | StageError::Summarize(c)
            | StageError::Export(c) => c,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Unrecognized reference '{0}': expected https://t.me/c/<channel_id>/<message_id>")]
    Unrecognized(String),

    #[error("Reference '{0}' is embedded inside another URL")]
    Embedded(String),

    #[error("Reference '{reference}' has a zero {field}")]
    ZeroId {
        reference: String,
        field: &'static str,
    },

    #[error("Reference '{0}' has an out-of-range id")]
    OutOfRange(String),
}

#[derive(Error, Debug)]
#[error("Filesystem operation failed for '{path}': {source}")]
pub struct FilesystemError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Job {0} is already being processed")]
    JobBusy(String),

    #[error("Failed to install shutdown signal handler: {0}")]
    SignalHandler(String),
}

pub type Result<T> = std::result::Result<T, ScribeError>;
