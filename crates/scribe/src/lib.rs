pub mod broadcast;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod reference;
pub mod sanitize;
pub mod scheduler;
pub mod store;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use cleanup::{purge_orphans, sweep, RetentionPolicy, SweepReport};
pub use config::{load_config, Config, RetentionConfig};
pub use error::{
    ConfigError, FilesystemError, ReferenceError, Result, ScribeError, StageError, StoreError,
    WorkerError,
};
pub use logging::{init_logging, LogFormat};
pub use pipeline::{Engines, Exporter, Fetcher, Stage, StageContext, Summarizer, Transcriber};
pub use reference::{parse_reference, references_from_text, SourceRef};
pub use scheduler::{BatchReport, ItemOutcome, JobSummary, Outcome, Scheduler};
pub use store::{Job, JobStatus, JobStore, RetryMode};
