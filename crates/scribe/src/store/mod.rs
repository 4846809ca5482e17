pub mod job;
pub mod job_store;
pub mod paths;

pub use job::{ErrorInfo, Job, JobStatus};
pub use job_store::{ErrorRecord, JobStore, ResolvedJob, RetryMode};
pub use paths::PathResolver;
