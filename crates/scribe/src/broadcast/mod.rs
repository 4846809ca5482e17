//! Job progress events for front-ends.
//!
//! Subscribers receive every event published after they subscribe; slow
//! subscribers lag and lose the oldest events rather than blocking workers.

pub mod job_progress;

pub use job_progress::{JobEvent, JobEventBroadcaster, JobEventKind, JobTracker};
