pub mod context;
pub mod engines;
pub mod progress;
pub mod runner;
pub mod stage;

pub use context::StageContext;
pub use engines::{Engines, Exporter, Fetcher, Summarizer, Transcriber};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::Pipeline;
pub use stage::{Stage, StageInputs};
