//! Continuous ingestion: references arrive on a channel and are handed to
//! the worker pool until the input closes or shutdown is requested.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use crate::error::WorkerError;

use super::pool::{WorkResult, WorkerPool};
use super::{ItemOutcome, Scheduler};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Words that end interactive input.
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "q"];

#[derive(Debug, Default)]
pub struct WatchSummary {
    pub accepted: usize,
    pub outcomes: Vec<ItemOutcome>,
    /// References whose processing hit a store or database error.
    pub errors: Vec<(String, String)>,
    /// Accepted references never started because of shutdown.
    pub abandoned: Vec<String>,
}

impl WatchSummary {
    fn record<F: FnMut(&ItemOutcome)>(&mut self, work: WorkResult, on_outcome: &mut F) {
        match work.result {
            Ok(item) => {
                on_outcome(&item);
                self.outcomes.push(item);
            }
            Err(e) => self.errors.push((work.reference, e.to_string())),
        }
    }
}

/// Accepts references from `input` until it disconnects or the scheduler is
/// cancelled. Acceptance only enqueues, so it never waits on a running stage.
///
/// On disconnect every queued reference is still processed. On cancellation
/// running jobs stop after their current stage and queued references are
/// returned as abandoned.
pub fn watch<F>(
    scheduler: Arc<Scheduler>,
    input: Receiver<String>,
    worker_count: usize,
    mut on_outcome: F,
) -> Result<WatchSummary, WorkerError>
where
    F: FnMut(&ItemOutcome),
{
    let pool = WorkerPool::new(Arc::clone(&scheduler), worker_count)?;
    let mut summary = WatchSummary::default();
    info!("Watching for references with {} workers", worker_count);

    loop {
        if scheduler.is_cancelled() {
            info!("Shutdown requested, stopping acceptance");
            pool.shutdown();
            break;
        }

        match input.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                let reference = line.trim();
                if !reference.is_empty() {
                    pool.submit(reference.to_string())?;
                    summary.accepted += 1;
                    debug!("Accepted {} ({} queued)", reference, pool.queued());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Input closed, draining {} queued references", pool.queued());
                break;
            }
        }

        while let Some(work) = pool.try_recv_result() {
            summary.record(work, &mut on_outcome);
        }
    }

    let report = pool.wait();
    for work in report.results {
        summary.record(work, &mut on_outcome);
    }
    summary.abandoned = report.abandoned;

    if !summary.abandoned.is_empty() {
        warn!("{} references abandoned", summary.abandoned.len());
    }
    info!(
        "Watch finished: {} accepted, {} processed",
        summary.accepted,
        summary.outcomes.len()
    );
    Ok(summary)
}

/// Spawns a thread that forwards non-blank lines from `reader`. The channel
/// closes on EOF, on a read error, or when an exit command is read.
pub fn spawn_line_reader<R>(reader: R) -> Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = unbounded();

    let spawned = thread::Builder::new()
        .name("scribe-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if EXIT_COMMANDS.contains(&trimmed.to_ascii_lowercase().as_str()) {
                    debug!("Exit command received");
                    break;
                }
                if tx.send(trimmed.to_string()).is_err() {
                    break;
                }
            }
        });

    // Without a reader thread the sender is dropped and the channel reads
    // as closed.
    if let Err(e) = spawned {
        error!("Failed to spawn input reader: {}", e);
    }

    rx
}

/// Sets `flag` when the process receives Ctrl-C.
pub fn install_ctrlc_handler(flag: Arc<AtomicBool>) -> Result<(), WorkerError> {
    ctrlc::set_handler(move || {
        info!("Interrupt received, finishing in-flight stages...");
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| WorkerError::SignalHandler(e.to_string()))
}
