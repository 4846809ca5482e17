use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::{ScribeError, WorkerError};

use super::{ItemOutcome, Scheduler};

/// What a worker produced for one queued reference.
#[derive(Debug)]
pub struct WorkResult {
    pub reference: String,
    pub result: Result<ItemOutcome, ScribeError>,
}

/// Everything left over once the pool has stopped.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Results not yet collected through `try_recv_result`.
    pub results: Vec<WorkResult>,
    /// References that were queued but never started.
    pub abandoned: Vec<String>,
}

/// Worker threads draining an unbounded queue of references.
pub struct WorkerPool {
    job_sender: Sender<String>,
    job_receiver: Receiver<String>,
    result_receiver: Receiver<WorkResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(scheduler: Arc<Scheduler>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (job_sender, job_receiver) = unbounded::<String>();
        let (result_sender, result_receiver) = unbounded::<WorkResult>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_scheduler = Arc::clone(&scheduler);

            let handle = thread::Builder::new()
                .name(format!("scribe-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_scheduler);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            job_receiver,
            result_receiver,
            workers,
            shutdown,
        })
    }

    /// Queues a reference. Never blocks.
    pub fn submit(&self, reference: String) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(reference)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<WorkResult> {
        self.result_receiver.try_recv().ok()
    }

    /// References queued but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.job_receiver.len()
    }

    /// Stops workers from taking new references. In-flight jobs finish
    /// their current stage.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Closes the queue and joins all workers. Without a prior `shutdown`
    /// the workers first drain everything still queued.
    pub fn wait(self) -> PoolReport {
        // Dropping the sender lets workers see a disconnected, empty queue.
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        let report = PoolReport {
            results: self.result_receiver.try_iter().collect(),
            abandoned: self.job_receiver.try_iter().collect(),
        };

        info!(
            "All workers have stopped ({} abandoned)",
            report.abandoned.len()
        );
        report
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<String>,
    result_sender: Sender<WorkResult>,
    shutdown: Arc<AtomicBool>,
    scheduler: Arc<Scheduler>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) || scheduler.is_cancelled() {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(reference) => {
                debug!("Worker {} processing {}", worker_id, reference);
                let result = scheduler.process(&reference);
                if let Err(e) = &result {
                    error!("Worker {} failed on {}: {}", worker_id, reference, e);
                }

                if let Err(e) = result_sender.send(WorkResult { reference, result }) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
