//! Ingestion worker pool
//!
//! N workers drain one bounded FIFO of bundle paths. Each worker owns its
//! handler (and therefore its store session) and runs a bundle to
//! completion before taking the next one. Dropping or closing the
//! [`BundleQueue`] is the only stop signal; workers exit once the queue is
//! closed and empty. [`WorkerPool::join`] is the drain barrier.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::pipeline::BundleHandler;

/// The queue was closed because every worker has gone away
#[derive(Debug, thiserror::Error)]
#[error("bundle queue is closed")]
pub struct QueueClosed(pub PathBuf);

/// Producer side of the work queue
pub struct BundleQueue {
    tx: mpsc::Sender<PathBuf>,
}

impl BundleQueue {
    /// Waits for room in the queue, then enqueues `path`
    pub async fn enqueue(&self, path: PathBuf) -> Result<(), QueueClosed> {
        self.tx.send(path).await.map_err(|e| QueueClosed(e.0))
    }

    /// Blocking variant for producers running outside the async runtime
    pub fn blocking_enqueue(&self, path: PathBuf) -> Result<(), QueueClosed> {
        self.tx.blocking_send(path).map_err(|e| QueueClosed(e.0))
    }

    /// Closes the queue. Workers finish what is queued, then exit.
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Per-worker counters, returned when the worker exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub processed: u64,
    pub persisted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub stats_written: u64,
    pub resources_written: u64,
}

/// Sum of every worker's report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
    /// Workers that panicked instead of returning a report
    pub crashed: usize,
}

impl PoolReport {
    fn total(&self, field: impl Fn(&WorkerReport) -> u64) -> u64 {
        self.workers.iter().map(field).sum()
    }

    pub fn processed(&self) -> u64 {
        self.total(|w| w.processed)
    }

    pub fn persisted(&self) -> u64 {
        self.total(|w| w.persisted)
    }

    pub fn rejected(&self) -> u64 {
        self.total(|w| w.rejected)
    }

    pub fn failed(&self) -> u64 {
        self.total(|w| w.failed)
    }

    pub fn stats_written(&self) -> u64 {
        self.total(|w| w.stats_written)
    }

    pub fn resources_written(&self) -> u64 {
        self.total(|w| w.resources_written)
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl WorkerPool {
    /// Starts one worker per handler over a queue holding at most
    /// `capacity` pending paths.
    pub fn spawn<H: BundleHandler>(handlers: Vec<H>, capacity: usize) -> (BundleQueue, WorkerPool) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = handlers
            .into_iter()
            .enumerate()
            .map(|(worker, handler)| tokio::spawn(run_worker(worker, handler, Arc::clone(&rx))))
            .collect::<Vec<_>>();

        info!(workers = handles.len(), capacity, "Worker pool started");
        (BundleQueue { tx }, WorkerPool { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to drain the queue and exit
    pub async fn join(self) -> PoolReport {
        let mut report = PoolReport::default();
        for result in join_all(self.handles).await {
            match result {
                Ok(worker) => report.workers.push(worker),
                Err(e) => {
                    error!(error = %e, "Ingestion worker crashed");
                    report.crashed += 1;
                }
            }
        }
        report.workers.sort_by_key(|w| w.worker);
        report
    }
}

async fn run_worker<H: BundleHandler>(
    worker: usize,
    mut handler: H,
    queue: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker,
        ..Default::default()
    };

    loop {
        let next = queue.lock().await.recv().await;
        let Some(path) = next else {
            break;
        };

        report.processed += 1;
        match handler.handle(&path).await {
            Ok(outcome) => {
                report.persisted += 1;
                report.resources_written += outcome.resources;
                if outcome.stat_written {
                    report.stats_written += 1;
                }
                debug!(worker, path = %path.display(), resources = outcome.resources, "Bundle loaded");
            }
            Err(e) if e.is_rejection() => {
                report.rejected += 1;
                warn!(worker, path = %path.display(), error = %e, "Bundle rejected");
            }
            Err(e) => {
                report.failed += 1;
                error!(worker, path = %path.display(), error = %e, "Bundle failed");
            }
        }
    }

    debug!(worker, processed = report.processed, "Worker finished");
    report
}
