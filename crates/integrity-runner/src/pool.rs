//! Shared work queue and the fixed pool of workers that drain it.

use std::sync::Arc;

use integrity_core::{InvocationId, TestResult};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::probe::Prober;

/// Where a worker publishes the result of one item.
pub type ResultSink = mpsc::Sender<TestResult>;

/// Worker pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("work queue capacity must be at least 1")]
    NoCapacity,

    #[error("work queue is closed")]
    QueueClosed,

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One (target, test) pair to probe, consumed exactly once.
#[derive(Debug)]
pub struct WorkItem {
    pub task_id: InvocationId,
    pub test_name: String,
    pub test_path: String,
    pub target: String,
    pub sink: ResultSink,
}

/// Producer side of the work queue. Cheap to clone.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
}

impl WorkQueue {
    /// Push an item, waiting for space if the queue is full.
    pub async fn enqueue(&self, item: WorkItem) -> Result<(), PoolError> {
        self.tx.send(item).await.map_err(|_| PoolError::QueueClosed)
    }
}

/// Consumer side of the work queue, shared by all workers.
#[derive(Clone)]
pub struct WorkReceiver {
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
}

impl WorkReceiver {
    /// Take the next item. Returns None once the queue is closed and drained.
    pub async fn next(&self) -> Option<WorkItem> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

/// Create the bounded queue feeding a worker pool.
pub fn work_queue(capacity: usize) -> Result<(WorkQueue, WorkReceiver), PoolError> {
    if capacity == 0 {
        return Err(PoolError::NoCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((
        WorkQueue { tx },
        WorkReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    ))
}

/// Fixed set of workers draining one work queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<usize>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers on `receiver`.
    pub fn start(
        worker_count: usize,
        receiver: WorkReceiver,
        prober: Arc<dyn Prober>,
    ) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let handles = (0..worker_count)
            .map(|index| {
                let receiver = receiver.clone();
                let prober = prober.clone();
                tokio::spawn(run_worker(index, receiver, prober))
            })
            .collect();

        info!(workers = worker_count, "Worker pool started");
        Ok(Self { handles })
    }

    /// Wait for every worker to exit and return how many items each processed.
    ///
    /// Workers exit only after every `WorkQueue` has been dropped and the queue drained.
    pub async fn join(self) -> Result<Vec<usize>, PoolError> {
        let mut processed = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            processed.push(handle.await?);
        }
        info!(processed = processed.iter().sum::<usize>(), "Worker pool stopped");
        Ok(processed)
    }
}

async fn run_worker(index: usize, receiver: WorkReceiver, prober: Arc<dyn Prober>) -> usize {
    debug!(worker = index, "Worker started");
    let mut processed = 0;

    while let Some(item) = receiver.next().await {
        let result = execute(prober.as_ref(), &item).await;
        processed += 1;

        if item.sink.send(result).await.is_err() {
            debug!(
                worker = index,
                task_id = %item.task_id,
                target = %item.target,
                test = %item.test_name,
                "Result sink closed - dropping result"
            );
        }
    }

    debug!(worker = index, processed, "Worker stopped");
    processed
}

/// Probe one item. A probe error becomes a failed result, never a dropped one.
async fn execute(prober: &dyn Prober, item: &WorkItem) -> TestResult {
    match prober.probe(&item.test_path, &item.target).await {
        Ok(outcome) => {
            debug!(
                task_id = %item.task_id,
                target = %item.target,
                test = %item.test_name,
                result = outcome.result,
                "Probe finished"
            );
            TestResult::new(
                item.task_id,
                &item.test_name,
                &item.target,
                outcome.result,
                outcome.note,
            )
        }
        Err(e) => {
            warn!(
                task_id = %item.task_id,
                target = %item.target,
                test = %item.test_name,
                error = %e,
                "Probe failed"
            );
            TestResult::new(
                item.task_id,
                &item.test_name,
                &item.target,
                false,
                format!("probe failed: {e}"),
            )
        }
    }
}
