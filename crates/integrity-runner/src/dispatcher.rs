//! Expands a task into work items and pushes them onto the shared queue.

use integrity_core::{DefinitionId, InvocationId, Task, TestResult};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::pool::{WorkItem, WorkQueue};

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("work queue closed after {enqueued} of {expected} items for task {task_id}")]
    QueueClosed {
        task_id: InvocationId,
        enqueued: usize,
        expected: usize,
    },
}

/// A dispatched task: where its results arrive and how many to wait for.
#[derive(Debug)]
pub struct Dispatched {
    pub task_id: InvocationId,
    pub definition_id: DefinitionId,
    pub sink: mpsc::Receiver<TestResult>,
    pub expected: usize,
}

/// Enqueue one work item per (target, test) pair of `task`.
///
/// Returns once every item is on the queue. The returned sink closes when
/// every item has been answered or dropped, since only the items hold senders.
pub async fn dispatch(task: &Task, queue: &WorkQueue) -> Result<Dispatched, DispatchError> {
    let pairs = task.pairs();
    let expected = pairs.len();

    // Sized so no worker ever waits on the sink, even before aggregation starts.
    let (tx, rx) = mpsc::channel(expected.max(1));

    for (enqueued, (target, test)) in pairs.enumerate() {
        let item = WorkItem {
            task_id: task.id,
            test_name: test.name.clone(),
            test_path: test.path.clone(),
            target: target.clone(),
            sink: tx.clone(),
        };

        if queue.enqueue(item).await.is_err() {
            warn!(task_id = %task.id, enqueued, expected, "Work queue closed during dispatch");
            return Err(DispatchError::QueueClosed {
                task_id: task.id,
                enqueued,
                expected,
            });
        }
    }

    debug!(task_id = %task.id, expected, "Task dispatched");

    Ok(Dispatched {
        task_id: task.id,
        definition_id: task.definition_id,
        sink: rx,
        expected,
    })
}
