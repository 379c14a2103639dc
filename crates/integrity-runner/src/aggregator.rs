//! Fan-in of one task's results into its report.

use std::time::Duration;

use integrity_core::{Completion, CoreError, InvocationId, Report, TestResult};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatched;

/// Aggregation errors. Both mean the count-based termination cannot be trusted.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("invariant violated: {0}")]
    ForeignResult(#[from] CoreError),

    #[error("invariant violated: task {task_id} received more than {expected} results")]
    Surplus {
        task_id: InvocationId,
        expected: usize,
    },
}

/// Collect results until the expected count arrives, the sink closes or
/// `deadline` elapses, whichever comes first.
///
/// A closed sink yields a `Truncated` report and an elapsed deadline a
/// `TimedOut` one; both carry whatever arrived before.
pub async fn aggregate(
    dispatched: Dispatched,
    deadline: Option<Duration>,
) -> Result<Report, AggregateError> {
    let Dispatched {
        task_id,
        definition_id,
        mut sink,
        expected,
    } = dispatched;

    let mut report = Report::new(task_id, definition_id, expected);

    let collected = match deadline {
        Some(limit) => {
            match tokio::time::timeout(limit, collect(&mut report, &mut sink)).await {
                Ok(collected) => collected,
                Err(_) => Ok(Completion::TimedOut),
            }
        }
        None => collect(&mut report, &mut sink).await,
    };

    sink.close();
    let completion = match collected {
        Ok(completion) => completion,
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Foreign result in task sink");
            return Err(e.into());
        }
    };

    if completion == Completion::Complete && sink.try_recv().is_ok() {
        error!(task_id = %task_id, expected, "Surplus result in task sink");
        return Err(AggregateError::Surplus { task_id, expected });
    }

    report.finish(completion);

    match completion {
        Completion::Complete => {
            info!(
                task_id = %task_id,
                results = report.received(),
                passed = report.passed(),
                failed = report.failed(),
                "Task complete"
            );
        }
        _ => {
            warn!(
                task_id = %task_id,
                received = report.received(),
                expected,
                completion = ?completion,
                "Task report is partial"
            );
        }
    }

    Ok(report)
}

async fn collect(
    report: &mut Report,
    sink: &mut mpsc::Receiver<TestResult>,
) -> Result<Completion, CoreError> {
    while !report.is_full() {
        match sink.recv().await {
            Some(result) => report.record(result)?,
            None => return Ok(Completion::Truncated),
        }
    }
    Ok(Completion::Complete)
}
