//! Test results and the reports that collect them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Completion, CoreError, DefinitionId, InvocationId};

/// Result of a single test run against a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Invocation this result was retrieved for.
    pub task_id: InvocationId,

    /// Test name; together with the task it recovers the path.
    pub name: String,

    /// Target the test ran against.
    pub target: String,

    /// When the result was retrieved.
    pub run_time: DateTime<Utc>,

    /// Outcome reported by the service, false when the probe itself failed.
    pub result: bool,

    /// Human-readable explanation.
    pub note: String,
}

impl TestResult {
    /// Create a result stamped with the current time.
    pub fn new(
        task_id: InvocationId,
        name: impl Into<String>,
        target: impl Into<String>,
        result: bool,
        note: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            name: name.into(),
            target: target.into(),
            run_time: Utc::now(),
            result,
            note: note.into(),
        }
    }
}

/// Finalized collection of results for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Invocation this report belongs to.
    pub task_id: InvocationId,

    /// Schedule slot the invocation was fired from.
    pub definition_id: DefinitionId,

    /// Number of results the invocation dispatched work for.
    pub expected: usize,

    /// Results in arrival order.
    pub results: Vec<TestResult>,

    /// How aggregation ended.
    pub completion: Completion,

    /// When aggregation started.
    pub started_at: DateTime<Utc>,

    /// When aggregation ended.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Create an empty report awaiting `expected` results.
    pub fn new(task_id: InvocationId, definition_id: DefinitionId, expected: usize) -> Self {
        Self {
            task_id,
            definition_id,
            expected,
            results: Vec::with_capacity(expected),
            completion: Completion::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a result, rejecting results that belong to another invocation.
    pub fn record(&mut self, result: TestResult) -> Result<(), CoreError> {
        if result.task_id != self.task_id {
            return Err(CoreError::ForeignResult {
                expected: self.task_id,
                actual: result.task_id,
            });
        }
        self.results.push(result);
        Ok(())
    }

    /// Number of results received so far.
    pub fn received(&self) -> usize {
        self.results.len()
    }

    /// Returns true once every expected result has been recorded.
    pub fn is_full(&self) -> bool {
        self.results.len() >= self.expected
    }

    /// Mark aggregation as ended.
    pub fn finish(&mut self, completion: Completion) {
        self.completion = completion;
        self.finished_at = Some(Utc::now());
    }

    /// Number of results with a passing outcome.
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.result).count()
    }

    /// Number of results with a failing outcome.
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}
