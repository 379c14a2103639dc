//! Core domain errors.

use thiserror::Error;

use crate::InvocationId;

/// Core domain errors for integrity runs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A result was recorded against a report for another invocation.
    #[error("Result for task {actual} recorded in report for task {expected}")]
    ForeignResult {
        expected: InvocationId,
        actual: InvocationId,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
