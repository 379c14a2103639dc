//! Completion state of a report.

use serde::{Deserialize, Serialize};

/// How aggregation of a report ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Completion {
    /// Aggregation still in progress.
    #[default]
    Pending,
    /// Every expected result arrived.
    Complete,
    /// The result sink closed before every expected result arrived.
    Truncated,
    /// The aggregation deadline elapsed first.
    TimedOut,
}

impl Completion {
    /// Returns true if the report is missing results.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Truncated | Self::TimedOut)
    }
}
