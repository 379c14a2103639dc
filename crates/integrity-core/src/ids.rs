//! Newtype wrappers for identifiers to ensure type safety.
//!
//! A definition id names a schedule slot and never changes. An invocation id
//! names one firing of that slot; two overlapping firings of the same
//! definition always carry different invocation ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a task definition (one schedule slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DefinitionId(u32);

impl DefinitionId {
    /// Create a new DefinitionId.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DefinitionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identifier of a single task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvocationId(u64);

impl InvocationId {
    /// Create a new InvocationId.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InvocationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
