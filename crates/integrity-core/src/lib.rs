//! Integrity Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Async runtimes
//! - Scheduling specifics
//!
//! All types here describe what an integrity run is: the definitions that
//! are scheduled, the tasks they expand into and the reports they produce.

pub mod error;
pub mod ids;
pub mod product;
pub mod report;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{DefinitionId, InvocationId};
pub use product::{outer_product, OuterProduct};
pub use report::{Report, TestResult};
pub use status::Completion;
pub use task::{Task, TaskDefinition, TestSpec};
