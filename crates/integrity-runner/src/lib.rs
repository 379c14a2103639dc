//! Integrity Runner Library
//!
//! Periodically runs integrity tests against remote resources. Each firing
//! of a task definition expands into one work item per (target, test) pair,
//! fans out over a fixed pool of probe workers and fans back in to a single
//! report per invocation.

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod pool;
pub mod probe;
pub mod reporter;
pub mod scheduler;
pub mod source;

pub use aggregator::{aggregate, AggregateError};
pub use config::{Config, OutputFormat};
pub use dispatcher::{dispatch, DispatchError, Dispatched};
pub use pool::{work_queue, PoolError, WorkItem, WorkQueue, WorkReceiver, WorkerPool};
pub use probe::{expand_path, HttpProber, ProbeError, ProbeOutcome, Prober};
pub use reporter::{render_json, render_text, JsonReporter, Reporter, TextReporter};
pub use scheduler::{Invocation, Scheduler, SchedulerConfig, SchedulerError, TriggerState};
pub use source::{DefinitionError, DefinitionSource, FileDefinitionSource, StaticDefinitionSource};
