//! Runner configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::scheduler::SchedulerConfig;

/// How finished reports are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Task definition files; definition ids are assigned 1, 2, ... in order.
    pub definitions: Vec<PathBuf>,

    /// Number of probe workers.
    pub workers: usize,

    /// Capacity of the shared work queue.
    pub queue_capacity: usize,

    /// Period between firings of each definition.
    pub every: Duration,

    /// Per-request probe timeout.
    pub probe_timeout: Duration,

    /// Upper bound on waiting for one invocation's results.
    pub aggregation_timeout: Option<Duration>,

    /// Report format.
    pub output: OutputFormat,

    /// Fire every definition once and exit.
    pub once: bool,
}

impl Config {
    /// Settings handed to the scheduler.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            aggregation_timeout: self.aggregation_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            definitions: Vec::new(),
            workers: 5,
            queue_capacity: 64,
            every: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(10),
            aggregation_timeout: Some(Duration::from_secs(60)),
            output: OutputFormat::Text,
            once: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.every, Duration::from_secs(10));
        assert_eq!(config.output, OutputFormat::Text);
        assert_eq!(
            config.scheduler_config().aggregation_timeout,
            Some(Duration::from_secs(60))
        );
    }
}
