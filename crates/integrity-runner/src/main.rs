//! Integrity test runner.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use integrity_runner::{
    work_queue, Config, FileDefinitionSource, HttpProber, JsonReporter, OutputFormat, Reporter,
    Scheduler, TextReporter, WorkerPool,
};

/// Run integrity tests against resources on multiple services.
#[derive(Parser, Debug)]
#[command(name = "integrity", about = "Run integrity tests against resources on multiple services")]
struct Args {
    /// Task definition files (JSON); numbered 1, 2, ... in order
    #[arg(required = true)]
    definitions: Vec<PathBuf>,

    /// Number of probe workers
    #[arg(long, default_value = "5")]
    workers: usize,

    /// Capacity of the shared work queue
    #[arg(long, default_value = "64")]
    queue_capacity: usize,

    /// Seconds between firings of each definition
    #[arg(long, default_value = "10")]
    every_secs: u64,

    /// Per-request probe timeout in seconds
    #[arg(long, default_value = "10")]
    probe_timeout_secs: u64,

    /// Seconds to wait for one task's results (0 waits forever)
    #[arg(long, default_value = "60")]
    aggregation_timeout_secs: u64,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Fire every definition once, print the reports and exit
    #[arg(long)]
    once: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            definitions: args.definitions,
            workers: args.workers,
            queue_capacity: args.queue_capacity,
            every: Duration::from_secs(args.every_secs),
            probe_timeout: Duration::from_secs(args.probe_timeout_secs),
            aggregation_timeout: match args.aggregation_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            output: args.output,
            once: args.once,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from(Args::parse());

    // Logs go to stderr; stdout carries reports only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("integrity=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("Act with integrity.");

    let (queue, receiver) = work_queue(config.queue_capacity)?;
    let prober = Arc::new(HttpProber::new(config.probe_timeout)?);
    let pool = WorkerPool::start(config.workers, receiver, prober)?;

    let source = FileDefinitionSource::from_paths(config.definitions.iter());
    let definition_ids = source.ids();
    for id in &definition_ids {
        if let Some(path) = source.path(*id) {
            info!(definition_id = %id, path = %path.display(), "Task definition configured");
        }
    }

    let reporter: Arc<dyn Reporter> = match config.output {
        OutputFormat::Text => Arc::new(TextReporter),
        OutputFormat::Json => Arc::new(JsonReporter),
    };

    let scheduler = Arc::new(Scheduler::new(
        queue,
        Arc::new(source),
        reporter,
        config.scheduler_config(),
    ));
    for id in definition_ids {
        scheduler.register(id, config.every).await?;
    }

    if config.once {
        for (id, outcome) in scheduler.run_once().await {
            if let Err(e) = outcome {
                error!(definition_id = %id, error = %e, "Task failed");
            }
        }
    } else {
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, shutting down");
                    shutdown.cancel();
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });

        scheduler.clone().run(cancel).await;
    }

    // Dropping the last queue handle lets the workers drain and exit.
    drop(scheduler);
    pool.join().await?;

    info!("Integrity runner stopped");
    Ok(())
}
