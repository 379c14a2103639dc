//! Output of finished reports.

use std::fmt::Write as _;
use std::io::{self, Write};

use async_trait::async_trait;
use chrono::SecondsFormat;
use integrity_core::{Completion, Report};
use tracing::warn;

/// Receives each finished report exactly once.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, report: &Report);
}

/// Human-readable report on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReporter;

#[async_trait]
impl Reporter for TextReporter {
    async fn report(&self, report: &Report) {
        let text = render_text(report);
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Render a report in the text layout.
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();

    writeln!(out, "All done with {}:", report.task_id).ok();
    for r in &report.results {
        writeln!(
            out,
            "  #{} {} @ {} \n    {} -> {}",
            r.task_id,
            r.name,
            r.run_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            r.result,
            r.note
        )
        .ok();
    }

    match report.completion {
        Completion::Truncated => {
            writeln!(
                out,
                "  (truncated: {} of {} results)",
                report.received(),
                report.expected
            )
            .ok();
        }
        Completion::TimedOut => {
            writeln!(
                out,
                "  (timed out: {} of {} results)",
                report.received(),
                report.expected
            )
            .ok();
        }
        Completion::Pending | Completion::Complete => {}
    }

    out
}

/// One JSON line per report on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReporter;

#[async_trait]
impl Reporter for JsonReporter {
    async fn report(&self, report: &Report) {
        match render_json(report) {
            Ok(json) => {
                let mut stdout = io::stdout().lock();
                let _ = writeln!(stdout, "{}", json);
                let _ = stdout.flush();
            }
            Err(e) => {
                warn!(task_id = %report.task_id, error = %e, "Failed to serialize report");
            }
        }
    }
}

/// Render a report as a single JSON line, without the trailing newline.
pub fn render_json(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string(report)
}
