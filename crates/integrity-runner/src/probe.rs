//! Probing diagnostic endpoints.
//!
//! A probe expands a test's path template with one target, calls the
//! service and decodes its `{"Result": bool, "Note": string}` verdict.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while probing a target.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("path template '{0}' must contain exactly one %s")]
    InvalidTemplate(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Verdict returned by a service for one target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProbeOutcome {
    #[serde(alias = "result")]
    pub result: bool,

    #[serde(default, alias = "note")]
    pub note: String,
}

impl ProbeOutcome {
    pub fn new(result: bool, note: impl Into<String>) -> Self {
        Self {
            result,
            note: note.into(),
        }
    }
}

/// Capability to run one integrity check.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Check `target` against the test at `path_template`.
    async fn probe(&self, path_template: &str, target: &str) -> Result<ProbeOutcome, ProbeError>;
}

/// Substitute `target` into the single `%s` slot of `template`.
pub fn expand_path(template: &str, target: &str) -> Result<String, ProbeError> {
    if template.matches("%s").count() != 1 {
        return Err(ProbeError::InvalidTemplate(template.to_string()));
    }
    Ok(template.replacen("%s", target, 1))
}

/// Probes services over HTTP GET.
#[derive(Clone)]
pub struct HttpProber {
    inner: reqwest::Client,
}

impl HttpProber {
    /// Create a prober whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, path_template: &str, target: &str) -> Result<ProbeOutcome, ProbeError> {
        let url = expand_path(path_template, target)?;
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
