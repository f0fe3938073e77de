// Blocking HTTP plumbing shared by the Ollama and Gemini clients.
// Callers run these requests on tokio's blocking pool.


use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::NetworkConfig;
use crate::{RagError, Result};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

#[derive(Debug, Clone)]
pub struct HttpClient {
    provider: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

impl HttpClient {
    #[inline]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }

    /// Client with the timeout and retry budget from the `[network]` section
    #[inline]
    pub fn from_config(provider: impl Into<String>, network: &NetworkConfig) -> Self {
        Self::new(provider)
            .with_timeout(Duration::from_secs(network.timeout_seconds))
            .with_retry_attempts(network.retry_attempts)
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubles on every further attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn get(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        self.send_with_retry(url, || {
            self.agent
                .get(url)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn post_json<T: Serialize>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let body = serde_json::to_string(body).map_err(|e| {
            RagError::Network(format!("Failed to serialize {} request: {}", self.provider, e))
        })?;

        debug!("POST {} ({} bytes)", url, body.len());
        self.send_with_retry(url, || {
            let mut request = self
                .agent
                .post(url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
                .send(body.as_str())
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn send_with_retry<F>(&self, url: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let retryable = match &error {
                        ureq::Error::StatusCode(status) => {
                            if let Some(err) = self.classify_status(*status) {
                                warn!("{} returned HTTP {}, not retrying", self.provider, status);
                                return Err(err);
                            }
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                            true
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !retryable {
                        warn!("Non-retryable error: {}", error);
                        return Err(RagError::Network(format!(
                            "{} request failed: {}",
                            self.provider, error
                        )));
                    }

                    last_error = Some(RagError::Network(format!(
                        "{} request failed: {}",
                        self.provider, error
                    )));

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);
        Err(last_error
            .unwrap_or_else(|| RagError::Network(format!("{} request failed", self.provider))))
    }

    /// Map client-side HTTP statuses to errors; `None` means the status is retryable
    fn classify_status(&self, status: u16) -> Option<RagError> {
        match status {
            401 | 403 => Some(RagError::Auth {
                provider: self.provider.clone(),
                message: format!("HTTP {}: check the configured API key", status),
            }),
            429 => Some(RagError::RateLimit {
                provider: self.provider.clone(),
                message: "quota exhausted (HTTP 429)".to_string(),
            }),
            s if s >= 500 => None,
            s => Some(RagError::Network(format!(
                "{} rejected the request: HTTP {}",
                self.provider, s
            ))),
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Run a blocking provider call on tokio's blocking pool
#[inline]
pub async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}
