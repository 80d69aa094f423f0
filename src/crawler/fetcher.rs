//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the shared HTTP client (one connection pool for every worker)
//! - GET requests with a per-attempt timeout
//! - Retry with fixed or exponential backoff for transient failures
//! - Rate limiting before every attempt, retries included
//! - Error classification

use crate::config::{BackoffKind, HttpConfig};
use crate::crawler::rate_limiter::RateLimiter;
use crate::url::page_url;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Broad category of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The attempt did not finish within the timeout
    Timeout,

    /// The server answered with a non-success status
    HttpError,

    /// Connection refused, reset, DNS failure, truncated body, ...
    NetworkError,

    /// The page URL could not be built
    InvalidUrl,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::HttpError => "http_error",
            Self::NetworkError => "network_error",
            Self::InvalidUrl => "invalid_url",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Page body content
        body: String,
        /// HTTP status code
        status_code: u16,
    },

    /// The request failed
    ///
    /// Once retries are exhausted (or the failure is terminal) `retriable` is
    /// always false: the caller should treat the page as failed.
    Failure {
        kind: FailureKind,
        status_code: Option<u16>,
        retriable: bool,
        /// Attempts made, first attempt included
        attempts: u32,
    },
}

impl FetchResult {
    /// True for 404/410, the statuses that mean "this page does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Failure {
                status_code: Some(404 | 410),
                ..
            }
        )
    }
}

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `failures`-th failed attempt (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                // base * 2^(failures - 1)
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Timeout and retry settings for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first attempt included
    pub max_attempts: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        let base = Duration::from_millis(config.backoff_base_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(config.backoff_max_ms),
            },
        };

        Self {
            max_attempts: config.max_retries.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            backoff,
        }
    }
}

/// Builds the HTTP client shared by every worker
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::HttpConfig;
/// use catalog_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Failure of a single attempt, before the retry decision
#[derive(Debug, Clone, Copy)]
struct AttemptFailure {
    kind: FailureKind,
    status_code: Option<u16>,
    retriable: bool,
}

/// Rate-limited, retrying page fetcher
///
/// Cloning is cheap; clones share the connection pool and the rate limiter.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    url_template: String,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl Fetcher {
    pub fn new(
        client: Client,
        url_template: impl Into<String>,
        policy: RetryPolicy,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            policy,
            limiter,
        }
    }

    /// Builds the URL of a listing page
    pub fn page_url(&self, page_number: u32) -> Result<Url, crate::UrlError> {
        page_url(&self.url_template, page_number)
    }

    /// Fetches listing page `page_number`
    pub async fn fetch(&self, page_number: u32) -> FetchResult {
        match self.page_url(page_number) {
            Ok(url) => self.fetch_url(&url).await,
            Err(e) => {
                tracing::error!(page = page_number, error = %e, "cannot build page URL");
                FetchResult::Failure {
                    kind: FailureKind::InvalidUrl,
                    status_code: None,
                    retriable: false,
                    attempts: 0,
                }
            }
        }
    }

    /// Fetches a URL with retry logic
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 404 / 410 | Immediate terminal failure |
    /// | Any other non-2xx (429, 5xx, 403, ...) | Retry |
    /// | Timeout | Retry |
    /// | Connection or body error | Retry |
    ///
    /// The rate limiter is acquired before every attempt. After
    /// `max_attempts` the last failure is returned with `retriable: false`.
    pub async fn fetch_url(&self, url: &Url) -> FetchResult {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            tracing::debug!(url = %url, attempt, "fetching");

            let failure = match self.attempt(url).await {
                Ok((status_code, body)) => {
                    return FetchResult::Success { body, status_code };
                }
                Err(failure) => failure,
            };

            if !failure.retriable || attempt >= max_attempts {
                tracing::warn!(
                    url = %url,
                    attempts = attempt,
                    kind = %failure.kind,
                    status = ?failure.status_code,
                    "giving up"
                );
                return FetchResult::Failure {
                    kind: failure.kind,
                    status_code: failure.status_code,
                    retriable: false,
                    attempts: attempt,
                };
            }

            let delay = self.policy.backoff.delay(attempt);
            tracing::warn!(
                url = %url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = %failure.kind,
                status = ?failure.status_code,
                "retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Makes exactly one request
    async fn attempt(&self, url: &Url) -> Result<(u16, String), AttemptFailure> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.policy.timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(AttemptFailure {
                kind: FailureKind::HttpError,
                status_code: Some(status.as_u16()),
                retriable: false,
            });
        }

        if !status.is_success() {
            return Err(AttemptFailure {
                kind: FailureKind::HttpError,
                status_code: Some(status.as_u16()),
                retriable: true,
            });
        }

        let body = response.text().await.map_err(|e| classify_error(&e))?;
        Ok((status.as_u16(), body))
    }
}

/// Classifies a transport error
fn classify_error(error: &reqwest::Error) -> AttemptFailure {
    let (kind, retriable) = if error.is_timeout() {
        (FailureKind::Timeout, true)
    } else if error.is_builder() {
        (FailureKind::InvalidUrl, false)
    } else {
        (FailureKind::NetworkError, true)
    };

    AttemptFailure {
        kind,
        status_code: error.status().map(|s| s.as_u16()),
        retriable,
    }
}
