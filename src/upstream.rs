use crate::date::format_date;
use crate::error::ApodError;
use crate::models::{ApodResult, UpstreamApod};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);

/// Attempts and backoff for metadata requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 500 | 502 | 504)
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(endpoint: &str, api_key: String, retry: RetryPolicy) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid APOD endpoint {}", endpoint))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            retry,
        })
    }

    /// Fetches one APOD entry; `None` asks upstream for the current day.
    pub async fn fetch(&self, date: Option<NaiveDate>) -> Result<ApodResult, ApodError> {
        let mut query = vec![
            ("api_key", self.api_key.clone()),
            ("hd", "true".to_string()),
        ];
        if let Some(date) = date {
            query.push(("date", format_date(date)));
        }

        let mut attempt = 1;
        loop {
            debug!(attempt, date = ?date, "Requesting APOD metadata");
            let outcome = self
                .client
                .get(self.endpoint.clone())
                .query(&query)
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    let raw: UpstreamApod = response.json().await.map_err(|e| {
                        ApodError::Upstream(format!("undecodable response: {}", describe(&e)))
                    })?;
                    info!(attempt, date = ?raw.date, "Fetched APOD metadata");
                    return Ok(raw.into());
                }
                Ok(response) => {
                    let status = response.status();
                    if !RetryPolicy::is_retryable_status(status)
                        || attempt >= self.retry.max_attempts
                    {
                        return Err(ApodError::Upstream(format!(
                            "status {} after {} attempt(s)",
                            status, attempt
                        )));
                    }
                    warn!(attempt, status = status.as_u16(), "APOD request failed, retrying");
                }
                Err(e) => {
                    if !RetryPolicy::is_retryable_error(&e) || attempt >= self.retry.max_attempts {
                        return Err(ApodError::Upstream(format!(
                            "{} after {} attempt(s)",
                            describe(&e),
                            attempt
                        )));
                    }
                    warn!(attempt, error = %describe(&e), "APOD request failed, retrying");
                }
            }

            tokio::time::sleep(self.retry.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

// reqwest's Display appends the request URL, which carries the api key
pub(crate) fn describe(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_decode() {
        "invalid body"
    } else if err.is_body() {
        "body read failed"
    } else {
        "request failed"
    };

    match err.source() {
        Some(source) => format!("{}: {}", kind, source),
        None => kind.to_string(),
    }
}
