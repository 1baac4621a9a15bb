//! HTTP client for the upstream APFS contract-forecast feed.

use std::time::Duration;

use anyhow::Context;
use apfs_core::RawForecastRecord;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info_span};

pub const CRATE_NAME: &str = "apfs-feed";

pub const DEFAULT_FEED_URL: &str = "https://apfs-cloud.dhs.gov/api/forecast/";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("feed body is not a JSON array of records: {0}")]
    Body(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Bounded exponential backoff for transient fetch failures. The upstream
/// publishes no tolerance contract, so the defaults are deliberately small.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    pub feed_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for FeedClientConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Fetches the forecast feed as one in-memory batch. No pagination, no
/// streaming; the upstream endpoint returns the full array in one response.
#[derive(Debug)]
pub struct FeedClient {
    client: reqwest::Client,
    feed_url: String,
    backoff: BackoffPolicy,
}

impl FeedClient {
    pub fn new(config: FeedClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            feed_url: config.feed_url,
            backoff: config.backoff,
        })
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// One GET against the feed endpoint. Exactly HTTP 200 succeeds; any other
    /// final status is a `FeedError::HttpStatus` and the batch produces zero
    /// writes. Retryable failures (5xx, 429, timeout/connect) are retried per
    /// the backoff policy before being surfaced.
    pub async fn fetch(&self) -> Result<Vec<RawForecastRecord>, FeedError> {
        let span = info_span!("feed_fetch", url = %self.feed_url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let resp_result = self.client.get(&self.feed_url).send().await;

            match resp_result {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status == StatusCode::OK {
                        let body = resp.bytes().await?;
                        let records = parse_feed_body(&body)?;
                        debug!(records = records.len(), "feed fetch complete");
                        return Ok(records);
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FeedError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FeedError::Request(err));
                }
            }
        }

        Err(FeedError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

/// Parse a feed response body into raw records. Split out of `fetch` so the
/// decode path is testable without a live endpoint.
pub fn parse_feed_body(body: &[u8]) -> Result<Vec<RawForecastRecord>, FeedError> {
    serde_json::from_slice(body).map_err(FeedError::Body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn feed_body_parses_into_raw_records() {
        let body = br#"[
            {"id": 1, "organization": "DHS", "dollar_range": {"display_name": "$0 to $250K"}},
            {"id": 2}
        ]"#;
        let records = parse_feed_body(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].organization.as_deref(), Some("DHS"));
        assert_eq!(records[1].organization, None);
    }

    #[test]
    fn non_array_body_is_a_body_error() {
        let err = parse_feed_body(br#"{"detail": "maintenance"}"#).unwrap_err();
        assert!(matches!(err, FeedError::Body(_)));
    }
}
