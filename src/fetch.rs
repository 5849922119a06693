//! HTTP fetching of ar5iv pages with retry on 429, 5xx and transport errors.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rate_limit::{parse_retry_after, retry_delay};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page not found: {url}")]
    NotFound { url: String },
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("gave up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Retry behaviour for [`PageFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base wait after a 429 without `Retry-After`.
    pub rate_limit_backoff: Duration,
    /// Base wait after a timeout, transport error or 5xx.
    pub retry_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_backoff: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(10),
        }
    }
}

/// `{base}/html/{id}`
pub fn ar5iv_url(site_base_url: &str, id: &str) -> String {
    format!("{}/html/{}", site_base_url.trim_end_matches('/'), id.trim())
}

#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    policy: FetchPolicy,
}

impl PageFetcher {
    pub fn new(user_agent: &str, timeout: Duration, policy: FetchPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// GET a page and return its body as (lossy) UTF-8.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            debug!("GET {} (attempt {})", url, attempt + 1);
            let (wait, last_error) = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.bytes().await {
                            Ok(body) => return Ok(String::from_utf8_lossy(&body).into_owned()),
                            Err(e) => (retry_delay(self.policy.retry_backoff, attempt), e.to_string()),
                        }
                    } else if status == StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound {
                            url: url.to_string(),
                        });
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok());
                        let wait = parse_retry_after(retry_after).unwrap_or_else(|| {
                            retry_delay(self.policy.rate_limit_backoff, attempt)
                        });
                        (wait, "rate limited (HTTP 429)".to_string())
                    } else if status.is_server_error() {
                        let retry_after = if status == StatusCode::SERVICE_UNAVAILABLE {
                            parse_retry_after(
                                response
                                    .headers()
                                    .get(reqwest::header::RETRY_AFTER)
                                    .and_then(|v| v.to_str().ok()),
                            )
                        } else {
                            None
                        };
                        let wait = retry_after
                            .unwrap_or_else(|| retry_delay(self.policy.retry_backoff, attempt));
                        (wait, format!("server error (HTTP {})", status.as_u16()))
                    } else {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                }
                Err(e) => (retry_delay(self.policy.retry_backoff, attempt), e.to_string()),
            };

            if attempt >= self.policy.max_retries {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    last_error,
                });
            }
            warn!(
                "{} for {}; retrying in {:?} ({}/{})",
                last_error,
                url,
                wait,
                attempt + 1,
                self.policy.max_retries
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
