//! Shared HTTP plumbing for fetchers: client construction and bounded retry.

use crate::config::CollectorConfig;
use crate::error::{HarvestError, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest server-requested wait we are willing to honour.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Timeout and retry settings copied out of [`CollectorConfig`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl From<&CollectorConfig> for HttpSettings {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from(&CollectorConfig::default())
    }
}

/// Build a client with the per-request timeout and an optional proxy. Cookies
/// set by a source persist across its pages.
pub fn build_client(
    settings: &HttpSettings,
    user_agent: &str,
    proxy: Option<&str>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(settings.timeout)
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            HarvestError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn jitter(backoff: Duration) -> Duration {
    let spread = (backoff.as_millis() as u64 / 4).max(1);
    Duration::from_millis(rand::random::<u64>() % spread)
}

/// Send a request, retrying 429/5xx responses and transport failures with
/// exponential backoff. `make_request` is called once per attempt.
///
/// Non-retryable statuses fail immediately; once retries are exhausted the last
/// failure is returned.
pub async fn send_with_retry<F>(
    source: &str,
    settings: &HttpSettings,
    make_request: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut backoff = settings.initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        let wait = match make_request().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                if !is_retryable_status(status) || attempt >= settings.max_retries {
                    return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                        HarvestError::RateLimited(
                            retry_after(&response).unwrap_or(backoff).as_secs(),
                        )
                    } else {
                        HarvestError::Api {
                            code: status.as_u16() as i32,
                            message: format!("{} API error: {}", source, status),
                        }
                    });
                }
                let wait = retry_after(&response).unwrap_or(backoff).max(backoff);
                warn!(
                    source = source,
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Transient HTTP status, backing off"
                );
                wait
            }
            Err(e) => {
                if !is_retryable_error(&e) || attempt >= settings.max_retries {
                    return Err(HarvestError::Network(e));
                }
                debug!(
                    source = source,
                    attempt = attempt + 1,
                    error = %e,
                    "Request failed, backing off"
                );
                backoff
            }
        };

        tokio::time::sleep(wait + jitter(wait)).await;
        backoff *= 2;
        attempt += 1;
    }
}
