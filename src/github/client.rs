//! Rate-limit aware HTTP access to the GitHub REST API.
//!
//! Every request goes through [`RateLimitedClient::request`], which:
//!
//! - injects `Accept`, `User-Agent` and (when a token is configured)
//!   `Authorization` headers;
//! - pauses the calling task while the shared [`RateLimitState`] says the
//!   quota is exhausted;
//! - retries rate-limited responses (429, or 403 carrying rate-limit
//!   semantics) using `Retry-After`, `X-RateLimit-Reset` or exponential
//!   backoff;
//! - retries network failures and 5xx responses a bounded number of times;
//! - surfaces any other 4xx immediately.
//!
//! All waits are `tokio::time::sleep`, so only the calling worker is
//! suspended.

use crate::error::{Result, ScanError};
use chrono::{DateTime, Local, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const GITHUB_JSON: &str = "application/vnd.github+json";
pub const GITHUB_RAW: &str = "application/vnd.github.raw+json";

const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Backoff and retry limits.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for a request that keeps getting rate limited.
    pub rate_limit_attempts: u32,
    /// Retries after a network failure or 5xx response.
    pub server_error_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// First wait after a secondary rate limit that names no retry time.
    /// Doubles per attempt.
    pub secondary_delay: Duration,
    /// Longest wait for a quota reset before giving up on the request.
    pub max_reset_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 5,
            server_error_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            secondary_delay: Duration::from_secs(60),
            max_reset_wait: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff for secondary rate limits: `secondary_delay * 2^attempt`,
    /// capped at `max_reset_wait`.
    pub fn secondary_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.secondary_delay
            .checked_mul(factor)
            .unwrap_or(self.max_reset_wait)
            .min(self.max_reset_wait)
    }
}

/// Remaining quota and reset time as last reported by GitHub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    /// Epoch seconds at which the quota resets.
    pub reset_at: Option<i64>,
}

impl RateLimitState {
    /// How long to hold off before the next request, if the quota is spent
    /// and the reset lies in the future.
    pub fn pause_needed(&self, now: i64) -> Option<Duration> {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset)) if reset > now => {
                Some(Duration::from_secs((reset - now) as u64))
            }
            _ => None,
        }
    }

    pub fn update(&mut self, headers: &HeaderMap) {
        if let Some(remaining) = header_number::<u32>(headers, HEADER_REMAINING) {
            self.remaining = Some(remaining);
        }
        if let Some(reset) = header_number::<i64>(headers, HEADER_RESET) {
            self.reset_at = Some(reset);
        }
    }
}

/// Shared handle to the one [`RateLimitState`] of a scan run.
///
/// The lock is only held for the read-decide or update step, never across
/// a network call or a sleep.
#[derive(Debug, Clone, Default)]
pub struct RateLimitHandle {
    state: Arc<Mutex<RateLimitState>>,
}

impl RateLimitHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RateLimitState {
        self.lock().clone()
    }

    fn pause_needed(&self, now: i64) -> Option<Duration> {
        self.lock().pause_needed(now)
    }

    fn update(&self, headers: &HeaderMap) {
        self.lock().update(headers);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimitState> {
        // State is plain data, a poisoned lock still holds a usable value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct RateLimitedClient {
    client: reqwest::Client,
    base_url: Url,
    policy: RetryPolicy,
    rate_limit: RateLimitHandle,
}

impl RateLimitedClient {
    pub fn new(options: ClientOptions, rate_limit: RateLimitHandle) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("hulud-scan/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(token) = options.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ScanError::Unauthorized)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()?;

        let base = options.base_url.trim_end_matches('/');
        let base_url =
            Url::parse(&format!("{}/", base)).map_err(|e| ScanError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            policy: options.retry,
            rate_limit,
        })
    }

    /// Builds an API URL from raw path segments (each one percent-encoded)
    /// and query pairs.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ScanError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Issues a request, retrying rate limits and transient failures.
    ///
    /// Returns the response on 2xx. A 4xx that is not a rate limit comes
    /// back as [`ScanError::Http`] without retrying; exhausted retries come
    /// back as [`ScanError::TransientApi`].
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        accept: Option<&str>,
    ) -> Result<Response> {
        let mut attempts = 0u32;
        let mut rate_limited = 0u32;
        let mut server_errors = 0u32;

        loop {
            if let Some(wait) = self.rate_limit.pause_needed(Utc::now().timestamp()) {
                if wait > self.policy.max_reset_wait {
                    let reset = self.rate_limit.snapshot().reset_at;
                    return Err(ScanError::TransientApi {
                        status: None,
                        attempts,
                        message: exhausted_message(reset),
                    });
                }
                warn!(wait_secs = wait.as_secs(), "rate limit exhausted, pausing");
                sleep(wait).await;
            }

            attempts += 1;
            debug!(%method, %url, attempt = attempts, "GitHub request");

            let mut builder = self.client.request(method.clone(), url.clone());
            if let Some(accept) = accept {
                builder = builder.header(ACCEPT, accept);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) => {
                    if server_errors >= self.policy.server_error_retries {
                        return Err(ScanError::TransientApi {
                            status: None,
                            attempts,
                            message: err.to_string(),
                        });
                    }
                    let delay = self.policy.backoff(server_errors);
                    server_errors += 1;
                    warn!(
                        %url,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    sleep(delay).await;
                    continue;
                }
            };

            self.rate_limit.update(response.headers());
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let message = github_message(status, &body);

            if is_rate_limited(status, &headers, &message) {
                rate_limited += 1;
                let reset = header_number::<i64>(&headers, HEADER_RESET);
                if rate_limited >= self.policy.rate_limit_attempts {
                    return Err(ScanError::TransientApi {
                        status: Some(status.as_u16()),
                        attempts,
                        message: exhausted_message(reset),
                    });
                }

                let delay = rate_limit_delay(
                    &self.policy,
                    &headers,
                    rate_limited - 1,
                    Utc::now().timestamp(),
                );
                if delay > self.policy.max_reset_wait {
                    return Err(ScanError::TransientApi {
                        status: Some(status.as_u16()),
                        attempts,
                        message: exhausted_message(reset),
                    });
                }
                warn!(
                    %url,
                    status = status.as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                sleep(delay).await;
                continue;
            }

            if status.is_server_error() {
                if server_errors >= self.policy.server_error_retries {
                    return Err(ScanError::TransientApi {
                        status: Some(status.as_u16()),
                        attempts,
                        message,
                    });
                }
                let delay = self.policy.backoff(server_errors);
                server_errors += 1;
                warn!(
                    %url,
                    status = status.as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "server error, retrying"
                );
                sleep(delay).await;
                continue;
            }

            return Err(ScanError::Http {
                status: status.as_u16(),
                message,
            });
        }
    }
}

/// Wait before retrying a rate-limited request. `Retry-After` wins. The
/// primary reset time only applies once the quota is spent. A limit hit
/// with quota left is a secondary one and backs off from
/// `secondary_delay`; without quota headers the regular backoff applies.
fn rate_limit_delay(
    policy: &RetryPolicy,
    headers: &HeaderMap,
    attempt: u32,
    now: i64,
) -> Duration {
    if let Some(secs) = header_number::<u64>(headers, RETRY_AFTER.as_str()) {
        return Duration::from_secs(secs);
    }
    match header_number::<u32>(headers, HEADER_REMAINING) {
        Some(0) => match header_number::<i64>(headers, HEADER_RESET) {
            Some(reset) if reset > now => Duration::from_secs((reset - now) as u64),
            _ => policy.backoff(attempt),
        },
        Some(_) => policy.secondary_backoff(attempt),
        None => policy.backoff(attempt),
    }
}

fn exhausted_message(reset: Option<i64>) -> String {
    format!("API rate limit exceeded; resets at {}", format_reset(reset))
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap, message: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (header_number::<u32>(headers, HEADER_REMAINING) == Some(0)
            || headers.contains_key(RETRY_AFTER)
            || message.to_lowercase().contains("rate limit"))
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Extracts GitHub's `message` field from an error body, falling back to
/// the raw body or the status reason.
fn github_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    if let Ok(ErrorBody { message: Some(message) }) = serde_json::from_str::<ErrorBody>(body) {
        return message;
    }
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}

/// Renders an `X-RateLimit-Reset` value as local time.
pub fn format_reset(reset: Option<i64>) -> String {
    reset
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
