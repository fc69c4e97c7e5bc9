//! Retry and response classification shared by the HTTP providers.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → returned to the caller immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

use crate::error::ProviderError;

/// Sends the request produced by `build`, retrying transient failures.
///
/// Returns the response for any success or non-retryable status; the
/// caller decides what a 404 means. When retries run out, the last
/// failure is reported as [`ProviderError::QuotaExceeded`] (429) or
/// [`ProviderError::Unavailable`].
pub async fn send_with_retry<F>(
    provider: &str,
    max_retries: u32,
    build: F,
) -> Result<Response, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(provider, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if !is_retryable(status) {
                    return Ok(response);
                }
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(provider, %status, "transient provider error");
                last_err = Some(if status == StatusCode::TOO_MANY_REQUESTS {
                    ProviderError::QuotaExceeded {
                        provider: provider.to_string(),
                        message: body,
                    }
                } else {
                    ProviderError::unavailable(provider, format!("{}: {}", status, body))
                });
            }
            Err(e) => {
                tracing::warn!(provider, error = %e, "provider request failed");
                last_err = Some(ProviderError::unavailable(provider, e));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ProviderError::unavailable(provider, "request failed after retries")))
}

/// Parses a successful response as JSON; any other status becomes
/// [`ProviderError::Rejected`].
pub async fn json_body(
    provider: &str,
    response: Response,
) -> Result<serde_json::Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Rejected {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| ProviderError::bad_response(provider, e))
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// Shared reqwest client with a per-request timeout.
pub fn http_client(provider: &str, timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::misconfigured(provider, e))
}
