use crate::utils::error::{CensusError, Result};
use crate::utils::retry::RetryPolicy;
use reqwest::{header::RETRY_AFTER, RequestBuilder, Response, StatusCode};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Rate limits and server-side failures are worth another attempt.
pub fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}…", head)
    }
}

/// Sends the request built by `build`, retrying transient failures per `policy`.
///
/// Non-transient HTTP statuses fail immediately with [`CensusError::UpstreamError`];
/// running out of attempts yields [`CensusError::RetryExhausted`].
pub async fn send_with_retry<F>(operation: &str, policy: &RetryPolicy, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let max_attempts = policy.max_attempts();
    let mut last_error = String::new();

    for attempt in 0..max_attempts {
        let delay = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) if is_transient(response.status()) => {
                last_error = format!("HTTP {}", response.status());
                retry_after(&response)
                    .map(|suggested| policy.clamp(suggested))
                    .unwrap_or_else(|| policy.delay_for(attempt))
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(CensusError::UpstreamError {
                    operation: operation.to_string(),
                    status: status.as_u16(),
                    message: truncate_body(&body),
                });
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                last_error = e.to_string();
                policy.delay_for(attempt)
            }
            Err(e) => return Err(e.into()),
        };

        if attempt + 1 < max_attempts {
            tracing::warn!(
                "⏳ {} failed ({}), retrying in {:?} (retry {}/{})",
                operation,
                last_error,
                delay,
                attempt + 1,
                policy.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(CensusError::RetryExhausted {
        operation: operation.to_string(),
        attempts: max_attempts,
        last_error,
    })
}
