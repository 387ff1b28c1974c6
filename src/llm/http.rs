//! Shared HTTP plumbing for the remote LLM providers.

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, WardenError};

/// Maximum number of retry attempts for transient errors.
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
pub(crate) const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Builds a reqwest client with the given overall request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| WardenError::llm(format!("Failed to create HTTP client: {}", e)))
}

/// Sends the request produced by `build` and returns the body of the first
/// successful response.
///
/// `parse_error` turns a non-2xx response into an error and says whether it
/// is worth retrying. Retryable failures back off exponentially, up to
/// [`MAX_RETRY_ATTEMPTS`] attempts in total.
pub(crate) async fn send_with_retry<B, E>(provider: &str, build: B, parse_error: E) -> Result<String>
where
    B: Fn() -> RequestBuilder,
    E: Fn(StatusCode, &str) -> (WardenError, bool),
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        debug!(
            "{} API request attempt {} of {}",
            provider, attempt, MAX_RETRY_ATTEMPTS
        );

        let (error, is_retryable) = match build().send().await {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| WardenError::llm(format!("Failed to read response: {}", e)))?;

                if status.is_success() {
                    return Ok(body);
                }

                parse_error(status, &body)
            }
            Err(e) => request_error(provider, &e),
        };

        if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
            return Err(error);
        }

        warn!(
            "{} API request failed (attempt {}), retrying in {:?}: {}",
            provider, attempt, delay, error
        );

        tokio::time::sleep(delay).await;
        delay *= 2;
        attempt += 1;
    }
}

/// Maps a transport-level reqwest failure to an error and its retryability.
fn request_error(provider: &str, error: &reqwest::Error) -> (WardenError, bool) {
    if error.is_timeout() {
        (WardenError::llm("Request timed out. Try again."), true)
    } else if error.is_connect() {
        (
            WardenError::llm(format!(
                "Failed to connect to {} API. Check your network.",
                provider
            )),
            true,
        )
    } else {
        (WardenError::llm(format!("Request failed: {}", error)), false)
    }
}

/// Common status handling shared by the hosted providers.
///
/// Returns `None` when the status needs a provider-specific message.
pub(crate) fn classify_status(
    status: StatusCode,
    key_env: &str,
) -> Option<(WardenError, bool)> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some((
            WardenError::llm(format!("Authentication failed. Check your {}.", key_env)),
            false,
        ));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some((
            WardenError::llm("Rate limited. Please wait and try again."),
            true,
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unauthorized() {
        let (error, retryable) =
            classify_status(StatusCode::UNAUTHORIZED, "OPENAI_API_KEY").unwrap();
        assert!(error.to_string().contains("Check your OPENAI_API_KEY"));
        assert!(!retryable);
    }

    #[test]
    fn test_classify_rate_limited_is_retryable() {
        let (error, retryable) = classify_status(StatusCode::TOO_MANY_REQUESTS, "X").unwrap();
        assert!(error.to_string().contains("Rate limited"));
        assert!(retryable);
    }

    #[test]
    fn test_classify_other_status_defers() {
        assert!(classify_status(StatusCode::BAD_REQUEST, "X").is_none());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "X").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_without_retry_on_non_connect_error() {
        let client = build_client(1).unwrap();
        let result = send_with_retry(
            "Test",
            || client.get("not a url"),
            |status, _| (WardenError::llm(status.to_string()), false),
        )
        .await;
        assert!(result.is_err());
    }
}
