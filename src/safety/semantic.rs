//! LLM-backed semantic safety review.
//!
//! Asks the model whether a query that already passed the local checks is
//! safe in intent. Any failure to get a clear `SAFE` answer is a rejection.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::prompt::build_validation_messages;
use crate::llm::LlmClient;

use super::{QueryValidator, ValidatorVerdict};

const SAFE_MARKER: &str = "SAFE";
const UNSAFE_PREFIX: &str = "UNSAFE:";
const FALLBACK_REASON: &str = "Semantic review flagged the query as unsafe without a reason.";

/// Validator that defers to an LLM reviewer, failing closed.
pub struct SemanticValidator {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl SemanticValidator {
    /// Creates a validator whose review calls are bounded by `timeout`.
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl QueryValidator for SemanticValidator {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn validate(&self, sql: &str) -> ValidatorVerdict {
        let messages = build_validation_messages(sql);

        let response =
            match tokio::time::timeout(self.timeout, self.client.complete(&messages)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(error = %e, "Semantic safety review failed");
                    return ValidatorVerdict::reject(format!(
                        "Semantic safety check failed: {}",
                        e
                    ));
                }
                Err(_) => {
                    warn!(timeout_secs = self.timeout.as_secs(), "Semantic safety review timed out");
                    return ValidatorVerdict::reject(format!(
                        "Semantic safety check failed: no response within {} seconds",
                        self.timeout.as_secs()
                    ));
                }
            };

        debug!(response = %response.trim(), "Semantic review response");
        parse_review(&response)
    }
}

/// Interprets a reviewer response.
///
/// Safe only when the first word is `SAFE`. Otherwise the text after an
/// optional `UNSAFE:` prefix is the reason.
pub fn parse_review(response: &str) -> ValidatorVerdict {
    let trimmed = response.trim();

    let first_word = trimmed
        .split(|c: char| c.is_whitespace() || c == ':' || c == '.' || c == ',')
        .next()
        .unwrap_or("");
    if first_word.eq_ignore_ascii_case(SAFE_MARKER) {
        return ValidatorVerdict::safe();
    }

    let reason = match trimmed.get(..UNSAFE_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(UNSAFE_PREFIX) => {
            trimmed[UNSAFE_PREFIX.len()..].trim()
        }
        _ => trimmed,
    };

    if reason.is_empty() {
        ValidatorVerdict::reject(FALLBACK_REASON)
    } else {
        ValidatorVerdict::reject(reason)
    }
}
