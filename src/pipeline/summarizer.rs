//! Answer summarization stage.
//!
//! Turns the execution outcome into prose with the LLM. A halted run gets a
//! fixed explanation instead, without an LLM call.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{Result, WardenError};
use crate::llm::prompt::{build_failure_messages, build_summary_messages};
use crate::llm::LlmClient;

use super::context::ExecutionOutcome;

pub struct Summarizer {
    client: Arc<dyn LlmClient>,
    row_limit: usize,
    timeout: Duration,
}

impl Summarizer {
    /// `row_limit` caps how many result rows are shown to the model.
    pub fn new(client: Arc<dyn LlmClient>, row_limit: usize, timeout: Duration) -> Self {
        Self {
            client,
            row_limit: row_limit.max(1),
            timeout,
        }
    }

    /// Explains `outcome` as the answer to `question`.
    ///
    /// Failed executions are explained too. Fails if the model errors, times
    /// out or returns nothing.
    pub async fn summarize(
        &self,
        question: &str,
        sql: &str,
        outcome: &ExecutionOutcome,
    ) -> Result<String> {
        let messages = match outcome {
            ExecutionOutcome::Rows(result) => {
                build_summary_messages(question, sql, &result.format_as_text(self.row_limit))
            }
            ExecutionOutcome::Failed { message } => build_failure_messages(question, sql, message),
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.client.complete(&messages))
            .await
            .map_err(|_| {
                WardenError::pipeline(format!(
                    "Summarization timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| WardenError::pipeline(format!("Summarization failed: {}", e)))?;

        let answer = response.trim();
        if answer.is_empty() {
            return Err(WardenError::pipeline("Summarization returned an empty answer"));
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            success = outcome.is_success(),
            "Summarized result"
        );
        Ok(answer.to_string())
    }
}

/// Answer for a run that exhausted its iterations without a safe query.
pub fn explain_halt(attempts: u32, halt_feedback: &str) -> String {
    format!(
        "I could not produce a safe, read-only query for this question after {} attempt{}. {}",
        attempts,
        if attempts == 1 { "" } else { "s" },
        halt_feedback
    )
}
