//! Query generation stage.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{Result, WardenError};
use crate::llm::prompt::build_generation_messages;
use crate::llm::{extract_sql, LlmClient};

/// Turns a question into a candidate SQL query with the LLM.
pub struct QueryGenerator {
    client: Arc<dyn LlmClient>,
    dialect: &'static str,
    timeout: Duration,
}

impl QueryGenerator {
    pub fn new(client: Arc<dyn LlmClient>, dialect: &'static str, timeout: Duration) -> Self {
        Self {
            client,
            dialect,
            timeout,
        }
    }

    /// Generates a candidate for `question`, addressing `feedback` from a
    /// previous rejection when present.
    ///
    /// Fails when the model errors, times out or returns no SQL.
    pub async fn generate(
        &self,
        schema_text: &str,
        question: &str,
        feedback: Option<&str>,
    ) -> Result<String> {
        let messages = build_generation_messages(schema_text, self.dialect, question, feedback);
        debug!(
            message_count = messages.len(),
            has_feedback = feedback.is_some(),
            "Requesting query generation"
        );

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.client.complete(&messages))
            .await
            .map_err(|_| {
                WardenError::pipeline(format!(
                    "Query generation timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| WardenError::pipeline(format!("Query generation failed: {}", e)))?;

        let sql = extract_sql(&response);
        if sql.is_empty() {
            return Err(WardenError::pipeline(
                "Query generation returned no SQL",
            ));
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            sql_len = sql.len(),
            "Generated candidate query"
        );
        Ok(sql)
    }
}
