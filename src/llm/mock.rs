//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, WardenError};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

#[derive(Debug, Clone)]
enum MockReply {
    /// Successive responses; the last one repeats once the list is exhausted.
    Sequence(Vec<String>),
    Failure(String),
}

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Patterns are matched case-insensitively against the user messages of a
/// request, first registered pattern wins. Requests that match nothing get a
/// stage-appropriate default: `SAFE` for safety reviews, a short canned answer
/// for summaries, and a polite refusal for anything else.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Vec<(String, MockReply)>,
    /// How many times each reply index has been used.
    served: Mutex<HashMap<usize, usize>>,
    /// User text of every request received.
    requests: Mutex<Vec<String>>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock whose every call fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Adds a custom response mapping.
    ///
    /// When the input contains `pattern`, the mock will return `response`.
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.with_responses(pattern, [response])
    }

    /// Returns the given responses in order on successive matches of `pattern`,
    /// repeating the last one afterwards.
    pub fn with_responses<I, S>(mut self, pattern: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses: Vec<String> = responses.into_iter().map(Into::into).collect();
        self.replies.push((
            pattern.into().to_lowercase(),
            MockReply::Sequence(responses),
        ));
        self
    }

    /// Fails requests containing `pattern` with an LLM error.
    pub fn with_failure(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.replies.push((
            pattern.into().to_lowercase(),
            MockReply::Failure(message.into()),
        ));
        self
    }

    /// Delays every response, for exercising stage timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of requests received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns the user text of every request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Joins the user messages of a request; system prompts are not matched.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn reply_for(&self, input: &str) -> Result<String> {
        let input_lower = input.to_lowercase();

        let matched = self
            .replies
            .iter()
            .enumerate()
            .find(|(_, (pattern, _))| input_lower.contains(pattern.as_str()));

        match matched {
            Some((_, (_, MockReply::Failure(message)))) => Err(WardenError::llm(message.clone())),
            Some((index, (_, MockReply::Sequence(responses)))) => {
                let served = match self.served.lock() {
                    Ok(mut served) => {
                        let count = served.entry(index).or_insert(0);
                        *count += 1;
                        *count - 1
                    }
                    Err(_) => 0,
                };
                let position = served.min(responses.len().saturating_sub(1));
                Ok(responses.get(position).cloned().unwrap_or_default())
            }
            None => Ok(Self::default_response(&input_lower)),
        }
    }

    fn default_response(input_lower: &str) -> String {
        if input_lower.starts_with("query to analyze:") {
            return "SAFE".to_string();
        }

        if input_lower.contains("the query failed with this error:") {
            return "I'm sorry, the query could not be run against the database.".to_string();
        }

        if input_lower.contains("query results:") {
            return "Here is what the data shows.".to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let input = Self::extract_user_input(messages);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(input.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(WardenError::llm(message.clone()));
        }

        self.reply_for(&input)
    }
}
