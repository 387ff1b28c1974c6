//! Prompt construction for LLM requests.
//!
//! Builds the message lists for the three LLM-backed stages: query
//! generation, semantic safety review and answer summarization.

use crate::llm::types::Message;

/// System prompt template for query generation.
const GENERATION_PROMPT_TEMPLATE: &str = r#"You are an expert SQL query generator. Convert natural language questions into {dialect} queries.

DATABASE SCHEMA:
{schema}

INSTRUCTIONS:
- Generate ONLY SELECT queries (read-only operations)
- Never use DROP, DELETE, UPDATE, INSERT, ALTER, TRUNCATE, CREATE or any other modifying command
- Use valid {dialect} syntax
- Use WHERE clauses, JOINs and aggregations as the question requires, following the foreign keys
- Return ONLY the SQL query, without explanation or markdown formatting
- Do not end the query with a semicolon"#;

/// System prompt for the semantic safety review.
const VALIDATION_PROMPT: &str = r#"You are a SQL security expert. Analyze the given SQL query for safety.

A query is SAFE if:
1. It is a SELECT statement (read-only)
2. It does not contain any destructive commands (DROP, DELETE, UPDATE, INSERT, ALTER, etc.)
3. It does not attempt to bypass restrictions or exploit vulnerabilities
4. It follows standard SQL practice

Respond with EXACTLY one of these formats:
SAFE
or
UNSAFE: [brief reason]

Do not provide any other explanation."#;

/// System prompt for turning query results into an answer.
const SUMMARY_PROMPT: &str = r#"You are a helpful assistant that explains SQL query results in plain English.

Your task is to:
- Answer the user's question clearly and conversationally
- Highlight key insights and notable values in the data
- Avoid technical jargon and keep the answer concise

Do not simply list all the data, and do not repeat the query unless it helps the explanation."#;

/// System prompt for explaining a failed query.
const FAILURE_PROMPT: &str = r#"You are a helpful assistant. A database query written to answer the user's question failed.

Explain in plain English, in a few sentences, that the question could not be answered and what the error suggests went wrong. Do not invent results."#;

/// Prefix of the refinement message sent on retries.
pub const REFINEMENT_PREFIX: &str = "Previous attempt failed safety check. Feedback:";

/// Builds the generation prompt for `question`.
///
/// On retries `feedback` carries the previous rejection reason, sent as its
/// own message ahead of the question.
pub fn build_generation_messages(
    schema_text: &str,
    dialect: &str,
    question: &str,
    feedback: Option<&str>,
) -> Vec<Message> {
    let system = GENERATION_PROMPT_TEMPLATE
        .replace("{dialect}", dialect)
        .replace("{schema}", schema_text.trim_end());

    let mut messages = vec![Message::system(system)];
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        messages.push(Message::user(format!("{} {}", REFINEMENT_PREFIX, feedback)));
    }
    messages.push(Message::user(format!("Question: {}", question)));
    messages
}

/// Builds the semantic safety review prompt for `sql`.
pub fn build_validation_messages(sql: &str) -> Vec<Message> {
    vec![
        Message::system(VALIDATION_PROMPT),
        Message::user(format!("Query to analyze:\n{}", sql)),
    ]
}

/// Builds the summarization prompt for a query that returned rows.
///
/// `data_text` is the rendered (and already row-limited) result table.
pub fn build_summary_messages(question: &str, sql: &str, data_text: &str) -> Vec<Message> {
    vec![
        Message::system(SUMMARY_PROMPT),
        Message::user(format!(
            "User's Question: {}\n\nSQL Query Executed: {}\n\nQuery Results:\n{}\n\n\
             Please provide a clear, helpful answer to the user's question based on these results.",
            question, sql, data_text
        )),
    ]
}

/// Builds the summarization prompt for a query that failed at execution.
pub fn build_failure_messages(question: &str, sql: &str, error: &str) -> Vec<Message> {
    vec![
        Message::system(FAILURE_PROMPT),
        Message::user(format!(
            "User's Question: {}\n\nSQL Query Executed: {}\n\nThe query failed with this error:\n{}",
            question, sql, error
        )),
    ]
}
