//! Lexical command classifier.
//!
//! The first and cheapest check in the chain: scans the query text for
//! blocked command keywords and requires a leading `SELECT`. Runs without any
//! network or database access.

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Result, WardenError};

use super::{QueryValidator, ValidatorVerdict};

/// Commands that may not appear anywhere in a candidate query, in check order.
pub const BLOCKED_KEYWORDS: [&str; 10] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "REPLACE", "CREATE", "GRANT",
    "REVOKE",
];

/// Keyword scanner over whole-word, case-insensitive patterns.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    patterns: Vec<(&'static str, Regex)>,
}

impl CommandClassifier {
    /// Compiles the keyword patterns.
    pub fn new() -> Result<Self> {
        let patterns = BLOCKED_KEYWORDS
            .iter()
            .map(|keyword| {
                Regex::new(&format!(r"(?i)\b{}\b", keyword))
                    .map(|re| (*keyword, re))
                    .map_err(|e| {
                        WardenError::internal(format!("Invalid keyword pattern {}: {}", keyword, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Classifies `sql`. The first blocked keyword found decides the reason.
    pub fn classify(&self, sql: &str) -> ValidatorVerdict {
        if let Some(keyword) = self.find_blocked_keyword(sql) {
            return ValidatorVerdict::reject(format!(
                "Query contains prohibited command: {}. Only SELECT queries are allowed.",
                keyword
            ));
        }

        if !starts_with_select(sql) {
            return ValidatorVerdict::reject(
                "Query must be a SELECT statement. Only read-only queries are allowed.",
            );
        }

        ValidatorVerdict::safe()
    }

    fn find_blocked_keyword(&self, sql: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(sql))
            .map(|(keyword, _)| *keyword)
    }
}

#[async_trait]
impl QueryValidator for CommandClassifier {
    fn name(&self) -> &'static str {
        "command_classifier"
    }

    async fn validate(&self, sql: &str) -> ValidatorVerdict {
        self.classify(sql)
    }
}

/// Whether the first word of the trimmed query is `SELECT`. Punctuation ends
/// the word, so `SELECT*FROM t` counts and `SELECTED` does not.
fn starts_with_select(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(trimmed.len());
    trimmed[..end].eq_ignore_ascii_case("SELECT")
}
