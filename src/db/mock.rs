//! Mock database clients for testing.
//!
//! Provides scripted database implementations so the pipeline can be
//! exercised without a real server or file.

use super::{ColumnInfo, DatabaseBackend, DatabaseClient, QueryResult, Schema, Value};
use crate::error::{Result, WardenError};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A scripted response for queries matching a pattern.
#[derive(Debug, Clone)]
enum MockResponse {
    Rows(QueryResult),
    Error(String),
}

/// A mock database client that returns predefined results.
///
/// Responses are matched by case-insensitive substring against the SQL text,
/// first registered pattern wins. Unmatched queries return a single echo row.
/// Every executed statement is recorded.
#[derive(Debug)]
pub struct MockDatabaseClient {
    schema: Schema,
    backend: DatabaseBackend,
    responses: Vec<(String, MockResponse)>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
            backend: DatabaseBackend::Sqlite,
            responses: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Reports a different backend (affects the dialect used in prompts).
    pub fn with_backend(mut self, backend: DatabaseBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Returns `result` for queries containing `pattern`.
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.responses
            .push((pattern.into().to_lowercase(), MockResponse::Rows(result)));
        self
    }

    /// Fails queries containing `pattern` with a query error.
    pub fn with_error(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses.push((
            pattern.into().to_lowercase(),
            MockResponse::Error(message.into()),
        ));
        self
    }

    /// Returns every statement executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    /// Returns how many statements were executed.
    pub fn execution_count(&self) -> usize {
        self.executed.lock().map(|queries| queries.len()).unwrap_or(0)
    }

    fn echo_result(sql: &str) -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new("result", "TEXT")],
            vec![vec![Value::String(format!("Mock result for: {sql}"))]],
        )
        .with_execution_time(Duration::from_millis(1))
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let sql_lower = sql.to_lowercase();
        let matched = self
            .responses
            .iter()
            .find(|(pattern, _)| sql_lower.contains(pattern.as_str()));

        match matched {
            Some((_, MockResponse::Rows(result))) => Ok(result.clone()),
            Some((_, MockResponse::Error(message))) => Err(WardenError::query(message.clone())),
            None => Ok(Self::echo_result(sql)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database client whose every operation fails, for exercising abort paths.
#[derive(Debug, Clone)]
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    /// Creates a client that fails with the given connection error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Err(WardenError::connection(self.message.clone()))
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(WardenError::connection(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Err(WardenError::connection(self.message.clone()))
    }
}
