//! Query execution stage.
//!
//! Runs an approved query against the database. Database errors are not
//! propagated; they become `ExecutionOutcome::Failed` for the summary stage
//! to explain.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::db::DatabaseClient;
use crate::error::WardenError;

use super::context::{ApprovedQuery, ExecutionOutcome};

pub struct QueryExecutor {
    db: Arc<dyn DatabaseClient>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }

    /// Executes `query`. Only the validation gate can produce one.
    pub async fn execute(&self, query: &ApprovedQuery) -> ExecutionOutcome {
        let start = Instant::now();
        let result = self.db.execute_query(query.as_str()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(result) => {
                info!(
                    duration_ms,
                    row_count = result.row_count,
                    truncated = result.was_truncated,
                    "Query executed"
                );
                ExecutionOutcome::Rows(result)
            }
            Err(e) => {
                warn!(duration_ms, error = %e, "Query execution failed");
                ExecutionOutcome::Failed {
                    message: error_message(e),
                }
            }
        }
    }
}

/// The database's own message, without the category prefix.
fn error_message(error: WardenError) -> String {
    match error {
        WardenError::Query(msg) | WardenError::Connection(msg) => msg,
        other => other.to_string(),
    }
}
