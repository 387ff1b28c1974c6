//! Pipeline integration tests.

mod ceiling_test;
mod concurrency_test;
mod postgres_test;
mod scenario_test;
mod sqlite_test;

use std::sync::Arc;

use db_warden::config::PipelineConfig;
use db_warden::db::{Column, DatabaseClient, MockDatabaseClient, Schema, Table};
use db_warden::llm::{LlmClient, MockLlmClient};
use db_warden::pipeline::Pipeline;

pub const SUMMARY: &str = "There are 3 employees across 2 departments.";
pub const FAILURE_EXPLANATION: &str = "The query referenced a column that does not exist.";

/// Schema of the small HR database used throughout.
pub fn employees_schema() -> Schema {
    Schema {
        tables: vec![
            Table::new("departments")
                .with_column(Column::new("id", "INTEGER").nullable(false))
                .with_column(Column::new("name", "TEXT").nullable(false))
                .with_primary_key(&["id"])
                .with_row_count(2),
            Table::new("employees")
                .with_column(Column::new("id", "INTEGER").nullable(false))
                .with_column(Column::new("name", "TEXT").nullable(false))
                .with_column(Column::new("salary", "INTEGER"))
                .with_column(Column::new("department_id", "INTEGER"))
                .with_column(Column::new("updated_at", "TEXT"))
                .with_primary_key(&["id"])
                .with_row_count(3),
        ],
        foreign_keys: vec![],
    }
}

/// LLM mock answering generation requests with `generations` in order.
///
/// Summary prompts also contain "Question:", so their patterns are
/// registered first.
pub fn scripted_llm<I, S>(generations: I) -> MockLlmClient
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    MockLlmClient::new()
        .with_response("query results:", SUMMARY)
        .with_response("the query failed with this error:", FAILURE_EXPLANATION)
        .with_responses("question:", generations)
}

pub fn build_pipeline(
    llm: Arc<dyn LlmClient>,
    db: Arc<dyn DatabaseClient>,
    config: PipelineConfig,
) -> Pipeline {
    Pipeline::builder(config)
        .database(db)
        .llm(llm)
        .build()
        .expect("pipeline should build")
}

pub fn mock_db() -> Arc<MockDatabaseClient> {
    Arc::new(MockDatabaseClient::with_schema(employees_schema()))
}

pub fn mock_db_with_result(pattern: &str, result: db_warden::db::QueryResult) -> MockDatabaseClient {
    MockDatabaseClient::with_schema(employees_schema()).with_result(pattern, result)
}
