//! Pipeline runs against PostgreSQL.
//!
//! Requires a running server: set DATABASE_URL to run these.

use std::sync::Arc;

use db_warden::config::{ConnectionConfig, PipelineConfig};
use db_warden::db::{DatabaseBackend, DatabaseClient, PostgresClient, Value};
use db_warden::pipeline::ExecutionOutcome;

use super::{build_pipeline, scripted_llm, FAILURE_EXPLANATION, SUMMARY};

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a test client.
async fn get_test_client() -> Option<Arc<PostgresClient>> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PostgresClient::connect(&config).await.ok().map(Arc::new)
}

#[tokio::test]
async fn test_pipeline_against_postgres() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    assert_eq!(client.backend(), DatabaseBackend::Postgres);

    let pipeline = build_pipeline(
        Arc::new(scripted_llm(["SELECT 1 AS one, 'hello' AS greeting"])),
        client.clone(),
        PipelineConfig::default(),
    );

    let ctx = pipeline.run_with_context("Say hello").await.unwrap();
    let Some(ExecutionOutcome::Rows(result)) = ctx.execution_outcome() else {
        panic!("expected rows, got {:?}", ctx.execution_outcome());
    };
    assert_eq!(result.rows[0][1], Value::String("hello".to_string()));
    assert_eq!(ctx.final_answer(), Some(SUMMARY));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_table_is_explained() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let pipeline = build_pipeline(
        Arc::new(scripted_llm(["SELECT * FROM warden_table_that_does_not_exist"])),
        client.clone(),
        PipelineConfig::default(),
    );

    let outcome = pipeline.run("Show me the missing table").await.unwrap();
    assert!(!outcome.succeeded);
    assert_eq!(outcome.final_answer, FAILURE_EXPLANATION);

    client.close().await.unwrap();
}
