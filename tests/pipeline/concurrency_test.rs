//! Independent questions running concurrently on one pipeline.

use std::sync::Arc;

use db_warden::config::PipelineConfig;
use db_warden::llm::MockLlmClient;
use futures::future::join_all;

use super::{build_pipeline, mock_db, SUMMARY};

#[tokio::test]
async fn test_concurrent_runs_keep_separate_state() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_response("query results:", SUMMARY)
            .with_response("question: how many employees", "SELECT COUNT(*) FROM employees")
            .with_response("question: list departments", "SELECT name FROM departments")
            .with_response("question: fire everyone", "DELETE FROM employees"),
    );
    let db = mock_db();
    let pipeline = Arc::new(build_pipeline(llm, db.clone(), PipelineConfig::default()));

    let questions = [
        "How many employees are there?",
        "List departments",
        "Fire everyone",
        "How many employees are there?",
    ];
    let outcomes = join_all(questions.iter().map(|q| pipeline.run(q))).await;
    let outcomes: Vec<_> = outcomes.into_iter().map(|o| o.unwrap()).collect();

    assert_eq!(
        outcomes[0].executed_query.as_deref(),
        Some("SELECT COUNT(*) FROM employees")
    );
    assert_eq!(
        outcomes[1].executed_query.as_deref(),
        Some("SELECT name FROM departments")
    );
    assert!(outcomes[2].executed_query.is_none());
    assert_eq!(outcomes[2].iterations_used, 3);
    assert_eq!(outcomes[3], outcomes[0]);

    for i in [0, 1, 3] {
        assert!(outcomes[i].succeeded);
        assert_eq!(outcomes[i].iterations_used, 1);
    }
    assert_eq!(db.execution_count(), 3);
}

#[tokio::test]
async fn test_spawned_runs_share_pipeline() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_response("query results:", SUMMARY)
            .with_response("question:", "SELECT name FROM employees"),
    );
    let pipeline = Arc::new(build_pipeline(llm, mock_db(), PipelineConfig::default()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run(&format!("Names, take {}", i)).await })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.final_answer, SUMMARY);
    }
}
