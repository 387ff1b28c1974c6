//! End-to-end scenarios over mock collaborators.

use std::sync::Arc;

use db_warden::config::PipelineConfig;
use db_warden::db::{ColumnInfo, FailingDatabaseClient, QueryResult, Value};
use db_warden::llm::MockLlmClient;
use db_warden::pipeline::{ExecutionOutcome, LoopState, RoutingDecision};
use db_warden::safety::{CommandClassifier, Verdict};
use pretty_assertions::assert_eq;

use super::{build_pipeline, mock_db, scripted_llm, FAILURE_EXPLANATION, SUMMARY};

#[test]
fn test_select_passes_classifier() {
    let verdict = CommandClassifier::new()
        .unwrap()
        .classify("SELECT * FROM employees");
    assert!(verdict.is_safe);
    assert!(verdict.reason.is_empty());
}

#[test]
fn test_delete_fails_classifier() {
    let verdict = CommandClassifier::new()
        .unwrap()
        .classify("DELETE FROM employees WHERE id = 1");
    assert!(!verdict.is_safe);
    assert!(verdict.reason.contains("DELETE"));
}

#[tokio::test]
async fn test_safe_question_is_answered() {
    let count = QueryResult::with_data(
        vec![ColumnInfo::new("COUNT(*)", "INTEGER")],
        vec![vec![Value::Int(3)]],
    );
    let db = Arc::new(super::mock_db_with_result("count(*)", count));
    let llm = Arc::new(scripted_llm(["```sql\nSELECT COUNT(*) FROM employees;\n```"]));
    let pipeline = build_pipeline(llm.clone(), db.clone(), PipelineConfig::default());

    let outcome = pipeline.run("How many employees are there?").await.unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.final_answer, SUMMARY);
    assert_eq!(
        outcome.executed_query.as_deref(),
        Some("SELECT COUNT(*) FROM employees")
    );
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(db.executed_queries(), vec!["SELECT COUNT(*) FROM employees"]);
    // generation, semantic review, summary
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn test_rejection_is_refined_with_feedback() {
    let db = mock_db();
    let llm = Arc::new(scripted_llm([
        "DROP TABLE employees",
        "SELECT name FROM employees",
    ]));
    let pipeline = build_pipeline(llm.clone(), db.clone(), PipelineConfig::default());

    let outcome = pipeline.run("Clear out the staff list").await.unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.iterations_used, 2);
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[0].verdict, Verdict::Unsafe);
    assert_eq!(
        outcome.attempts[0].rejected_by.as_deref(),
        Some("command_classifier")
    );
    assert_eq!(outcome.attempts[1].verdict, Verdict::Safe);

    let second_generation = llm
        .requests()
        .into_iter()
        .filter(|r| r.contains("Question: Clear out the staff list"))
        .nth(1)
        .unwrap();
    assert!(second_generation.contains(
        "Previous attempt failed safety check. Feedback: Query contains prohibited command: DROP."
    ));
    assert_eq!(db.executed_queries(), vec!["SELECT name FROM employees"]);
}

#[tokio::test]
async fn test_execution_failure_is_summarized_not_retried() {
    let db = Arc::new(
        db_warden::db::MockDatabaseClient::with_schema(super::employees_schema())
            .with_error("salry", "no such column: salry"),
    );
    let llm = Arc::new(scripted_llm(["SELECT AVG(salry) FROM employees"]));
    let pipeline = build_pipeline(llm.clone(), db.clone(), PipelineConfig::default());

    let ctx = pipeline
        .run_with_context("What is the average salary?")
        .await
        .unwrap();

    assert_eq!(ctx.state(), LoopState::Finished);
    assert_eq!(ctx.iteration_count(), 1);
    assert_eq!(ctx.routing_decision(), Some(RoutingDecision::Execute));
    assert_eq!(
        ctx.execution_outcome(),
        Some(&ExecutionOutcome::Failed {
            message: "no such column: salry".to_string()
        })
    );
    assert_eq!(ctx.final_answer(), Some(FAILURE_EXPLANATION));
    assert_eq!(db.execution_count(), 1);
    assert!(llm
        .requests()
        .iter()
        .any(|r| r.contains("The query failed with this error:\nno such column: salry")));

    let outcome = pipeline.run("What is the average salary?").await.unwrap();
    assert!(!outcome.succeeded);
    assert_eq!(
        outcome.executed_query.as_deref(),
        Some("SELECT AVG(salry) FROM employees")
    );
}

#[tokio::test]
async fn test_semantic_failure_drives_refinement() {
    let db = mock_db();
    let llm = Arc::new(
        scripted_llm(["SELECT name FROM employees"])
            .with_failure("query to analyze", "503 Service Unavailable"),
    );
    let pipeline = build_pipeline(llm, db.clone(), PipelineConfig::default());

    let outcome = pipeline.run("List employee names").await.unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.iterations_used, 3);
    assert!(outcome.executed_query.is_none());
    assert_eq!(db.execution_count(), 0);
    for attempt in &outcome.attempts {
        assert_eq!(attempt.rejected_by.as_deref(), Some("semantic"));
        let feedback = attempt.feedback.as_deref().unwrap();
        assert!(feedback.starts_with("Semantic safety check failed:"));
        assert!(feedback.contains("503 Service Unavailable"));
    }
    assert!(outcome
        .final_answer
        .contains("Maximum refinement attempts (3) reached."));
}

#[tokio::test]
async fn test_semantic_rejection_reason_is_fed_back() {
    let db = mock_db();
    let llm = Arc::new(
        scripted_llm(["SELECT * FROM employees", "SELECT name FROM employees"])
            .with_responses(
                "query to analyze",
                ["UNSAFE: selects every column including salary", "SAFE"],
            ),
    );
    let pipeline = build_pipeline(llm.clone(), db, PipelineConfig::default());

    let outcome = pipeline.run("Who works here?").await.unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.iterations_used, 2);
    assert_eq!(
        outcome.attempts[0].feedback.as_deref(),
        Some("selects every column including salary")
    );
    assert!(llm.requests().iter().any(|r| r.contains(
        "Previous attempt failed safety check. Feedback: selects every column including salary"
    )));
}

#[tokio::test]
async fn test_disabled_semantic_check_skips_review() {
    let llm = Arc::new(scripted_llm(["SELECT name FROM employees"]));
    let pipeline = build_pipeline(
        llm.clone(),
        mock_db(),
        PipelineConfig::default().with_semantic_check(false),
    );

    pipeline.run("Names?").await.unwrap();

    assert!(!llm
        .requests()
        .iter()
        .any(|r| r.starts_with("Query to analyze:")));
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_generation_failure_aborts() {
    let pipeline = build_pipeline(
        Arc::new(MockLlmClient::failing("invalid api key")),
        mock_db(),
        PipelineConfig::default(),
    );

    let err = pipeline.run("Anything").await.unwrap_err();
    assert_eq!(err.category(), "Pipeline Error");
    assert!(err.to_string().contains("invalid api key"));
}

#[tokio::test]
async fn test_summary_failure_aborts() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_failure("query results:", "summary model overloaded")
            .with_response("question:", "SELECT 1"),
    );
    let pipeline = build_pipeline(llm, mock_db(), PipelineConfig::default());

    let err = pipeline.run("One?").await.unwrap_err();
    assert!(err.to_string().contains("summary model overloaded"));
}

#[tokio::test]
async fn test_schema_failure_aborts_before_generation() {
    let llm = Arc::new(scripted_llm(["SELECT 1"]));
    let pipeline = build_pipeline(
        llm.clone(),
        Arc::new(FailingDatabaseClient::new("database is locked")),
        PipelineConfig::default(),
    );

    let err = pipeline.run("Anything").await.unwrap_err();
    assert_eq!(err.category(), "Connection Error");
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_schema_is_sent_to_generation() {
    let llm = Arc::new(scripted_llm(["SELECT 1"]));
    let pipeline = build_pipeline(llm.clone(), mock_db(), PipelineConfig::default());

    let ctx = pipeline.run_with_context("One?").await.unwrap();

    let schema = ctx.schema_description().unwrap();
    assert!(schema.contains("Table: employees"));
    assert!(schema.contains("updated_at"));
}

#[tokio::test]
async fn test_sqlite_only_syntax_reaches_execution() {
    for sql in [
        "SELECT name FROM employees WHERE name GLOB 'A*'",
        "SELECT * FROM employees LIMIT 5, 10",
    ] {
        let db = mock_db();
        let pipeline = build_pipeline(
            Arc::new(scripted_llm([sql])),
            db.clone(),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run("Which employees start with A?").await.unwrap();

        assert!(outcome.succeeded, "{} was not executed", sql);
        assert_eq!(outcome.iterations_used, 1);
        assert_eq!(outcome.executed_query.as_deref(), Some(sql));
        assert_eq!(db.execution_count(), 1);
    }
}
