//! Iteration ceiling behavior.

use std::sync::Arc;

use db_warden::config::PipelineConfig;
use db_warden::pipeline::{LoopState, RoutingDecision};
use db_warden::safety::Verdict;

use super::{build_pipeline, mock_db, scripted_llm};

#[tokio::test]
async fn test_three_rejections_halt_at_ceiling() {
    let db = mock_db();
    let llm = Arc::new(scripted_llm(["DELETE FROM employees WHERE id = 1"]));
    let pipeline = build_pipeline(llm.clone(), db.clone(), PipelineConfig::default());

    let ctx = pipeline
        .run_with_context("Remove employee 1")
        .await
        .unwrap();

    assert_eq!(ctx.iteration_count(), 3);
    assert_eq!(ctx.routing_decision(), Some(RoutingDecision::Halt));
    assert_eq!(ctx.verdict(), Verdict::Unsafe);
    assert_eq!(ctx.state(), LoopState::Finished);
    assert!(ctx.execution_outcome().is_none());
    assert!(ctx
        .final_answer()
        .unwrap()
        .contains("Maximum refinement attempts (3) reached. Query contains prohibited command: DELETE."));
    assert_eq!(db.execution_count(), 0);
    // Three generations; the classifier rejects before any review or summary.
    assert_eq!(llm.call_count(), 3);
}

#[tokio::test]
async fn test_halt_outcome() {
    let pipeline = build_pipeline(
        Arc::new(scripted_llm(["UPDATE employees SET salary = 0"])),
        mock_db(),
        PipelineConfig::default(),
    );

    let outcome = pipeline.run("Zero all salaries").await.unwrap();

    assert!(!outcome.succeeded);
    assert!(outcome.executed_query.is_none());
    assert_eq!(outcome.iterations_used, 3);
    assert!(!outcome.final_answer.is_empty());
    assert!(outcome
        .attempts
        .iter()
        .all(|a| a.verdict == Verdict::Unsafe));
}

#[tokio::test]
async fn test_iterations_never_exceed_ceiling() {
    for ceiling in 1..=5u32 {
        let pipeline = build_pipeline(
            Arc::new(scripted_llm(["TRUNCATE employees"])),
            mock_db(),
            PipelineConfig::default().with_iteration_ceiling(ceiling),
        );

        let outcome = pipeline.run("Empty the table").await.unwrap();
        assert_eq!(outcome.iterations_used, ceiling);
        assert_eq!(outcome.attempts.len(), ceiling as usize);
        assert!(outcome
            .final_answer
            .contains(&format!("Maximum refinement attempts ({}) reached.", ceiling)));
    }
}

#[tokio::test]
async fn test_success_on_last_allowed_attempt() {
    let pipeline = build_pipeline(
        Arc::new(scripted_llm([
            "DROP TABLE employees",
            "DELETE FROM employees",
            "SELECT COUNT(*) FROM employees",
        ])),
        mock_db(),
        PipelineConfig::default(),
    );

    let outcome = pipeline.run("How many employees?").await.unwrap();
    assert!(outcome.succeeded);
    assert_eq!(outcome.iterations_used, 3);
}

#[tokio::test]
async fn test_single_attempt_ceiling_halts_immediately() {
    let pipeline = build_pipeline(
        Arc::new(scripted_llm(["DROP TABLE employees", "SELECT 1"])),
        mock_db(),
        PipelineConfig::default().with_iteration_ceiling(1),
    );

    let outcome = pipeline.run("Drop it").await.unwrap();
    assert_eq!(outcome.iterations_used, 1);
    assert!(!outcome.succeeded);
}
