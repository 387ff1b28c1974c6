//! Pipeline runs against a real SQLite database file.

use std::path::Path;
use std::sync::Arc;

use db_warden::config::{ConnectionConfig, PipelineConfig};
use db_warden::db::{self, DatabaseClient, Value};
use db_warden::pipeline::ExecutionOutcome;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::{build_pipeline, scripted_llm, FAILURE_EXPLANATION, SUMMARY};

const SEED: &[&str] = &[
    "CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE employees (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        salary INTEGER,
        department_id INTEGER REFERENCES departments(id),
        updated_at TEXT
    )",
    "INSERT INTO departments (name) VALUES ('Engineering'), ('Sales')",
    "INSERT INTO employees (name, salary, department_id, updated_at) VALUES
        ('Ada', 120000, 1, '2024-01-01'),
        ('Grace', 110000, 1, '2024-02-01'),
        ('Linus', 90000, 2, NULL)",
];

async fn seed_database(path: &Path) {
    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
        .await
        .unwrap();
    for statement in SEED {
        sqlx::query(statement).execute(&writer).await.unwrap();
    }
    writer.close().await;
}

async fn open(path: &Path) -> Arc<dyn DatabaseClient> {
    let config = ConnectionConfig::from_connection_string(&format!("sqlite://{}", path.display()))
        .unwrap();
    Arc::from(db::connect(&config).await.unwrap())
}

#[tokio::test]
async fn test_question_answered_from_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hr.db");
    seed_database(&path).await;
    let db = open(&path).await;

    let llm = Arc::new(scripted_llm([
        "SELECT d.name, COUNT(e.id) AS headcount FROM departments d \
         JOIN employees e ON e.department_id = d.id GROUP BY d.name ORDER BY d.name;",
    ]));
    let pipeline = build_pipeline(llm.clone(), db.clone(), PipelineConfig::default());

    let ctx = pipeline
        .run_with_context("How many people work in each department?")
        .await
        .unwrap();

    let Some(ExecutionOutcome::Rows(result)) = ctx.execution_outcome() else {
        panic!("expected rows, got {:?}", ctx.execution_outcome());
    };
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("Engineering".to_string()), Value::Int(2)],
            vec![Value::String("Sales".to_string()), Value::Int(1)],
        ]
    );
    assert_eq!(ctx.final_answer(), Some(SUMMARY));

    let schema = ctx.schema_description().unwrap();
    assert!(schema.contains("Table: employees"));
    assert!(schema.contains("Total rows: 3"));
    assert!(schema.contains("employees.department_id -> departments.id"));

    let summary_request = llm
        .requests()
        .into_iter()
        .find(|r| r.contains("Query Results:"))
        .unwrap();
    assert!(summary_request.contains("Engineering"));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_column_is_explained() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hr.db");
    seed_database(&path).await;
    let db = open(&path).await;

    let llm = Arc::new(scripted_llm(["SELECT AVG(salry) FROM employees"]));
    let pipeline = build_pipeline(llm.clone(), db.clone(), PipelineConfig::default());

    let outcome = pipeline.run("What is the average salary?").await.unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(outcome.final_answer, FAILURE_EXPLANATION);
    assert!(llm
        .requests()
        .iter()
        .any(|r| r.contains("The query failed with this error:") && r.contains("salry")));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_updated_at_column_is_not_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hr.db");
    seed_database(&path).await;
    let db = open(&path).await;

    let llm = Arc::new(scripted_llm([
        "SELECT name FROM employees WHERE updated_at IS NOT NULL ORDER BY name",
    ]));
    let pipeline = build_pipeline(llm, db.clone(), PipelineConfig::default());

    let ctx = pipeline.run_with_context("Who was updated?").await.unwrap();
    let Some(ExecutionOutcome::Rows(result)) = ctx.execution_outcome() else {
        panic!("expected rows");
    };
    assert_eq!(result.row_count, 2);
    assert_eq!(ctx.iteration_count(), 1);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_database_is_untouched_after_halt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hr.db");
    seed_database(&path).await;
    let db = open(&path).await;

    let llm = Arc::new(scripted_llm(["DELETE FROM employees"]));
    let pipeline = build_pipeline(llm, db.clone(), PipelineConfig::default());
    let outcome = pipeline.run("Delete all employees").await.unwrap();
    assert!(!outcome.succeeded);

    let count = db
        .execute_query("SELECT COUNT(*) FROM employees")
        .await
        .unwrap();
    assert_eq!(count.rows, vec![vec![Value::Int(3)]]);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_glob_filter_runs_against_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hr.db");
    seed_database(&path).await;
    let db = open(&path).await;

    let llm = Arc::new(scripted_llm([
        "SELECT name FROM employees WHERE name GLOB 'G*'",
    ]));
    let pipeline = build_pipeline(llm, db.clone(), PipelineConfig::default());

    let ctx = pipeline.run_with_context("Who starts with G?").await.unwrap();
    let Some(ExecutionOutcome::Rows(result)) = ctx.execution_outcome() else {
        panic!("expected rows, got {:?}", ctx.execution_outcome());
    };
    assert_eq!(result.rows, vec![vec![Value::String("Grace".to_string())]]);
    assert_eq!(ctx.iteration_count(), 1);

    db.close().await.unwrap();
}
