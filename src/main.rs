//! db-warden - ask a database questions in plain English.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use db_warden::cli::Cli;
use db_warden::config::Config;
use db_warden::db::{self, DatabaseClient};
use db_warden::error::WardenError;
use db_warden::llm::create_client;
use db_warden::logging;
use db_warden::pipeline::{Pipeline, PipelineOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "q"];

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        let category = e
            .downcast_ref::<WardenError>()
            .map(WardenError::category)
            .unwrap_or("Error");
        eprintln!("{}: {:#}", category, e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    cli.apply_overrides(&mut config)?;

    let connection = cli.resolve_connection(&config)?;
    info!(connection = %connection.display_string(), "Connecting to database");
    let db: Arc<dyn DatabaseClient> = Arc::from(
        db::connect(&connection)
            .await
            .with_context(|| format!("Failed to connect to {}", connection.display_string()))?,
    );

    let result = if cli.show_schema {
        show_schema(db.as_ref()).await
    } else {
        answer_questions(&cli, &config, db.clone()).await
    };

    close_database(db.as_ref(), result).await
}

/// Closes `db` and hands back `result`. A close failure is only logged so it
/// never hides the error a run already produced.
async fn close_database<T>(
    db: &dyn DatabaseClient,
    result: anyhow::Result<T>,
) -> anyhow::Result<T> {
    if let Err(e) = db.close().await {
        warn!(error = %e, "Failed to close database connection");
    }
    result
}

async fn show_schema(db: &dyn DatabaseClient) -> anyhow::Result<()> {
    let schema = db.introspect_schema().await?;
    println!("{}", schema.format_for_llm());
    Ok(())
}

async fn answer_questions(
    cli: &Cli,
    config: &Config,
    db: Arc<dyn DatabaseClient>,
) -> anyhow::Result<()> {
    let llm = create_client(&config.llm, None)?;
    let pipeline = Pipeline::builder(config.pipeline.clone())
        .database(db)
        .llm(llm)
        .build()?;
    info!(validators = ?pipeline.validator_names(), "Pipeline ready");

    match &cli.question {
        Some(question) => {
            let outcome = pipeline.run(question).await?;
            print_outcome(&outcome, cli.json)?;
        }
        None => interactive(&pipeline, cli.json).await?,
    }

    Ok(())
}

/// Reads questions from stdin until EOF or an exit command.
async fn interactive(pipeline: &Pipeline, json: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("warden> ");
        std::io::stderr().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        match pipeline.run(question).await {
            Ok(outcome) => print_outcome(&outcome, json)?,
            Err(e) => eprintln!("{}: {}", e.category(), e),
        }
    }

    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!("{}", outcome.final_answer);
    if let Some(sql) = &outcome.executed_query {
        println!();
        println!("SQL: {}", sql);
    }
    println!(
        "({} attempt{})",
        outcome.iterations_used,
        if outcome.iterations_used == 1 { "" } else { "s" }
    );
    Ok(())
}
