//! Pipeline orchestrator.
//!
//! Wires schema fetch, generation, validation, execution and summarization
//! into one run per question. A single `Pipeline` can serve concurrent runs;
//! each run owns its own `PipelineContext`.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::PipelineConfig;
use crate::db::DatabaseClient;
use crate::error::{Result, WardenError};
use crate::llm::LlmClient;
use crate::safety::{CommandClassifier, QueryValidator, SemanticValidator, StructureValidator};

use super::context::{AttemptRecord, ExecutionOutcome, LoopState, PipelineContext, RoutingDecision};
use super::controller::RefinementController;
use super::executor::QueryExecutor;
use super::gate::ValidationGate;
use super::generator::QueryGenerator;
use super::summarizer::{explain_halt, Summarizer};

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    /// Natural-language answer. Never empty.
    pub final_answer: String,
    /// The query that ran, if any.
    pub executed_query: Option<String>,
    pub iterations_used: u32,
    /// True when the query ran and returned a result set.
    pub succeeded: bool,
    pub attempts: Vec<AttemptRecord>,
}

impl PipelineOutcome {
    /// Builds the outcome from a finished context.
    pub fn from_context(ctx: &PipelineContext) -> Result<Self> {
        let final_answer = ctx
            .final_answer()
            .ok_or_else(|| WardenError::internal("Pipeline run ended without an answer"))?
            .to_string();

        let executed_query = ctx
            .execution_outcome()
            .and(ctx.approved_query())
            .map(|q| q.as_str().to_string());

        Ok(Self {
            final_answer,
            executed_query,
            iterations_used: ctx.iteration_count(),
            succeeded: ctx
                .execution_outcome()
                .is_some_and(ExecutionOutcome::is_success),
            attempts: ctx.attempts().to_vec(),
        })
    }
}

/// The question-to-answer pipeline.
pub struct Pipeline {
    db: Arc<dyn DatabaseClient>,
    generator: QueryGenerator,
    gate: ValidationGate,
    controller: RefinementController,
    executor: QueryExecutor,
    summarizer: Summarizer,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Names of the configured validators, in order.
    pub fn validator_names(&self) -> Vec<&'static str> {
        self.gate.validator_names()
    }

    /// Answers `question`.
    pub async fn run(&self, question: &str) -> Result<PipelineOutcome> {
        let ctx = self.run_with_context(question).await?;
        PipelineOutcome::from_context(&ctx)
    }

    /// Answers `question` and returns the full run record.
    pub async fn run_with_context(&self, question: &str) -> Result<PipelineContext> {
        let question = question.trim();
        if question.is_empty() {
            return Err(WardenError::pipeline("Question must not be empty"));
        }

        let span = info_span!("pipeline_run", ceiling = self.controller.ceiling());
        self.drive(PipelineContext::new(question, self.controller.ceiling()))
            .instrument(span)
            .await
    }

    async fn drive(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        let start = Instant::now();

        let schema = self.db.introspect_schema().await?;
        debug!(tables = schema.tables.len(), "Fetched schema");
        ctx.set_schema(schema.format_for_llm())?;

        loop {
            match ctx.state() {
                LoopState::AwaitingGeneration => {
                    let sql = self
                        .generator
                        .generate(
                            ctx.schema_description().unwrap_or_default(),
                            ctx.question(),
                            ctx.refinement_feedback(),
                        )
                        .await?;
                    self.controller.on_generated(&mut ctx, sql)?;
                }
                LoopState::AwaitingValidation => {
                    let candidate = ctx
                        .candidate_query()
                        .ok_or_else(|| WardenError::internal("No candidate query to validate"))?;
                    let outcome = self.gate.evaluate(candidate).await;
                    let iteration = ctx.iteration_count();

                    match self.controller.on_validated(&mut ctx, outcome)? {
                        RoutingDecision::Execute => debug!(iteration, "Routing to execution"),
                        RoutingDecision::Refine => debug!(iteration, "Routing back to generation"),
                        RoutingDecision::Halt => warn!(iteration, "Halting without execution"),
                    }
                }
                LoopState::Executing => {
                    let approved = ctx
                        .approved_query()
                        .cloned()
                        .ok_or_else(|| WardenError::internal("No approved query to execute"))?;
                    let outcome = self.executor.execute(&approved).await;
                    self.controller.on_executed(&mut ctx, outcome)?;
                }
                LoopState::Summarizing => {
                    let (sql, outcome) = match (ctx.approved_query(), ctx.execution_outcome()) {
                        (Some(sql), Some(outcome)) => (sql.as_str(), outcome),
                        _ => return Err(WardenError::internal("Nothing to summarize")),
                    };
                    let answer = self
                        .summarizer
                        .summarize(ctx.question(), sql, outcome)
                        .await?;
                    ctx.finish(answer)?;
                }
                LoopState::Halted => {
                    let answer = explain_halt(
                        ctx.iteration_count(),
                        ctx.validation_feedback().unwrap_or_default(),
                    );
                    ctx.finish(answer)?;
                }
                LoopState::Finished => break,
            }
        }

        info!(
            iterations = ctx.iteration_count(),
            executed = ctx.execution_outcome().is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Pipeline run finished"
        );
        Ok(ctx)
    }
}

/// Assembles a `Pipeline` from configuration and collaborators.
///
/// The default validator chain is the command classifier, then the statement
/// shape check and the LLM review when enabled in the config. Validators added
/// with [`PipelineBuilder::validator`] run after the built-in ones.
pub struct PipelineBuilder {
    config: PipelineConfig,
    db: Option<Arc<dyn DatabaseClient>>,
    llm: Option<Arc<dyn LlmClient>>,
    reviewer: Option<Arc<dyn LlmClient>>,
    extra_validators: Vec<Box<dyn QueryValidator>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            db: None,
            llm: None,
            reviewer: None,
            extra_validators: Vec::new(),
        }
    }

    pub fn database(mut self, db: Arc<dyn DatabaseClient>) -> Self {
        self.db = Some(db);
        self
    }

    /// LLM used for generation, summarization and, unless overridden, review.
    pub fn llm(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    /// Uses a separate LLM for the semantic safety review.
    pub fn reviewer(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.reviewer = Some(client);
        self
    }

    pub fn validator(mut self, validator: Box<dyn QueryValidator>) -> Self {
        self.extra_validators.push(validator);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        let db = self
            .db
            .ok_or_else(|| WardenError::config("Pipeline requires a database client"))?;
        let llm = self
            .llm
            .ok_or_else(|| WardenError::config("Pipeline requires an LLM client"))?;

        let backend = db.backend();
        let stage_timeout = Duration::from_secs(self.config.stage_timeout_secs);

        let mut validators: Vec<Box<dyn QueryValidator>> = vec![Box::new(CommandClassifier::new()?)];
        if self.config.structure_check {
            validators.push(Box::new(StructureValidator::new(backend)));
        }
        if self.config.semantic_check {
            let reviewer = self.reviewer.unwrap_or_else(|| llm.clone());
            validators.push(Box::new(SemanticValidator::new(reviewer, stage_timeout)));
        }
        validators.extend(self.extra_validators);

        let gate = ValidationGate::new(validators);
        debug!(validators = ?gate.validator_names(), backend = %backend, "Built pipeline");

        Ok(Pipeline {
            generator: QueryGenerator::new(llm.clone(), backend.dialect_name(), stage_timeout),
            gate,
            controller: RefinementController::new(self.config.iteration_ceiling),
            executor: QueryExecutor::new(db.clone()),
            summarizer: Summarizer::new(llm, self.config.summary_row_limit, stage_timeout),
            db,
        })
    }
}
