//! Per-run pipeline state.
//!
//! A `PipelineContext` is created for each question and threaded through every
//! stage. Fields are private: stages read through accessors and write through
//! narrowly-scoped methods, and write-once fields refuse a second write.

use serde::Serialize;

use crate::db::QueryResult;
use crate::error::{Result, WardenError};
use crate::safety::Verdict;

/// Where the run goes after a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    /// The candidate passed every validator and may run.
    Execute,
    /// The candidate was rejected; generate again with the feedback.
    Refine,
    /// The candidate was rejected and the iteration ceiling is reached.
    Halt,
}

impl RoutingDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Refine => "refine",
            Self::Halt => "halt",
        }
    }
}

impl std::fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position of a run in the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    AwaitingGeneration,
    AwaitingValidation,
    Executing,
    Summarizing,
    Halted,
    /// The final answer has been written.
    Finished,
}

impl LoopState {
    /// Whether a final answer may be written from this state.
    pub fn is_terminal_branch(&self) -> bool {
        matches!(self, Self::Summarizing | Self::Halted)
    }
}

/// A query that passed the validation gate.
///
/// Only the gate can construct one, and the execution stage accepts nothing
/// else, so unvalidated text never reaches the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedQuery(String);

impl ApprovedQuery {
    pub(super) fn approve(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What happened when the approved query ran.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The query ran and returned a (possibly empty) result set.
    Rows(QueryResult),
    /// The database rejected the query.
    Failed { message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Rows(_))
    }
}

/// One generation and validation round, kept for logs and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub iteration: u32,
    pub query: String,
    pub verdict: Verdict,
    /// Name of the validator that rejected the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// State of a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    question: String,
    schema_description: Option<String>,
    candidate_query: Option<String>,
    iteration_count: u32,
    iteration_ceiling: u32,
    verdict: Verdict,
    validation_feedback: Option<String>,
    refinement_feedback: Option<String>,
    routing_decision: Option<RoutingDecision>,
    approved_query: Option<ApprovedQuery>,
    execution_outcome: Option<ExecutionOutcome>,
    final_answer: Option<String>,
    state: LoopState,
    attempts: Vec<AttemptRecord>,
}

impl PipelineContext {
    /// Creates the context for `question` with a fixed iteration ceiling.
    pub fn new(question: impl Into<String>, iteration_ceiling: u32) -> Self {
        Self {
            question: question.into(),
            schema_description: None,
            candidate_query: None,
            iteration_count: 0,
            iteration_ceiling,
            verdict: Verdict::Unknown,
            validation_feedback: None,
            refinement_feedback: None,
            routing_decision: None,
            approved_query: None,
            execution_outcome: None,
            final_answer: None,
            state: LoopState::default(),
            attempts: Vec::new(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn schema_description(&self) -> Option<&str> {
        self.schema_description.as_deref()
    }

    pub fn candidate_query(&self) -> Option<&str> {
        self.candidate_query.as_deref()
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn iteration_ceiling(&self) -> u32 {
        self.iteration_ceiling
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Reason for the current rejection, if the last validation failed.
    pub fn validation_feedback(&self) -> Option<&str> {
        self.validation_feedback.as_deref()
    }

    /// Rejection reason handed to the next generation attempt.
    pub fn refinement_feedback(&self) -> Option<&str> {
        self.refinement_feedback.as_deref()
    }

    pub fn routing_decision(&self) -> Option<RoutingDecision> {
        self.routing_decision
    }

    pub fn approved_query(&self) -> Option<&ApprovedQuery> {
        self.approved_query.as_ref()
    }

    pub fn execution_outcome(&self) -> Option<&ExecutionOutcome> {
        self.execution_outcome.as_ref()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Stores the schema text used for generation. Write-once.
    pub(super) fn set_schema(&mut self, description: impl Into<String>) -> Result<()> {
        if self.schema_description.is_some() {
            return Err(already_set("schema_description"));
        }
        self.schema_description = Some(description.into());
        Ok(())
    }

    /// Starts a new iteration with a freshly generated candidate.
    ///
    /// Clears the previous verdict and feedback.
    pub(super) fn record_generation(&mut self, query: String) {
        self.iteration_count += 1;
        self.candidate_query = Some(query);
        self.verdict = Verdict::Unknown;
        self.validation_feedback = None;
        self.routing_decision = None;
    }

    /// Stores the gate's verdict for the current candidate.
    pub(super) fn record_validation(
        &mut self,
        verdict: Verdict,
        feedback: Option<String>,
        rejected_by: Option<String>,
    ) {
        self.verdict = verdict;
        self.validation_feedback = if verdict == Verdict::Safe {
            None
        } else {
            feedback.clone()
        };
        self.attempts.push(AttemptRecord {
            iteration: self.iteration_count,
            query: self.candidate_query.clone().unwrap_or_default(),
            verdict,
            rejected_by,
            feedback,
        });
    }

    pub(super) fn set_routing(&mut self, decision: RoutingDecision) {
        self.routing_decision = Some(decision);
    }

    pub(super) fn set_state(&mut self, state: LoopState) {
        self.state = state;
    }

    pub(super) fn set_validation_feedback(&mut self, feedback: String) {
        self.validation_feedback = Some(feedback);
    }

    pub(super) fn set_refinement_feedback(&mut self, feedback: Option<String>) {
        self.refinement_feedback = feedback;
    }

    /// Stores the query cleared for execution. Write-once.
    pub(super) fn set_approved_query(&mut self, query: ApprovedQuery) -> Result<()> {
        if self.approved_query.is_some() {
            return Err(already_set("approved_query"));
        }
        self.approved_query = Some(query);
        Ok(())
    }

    /// Stores the execution result. Write-once.
    pub(super) fn record_execution(&mut self, outcome: ExecutionOutcome) -> Result<()> {
        if self.execution_outcome.is_some() {
            return Err(already_set("execution_outcome"));
        }
        self.execution_outcome = Some(outcome);
        Ok(())
    }

    /// Writes the final answer and ends the run. Write-once.
    pub(super) fn finish(&mut self, answer: impl Into<String>) -> Result<()> {
        if self.final_answer.is_some() {
            return Err(already_set("final_answer"));
        }
        if !self.state.is_terminal_branch() {
            return Err(WardenError::internal(format!(
                "Cannot finish a run in state {:?}",
                self.state
            )));
        }
        self.final_answer = Some(answer.into());
        self.state = LoopState::Finished;
        Ok(())
    }
}

fn already_set(field: &str) -> WardenError {
    WardenError::internal(format!("Pipeline context field {} is already set", field))
}
