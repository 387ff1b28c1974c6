//! Question-to-answer pipeline.
//!
//! A run fetches the schema, then loops: generate a candidate query, pass it
//! through the validation gate, and either execute it, regenerate with the
//! rejection as feedback, or halt once the iteration ceiling is reached. The
//! outcome of execution, success or failure, is then summarized in prose.

pub mod context;
pub mod controller;
pub mod executor;
pub mod gate;
pub mod generator;
pub mod orchestrator;
pub mod summarizer;

pub use context::{
    ApprovedQuery, AttemptRecord, ExecutionOutcome, LoopState, PipelineContext, RoutingDecision,
};
pub use controller::RefinementController;
pub use gate::{halt_feedback, route, GateOutcome, ValidationGate};
pub use orchestrator::{Pipeline, PipelineBuilder, PipelineOutcome};
pub use summarizer::explain_halt;
