//! Refinement loop controller.
//!
//! The state machine at the center of a run. Its transition methods are the
//! only code that advances `LoopState`, counts iterations and sets the routing
//! decision.

use tracing::{info, warn};

use crate::error::{Result, WardenError};

use super::context::{ExecutionOutcome, LoopState, PipelineContext, RoutingDecision};
use super::gate::{halt_feedback, route, GateOutcome};

/// Drives a `PipelineContext` through the refinement loop.
#[derive(Debug, Clone, Copy)]
pub struct RefinementController {
    ceiling: u32,
}

impl RefinementController {
    /// Creates a controller. The ceiling is clamped to at least one attempt.
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// `AwaitingGeneration -> AwaitingValidation`. Counts the iteration.
    pub fn on_generated(&self, ctx: &mut PipelineContext, query: String) -> Result<()> {
        expect_state(ctx, LoopState::AwaitingGeneration)?;
        if ctx.iteration_count() >= self.ceiling {
            return Err(WardenError::internal(format!(
                "Generation attempted after {} of {} iterations",
                ctx.iteration_count(),
                self.ceiling
            )));
        }

        ctx.record_generation(query);
        ctx.set_state(LoopState::AwaitingValidation);
        Ok(())
    }

    /// `AwaitingValidation -> Executing | AwaitingGeneration | Halted`.
    pub fn on_validated(
        &self,
        ctx: &mut PipelineContext,
        outcome: GateOutcome,
    ) -> Result<RoutingDecision> {
        expect_state(ctx, LoopState::AwaitingValidation)?;

        let GateOutcome {
            verdict,
            feedback,
            rejected_by,
            approved,
        } = outcome;
        ctx.record_validation(verdict, feedback.clone(), rejected_by);

        let iteration = ctx.iteration_count();
        let decision = route(verdict, iteration, self.ceiling);
        ctx.set_routing(decision);

        match decision {
            RoutingDecision::Execute => {
                let approved = approved.ok_or_else(|| {
                    WardenError::internal("Safe verdict without an approved query")
                })?;
                ctx.set_approved_query(approved)?;
                ctx.set_refinement_feedback(None);
                ctx.set_state(LoopState::Executing);
                info!(iteration, "Query approved for execution");
            }
            RoutingDecision::Refine => {
                ctx.set_refinement_feedback(feedback);
                ctx.set_state(LoopState::AwaitingGeneration);
                warn!(iteration, ceiling = self.ceiling, "Refining rejected query");
            }
            RoutingDecision::Halt => {
                let reason = feedback.unwrap_or_default();
                ctx.set_validation_feedback(halt_feedback(self.ceiling, &reason));
                ctx.set_state(LoopState::Halted);
                warn!(iteration, ceiling = self.ceiling, "Iteration ceiling reached");
            }
        }

        Ok(decision)
    }

    /// `Executing -> Summarizing`. Failures are carried forward, never retried.
    pub fn on_executed(&self, ctx: &mut PipelineContext, outcome: ExecutionOutcome) -> Result<()> {
        expect_state(ctx, LoopState::Executing)?;
        ctx.record_execution(outcome)?;
        ctx.set_state(LoopState::Summarizing);
        Ok(())
    }
}

fn expect_state(ctx: &PipelineContext, expected: LoopState) -> Result<()> {
    if ctx.state() == expected {
        Ok(())
    } else {
        Err(WardenError::internal(format!(
            "Invalid transition: expected {:?}, run is in {:?}",
            expected,
            ctx.state()
        )))
    }
}
