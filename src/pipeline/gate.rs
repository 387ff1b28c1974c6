//! Validation gate.
//!
//! Runs the validator chain over a candidate query and derives where the run
//! goes next.

use std::time::Instant;
use tracing::{debug, warn};

use crate::safety::{QueryValidator, Verdict};

use super::context::{ApprovedQuery, RoutingDecision};

/// Combined result of the validator chain for one candidate.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub verdict: Verdict,
    /// Reason given by the rejecting validator.
    pub feedback: Option<String>,
    /// Name of the rejecting validator.
    pub rejected_by: Option<String>,
    /// Present only when every validator passed.
    pub approved: Option<ApprovedQuery>,
}

/// Ordered chain of validators. The first rejection short-circuits, so later
/// (more expensive) validators only see queries the earlier ones accepted.
pub struct ValidationGate {
    validators: Vec<Box<dyn QueryValidator>>,
}

impl ValidationGate {
    pub fn new(validators: Vec<Box<dyn QueryValidator>>) -> Self {
        Self { validators }
    }

    /// Names of the validators in evaluation order.
    pub fn validator_names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Runs every validator in order against `sql`.
    pub async fn evaluate(&self, sql: &str) -> GateOutcome {
        for validator in &self.validators {
            let start = Instant::now();
            let verdict = validator.validate(sql).await;
            debug!(
                validator = validator.name(),
                is_safe = verdict.is_safe,
                duration_ms = start.elapsed().as_millis() as u64,
                "Validator finished"
            );

            if !verdict.is_safe {
                warn!(validator = validator.name(), reason = %verdict.reason, "Query rejected");
                return GateOutcome {
                    verdict: Verdict::Unsafe,
                    feedback: Some(verdict.reason),
                    rejected_by: Some(validator.name().to_string()),
                    approved: None,
                };
            }
        }

        GateOutcome {
            verdict: Verdict::Safe,
            feedback: None,
            rejected_by: None,
            approved: Some(ApprovedQuery::approve(sql)),
        }
    }
}

/// Derives the routing decision from a verdict and the iteration position.
///
/// Only a safe verdict executes. A rejection refines while iterations remain
/// and halts once `iteration` reaches `ceiling`.
pub fn route(verdict: Verdict, iteration: u32, ceiling: u32) -> RoutingDecision {
    match verdict {
        Verdict::Safe => RoutingDecision::Execute,
        Verdict::Unsafe | Verdict::Unknown if iteration < ceiling => RoutingDecision::Refine,
        Verdict::Unsafe | Verdict::Unknown => RoutingDecision::Halt,
    }
}

/// Terminal feedback for a run that ran out of iterations.
pub fn halt_feedback(ceiling: u32, last_reason: &str) -> String {
    format!(
        "Maximum refinement attempts ({}) reached. {}",
        ceiling, last_reason
    )
}
