//! Query safety validation.
//!
//! Every candidate query passes through an ordered chain of validators before
//! it may run. Each validator answers the same question: is this query safe,
//! and if not, why not.

pub mod classifier;
pub mod semantic;
pub mod structure;

pub use classifier::CommandClassifier;
pub use semantic::SemanticValidator;
pub use structure::StructureValidator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No validation has run for the current candidate yet.
    #[default]
    Unknown,
    Safe,
    Unsafe,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Safe => "safe",
            Self::Unsafe => "unsafe",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single validator's answer for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorVerdict {
    /// Whether the query may proceed.
    pub is_safe: bool,
    /// Why the query was rejected. Empty when safe.
    pub reason: String,
}

impl ValidatorVerdict {
    /// A passing verdict.
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: String::new(),
        }
    }

    /// A rejection with the given reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
        }
    }

    /// Collapses the verdict into the tri-state used by the pipeline context.
    pub fn verdict(&self) -> Verdict {
        if self.is_safe {
            Verdict::Safe
        } else {
            Verdict::Unsafe
        }
    }
}

/// A single check in the validation chain.
///
/// Validators never return errors: anything that prevents a validator from
/// reaching a decision must be reported as a rejection.
#[async_trait]
pub trait QueryValidator: Send + Sync {
    /// Short name used in logs and attempt records.
    fn name(&self) -> &'static str;

    /// Judges whether `sql` may be executed.
    async fn validate(&self, sql: &str) -> ValidatorVerdict;
}
