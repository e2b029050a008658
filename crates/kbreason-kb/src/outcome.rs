use std::collections::BTreeMap;
use std::time::Duration;

use kbreason_prover::Interpretation;

use crate::{KbError, TimeBudget};

/// Result of one query. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        bindings: BTreeMap<String, String>,
        proof: Vec<String>,
        elapsed: Duration,
    },
    Timeout {
        elapsed: Duration,
    },
    Error(KbError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Decide the outcome of a pipeline run.
///
/// Reaching the budget always means `Timeout`, even if an answer arrived;
/// whatever the prover produced is discarded.
pub fn classify(
    result: Result<Interpretation, KbError>,
    elapsed: Duration,
    budget: TimeBudget,
) -> Outcome {
    if elapsed >= budget.as_duration() {
        return Outcome::Timeout { elapsed };
    }
    match result {
        Ok(interpretation) => Outcome::Success {
            bindings: interpretation.bindings,
            proof: interpretation.proof,
            elapsed,
        },
        Err(KbError::Timeout { elapsed }) => Outcome::Timeout { elapsed },
        Err(err) => Outcome::Error(err),
    }
}
