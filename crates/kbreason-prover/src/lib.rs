//! External prover boundary.
//!
//! A `Prover` takes a TPTP problem (the knowledge base's axioms plus one
//! conjecture) and returns the solver's raw text. Turning that text into
//! bindings and a proof trace is `proof::interpret`'s job; deciding whether
//! the answer arrived in time belongs to the caller.

pub mod proof;
pub mod vampire;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use proof::{interpret, run_failure, Interpretation, ProofParseError, SzsStatus};
pub use vampire::{VampireConfig, VampireProver};

/// Solver resource limits that are not the time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverLimits {
    /// Maximum number of answer tuples read from one run.
    pub answer_limit: usize,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self { answer_limit: 10 }
    }
}

/// One prover call: shared axioms, a conjecture, and the variables it binds.
#[derive(Debug, Clone)]
pub struct ProverProblem {
    pub axioms: Arc<str>,
    pub conjecture: String,
    /// Query variables (KIF names, no `?`), in the order the conjecture
    /// quantifies them. Answer tuples are positional over this list.
    pub variables: Vec<String>,
    pub budget: Duration,
    pub limits: SolverLimits,
}

impl ProverProblem {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.axioms.len() + self.conjecture.len() + 2);
        out.push_str(&self.axioms);
        if !self.axioms.is_empty() && !self.axioms.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.conjecture);
        out.push('\n');
        out
    }
}

/// Text produced by one prover run. Not retained across calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProverOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub variables: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("failed to start prover `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("prover i/o failed on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Prover: Send + Sync {
    fn name(&self) -> &str;

    /// Run the solver to completion. Callers enforce deadlines by dropping
    /// the returned future; implementations must not leave work running
    /// when that happens.
    async fn prove(&self, problem: &ProverProblem) -> Result<RawProverOutput, ProverError>;
}
