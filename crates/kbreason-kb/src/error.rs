use std::time::Duration;

use kbreason_kif::KifError;
use kbreason_prover::{ProofParseError, ProverError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KbError {
    #[error("knowledge base failed to initialize: {0}")]
    Initialization(String),

    #[error("no such term in KB: {0}")]
    UnknownTerm(String),

    #[error("no results for term: {0}")]
    NoResult(String),

    /// Prover output that could not be read; carries the offending fragment.
    #[error("malformed prover output: {0}")]
    Parse(#[from] ProofParseError),

    #[error("query timed out after {:.3}s", .elapsed.as_secs_f64())]
    Timeout { elapsed: Duration },

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    #[error("prover failed: {0}")]
    Prover(String),
}

impl From<KifError> for KbError {
    fn from(err: KifError) -> Self {
        KbError::InvalidStatement(err.to_string())
    }
}

impl From<ProverError> for KbError {
    fn from(err: ProverError) -> Self {
        KbError::Prover(err.to_string())
    }
}
