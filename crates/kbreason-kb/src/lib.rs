//! Knowledge base and query pipeline for kbreason
//!
//! ```text
//!   query text ──► Query::parse ──► invoke_prover ──► interpret ──► classify ──► encode
//!                                    (deadline)       (bindings,     (Success,     (JSON +
//!                                                      proof)         Timeout,      status)
//!                                                                     Error)
//! ```
//!
//! The pipeline only needs the narrow [`KnowledgeBase`] interface. [`Ontology`]
//! is the reference implementation: SUO-KIF files on disk, a term index, and a
//! TPTP artifact handed to the configured prover. [`KbManager`] owns the
//! one-time load and is shared by reference with every request handler.

pub mod ask;
pub mod error;
pub mod invoke;
pub mod manager;
pub mod ontology;
pub mod outcome;
pub mod query;
pub mod response;

use std::collections::BTreeSet;

use async_trait::async_trait;
use kbreason_prover::{RawProverOutput, SolverLimits};

pub use ask::{execute_query, lookup_term};
pub use error::KbError;
pub use invoke::invoke_prover;
pub use manager::KbManager;
pub use ontology::{KbStatus, Ontology, OntologyConfig, ProverArtifact};
pub use outcome::{classify, Outcome};
pub use query::{Query, TimeBudget};
pub use response::{encode, error_body, EncodedResponse, ResponseStatus};

/// What the query pipeline and the transport need from a knowledge base.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    fn name(&self) -> &str;

    fn has_term(&self, name: &str) -> bool;

    /// Transitive subclasses of `name`; `None` when it has none recorded.
    fn child_classes(&self, name: &str) -> Option<BTreeSet<String>>;

    /// Build the prover input if it is missing. Idempotent.
    async fn ensure_prover_loaded(&self) -> Result<(), KbError>;

    async fn submit_query(
        &self,
        query: &Query,
        budget: TimeBudget,
        limits: SolverLimits,
    ) -> Result<RawProverOutput, KbError>;

    /// Add one assertion; returns a confirmation for the client.
    fn tell(&self, statement: &str) -> Result<String, KbError>;

    /// Drop user assertions and reload the configured sources.
    async fn reset(&self) -> Result<(), KbError>;
}
