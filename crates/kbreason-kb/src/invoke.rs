//! Prover invocation under a real deadline.

use std::time::Instant;

use kbreason_prover::{RawProverOutput, SolverLimits};

use crate::{KbError, KnowledgeBase, Query, TimeBudget};

/// Make sure the prover input exists, then run the query.
///
/// Both steps share the budget, counted from `submitted`. When the deadline
/// passes the in-flight call is dropped (the Vampire backend kills its child
/// on drop) and `KbError::Timeout` is returned; nothing the prover printed is
/// kept.
pub async fn invoke_prover(
    kb: &dyn KnowledgeBase,
    query: &Query,
    budget: TimeBudget,
    limits: SolverLimits,
    submitted: Instant,
) -> Result<RawProverOutput, KbError> {
    let remaining = budget.as_duration().saturating_sub(submitted.elapsed());
    let Some(remaining_budget) = TimeBudget::new(remaining) else {
        return Err(KbError::Timeout {
            elapsed: submitted.elapsed(),
        });
    };

    let run = async {
        kb.ensure_prover_loaded().await?;
        kb.submit_query(query, remaining_budget, limits).await
    };

    match tokio::time::timeout(remaining, run).await {
        Ok(result) => result,
        Err(_) => {
            let elapsed = submitted.elapsed();
            tracing::debug!(
                kb = kb.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "prover call cancelled at deadline"
            );
            Err(KbError::Timeout { elapsed })
        }
    }
}
