use std::time::Instant;

use kbreason_prover::{interpret, run_failure, Interpretation, SolverLimits};

use crate::{classify, invoke_prover, KbError, KnowledgeBase, Outcome, Query, TimeBudget};

/// Run one query end to end: parse, prove under the budget, interpret, classify.
pub async fn execute_query(
    kb: &dyn KnowledgeBase,
    text: &str,
    budget: TimeBudget,
    limits: SolverLimits,
) -> Outcome {
    let submitted = Instant::now();
    let result = prove_and_interpret(kb, text, budget, limits, submitted).await;
    let elapsed = submitted.elapsed();
    let outcome = classify(result, elapsed, budget);

    match &outcome {
        Outcome::Success { bindings, proof, .. } => tracing::debug!(
            kb = kb.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            bindings = bindings.len(),
            proof_steps = proof.len(),
            "query answered"
        ),
        Outcome::Timeout { .. } => tracing::debug!(
            kb = kb.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_duration().as_millis() as u64,
            "query timed out"
        ),
        Outcome::Error(err) => tracing::debug!(kb = kb.name(), error = %err, "query failed"),
    }
    outcome
}

async fn prove_and_interpret(
    kb: &dyn KnowledgeBase,
    text: &str,
    budget: TimeBudget,
    limits: SolverLimits,
    submitted: Instant,
) -> Result<Interpretation, KbError> {
    let query = Query::parse(text)?;
    let output = invoke_prover(kb, &query, budget, limits, submitted).await?;
    let interpretation = interpret(&output, &limits)?;
    if let Some(reason) = run_failure(&output, &interpretation) {
        tracing::warn!(kb = kb.name(), exit_code = ?output.exit_code, "{reason}");
        return Err(KbError::Prover(reason));
    }
    Ok(interpretation)
}

/// Child classes of `term`, for the term browser.
pub fn lookup_term(kb: &dyn KnowledgeBase, term: &str) -> Result<Vec<String>, KbError> {
    if !kb.has_term(term) {
        return Err(KbError::UnknownTerm(term.to_string()));
    }
    kb.child_classes(term)
        .filter(|children| !children.is_empty())
        .map(|children| children.into_iter().collect())
        .ok_or_else(|| KbError::NoResult(term.to_string()))
}
