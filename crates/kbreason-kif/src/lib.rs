//! SUO-KIF for kbreason
//!
//! The knowledge base is written in SUO-KIF (s-expressions); the external
//! prover speaks TPTP. This crate owns both ends of that boundary:
//! - `sexpr`: a tolerant reader for `.kif` files and single statements,
//! - `formula`: the first-order subset we can hand to a prover,
//! - `tptp`: FOF rendering plus the symbol mangling used to map answers back.

pub mod formula;
pub mod sexpr;
pub mod tptp;

pub use formula::{Formula, Term};
pub use sexpr::{parse_kif, parse_statement, LocatedSexpr, Sexpr};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KifError {
    #[error("syntax error on line {line}: {message} (near `{fragment}`)")]
    Syntax {
        line: usize,
        message: String,
        fragment: String,
    },

    #[error("malformed formula: {message}: {fragment}")]
    Malformed { message: String, fragment: String },

    /// Valid KIF that has no first-order TPTP rendering (row variables,
    /// variable predicates, sentences in term position).
    #[error("unsupported construct: {message}: {fragment}")]
    Unsupported { message: String, fragment: String },
}

/// Trim long source text for error messages.
pub(crate) fn fragment_of(text: &str) -> String {
    const MAX: usize = 80;
    let text = text.trim();
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
