//! TPTP3 / SZS proof-output interpretation.
//!
//! The interpreter reads three things from the prover's stdout:
//! - `% SZS status <Status> for <problem>`
//! - `% SZS answers Tuple [[a,b],[c,d]|_] for <problem>`
//! - the annotated formulas between `% SZS output start Proof` and
//!   `% SZS output end Proof`
//!
//! Proof steps are kept verbatim and in emission order. Anything else the
//! prover prints (statistics, banners) is ignored.

use std::collections::BTreeMap;

use kbreason_kif::tptp::unmangle_term;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char as pchar, multispace0},
    combinator::{all_consuming, opt, recognize},
    error::{Error as NomError, ErrorKind},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{RawProverOutput, SolverLimits};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SzsStatus {
    Theorem,
    Unsatisfiable,
    CounterSatisfiable,
    Satisfiable,
    Timeout,
    GaveUp,
    Error,
    OSError,
    InputError,
    SyntaxError,
    MemoryOut,
    Other(String),
}

impl SzsStatus {
    fn parse(word: &str) -> Self {
        match word {
            "Theorem" => Self::Theorem,
            "Unsatisfiable" => Self::Unsatisfiable,
            "CounterSatisfiable" => Self::CounterSatisfiable,
            "Satisfiable" => Self::Satisfiable,
            "Timeout" => Self::Timeout,
            "GaveUp" => Self::GaveUp,
            "Error" => Self::Error,
            "OSError" => Self::OSError,
            "InputError" => Self::InputError,
            "SyntaxError" => Self::SyntaxError,
            "MemoryOut" => Self::MemoryOut,
            other => Self::Other(other.to_string()),
        }
    }

    /// The prover could not work on the problem at all.
    ///
    /// `GaveUp`, `Timeout` and the non-theorem statuses are answers ("no
    /// proof found"), not failures.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Error | Self::OSError | Self::InputError | Self::SyntaxError | Self::MemoryOut
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Theorem => "Theorem",
            Self::Unsatisfiable => "Unsatisfiable",
            Self::CounterSatisfiable => "CounterSatisfiable",
            Self::Satisfiable => "Satisfiable",
            Self::Timeout => "Timeout",
            Self::GaveUp => "GaveUp",
            Self::Error => "Error",
            Self::OSError => "OSError",
            Self::InputError => "InputError",
            Self::SyntaxError => "SyntaxError",
            Self::MemoryOut => "MemoryOut",
            Self::Other(word) => word,
        }
    }
}

/// Structured view of one prover run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub status: Option<SzsStatus>,
    /// Answer tuples in prover order, at most `answer_limit`; `None` marks a
    /// position the prover left unbound.
    pub answers: Vec<Vec<Option<String>>>,
    /// Query variable → term, taken from the first answer tuple. Unsolved
    /// variables are absent.
    pub bindings: BTreeMap<String, String>,
    /// Derivation records exactly as emitted, in emission order.
    pub proof: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: `{fragment}`")]
pub struct ProofParseError {
    pub message: String,
    pub fragment: String,
}

impl ProofParseError {
    fn new(message: &str, fragment: &str) -> Self {
        Self {
            message: message.to_string(),
            fragment: fragment.trim().to_string(),
        }
    }
}

enum SzsLine<'a> {
    Status(&'a str),
    Answers(&'a str),
    ProofStart,
    ProofEnd,
    Other,
}

fn classify_szs(line: &str) -> Option<SzsLine<'_>> {
    let rest = line.strip_prefix('%')?.trim_start().strip_prefix("SZS")?.trim_start();
    if let Some(status) = rest.strip_prefix("status") {
        return Some(SzsLine::Status(
            status.split_whitespace().next().unwrap_or_default(),
        ));
    }
    if let Some(answers) = rest.strip_prefix("answers") {
        let answers = answers.trim_start();
        let answers = answers.strip_prefix("Tuple").unwrap_or(answers).trim();
        let answers = match answers.rfind(" for ") {
            Some(idx) => &answers[..idx],
            None => answers,
        };
        return Some(SzsLine::Answers(answers.trim()));
    }
    if rest.starts_with("output start") {
        return Some(if rest.contains("Proof") || rest.contains("Refutation") {
            SzsLine::ProofStart
        } else {
            SzsLine::Other
        });
    }
    if rest.starts_with("output end") {
        return Some(if rest.contains("Proof") || rest.contains("Refutation") {
            SzsLine::ProofEnd
        } else {
            SzsLine::Other
        });
    }
    Some(SzsLine::Other)
}

/// Parse prover stdout into status, answers, bindings and proof steps.
///
/// Output with no proof block and no answers is a valid, empty result.
pub fn interpret(
    output: &RawProverOutput,
    limits: &SolverLimits,
) -> Result<Interpretation, ProofParseError> {
    let mut result = Interpretation::default();
    let mut in_proof = false;
    let mut pending: Option<String> = None;

    for line in output.stdout.lines() {
        let trimmed = line.trim();

        if let Some(szs) = classify_szs(trimmed) {
            match szs {
                SzsLine::Status(word) => result.status = Some(SzsStatus::parse(word)),
                SzsLine::Answers(text) => {
                    if result.answers.is_empty() {
                        let mut tuples = parse_answer_tuples(text)?;
                        tuples.truncate(limits.answer_limit.max(1));
                        result.answers = tuples;
                    }
                }
                SzsLine::ProofStart => {
                    in_proof = true;
                }
                SzsLine::ProofEnd => {
                    if let Some(unfinished) = pending.take() {
                        return Err(ProofParseError::new("unterminated proof step", &unfinished));
                    }
                    in_proof = false;
                }
                SzsLine::Other => {}
            }
            continue;
        }

        // Non-SZS comments never belong to a record, even one still open.
        if !in_proof || trimmed.starts_with('%') {
            continue;
        }

        let record = match pending.take() {
            Some(mut acc) => {
                acc.push('\n');
                acc.push_str(line.trim_end());
                acc
            }
            None if trimmed.is_empty() => continue,
            None => trimmed.to_string(),
        };

        match record_state(&record) {
            RecordState::Complete => {
                check_record_header(&record)?;
                result.proof.push(record);
            }
            RecordState::Open => pending = Some(record),
            RecordState::Unbalanced => {
                return Err(ProofParseError::new("unbalanced parentheses in proof step", &record))
            }
        }
    }

    if let Some(unfinished) = pending {
        return Err(ProofParseError::new("unterminated proof step", &unfinished));
    }
    if in_proof {
        let tail = result.proof.last().map(String::as_str).unwrap_or("% SZS output start Proof");
        return Err(ProofParseError::new("proof block never closed", tail));
    }

    if let Some(first) = result.answers.first() {
        for (var, value) in output.variables.iter().zip(first.iter()) {
            if let Some(value) = value {
                result.bindings.insert(var.clone(), unmangle_term(value));
            }
        }
    }

    Ok(result)
}

/// Why a run failed on the prover's side, if it did.
///
/// A failure SZS status always counts. A non-zero exit code (or a kill by
/// signal) counts only when no SZS status was printed, since Vampire also
/// exits non-zero after reporting `CounterSatisfiable` or `GaveUp`.
pub fn run_failure(output: &RawProverOutput, interpretation: &Interpretation) -> Option<String> {
    let reason = match (&interpretation.status, output.exit_code) {
        (Some(status), _) if status.is_failure() => format!("SZS status {}", status.as_str()),
        (Some(_), _) | (None, Some(0)) => return None,
        (None, Some(code)) => format!("exited with status {code} without an SZS status"),
        (None, None) => "terminated by a signal without an SZS status".to_string(),
    };
    let stderr = output.stderr.trim();
    Some(if stderr.is_empty() {
        reason
    } else {
        format!("{reason}: {stderr}")
    })
}

// ============================================================================
// Proof records
// ============================================================================

enum RecordState {
    Complete,
    Open,
    Unbalanced,
}

fn record_state(text: &str) -> RecordState {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return RecordState::Unbalanced;
                }
            }
            _ => {}
        }
    }
    if depth == 0 && quote.is_none() && text.trim_end().ends_with(").") {
        RecordState::Complete
    } else if depth == 0 && quote.is_none() && text.trim_end().ends_with(')') {
        // `fof(...)` without the final period is a broken record, not an open one.
        RecordState::Unbalanced
    } else {
        RecordState::Open
    }
}

fn formula_name(input: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        recognize(delimited(
            pchar('\''),
            take_while1(|c: char| c != '\''),
            pchar('\''),
        )),
    ))(input)
}

fn record_header(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, lang) = alt((tag("fof"), tag("cnf"), tag("tff"), tag("thf")))(input)?;
    let (input, _) = preceded(multispace0, pchar('('))(input)?;
    let (input, name) = preceded(multispace0, formula_name)(input)?;
    let (input, _) = preceded(multispace0, pchar(','))(input)?;
    let (input, role) = preceded(
        multispace0,
        take_while1(|c: char| c.is_ascii_lowercase() || c == '_' || c == '-'),
    )(input)?;
    let (input, _) = preceded(multispace0, pchar(','))(input)?;
    Ok((input, (lang, name, role)))
}

fn check_record_header(record: &str) -> Result<(), ProofParseError> {
    record_header(record.trim_start())
        .map(|_| ())
        .map_err(|_| ProofParseError::new("proof step without `lang(name, role,` header", record))
}

// ============================================================================
// Answer tuples
// ============================================================================

/// A TPTP term inside an answer tuple: balanced text up to a top-level
/// `,`, `]` or `|`.
fn answer_term(input: &str) -> IResult<&str, &str> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' if depth > 0 => depth -= 1,
            ',' | ']' | '|' | ')' if depth == 0 => {
                let term = input[..idx].trim();
                if term.is_empty() {
                    break;
                }
                return Ok((&input[idx..], term));
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(NomError::new(input, ErrorKind::TakeWhile1)))
}

fn open_tail(input: &str) -> IResult<&str, Option<&str>> {
    opt(preceded(multispace0, recognize(pair(pchar('|'), preceded(multispace0, pchar('_'))))))(
        input,
    )
}

fn answer_tuple(input: &str) -> IResult<&str, Vec<&str>> {
    delimited(
        pchar('['),
        separated_list1(pchar(','), preceded(multispace0, answer_term)),
        terminated(open_tail, preceded(multispace0, pchar(']'))),
    )(input)
}

fn answer_list(input: &str) -> IResult<&str, Vec<Vec<&str>>> {
    let (input, (_, tuples, _, _)) = tuple((
        pchar('['),
        separated_list0(pchar(','), preceded(multispace0, answer_tuple)),
        open_tail,
        preceded(multispace0, pchar(']')),
    ))(input)?;
    Ok((input, tuples))
}

/// `_` and TPTP variables (uppercase initial) are positions the prover
/// did not bind.
fn is_unbound(term: &str) -> bool {
    term == "_" || term.starts_with(|c: char| c.is_ascii_uppercase())
}

fn parse_answer_tuples(text: &str) -> Result<Vec<Vec<Option<String>>>, ProofParseError> {
    let (_, tuples) = all_consuming(terminated(answer_list, multispace0))(text)
        .map_err(|_| ProofParseError::new("malformed answer tuple", text))?;
    Ok(tuples
        .into_iter()
        .map(|t| {
            t.into_iter()
                .map(|term| (!is_unbound(term)).then(|| term.to_string()))
                .collect()
        })
        .collect())
}
