//! SUO-KIF s-expression reader.
//!
//! Reads `.kif` text into a flat list of top-level expressions, each tagged
//! with the line it starts on. `;` comments run to the end of the line.

use std::collections::BTreeSet;
use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char as pchar, multispace1, not_line_ending},
    combinator::{map, recognize},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    sequence::{pair, preceded},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::{fragment_of, KifError};

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sexpr {
    Word(String),
    /// `?NAME`, stored without the sigil.
    Var(String),
    /// `@NAME`, stored without the sigil.
    RowVar(String),
    Number(String),
    /// String literal contents, escapes resolved.
    Str(String),
    List(Vec<Sexpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedSexpr {
    pub line: usize,
    pub sexpr: Sexpr,
}

pub fn is_logical_operator(word: &str) -> bool {
    matches!(
        word,
        "and" | "or" | "not" | "=>" | "<=>" | "forall" | "exists"
    )
}

impl Sexpr {
    /// The operator word of a list expression, if it has one.
    pub fn head(&self) -> Option<&str> {
        match self {
            Sexpr::List(items) => match items.first() {
                Some(Sexpr::Word(w)) => Some(w.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Every non-logical constant mentioned anywhere in the expression.
    pub fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Sexpr::Word(w) if !is_logical_operator(w) => {
                out.insert(w.clone());
            }
            Sexpr::List(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            _ => {}
        }
    }

    pub fn contains_row_var(&self) -> bool {
        match self {
            Sexpr::RowVar(_) => true,
            Sexpr::List(items) => items.iter().any(Sexpr::contains_row_var),
            _ => false,
        }
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Word(w) => f.write_str(w),
            Sexpr::Var(v) => write!(f, "?{v}"),
            Sexpr::RowVar(v) => write!(f, "@{v}"),
            Sexpr::Number(n) => f.write_str(n),
            Sexpr::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            Sexpr::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Read every top-level expression in a `.kif` document.
pub fn parse_kif(text: &str) -> Result<Vec<LocatedSexpr>, KifError> {
    let mut out = Vec::new();
    let mut rest = text;
    let mut line = 1usize;

    loop {
        let (after_ws, _) = ws(rest).map_err(|_| syntax_error(line, rest, "unreadable input"))?;
        line += newlines_between(rest, after_ws);
        rest = after_ws;
        if rest.is_empty() {
            break;
        }
        if rest.starts_with(')') {
            return Err(syntax_error(line, rest, "unbalanced `)`"));
        }

        match sexpr(rest) {
            Ok((next, sexpr)) => {
                out.push(LocatedSexpr { line, sexpr });
                line += newlines_between(rest, next);
                rest = next;
            }
            Err(_) => {
                let message = if rest.starts_with('"') {
                    "unterminated string literal"
                } else {
                    "unbalanced `(`"
                };
                return Err(syntax_error(line, rest, message));
            }
        }
    }

    Ok(out)
}

/// Read exactly one statement (the `tell`/`ask` entrypoint).
pub fn parse_statement(text: &str) -> Result<Sexpr, KifError> {
    let mut exprs = parse_kif(text)?;
    if exprs.len() != 1 {
        return Err(KifError::Malformed {
            message: format!("expected exactly one statement, found {}", exprs.len()),
            fragment: fragment_of(text),
        });
    }
    Ok(exprs.remove(0).sexpr)
}

fn syntax_error(line: usize, rest: &str, message: &str) -> KifError {
    KifError::Syntax {
        line,
        message: message.to_string(),
        fragment: fragment_of(rest.lines().next().unwrap_or("")),
    }
}

/// `before` and `after` are the same buffer, `after` a suffix of `before`.
fn newlines_between(before: &str, after: &str) -> usize {
    before[..before.len() - after.len()].matches('\n').count()
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(pchar(';'), not_line_ending))(input)
}

fn ws(input: &str) -> IResult<&str, ()> {
    let (input, _) = many0(alt((multispace1, comment)))(input)?;
    Ok((input, ()))
}

fn is_token_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | ';')
}

fn is_number(tok: &str) -> bool {
    tok.chars().any(|c| c.is_ascii_digit()) && tok.parse::<f64>().is_ok()
}

fn classify_token(tok: &str) -> Sexpr {
    if let Some(name) = tok.strip_prefix('?').filter(|n| !n.is_empty()) {
        return Sexpr::Var(name.to_string());
    }
    if let Some(name) = tok.strip_prefix('@').filter(|n| !n.is_empty()) {
        return Sexpr::RowVar(name.to_string());
    }
    if is_number(tok) {
        return Sexpr::Number(tok.to_string());
    }
    Sexpr::Word(tok.to_string())
}

fn atom(input: &str) -> IResult<&str, Sexpr> {
    map(take_while1(is_token_char), classify_token)(input)
}

fn string_lit(input: &str) -> IResult<&str, Sexpr> {
    let (body, _) = pchar('"')(input)?;
    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((&body[idx + 1..], Sexpr::Str(out))),
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            other => out.push(other),
        }
    }
    Err(nom::Err::Failure(NomError::new(input, ErrorKind::Char)))
}

fn list(input: &str) -> IResult<&str, Sexpr> {
    let (input, _) = pchar('(')(input)?;
    let (input, items) = many0(preceded(ws, sexpr))(input)?;
    let (input, _) = preceded(ws, pchar(')'))(input)?;
    Ok((input, Sexpr::List(items)))
}

fn sexpr(input: &str) -> IResult<&str, Sexpr> {
    alt((list, string_lit, atom))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_statements_with_comments_and_lines() {
        let text = r#"
; upper ontology excerpt
(subclass Animal Organism)

(documentation Animal EnglishLanguage "An \"organism\" that moves.")
(=> (instance ?X Animal) ; trailing comment
    (exists (?Y) (part ?Y ?X)))
"#;
        let exprs = parse_kif(text).expect("parse");
        assert_eq!(exprs.len(), 3);
        assert_eq!(exprs[0].line, 3);
        assert_eq!(exprs[1].line, 5);
        assert_eq!(exprs[2].line, 6);
        assert_eq!(exprs[0].sexpr.head(), Some("subclass"));

        let Sexpr::List(items) = &exprs[1].sexpr else {
            panic!("expected list");
        };
        assert_eq!(items[3], Sexpr::Str("An \"organism\" that moves.".to_string()));
    }

    #[test]
    fn classifies_tokens() {
        let expr = parse_statement("(lessThan ?N -2.5 @ROW ?)").expect("parse");
        assert_eq!(
            expr,
            Sexpr::List(vec![
                Sexpr::Word("lessThan".to_string()),
                Sexpr::Var("N".to_string()),
                Sexpr::Number("-2.5".to_string()),
                Sexpr::RowVar("ROW".to_string()),
                Sexpr::Word("?".to_string()),
            ])
        );
        assert!(expr.contains_row_var());
    }

    #[test]
    fn display_prints_kif() {
        let expr = parse_statement("(  subclass   ?X\n Object )").expect("parse");
        assert_eq!(expr.to_string(), "(subclass ?X Object)");
    }

    #[test]
    fn unbalanced_input_is_a_syntax_error() {
        let err = parse_kif("(subclass Animal Organism)\n(subclass Plant").unwrap_err();
        match err {
            KifError::Syntax { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("unbalanced"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            parse_kif("(a b))"),
            Err(KifError::Syntax { .. })
        ));
        assert!(matches!(
            parse_kif("(documentation A \"open"),
            Err(KifError::Syntax { .. })
        ));
    }

    #[test]
    fn statement_must_be_single() {
        assert!(matches!(
            parse_statement("(a b) (c d)"),
            Err(KifError::Malformed { .. })
        ));
        assert!(matches!(parse_statement("   "), Err(KifError::Malformed { .. })));
    }

    #[test]
    fn collects_non_logical_symbols() {
        let expr =
            parse_statement("(=> (and (instance ?X Dog) (not (attribute ?X Dead))) (instance ?X Animal))")
                .expect("parse");
        let mut symbols = BTreeSet::new();
        expr.collect_symbols(&mut symbols);
        let symbols: Vec<_> = symbols.into_iter().collect();
        assert_eq!(
            symbols,
            vec!["Animal", "Dead", "Dog", "attribute", "instance"]
        );
    }
}
