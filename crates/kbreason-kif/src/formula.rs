//! First-order view of KIF statements.
//!
//! Only the subset with a direct FOF rendering is accepted. Everything else
//! is reported as `KifError::Unsupported` so callers can keep the statement
//! for browsing while leaving it out of the prover input.

use serde::{Deserialize, Serialize};

use crate::sexpr::{is_logical_operator, Sexpr};
use crate::{fragment_of, KifError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    Var(String),
    Const(String),
    Number(String),
    Str(String),
    Apply { function: String, args: Vec<Term> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formula {
    Pred { relation: String, args: Vec<Term> },
    Equal(Term, Term),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
    Forall { vars: Vec<String>, body: Box<Formula> },
    Exists { vars: Vec<String>, body: Box<Formula> },
}

fn malformed(message: impl Into<String>, expr: &Sexpr) -> KifError {
    KifError::Malformed {
        message: message.into(),
        fragment: fragment_of(&expr.to_string()),
    }
}

fn unsupported(message: impl Into<String>, expr: &Sexpr) -> KifError {
    KifError::Unsupported {
        message: message.into(),
        fragment: fragment_of(&expr.to_string()),
    }
}

impl Term {
    pub fn from_sexpr(expr: &Sexpr) -> Result<Term, KifError> {
        match expr {
            Sexpr::Word(w) if is_logical_operator(w) => {
                Err(malformed(format!("`{w}` used as a term"), expr))
            }
            Sexpr::Word(w) => Ok(Term::Const(w.clone())),
            Sexpr::Var(v) => Ok(Term::Var(v.clone())),
            Sexpr::Number(n) => Ok(Term::Number(n.clone())),
            Sexpr::Str(s) => Ok(Term::Str(s.clone())),
            Sexpr::RowVar(_) => Err(unsupported("row variable", expr)),
            Sexpr::List(items) => match items.split_first() {
                Some((Sexpr::Word(head), args)) if !is_logical_operator(head) => {
                    let args = args
                        .iter()
                        .map(Term::from_sexpr)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Term::Apply {
                        function: head.clone(),
                        args,
                    })
                }
                Some((Sexpr::Word(_), _)) => Err(unsupported("sentence in term position", expr)),
                Some((Sexpr::Var(_), _)) => Err(unsupported("variable in function position", expr)),
                _ => Err(malformed("term list must start with a function name", expr)),
            },
        }
    }
}

impl Formula {
    pub fn from_sexpr(expr: &Sexpr) -> Result<Formula, KifError> {
        let items = match expr {
            Sexpr::Word(w) if !is_logical_operator(w) => {
                return Ok(Formula::Pred {
                    relation: w.clone(),
                    args: vec![],
                })
            }
            Sexpr::List(items) => items,
            Sexpr::Var(_) => return Err(unsupported("variable used as a sentence", expr)),
            _ => return Err(malformed("expected a sentence", expr)),
        };

        let (head, args) = match items.split_first() {
            Some((Sexpr::Word(head), args)) => (head.as_str(), args),
            Some((Sexpr::Var(_), _)) => {
                return Err(unsupported("variable in relation position", expr))
            }
            _ => return Err(malformed("sentence must start with a relation or operator", expr)),
        };

        let sub = |e: &Sexpr| Formula::from_sexpr(e).map(Box::new);

        match head {
            "and" | "or" => {
                if args.is_empty() {
                    return Err(malformed(format!("`{head}` needs at least one argument"), expr));
                }
                let parts = args
                    .iter()
                    .map(Formula::from_sexpr)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if head == "and" {
                    Formula::And(parts)
                } else {
                    Formula::Or(parts)
                })
            }
            "not" => match args {
                [inner] => Ok(Formula::Not(sub(inner)?)),
                _ => Err(malformed("`not` takes exactly one argument", expr)),
            },
            "=>" | "<=>" => match args {
                [lhs, rhs] if head == "=>" => Ok(Formula::Implies(sub(lhs)?, sub(rhs)?)),
                [lhs, rhs] => Ok(Formula::Iff(sub(lhs)?, sub(rhs)?)),
                _ => Err(malformed(format!("`{head}` takes exactly two arguments"), expr)),
            },
            "forall" | "exists" => {
                let [Sexpr::List(var_list), body] = args else {
                    return Err(malformed(
                        format!("`{head}` expects a variable list and a body"),
                        expr,
                    ));
                };
                if var_list.is_empty() {
                    return Err(malformed("empty quantifier variable list", expr));
                }
                let mut vars = Vec::with_capacity(var_list.len());
                for v in var_list {
                    match v {
                        Sexpr::Var(name) => vars.push(name.clone()),
                        Sexpr::RowVar(_) => return Err(unsupported("row variable", expr)),
                        _ => return Err(malformed("quantifier binds a non-variable", expr)),
                    }
                }
                let body = sub(body)?;
                Ok(if head == "forall" {
                    Formula::Forall { vars, body }
                } else {
                    Formula::Exists { vars, body }
                })
            }
            "equal" => match args {
                [lhs, rhs] => Ok(Formula::Equal(Term::from_sexpr(lhs)?, Term::from_sexpr(rhs)?)),
                _ => Err(malformed("`equal` takes exactly two arguments", expr)),
            },
            relation => {
                let args = args
                    .iter()
                    .map(Term::from_sexpr)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Formula::Pred {
                    relation: relation.to_string(),
                    args,
                })
            }
        }
    }

    /// Free variables in order of first appearance, without duplicates.
    pub fn free_variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut bound = Vec::new();
        self.walk_free(&mut bound, &mut out);
        out
    }

    fn walk_free(&self, bound: &mut Vec<String>, out: &mut Vec<String>) {
        match self {
            Formula::Pred { args, .. } => {
                for arg in args {
                    arg.walk_free(bound, out);
                }
            }
            Formula::Equal(lhs, rhs) => {
                lhs.walk_free(bound, out);
                rhs.walk_free(bound, out);
            }
            Formula::Not(inner) => inner.walk_free(bound, out),
            Formula::And(parts) | Formula::Or(parts) => {
                for part in parts {
                    part.walk_free(bound, out);
                }
            }
            Formula::Implies(lhs, rhs) | Formula::Iff(lhs, rhs) => {
                lhs.walk_free(bound, out);
                rhs.walk_free(bound, out);
            }
            Formula::Forall { vars, body } | Formula::Exists { vars, body } => {
                let depth = bound.len();
                bound.extend(vars.iter().cloned());
                body.walk_free(bound, out);
                bound.truncate(depth);
            }
        }
    }
}

impl Term {
    fn walk_free(&self, bound: &[String], out: &mut Vec<String>) {
        match self {
            Term::Var(v) => {
                if !bound.contains(v) && !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Term::Apply { args, .. } => {
                for arg in args {
                    arg.walk_free(bound, out);
                }
            }
            Term::Const(_) | Term::Number(_) | Term::Str(_) => {}
        }
    }
}
