use std::time::Duration;

use kbreason_kif::{parse_statement, Formula, Sexpr};

use crate::KbError;

/// One parenthesized KIF sentence, the form clients send to `ask` and `tell`.
pub(crate) fn parse_sentence(text: &str) -> Result<Sexpr, KbError> {
    let sexpr = parse_statement(text)?;
    if !matches!(sexpr, Sexpr::List(_)) {
        return Err(KbError::InvalidStatement(format!(
            "expected a parenthesized sentence, got `{}`",
            text.trim()
        )));
    }
    Ok(sexpr)
}

/// A parsed query and the variables its answers bind, in first-appearance
/// order. Answer tuples from the prover are positional over `variables`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    formula: Formula,
    variables: Vec<String>,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self, KbError> {
        let sexpr = parse_sentence(text)?;
        let formula = Formula::from_sexpr(&sexpr)?;
        let variables = formula.free_variables();
        Ok(Self {
            text: text.trim().to_string(),
            formula,
            variables,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

/// Maximum wall-clock time for one query, measured from submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeBudget(Duration);

impl TimeBudget {
    /// `None` for a zero budget.
    pub fn new(duration: Duration) -> Option<Self> {
        (!duration.is_zero()).then_some(Self(duration))
    }

    pub fn from_secs(secs: u64) -> Option<Self> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_follow_first_appearance() {
        let q = Query::parse("(and (instance ?Y Dog) (subclass ?X ?Y) (instance ?X Class))").unwrap();
        assert_eq!(q.variables(), ["Y", "X"]);
        assert_eq!(q.text(), "(and (instance ?Y Dog) (subclass ?X ?Y) (instance ?X Class))");
    }

    #[test]
    fn malformed_queries_are_invalid_statements() {
        assert!(matches!(
            Query::parse("(subclass ?X Object"),
            Err(KbError::InvalidStatement(_))
        ));
        assert!(matches!(Query::parse(""), Err(KbError::InvalidStatement(_))));
        assert!(matches!(Query::parse("Object"), Err(KbError::InvalidStatement(_))));
    }

    #[test]
    fn budgets_must_be_positive() {
        assert!(TimeBudget::from_secs(0).is_none());
        assert_eq!(
            TimeBudget::from_secs(30).map(|b| b.as_duration()),
            Some(Duration::from_secs(30))
        );
    }
}
