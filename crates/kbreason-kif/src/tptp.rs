//! KIF → TPTP (FOF) rendering and the reverse symbol mapping.
//!
//! Symbol scheme:
//! - constants, functions and relations: `Animal` → `s__Animal`
//! - relation names used as arguments: `subclass` → `s__subclass__m`
//! - variables: `?X` → `V__X`
//! - numbers: `-2.5` → `n__neg2_5`
//! - strings: TPTP distinct objects (`"..."`)
//!
//! Characters outside `[A-Za-z0-9_]` are replaced by `_`, so unmangling is
//! exact only for names already in that alphabet (all SUMO names are).

use crate::formula::{Formula, Term};

pub const SYMBOL_PREFIX: &str = "s__";
pub const MENTION_SUFFIX: &str = "__m";
pub const VARIABLE_PREFIX: &str = "V__";
pub const NUMBER_PREFIX: &str = "n__";

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn mangle_symbol(name: &str) -> String {
    format!("{SYMBOL_PREFIX}{}", sanitize(name))
}

/// Relations start lowercase in SUMO; as arguments they become mentions.
pub fn mangle_argument_constant(name: &str) -> String {
    if name.starts_with(|c: char| c.is_ascii_lowercase()) {
        format!("{SYMBOL_PREFIX}{}{MENTION_SUFFIX}", sanitize(name))
    } else {
        mangle_symbol(name)
    }
}

pub fn mangle_variable(name: &str) -> String {
    format!("{VARIABLE_PREFIX}{}", sanitize(name))
}

pub fn mangle_number(number: &str) -> String {
    let body = number.replace('-', "neg").replace('+', "").replace('.', "_");
    format!("{NUMBER_PREFIX}{}", sanitize(&body))
}

fn quote_distinct_object(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Map a prover symbol back to its KIF spelling.
///
/// Symbols the knowledge base never produced (Skolem constants such as
/// `sK3`, prover-internal names) are returned unchanged.
pub fn unmangle(symbol: &str) -> String {
    let symbol = symbol.trim();
    if let Some(rest) = symbol.strip_prefix(SYMBOL_PREFIX) {
        return rest.strip_suffix(MENTION_SUFFIX).unwrap_or(rest).to_string();
    }
    if let Some(rest) = symbol.strip_prefix(VARIABLE_PREFIX) {
        return format!("?{rest}");
    }
    if let Some(rest) = symbol.strip_prefix(NUMBER_PREFIX) {
        let number = rest.replacen("neg", "-", 1).replace('_', ".");
        if number.parse::<f64>().is_ok() {
            return number;
        }
        return symbol.to_string();
    }
    if symbol.len() >= 2 && symbol.starts_with('"') && symbol.ends_with('"') {
        let inner = &symbol[1..symbol.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }
    symbol.to_string()
}

/// Split on commas that are not nested in parentheses or quotes.
fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Map a whole prover term back to KIF: `s__MeasureFn(n__3,s__Meter)`
/// becomes `(MeasureFn 3 Meter)`. Atomic terms behave like [`unmangle`].
pub fn unmangle_term(text: &str) -> String {
    let text = text.trim();
    let application = match (text.find('('), text.ends_with(')')) {
        (Some(open), true) if open > 0 && !text.starts_with(&['"', '\''][..]) => {
            Some((&text[..open], &text[open + 1..text.len() - 1]))
        }
        _ => None,
    };
    let Some((functor, inner)) = application else {
        return unmangle(text);
    };

    let mut out = format!("({}", unmangle(functor));
    for arg in split_top_level_commas(inner) {
        let arg = arg.trim();
        out.push(' ');
        if arg.starts_with('"') {
            // Distinct objects already use KIF string escaping.
            out.push_str(arg);
        } else {
            out.push_str(&unmangle_term(arg));
        }
    }
    out.push(')');
    out
}

fn render_term(term: &Term, out: &mut String) {
    match term {
        Term::Var(v) => out.push_str(&mangle_variable(v)),
        Term::Const(c) => out.push_str(&mangle_argument_constant(c)),
        Term::Number(n) => out.push_str(&mangle_number(n)),
        Term::Str(s) => out.push_str(&quote_distinct_object(s)),
        Term::Apply { function, args } => {
            out.push_str(&mangle_symbol(function));
            render_args(args, out);
        }
    }
}

fn render_args(args: &[Term], out: &mut String) {
    if args.is_empty() {
        return;
    }
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        render_term(arg, out);
    }
    out.push(')');
}

fn render_vars(vars: &[String]) -> String {
    vars.iter()
        .map(|v| mangle_variable(v))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_nary(parts: &[Formula], op: &str, out: &mut String) {
    if let [only] = parts {
        render_formula_into(only, out);
        return;
    }
    out.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(op);
        }
        render_formula_into(part, out);
    }
    out.push(')');
}

fn render_formula_into(formula: &Formula, out: &mut String) {
    match formula {
        Formula::Pred { relation, args } => {
            out.push_str(&mangle_symbol(relation));
            render_args(args, out);
        }
        Formula::Equal(lhs, rhs) => {
            out.push('(');
            render_term(lhs, out);
            out.push_str(" = ");
            render_term(rhs, out);
            out.push(')');
        }
        Formula::Not(inner) => {
            out.push_str("~(");
            render_formula_into(inner, out);
            out.push(')');
        }
        Formula::And(parts) => render_nary(parts, " & ", out),
        Formula::Or(parts) => render_nary(parts, " | ", out),
        Formula::Implies(lhs, rhs) | Formula::Iff(lhs, rhs) => {
            let op = if matches!(formula, Formula::Implies(..)) {
                " => "
            } else {
                " <=> "
            };
            out.push('(');
            render_formula_into(lhs, out);
            out.push_str(op);
            render_formula_into(rhs, out);
            out.push(')');
        }
        Formula::Forall { vars, body } | Formula::Exists { vars, body } => {
            let q = if matches!(formula, Formula::Forall { .. }) {
                '!'
            } else {
                '?'
            };
            out.push_str(&format!("({q} [{}] : ", render_vars(vars)));
            render_formula_into(body, out);
            out.push(')');
        }
    }
}

/// Render a formula body in FOF syntax (free variables left open).
pub fn render_formula(formula: &Formula) -> String {
    let mut out = String::new();
    render_formula_into(formula, &mut out);
    out
}

fn closed(formula: &Formula, quantifier: char) -> String {
    let free = formula.free_variables();
    let body = render_formula(formula);
    if free.is_empty() {
        body
    } else {
        format!("({quantifier} [{}] : {body})", render_vars(&free))
    }
}

/// `fof(name, axiom, ...).` with free variables universally closed.
pub fn render_axiom(name: &str, formula: &Formula) -> String {
    format!("fof({name},axiom,{}).", closed(formula, '!'))
}

/// `fof(name, conjecture, ...).` with free variables existentially closed,
/// which is what question answering binds.
pub fn render_conjecture(name: &str, formula: &Formula) -> String {
    format!("fof({name},conjecture,{}).", closed(formula, '?'))
}
