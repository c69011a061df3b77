//! Loop exit conditions.
//!
//! A condition is evaluated against the shared run state and never mutates it.
//!
//! - `ref` holds when the value exists and is truthy (not null, false, 0, "" or empty)
//! - `!ref` holds when `ref` does not
//! - `ref == "value"`, `ref != "value"`, `ref contains "substr"` compare the
//!   text form of the value
//! - clauses combine with `&&` and `||`; `&&` binds tighter
//!
//! `ref` is a step id, optionally followed by `.field` segments into JSON
//! objects. Comparisons against an unknown `ref` are false.

use crate::state::RunState;

/// Evaluate a condition expression. Empty or unparseable expressions are false.
pub fn evaluate(expr: &str, state: &RunState) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return false;
    }
    split_outside_quotes(expr, "||").into_iter().any(|clause| {
        split_outside_quotes(clause, "&&")
            .into_iter()
            .all(|atom| evaluate_atom(atom.trim(), state))
    })
}

fn evaluate_atom(atom: &str, state: &RunState) -> bool {
    if atom.is_empty() {
        return false;
    }

    // key contains "value"
    if let Some((key, substr)) = parse_operator(atom, " contains ") {
        return text_of(key, state).is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(atom, "!=") {
        return text_of(key, state).is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(atom, "==") {
        return text_of(key, state).is_some_and(|s| s == value);
    }

    if let Some(negated) = atom.strip_prefix('!') {
        return !is_truthy(negated.trim(), state);
    }

    is_truthy(atom, state)
}

fn text_of(path: &str, state: &RunState) -> Option<String> {
    state.lookup(path).map(strand_core::types::value_to_text)
}

fn is_truthy(path: &str, state: &RunState) -> bool {
    match state.lookup(path) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(serde_json::Value::Array(a)) => !a.is_empty(),
        Some(serde_json::Value::Object(o)) => !o.is_empty(),
    }
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let idx = find_outside_quotes(expr, op)?;
    let key = expr[..idx].trim();
    let val = unquote(expr[idx + op.len()..].trim());
    if key.is_empty() {
        return None;
    }
    Some((key, val))
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn find_outside_quotes(expr: &str, needle: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in expr.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if expr[i..].starts_with(needle) => return Some(i),
            None => {}
        }
    }
    None
}

fn split_outside_quotes<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = expr;
    while let Some(idx) = find_outside_quotes(rest, sep) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + sep.len()..];
    }
    parts.push(rest);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> RunState {
        let mut s = RunState::new();
        s.set_str("status", "success");
        s.set_str("draft", "Looks good. APPROVED");
        s.set_str("empty", "");
        s.set("review", json!({"approved": true, "score": 8}));
        s
    }

    #[test]
    fn test_condition_equals() {
        assert!(evaluate(r#"status == "success""#, &state()));
        assert!(!evaluate(r#"status == "failure""#, &state()));
        assert!(evaluate("status == success", &state()));
        assert!(evaluate("status == 'success'", &state()));
    }

    #[test]
    fn test_condition_not_equals() {
        assert!(evaluate(r#"status != "failure""#, &state()));
        assert!(!evaluate(r#"status != "success""#, &state()));
        // Unknown refs are false, even for `!=`.
        assert!(!evaluate(r#"missing != "x""#, &state()));
    }

    #[test]
    fn test_condition_contains() {
        assert!(evaluate(r#"draft contains "APPROVED""#, &state()));
        assert!(!evaluate(r#"draft contains "REJECTED""#, &state()));
        assert!(evaluate(r#"draft contains "good. A""#, &state()));
    }

    #[test]
    fn test_dotted_refs_and_numbers() {
        assert!(evaluate("review.approved", &state()));
        assert!(evaluate(r#"review.score == "8""#, &state()));
        assert!(!evaluate("review.missing", &state()));
    }

    #[test]
    fn test_truthiness_and_negation() {
        assert!(evaluate("status", &state()));
        assert!(!evaluate("empty", &state()));
        assert!(!evaluate("missing", &state()));
        assert!(evaluate("!missing", &state()));
        assert!(evaluate("!empty", &state()));
        assert!(!evaluate("!status", &state()));
    }

    #[test]
    fn test_boolean_combinators() {
        assert!(evaluate(r#"status == "success" && review.approved"#, &state()));
        assert!(!evaluate(r#"status == "success" && missing"#, &state()));
        assert!(evaluate(r#"missing || draft contains "APPROVED""#, &state()));
        // && binds tighter than ||
        assert!(evaluate("status || missing && missing", &state()));
        assert!(!evaluate("missing && status || missing", &state()));
    }

    #[test]
    fn test_operators_inside_quotes_are_literal() {
        let mut s = RunState::new();
        s.set_str("out", "a && b == c");
        assert!(evaluate(r#"out contains "&& b ==""#, &s));
        assert!(evaluate(r#"out == "a && b == c""#, &s));
    }

    #[test]
    fn test_empty_or_garbage_is_false() {
        assert!(!evaluate("", &state()));
        assert!(!evaluate("   ", &state()));
        assert!(!evaluate("== \"x\"", &state()));
    }
}
