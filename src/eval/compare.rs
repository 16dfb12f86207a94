//! Comparison semantics: the typed coercion ladder.
//!
//! Every comparison receives a resolved left value and a right-hand form
//! from the AST. Numeric comparison is tried first whenever both sides
//! convert to numbers, which is also what makes entity values leading-zero
//! insensitive (`sub=1` matches `sub-01`); otherwise comparison is
//! case-sensitive over strings. Wildcard values and SQL LIKE both translate
//! to `glob::Pattern`; `~=` is a separate full-match regex path. A bad
//! regex or pattern makes that one comparison false and records a warning,
//! never aborting the query.

use crate::ast::{CompareOp, RValue};
use crate::model::Value;
use glob::Pattern;
use log::debug;
use regex::Regex;
use std::cmp::Ordering;

/// Evaluate `left <op> right`. Null left operands only ever match `NULL`.
pub fn evaluate(left: &Value, op: CompareOp, right: &RValue, warnings: &mut Vec<String>) -> bool {
    match right {
        RValue::Null => match op {
            CompareOp::Eq => left.is_null(),
            CompareOp::NotEq => !left.is_null(),
            _ => false,
        },
        RValue::Range(lo, hi) => {
            if !matches!(op, CompareOp::Eq) {
                return false;
            }
            match left.as_number() {
                Some(n) => *lo <= n && n <= *hi,
                None => false,
            }
        }
        RValue::List(values) => {
            let contained = values.iter().any(|v| evaluate(left, CompareOp::Eq, v, warnings));
            match op {
                CompareOp::Eq => contained,
                CompareOp::NotEq => !contained,
                _ => false,
            }
        }
        RValue::Pattern(pattern) => {
            let matched = glob_match(pattern, left, warnings);
            match op {
                CompareOp::Eq => matched,
                CompareOp::NotEq => !matched,
                _ => false,
            }
        }
        RValue::Regex(pattern) => {
            let matched = regex_match(pattern, left, warnings);
            match op {
                CompareOp::Eq | CompareOp::Match => matched,
                CompareOp::NotEq => !matched,
                _ => false,
            }
        }
        RValue::Number(n) => scalar_compare(left, op, &Value::Float(*n)),
        RValue::Str(s) => scalar_compare(left, op, &Value::Str(s.clone())),
    }
}

/// SQL LIKE: `%` and `_` wildcards over the string form.
pub fn like_match(pattern: &str, left: &Value, warnings: &mut Vec<String>) -> bool {
    glob_match(&like_to_glob(pattern), left, warnings)
}

fn scalar_compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    if left.is_null() {
        return false;
    }
    let ordering = match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(left.as_display_string().cmp(&right.as_display_string())),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::GtEq => ordering != Ordering::Less,
        CompareOp::Match => false,
    }
}

fn glob_match(pattern: &str, left: &Value, warnings: &mut Vec<String>) -> bool {
    if left.is_null() {
        return false;
    }
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches(&left.as_display_string()),
        Err(err) => {
            let message = format!("invalid pattern '{}': {}", pattern, err);
            debug!("{}", message);
            warnings.push(message);
            false
        }
    }
}

fn regex_match(pattern: &str, left: &Value, warnings: &mut Vec<String>) -> bool {
    if left.is_null() {
        return false;
    }
    // `~=` performs a full match: the whole string form must match.
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(compiled) => compiled.is_match(&left.as_display_string()),
        Err(err) => {
            let message = format!("invalid regex '{}': {}", pattern, err);
            debug!("{}", message);
            warnings.push(message);
            false
        }
    }
}

/// Translate `%`/`_` to `*`/`?`, escaping glob metacharacters so LIKE
/// patterns stay literal elsewhere.
fn like_to_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => glob.push('*'),
            '_' => glob.push('?'),
            '*' | '?' | '[' | ']' => {
                glob.push('[');
                glob.push(c);
                glob.push(']');
            }
            other => glob.push(other),
        }
    }
    glob
}

/// Ordering used by MAX/MIN and ORDER BY: numeric when both sides convert,
/// lexicographic otherwise. Null handling belongs to the caller.
pub fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.as_display_string().cmp(&b.as_display_string()),
    }
}
