//! Expression evaluation with SQLite-style comparison and NULL semantics.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::plan::{CompareOp, Predicate, ScalarExpr};
use crate::errors;
use crate::{LixError, Value};

/// Column names and values of the row an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowContext<'a> {
    pub columns: &'a [String],
    pub values: &'a [Value],
}

impl<'a> RowContext<'a> {
    pub(crate) fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    fn column(&self, name: &str) -> Result<&'a Value, LixError> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| errors::unsupported_statement_error(&format!("unknown column `{name}`")))
    }
}

pub(crate) fn eval_scalar(expr: &ScalarExpr, row: RowContext<'_>) -> Result<Value, LixError> {
    match expr {
        ScalarExpr::Column(name) => row.column(name).cloned(),
        ScalarExpr::Literal(value) => Ok(value.clone()),
        ScalarExpr::JsonExtract { expr, path } => {
            let Value::Text(text) = eval_scalar(expr, row)? else {
                return Ok(Value::Null);
            };
            let Ok(document) = serde_json::from_str::<JsonValue>(&text) else {
                return Ok(Value::Null);
            };
            Ok(json_at_path(&document, path)
                .map(Value::from_json)
                .unwrap_or(Value::Null))
        }
    }
}

fn json_at_path<'a>(document: &'a JsonValue, path: &[String]) -> Option<&'a JsonValue> {
    let mut node = document;
    for segment in path {
        node = match node {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Three-valued: `None` is SQL's unknown.
pub(crate) fn eval_predicate(
    predicate: &Predicate,
    row: RowContext<'_>,
) -> Result<Option<bool>, LixError> {
    match predicate {
        Predicate::Compare { left, op, right } => {
            let left = eval_scalar(left, row)?;
            let right = eval_scalar(right, row)?;
            Ok(compare_values(&left, &right).map(|ordering| match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::NotEq => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtEq => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
            }))
        }
        Predicate::IsNull { expr, negated } => {
            Ok(Some(eval_scalar(expr, row)?.is_null() != *negated))
        }
        Predicate::InList {
            expr,
            list,
            negated,
        } => {
            let value = eval_scalar(expr, row)?;
            if value.is_null() {
                return Ok(None);
            }
            let mut saw_null = false;
            for item in list {
                match compare_values(&value, &eval_scalar(item, row)?) {
                    Some(Ordering::Equal) => return Ok(Some(!negated)),
                    None => saw_null = true,
                    Some(_) => {}
                }
            }
            Ok(if saw_null { None } else { Some(*negated) })
        }
        Predicate::Like {
            expr,
            pattern,
            negated,
        } => {
            let (Some(text), Some(pattern)) = (
                text_of(&eval_scalar(expr, row)?),
                text_of(&eval_scalar(pattern, row)?),
            ) else {
                return Ok(None);
            };
            Ok(Some(like_matches(&pattern, &text) != *negated))
        }
        Predicate::Truthy(expr) => Ok(truthiness(&eval_scalar(expr, row)?)),
        Predicate::And(left, right) => {
            let left = eval_predicate(left, row)?;
            if left == Some(false) {
                return Ok(Some(false));
            }
            match (left, eval_predicate(right, row)?) {
                (_, Some(false)) => Ok(Some(false)),
                (Some(true), Some(true)) => Ok(Some(true)),
                _ => Ok(None),
            }
        }
        Predicate::Or(left, right) => {
            let left = eval_predicate(left, row)?;
            if left == Some(true) {
                return Ok(Some(true));
            }
            match (left, eval_predicate(right, row)?) {
                (_, Some(true)) => Ok(Some(true)),
                (Some(false), Some(false)) => Ok(Some(false)),
                _ => Ok(None),
            }
        }
        Predicate::Not(inner) => Ok(eval_predicate(inner, row)?.map(|value| !value)),
    }
}

/// `None` when either side is NULL. Numbers sort before text, text before
/// blobs.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
        (a, b) => match (numeric(a), numeric(b)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(type_rank(a).cmp(&type_rank(b))),
        },
    }
}

/// Total order for ORDER BY: NULL first, then [`compare_values`].
pub(crate) fn order_values(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(integer) => Some(*integer as f64),
        Value::Real(real) => Some(*real),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Integer(_) | Value::Real(_) => 1,
        Value::Text(_) => 2,
        Value::Blob(_) => 3,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(integer) => Some(integer.to_string()),
        Value::Real(real) => Some(real.to_string()),
        Value::Text(text) => Some(text.clone()),
        Value::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Integer(integer) => Some(*integer != 0),
        Value::Real(real) => Some(*real != 0.0),
        Value::Text(text) => Some(text.trim().parse::<f64>().is_ok_and(|number| number != 0.0)),
        Value::Blob(bytes) => Some(!bytes.is_empty()),
    }
}

/// SQLite LIKE: `%` and `_` wildcards, ASCII case-insensitive.
pub(crate) fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                p += 1;
                t += 1;
            }
            Some(ch) if ch.eq_ignore_ascii_case(&text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|ch| *ch == '%')
}
