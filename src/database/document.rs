//! Document-store semantics shared by in-process evaluation: predicate
//! matching, cross-type ordering and projection over JSON documents.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::database::collection::Document;
use crate::database::manager::DatabaseError;
use crate::query::types::{FieldPredicate, Operand, Projection, QueryOp, QueryValue, SortDirection, SortField};
use crate::query::value::parse_date;

/// A predicate with its pattern compiled once per query.
pub struct CompiledPredicate<'p> {
    predicate: &'p FieldPredicate,
    regex: Option<Regex>,
}

impl<'p> CompiledPredicate<'p> {
    pub fn compile(predicate: &'p FieldPredicate) -> Result<Self, DatabaseError> {
        let regex = match &predicate.operand {
            Operand::Pattern(pattern) => Some(
                RegexBuilder::new(&pattern.source)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| DatabaseError::QueryError(format!("invalid pattern on '{}': {}", predicate.field, e)))?,
            ),
            _ => None,
        };
        Ok(Self { predicate, regex })
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let field = doc.get(&self.predicate.field);
        match (&self.predicate.operand, self.predicate.op) {
            (Operand::Pattern(_), _) => match &self.regex {
                Some(re) => any_element(field, |v| v.as_str().is_some_and(|s| re.is_match(s))),
                None => false,
            },
            (Operand::List(values), QueryOp::In) => any_element(field, |v| values.iter().any(|q| equals(v, q))),
            (Operand::List(values), QueryOp::Nin) => !any_element(field, |v| values.iter().any(|q| equals(v, q))),
            (Operand::Value(q), QueryOp::Eq) => any_element(field, |v| equals(v, q)),
            (Operand::Value(q), QueryOp::Ne) => !any_element(field, |v| equals(v, q)),
            (Operand::Value(q), QueryOp::Gt) => any_element(field, |v| compare(v, q) == Some(Ordering::Greater)),
            (Operand::Value(q), QueryOp::Gte) => {
                any_element(field, |v| matches!(compare(v, q), Some(Ordering::Greater | Ordering::Equal)))
            }
            (Operand::Value(q), QueryOp::Lt) => any_element(field, |v| compare(v, q) == Some(Ordering::Less)),
            (Operand::Value(q), QueryOp::Lte) => {
                any_element(field, |v| matches!(compare(v, q), Some(Ordering::Less | Ordering::Equal)))
            }
            // Shapes the grammar never produces
            _ => false,
        }
    }
}

pub fn compile_filter(filter: &[FieldPredicate]) -> Result<Vec<CompiledPredicate<'_>>, DatabaseError> {
    filter.iter().map(CompiledPredicate::compile).collect()
}

pub fn matches_all(compiled: &[CompiledPredicate<'_>], doc: &Document) -> bool {
    compiled.iter().all(|p| p.matches(doc))
}

/// Arrays match when any element matches; missing fields never match.
fn any_element(field: Option<&Value>, test: impl Fn(&Value) -> bool) -> bool {
    match field {
        None => false,
        Some(Value::Array(items)) => items.iter().any(&test),
        Some(value) => test(value),
    }
}

fn equals(value: &Value, operand: &QueryValue) -> bool {
    compare(value, operand) == Some(Ordering::Equal)
}

/// Orders a stored value against an operand. `None` when the types differ.
/// Date operands compare against date strings.
fn compare(value: &Value, operand: &QueryValue) -> Option<Ordering> {
    match (value, operand) {
        (Value::Bool(v), QueryValue::Bool(q)) => Some(v.cmp(q)),
        (Value::Number(v), QueryValue::Number(q)) => v.as_f64()?.partial_cmp(q),
        (Value::String(v), QueryValue::Date(q)) => Some(parse_date(v)?.cmp(q)),
        (Value::String(v), QueryValue::String(q)) => Some(v.as_str().cmp(q.as_str())),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Object(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Bool(_)) => 6,
    }
}

/// Total order over optional JSON values:
/// missing < null < number < string < object < array < bool.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(Some(l), Some(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

pub fn compare_documents(a: &Document, b: &Document, sort: &[SortField]) -> Ordering {
    for key in sort {
        let ord = compare_values(a.get(&key.field), b.get(&key.field));
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Copies the selected fields. `id` is always kept.
pub fn project(doc: &Document, projection: &Projection) -> Document {
    match projection {
        Projection::All => doc.clone(),
        Projection::Fields(fields) => {
            let mut out = Document::new();
            if let Some(id) = doc.get("id") {
                out.insert("id".to_string(), id.clone());
            }
            for field in fields {
                if let Some(value) = doc.get(field) {
                    out.insert(field.clone(), value.clone());
                }
            }
            out
        }
    }
}
