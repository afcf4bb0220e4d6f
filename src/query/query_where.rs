use super::policy::QueryPolicy;
use super::types::{DropReason, FieldPredicate, Operand, QueryOp};
use super::value::{coerce_list, coerce_value, text_pattern};

/// Operator grammar for filter keys: `field` (implicit `eq`) or `field[operator]`.
pub struct QueryWhere;

impl QueryWhere {
    /// Splits `name[operator]` into its parts. Keys without a well-formed
    /// bracket suffix are returned whole with no operator.
    pub fn split_key(key: &str) -> (&str, Option<&str>) {
        if let Some(inner) = key.strip_suffix(']') {
            if let Some(open) = inner.rfind('[') {
                let (field, op) = (&inner[..open], &inner[open + 1..]);
                if !field.is_empty() && !op.is_empty() {
                    return (field, Some(op));
                }
            }
        }
        (key, None)
    }

    /// Checks a key against the policy without looking at its value.
    pub fn check_key<'k>(key: &'k str, policy: &QueryPolicy) -> Result<(&'k str, QueryOp), DropReason> {
        let (field, token) = Self::split_key(key);
        if !policy.allows_field(field) {
            return Err(DropReason::FieldNotAllowed);
        }
        let op = match token {
            Some(token) => token.parse::<QueryOp>().map_err(|_| DropReason::UnknownOperator)?,
            None => QueryOp::Eq,
        };
        if !policy.allows_operator(op) {
            return Err(DropReason::OperatorNotAllowed);
        }
        Ok((field, op))
    }

    /// Turns one key/value pair into a predicate, or the reason it was dropped.
    pub fn evaluate(key: &str, raw: &str, policy: &QueryPolicy) -> Result<FieldPredicate, DropReason> {
        let (field, op) = Self::check_key(key, policy)?;
        Ok(FieldPredicate { field: field.to_string(), op, operand: Self::operand(op, raw) })
    }

    fn operand(op: QueryOp, raw: &str) -> Operand {
        if op.is_list() {
            return Operand::List(coerce_list(raw));
        }
        match text_pattern(op, raw) {
            Some(pattern) => Operand::Pattern(pattern),
            None => Operand::Value(coerce_value(raw)),
        }
    }
}

/// Zero or one predicate for a query-string entry. Never fails.
pub fn parse_predicate(key: &str, raw: &str, policy: &QueryPolicy) -> Option<FieldPredicate> {
    QueryWhere::evaluate(key, raw, policy).ok()
}
