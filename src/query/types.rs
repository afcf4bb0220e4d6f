use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// Operator tokens accepted in `field[operator]=value` query keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Nin,
}

impl QueryOp {
    pub const ALL: [QueryOp; 11] = [
        QueryOp::Eq,
        QueryOp::Ne,
        QueryOp::Gt,
        QueryOp::Gte,
        QueryOp::Lt,
        QueryOp::Lte,
        QueryOp::Contains,
        QueryOp::StartsWith,
        QueryOp::EndsWith,
        QueryOp::In,
        QueryOp::Nin,
    ];

    /// Comparison and membership operators only, no string patterns.
    pub const COMPARISON: [QueryOp; 8] = [
        QueryOp::Eq,
        QueryOp::Ne,
        QueryOp::Gt,
        QueryOp::Gte,
        QueryOp::Lt,
        QueryOp::Lte,
        QueryOp::In,
        QueryOp::Nin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOp::Eq => "eq",
            QueryOp::Ne => "ne",
            QueryOp::Gt => "gt",
            QueryOp::Gte => "gte",
            QueryOp::Lt => "lt",
            QueryOp::Lte => "lte",
            QueryOp::Contains => "contains",
            QueryOp::StartsWith => "startsWith",
            QueryOp::EndsWith => "endsWith",
            QueryOp::In => "in",
            QueryOp::Nin => "nin",
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, QueryOp::Contains | QueryOp::StartsWith | QueryOp::EndsWith)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, QueryOp::In | QueryOp::Nin)
    }
}

impl FromStr for QueryOp {
    type Err = UnknownOperator;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        QueryOp::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == token)
            .ok_or_else(|| UnknownOperator(token.to_string()))
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operator: {}", self.0)
    }
}

/// A coerced scalar operand.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    String(String),
}

impl QueryValue {
    /// JSON form used for storage parameters and API output.
    /// Integral numbers render as integers, dates as ISO-8601 with milliseconds.
    pub fn to_json(&self) -> Value {
        match self {
            QueryValue::Bool(b) => Value::Bool(*b),
            QueryValue::Number(n) => number_to_json(*n),
            QueryValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            QueryValue::String(s) => Value::String(s.clone()),
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

impl Serialize for QueryValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Case-insensitive text pattern built from an escaped literal.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPattern {
    /// The user-supplied text, unescaped.
    pub literal: String,
    /// Regex source: escaped literal plus `^`/`$` anchors where required.
    pub source: String,
}

impl Serialize for TextPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("$regex", &self.source)?;
        map.serialize_entry("$options", "i")?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Value(QueryValue),
    List(Vec<QueryValue>),
    Pattern(TextPattern),
}

/// One whitelisted filter condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPredicate {
    pub field: String,
    pub op: QueryOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Which fields a read returns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "fields")]
pub enum Projection {
    #[default]
    All,
    Fields(Vec<String>),
}

/// Everything the builder has accumulated for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub predicates: Vec<FieldPredicate>,
    pub sort: Vec<SortField>,
    pub projection: Projection,
    pub page: u64,
    pub page_size: u64,
    pub skip: u64,
}

impl QuerySpec {
    pub fn new(default_page_size: u64) -> Self {
        Self {
            predicates: vec![],
            sort: vec![],
            projection: Projection::All,
            page: 1,
            page_size: default_page_size,
            skip: 0,
        }
    }
}

/// Pagination envelope returned next to a page of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PaginationMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

/// Why a query parameter contributed nothing to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    FieldNotAllowed,
    UnknownOperator,
    OperatorNotAllowed,
    SortFieldNotAllowed,
    ProjectionFieldNotAllowed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::FieldNotAllowed => "field not allowed",
            DropReason::UnknownOperator => "unknown operator",
            DropReason::OperatorNotAllowed => "operator not allowed",
            DropReason::SortFieldNotAllowed => "sort field not allowed",
            DropReason::ProjectionFieldNotAllowed => "projection field not allowed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedParam {
    pub key: String,
    pub reason: DropReason,
}

impl DroppedParam {
    pub fn new(key: impl Into<String>, reason: DropReason) -> Self {
        Self { key: key.into(), reason }
    }
}
