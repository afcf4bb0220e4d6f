use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgArguments, PgPool, Row};
use tracing::{debug, info};

use crate::database::collection::{Collection, Document, FindQuery, Store};
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::query::types::{FieldPredicate, Operand, Projection, QueryOp, SortDirection, SortField};

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
    Int(i64),
    TextArray(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub query: String,
    pub params: Vec<SqlParam>,
}

/// Translates a `FindQuery` into parameterised SQL over a `(id TEXT, data JSONB)` table.
///
/// Field names travel as text parameters (`data->$n`), so only the table name
/// is ever interpolated, and it is validated first.
pub struct SqlFind {
    params: Vec<SqlParam>,
}

impl SqlFind {
    fn new() -> Self {
        Self { params: vec![] }
    }

    pub fn select(table: &str, query: &FindQuery) -> Result<SqlStatement, DatabaseError> {
        DatabaseManager::validate_table_name(table)?;
        let mut sql = Self::new();

        let data = match &query.projection {
            Projection::All => "data".to_string(),
            Projection::Fields(fields) => {
                let keys = sql.param(SqlParam::TextArray(fields.clone()));
                format!(
                    "(SELECT COALESCE(jsonb_object_agg(key, value), '{{}}'::jsonb) FROM jsonb_each(data) WHERE key = ANY({})) AS data",
                    keys
                )
            }
        };

        let where_clause = sql.where_clause(&query.filter);
        let order_clause = sql.order_clause(&query.sort);

        let mut statement = format!(
            "SELECT id, {} FROM {} WHERE {} ORDER BY {}",
            data,
            DatabaseManager::quote_identifier(table),
            where_clause,
            order_clause
        );
        if let Some(limit) = query.limit {
            let limit = sql.param(SqlParam::Int(to_i64(limit)));
            statement.push_str(&format!(" LIMIT {}", limit));
        }
        if query.skip > 0 {
            let offset = sql.param(SqlParam::Int(to_i64(query.skip)));
            statement.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(SqlStatement { query: statement, params: sql.params })
    }

    pub fn count(table: &str, filter: &[FieldPredicate]) -> Result<SqlStatement, DatabaseError> {
        DatabaseManager::validate_table_name(table)?;
        let mut sql = Self::new();
        let where_clause = sql.where_clause(filter);
        Ok(SqlStatement {
            query: format!(
                "SELECT COUNT(*) AS count FROM {} WHERE {}",
                DatabaseManager::quote_identifier(table),
                where_clause
            ),
            params: sql.params,
        })
    }

    fn where_clause(&mut self, filter: &[FieldPredicate]) -> String {
        if filter.is_empty() {
            return "1=1".to_string();
        }
        filter
            .iter()
            .map(|p| self.condition(p))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn order_clause(&mut self, sort: &[SortField]) -> String {
        let mut parts: Vec<String> = sort
            .iter()
            .map(|s| {
                let field = self.param(SqlParam::Text(s.field.clone()));
                // Missing values sort lowest in both directions
                let nulls = match s.direction {
                    SortDirection::Asc => "NULLS FIRST",
                    SortDirection::Desc => "NULLS LAST",
                };
                format!("data->{} {} {}", field, s.direction.to_sql(), nulls)
            })
            .collect();
        parts.push("id ASC".to_string());
        parts.join(", ")
    }

    fn condition(&mut self, predicate: &FieldPredicate) -> String {
        let field = self.param(SqlParam::Text(predicate.field.clone()));
        let column = format!("data->{}", field);

        match (&predicate.operand, predicate.op) {
            (Operand::Pattern(pattern), _) => {
                let source = self.param(SqlParam::Text(pattern.source.clone()));
                format!("(jsonb_typeof({}) = 'string' AND data->>{} ~* {})", column, field, source)
            }
            (Operand::List(values), QueryOp::Nin) => {
                let any = self.any_of(&column, values.iter().map(|v| v.to_json()));
                format!("NOT COALESCE({}, false)", any)
            }
            (Operand::List(values), _) => self.any_of(&column, values.iter().map(|v| v.to_json())),
            (Operand::Value(value), QueryOp::Ne) => {
                let eq = self.equals(&column, value.to_json());
                format!("NOT COALESCE({}, false)", eq)
            }
            (Operand::Value(value), op) => match comparison(op) {
                Some(symbol) => {
                    let operand = self.param(SqlParam::Json(value.to_json()));
                    format!(
                        "(jsonb_typeof({c}) = jsonb_typeof({p}::jsonb) AND {c} {s} {p}::jsonb)",
                        c = column,
                        p = operand,
                        s = symbol
                    )
                }
                None => self.equals(&column, value.to_json()),
            },
        }
    }

    /// Scalar equality, or membership when the stored value is an array.
    fn equals(&mut self, column: &str, value: Value) -> String {
        let p = self.param(SqlParam::Json(value));
        format!("({c} = {p}::jsonb OR {c} @> jsonb_build_array({p}::jsonb))", c = column, p = p)
    }

    fn any_of(&mut self, column: &str, values: impl Iterator<Item = Value>) -> String {
        let parts: Vec<String> = values.map(|v| self.equals(column, v)).collect();
        if parts.is_empty() {
            return "FALSE".to_string();
        }
        format!("({})", parts.join(" OR "))
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

fn comparison(op: QueryOp) -> Option<&'static str> {
    match op {
        QueryOp::Gt => Some(">"),
        QueryOp::Gte => Some(">="),
        QueryOp::Lt => Some("<"),
        QueryOp::Lte => Some("<="),
        _ => None,
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    p: &'q SqlParam,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match p {
        SqlParam::Text(s) => q.bind(s),
        SqlParam::Json(v) => q.bind(v),
        SqlParam::Int(i) => q.bind(*i),
        SqlParam::TextArray(items) => q.bind(items),
    }
}

/// A collection stored as one JSONB row per document.
pub struct PgCollection {
    table: String,
    pool: PgPool,
}

impl PgCollection {
    pub fn new(table: impl Into<String>, pool: PgPool) -> Result<Self, DatabaseError> {
        let table = table.into();
        DatabaseManager::validate_table_name(&table)?;
        Ok(Self { table, pool })
    }

    pub async fn ensure_table(&self) -> Result<(), DatabaseError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, data JSONB NOT NULL DEFAULT '{{}}'::jsonb)",
            DatabaseManager::quote_identifier(&self.table)
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Collection for PgCollection {
    fn name(&self) -> &str {
        &self.table
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, DatabaseError> {
        let statement = SqlFind::select(&self.table, query)?;
        let started = Instant::now();

        let mut q = sqlx::query(&statement.query);
        for p in statement.params.iter() {
            q = bind_param_query(q, p);
        }
        let rows = q.fetch_all(&self.pool).await?;
        debug!(table = %self.table, rows = rows.len() as u64, elapsed_ms = started.elapsed().as_millis() as u64, "postgres find");

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let data: Value = row.try_get("data")?;
            let mut document = match data {
                Value::Object(map) => map,
                _ => Document::new(),
            };
            document.insert("id".to_string(), Value::String(id));
            documents.push(document);
        }
        Ok(documents)
    }

    async fn count_documents(&self, filter: &[FieldPredicate]) -> Result<u64, DatabaseError> {
        let statement = SqlFind::count(&self.table, filter)?;
        let mut q = sqlx::query(&statement.query);
        for p in statement.params.iter() {
            q = bind_param_query(q, p);
        }
        let row = q.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// One `PgCollection` per entity, sharing a pool.
pub struct PgStore {
    pool: PgPool,
    collections: HashMap<String, Arc<PgCollection>>,
}

impl PgStore {
    pub fn new<'e>(pool: PgPool, entities: impl IntoIterator<Item = &'e str>) -> Result<Self, DatabaseError> {
        let mut collections = HashMap::new();
        for entity in entities {
            let collection = PgCollection::new(entity, pool.clone())?;
            collections.insert(entity.to_string(), Arc::new(collection));
        }
        Ok(Self { pool, collections })
    }

    /// Creates any missing entity tables.
    pub async fn ensure_tables(&self) -> Result<(), DatabaseError> {
        for collection in self.collections.values() {
            collection.ensure_table().await?;
        }
        info!("Ensured {} entity tables", self.collections.len());
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn collection(&self, entity: &str) -> Option<Arc<dyn Collection>> {
        self.collections.get(entity).map(|c| c.clone() as Arc<dyn Collection>)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}
