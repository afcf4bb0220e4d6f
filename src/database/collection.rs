use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::database::manager::DatabaseError;
use crate::query::types::{FieldPredicate, Projection, SortField};

/// A stored record: a JSON object with an `id` member.
pub type Document = Map<String, Value>;

/// A read against one collection: conjunctive filter, sort, projection and window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Vec<FieldPredicate>,
    pub sort: Vec<SortField>,
    pub projection: Projection,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Vec<FieldPredicate>) -> Self {
        Self { filter, ..Default::default() }
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// Capability set the query engine needs from a document store.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Matching documents in sort order, windowed and projected.
    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, DatabaseError>;

    /// Number of documents matching every predicate.
    async fn count_documents(&self, filter: &[FieldPredicate]) -> Result<u64, DatabaseError>;
}

/// Hands out the collection backing each entity.
#[async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> &'static str;

    fn collection(&self, entity: &str) -> Option<Arc<dyn Collection>>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::SortField;

    #[test]
    fn chained_calls_fill_every_part() {
        let query = FindQuery::new(vec![])
            .sort(vec![SortField::desc("createdAt")])
            .skip(20)
            .limit(10)
            .select(Projection::Fields(vec!["name".into()]));
        assert_eq!(query.sort, vec![SortField::desc("createdAt")]);
        assert_eq!(query.skip, 20);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.projection, Projection::Fields(vec!["name".into()]));
    }
}
