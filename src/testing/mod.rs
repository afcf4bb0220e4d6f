//! Shared fixtures for unit tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::database::collection::{Collection, Document, FindQuery};
use crate::database::manager::DatabaseError;
use crate::database::memory::{MemoryCollection, MemoryStore};
use crate::query::policy::QueryPolicy;
use crate::query::types::{FieldPredicate, QueryOp, SortField};

pub const SEED_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/seed.json"));

pub fn seed() -> Value {
    serde_json::from_str(SEED_JSON).expect("seed fixture is valid JSON")
}

/// The narrow materials policy used by the end-to-end scenarios.
pub fn scenario_materials_policy() -> QueryPolicy {
    QueryPolicy::new(
        "materials",
        &["name", "category", "quantity", "ecoFriendly", "createdAt"],
        &[
            QueryOp::Eq,
            QueryOp::Gt,
            QueryOp::Gte,
            QueryOp::Lt,
            QueryOp::Lte,
            QueryOp::Contains,
            QueryOp::In,
        ],
    )
    .with_default_sort(vec![SortField::desc("createdAt")])
    .with_page_sizes(50, 100)
}

pub async fn seeded_materials() -> MemoryCollection {
    let collection = MemoryCollection::new("materials");
    let records = seed()["materials"].as_array().cloned().unwrap_or_default();
    let documents: Vec<Document> = records.into_iter().filter_map(|r| r.as_object().cloned()).collect();
    collection.insert_many(documents).await;
    collection
}

pub async fn seeded_store<'e>(entities: impl IntoIterator<Item = &'e str>) -> MemoryStore {
    let store = MemoryStore::new(entities);
    store.seed_json(&seed()).await.expect("seed fixture loads");
    store
}

/// A collection whose every read fails.
pub struct FailingCollection;

#[async_trait]
impl Collection for FailingCollection {
    fn name(&self) -> &str {
        "failing"
    }

    async fn find(&self, _query: &FindQuery) -> Result<Vec<Document>, DatabaseError> {
        Err(DatabaseError::QueryError("connection reset".to_string()))
    }

    async fn count_documents(&self, _filter: &[FieldPredicate]) -> Result<u64, DatabaseError> {
        Err(DatabaseError::QueryError("connection reset".to_string()))
    }
}
