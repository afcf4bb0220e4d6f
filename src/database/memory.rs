use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::database::collection::{Collection, Document, FindQuery, Store};
use crate::database::document::{compare_documents, compile_filter, matches_all, project};
use crate::database::manager::DatabaseError;
use crate::query::types::FieldPredicate;

/// In-process document collection with document-store query semantics.
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), documents: RwLock::new(Vec::new()) }
    }

    /// Inserts documents, assigning a UUID `id` to any that lack one.
    pub async fn insert_many(&self, documents: impl IntoIterator<Item = Document>) -> usize {
        let mut stored = self.documents.write().await;
        let before = stored.len();
        for mut doc in documents {
            if !doc.contains_key("id") {
                doc.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            }
            stored.push(doc);
        }
        stored.len() - before
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, DatabaseError> {
        let compiled = compile_filter(&query.filter)?;
        let documents = self.documents.read().await;

        let mut matched: Vec<&Document> = documents.iter().filter(|d| matches_all(&compiled, d)).collect();
        if !query.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| project(d, &query.projection))
            .collect())
    }

    async fn count_documents(&self, filter: &[FieldPredicate]) -> Result<u64, DatabaseError> {
        let compiled = compile_filter(filter)?;
        let documents = self.documents.read().await;
        Ok(documents.iter().filter(|d| matches_all(&compiled, d)).count() as u64)
    }
}

/// One `MemoryCollection` per entity.
#[derive(Default)]
pub struct MemoryStore {
    collections: HashMap<String, Arc<MemoryCollection>>,
}

impl MemoryStore {
    pub fn new<'e>(entities: impl IntoIterator<Item = &'e str>) -> Self {
        let collections = entities
            .into_iter()
            .map(|e| (e.to_string(), Arc::new(MemoryCollection::new(e))))
            .collect();
        Self { collections }
    }

    pub fn memory_collection(&self, entity: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(entity).cloned()
    }

    /// Loads `{ "<entity>": [ {...}, ... ] }`. Entities without a collection are skipped.
    pub async fn seed_json(&self, fixtures: &Value) -> Result<usize, DatabaseError> {
        let object = fixtures
            .as_object()
            .ok_or_else(|| DatabaseError::FixtureError("fixture root must be an object".to_string()))?;

        let mut total = 0;
        for (entity, records) in object {
            let Some(collection) = self.collections.get(entity) else {
                tracing::warn!("Skipping fixtures for unknown entity '{}'", entity);
                continue;
            };
            let records = records
                .as_array()
                .ok_or_else(|| DatabaseError::FixtureError(format!("fixtures for '{}' must be an array", entity)))?;

            let mut documents = Vec::with_capacity(records.len());
            for record in records {
                match record {
                    Value::Object(map) => documents.push(map.clone()),
                    _ => {
                        return Err(DatabaseError::FixtureError(format!(
                            "fixture records for '{}' must be objects",
                            entity
                        )))
                    }
                }
            }
            let inserted = collection.insert_many(documents).await;
            info!("Seeded {} '{}' records", inserted, entity);
            total += inserted;
        }
        Ok(total)
    }

    pub async fn seed_file(&self, path: impl AsRef<Path>) -> Result<usize, DatabaseError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DatabaseError::FixtureError(format!("{}: {}", path.display(), e)))?;
        let fixtures: Value = serde_json::from_str(&contents)
            .map_err(|e| DatabaseError::FixtureError(format!("{}: {}", path.display(), e)))?;
        self.seed_json(&fixtures).await
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn collection(&self, entity: &str) -> Option<Arc<dyn Collection>> {
        self.collections.get(entity).map(|c| c.clone() as Arc<dyn Collection>)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::{Operand, Projection, QueryOp, QueryValue, SortField};
    use crate::testing;
    use serde_json::json;

    #[tokio::test]
    async fn find_filters_sorts_windows_and_projects() {
        let collection = testing::seeded_materials().await;
        let query = FindQuery::new(vec![FieldPredicate {
            field: "ecoFriendly".into(),
            op: QueryOp::Eq,
            operand: Operand::Value(QueryValue::Bool(true)),
        }])
        .sort(vec![SortField::asc("name")])
        .skip(1)
        .limit(2)
        .select(Projection::Fields(vec!["name".into()]));

        let docs = collection.find(&query).await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Fly Ash Blend", "Recycled Steel Beam"]);
        assert!(docs.iter().all(|d| d.len() == 2 && d.contains_key("id")));
    }

    #[tokio::test]
    async fn count_ignores_window() {
        let collection = testing::seeded_materials().await;
        let filter = vec![FieldPredicate {
            field: "quantity".into(),
            op: QueryOp::Gte,
            operand: Operand::Value(QueryValue::Number(50.0)),
        }];
        assert_eq!(collection.count_documents(&filter).await.unwrap(), 4);
        assert_eq!(collection.count_documents(&[]).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn insert_assigns_missing_ids() {
        let collection = MemoryCollection::new("tasks");
        let doc = json!({ "title": "Pour slab" }).as_object().cloned().unwrap();
        assert_eq!(collection.insert_many(vec![doc]).await, 1);
        let docs = collection.find(&FindQuery::default()).await.unwrap();
        assert!(docs[0]["id"].as_str().is_some());
    }

    #[tokio::test]
    async fn seeds_known_entities_and_rejects_bad_shapes() {
        let store = MemoryStore::new(["materials", "tasks"]);
        let fixtures = json!({
            "materials": [{ "id": "m1", "name": "Cement" }],
            "tasks": [{ "id": "t1", "title": "Survey" }, { "id": "t2", "title": "Excavate" }],
            "unknown": [{ "id": "x" }]
        });
        assert_eq!(store.seed_json(&fixtures).await.unwrap(), 3);
        assert_eq!(store.memory_collection("tasks").unwrap().len().await, 2);

        let bad = json!({ "tasks": { "id": "t3" } });
        assert!(matches!(store.seed_json(&bad).await, Err(DatabaseError::FixtureError(_))));
    }

    #[tokio::test]
    async fn store_hands_out_collections_by_entity() {
        let store = MemoryStore::new(["materials"]);
        assert_eq!(store.collection("materials").unwrap().name(), "materials");
        assert!(store.collection("budgets").is_none());
        assert!(store.health_check().await.is_ok());
    }
}
