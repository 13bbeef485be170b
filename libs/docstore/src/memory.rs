use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::{DocumentBackend, Snapshot};
use crate::error::{StoreError, StoreResult};
use crate::query::Filter;

#[derive(Debug, Default)]
struct MemoryCollection {
    /// Insertion order is the natural store order
    documents: Vec<Snapshot>,
    unique: BTreeSet<String>,
}

impl MemoryCollection {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|d| d.id == id)
    }

    /// First unique field whose value in `fields` is already held by another document
    fn conflict(&self, fields: &Document, skip_id: Option<&str>) -> Option<(String, Bson)> {
        self.unique.iter().find_map(|field| {
            let value = fields.get(field)?;
            let taken = self
                .documents
                .iter()
                .filter(|d| Some(d.id.as_str()) != skip_id)
                .any(|d| d.fields.get(field).unwrap_or(&Bson::Null) == value);
            taken.then(|| (field.clone(), value.clone()))
        })
    }
}

fn duplicate(field: String, value: &Bson) -> StoreError {
    let value = match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    };
    StoreError::DuplicateKey { field, value }
}

/// In-memory backend (for development/testing)
///
/// Mirrors the MongoDB backend: per-field merges, unique fields enforced under
/// the collection's write lock, and the same filter semantics.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn insert(&self, collection: &str, fields: Document) -> StoreResult<String> {
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();

        if let Some((field, value)) = coll.conflict(&fields, None) {
            return Err(duplicate(field, &value));
        }

        let id = Uuid::now_v7().simple().to_string();
        coll.documents.push(Snapshot {
            id: id.clone(),
            fields,
        });
        Ok(id)
    }

    async fn fetch(&self, collection: &str, id: &str) -> StoreResult<Option<Snapshot>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|coll| coll.position(id).map(|i| coll.documents[i].clone())))
    }

    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(index) = coll.position(id) else {
            return Ok(false);
        };

        if let Some((field, value)) = coll.conflict(&fields, Some(id)) {
            return Err(duplicate(field, &value));
        }

        let target = &mut coll.documents[index].fields;
        for (key, value) in fields {
            target.insert(key, value);
        }
        Ok(true)
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(coll) = collections.get_mut(collection) {
            coll.documents.retain(|d| d.id != id);
        }
        Ok(())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Snapshot>> {
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut result: Vec<Snapshot> = coll
            .documents
            .iter()
            .filter(|d| filter.matches(&d.fields))
            .cloned()
            .collect();

        // Stable sort keeps store order among equal keys
        result.sort_by(|a, b| filter.sort_cmp(&a.fields, &b.fields));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();

        let mut seen: Vec<&Bson> = Vec::new();
        for doc in &coll.documents {
            let value = doc.fields.get(field).unwrap_or(&Bson::Null);
            if seen.contains(&value) {
                return Err(duplicate(field.to_string(), value));
            }
            seen.push(value);
        }

        coll.unique.insert(field.to_string());
        Ok(())
    }
}
