use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::StoreResult;
use crate::query::Filter;

/// A stored document as the backend sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub fields: Document,
}

/// Raw document storage, one implementation per database.
///
/// Backends know nothing about record types; [`crate::DocumentStore`] layers
/// the codec, timestamps and deadlines on top.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Insert a new document and return its generated id
    async fn insert(&self, collection: &str, fields: Document) -> StoreResult<String>;

    async fn fetch(&self, collection: &str, id: &str) -> StoreResult<Option<Snapshot>>;

    /// Set the given fields only; returns `false` when no document has `id`
    async fn merge(&self, collection: &str, id: &str, fields: Document) -> StoreResult<bool>;

    /// Remove a document; removing a missing one is not an error
    async fn remove(&self, collection: &str, id: &str) -> StoreResult<()>;

    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Snapshot>>;

    /// Reject later writes that would repeat an existing value of `field`
    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()>;
}
