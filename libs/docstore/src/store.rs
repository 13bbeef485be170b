use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use core_config::StoreConfig;
use mongodb::bson::Document;
use tracing::{info, instrument, warn};

use crate::backend::DocumentBackend;
use crate::codec::{self, FieldMap, Record, Stored, CREATED_AT, RESERVED_FIELDS, UPDATED_AT};
use crate::error::{StoreError, StoreResult};
use crate::query::Filter;

/// Typed access to one named collection.
///
/// Cheap to clone; clones share the backend. Every backend round-trip runs
/// under `StoreConfig::operation_timeout` and an elapsed deadline surfaces
/// as [`StoreError::Unavailable`].
pub struct DocumentStore<T> {
    backend: Arc<dyn DocumentBackend>,
    collection: String,
    config: StoreConfig,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            collection: self.collection.clone(),
            config: self.config.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> DocumentStore<T> {
    pub fn new(backend: Arc<dyn DocumentBackend>, collection: impl Into<String>) -> Self {
        Self {
            backend,
            collection: collection.into(),
            config: StoreConfig::default(),
            _record: PhantomData,
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn deadline<R>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<R>>,
    ) -> StoreResult<R> {
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    collection = %self.collection,
                    operation,
                    ?timeout,
                    "Store deadline exceeded"
                );
                Err(StoreError::Unavailable(format!(
                    "{} on '{}' timed out after {:?}",
                    operation, self.collection, timeout
                )))
            }
        }
    }

    /// Drop codec-owned keys and stamp `updated_at`
    fn prepare_patch(&self, patch: FieldMap) -> Document {
        let mut doc = patch.into_document();
        for key in RESERVED_FIELDS {
            doc.remove(key);
        }
        doc.insert(
            UPDATED_AT,
            codec::timestamp_bson(codec::now(), self.config.timestamp_format),
        );
        codec::canonicalize_timestamps(&mut doc, self.config.timestamp_format);
        doc
    }

    /// Persist a new record; both timestamps are set to now
    #[instrument(skip(self, record), fields(collection = %self.collection))]
    pub async fn create(&self, record: T) -> StoreResult<Stored<T>> {
        let now = codec::now();
        let format = self.config.timestamp_format;

        let mut doc = codec::encode(&record).into_document();
        for key in RESERVED_FIELDS {
            doc.remove(key);
        }
        doc.insert(CREATED_AT, codec::timestamp_bson(now, format));
        doc.insert(UPDATED_AT, codec::timestamp_bson(now, format));
        codec::canonicalize_timestamps(&mut doc, format);

        let id = self
            .deadline("create", self.backend.insert(&self.collection, doc))
            .await?;

        info!(id = %id, "Document created");
        Ok(Stored {
            id,
            created_at: now,
            updated_at: now,
            record,
            extra: Document::new(),
        })
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn get(&self, id: &str) -> StoreResult<Stored<T>> {
        let snapshot = self
            .deadline("get", self.backend.fetch(&self.collection, id))
            .await?
            .ok_or_else(|| StoreError::not_found(&self.collection, id))?;

        codec::decode(snapshot.id, &snapshot.fields)
    }

    /// Merge the fields present in `patch`; everything else is left as stored
    #[instrument(
        skip(self, patch),
        fields(collection = %self.collection, field_count = patch.len())
    )]
    pub async fn update(&self, id: &str, patch: FieldMap) -> StoreResult<()> {
        let doc = self.prepare_patch(patch);

        let merged = self
            .deadline("update", self.backend.merge(&self.collection, id, doc))
            .await?;
        if !merged {
            return Err(StoreError::not_found(&self.collection, id));
        }

        info!(id = %id, "Document updated");
        Ok(())
    }

    /// Merge every declared field of `record`; undeclared stored fields survive
    pub async fn update_record(&self, id: &str, record: &T) -> StoreResult<()> {
        self.update(id, codec::encode(record)).await
    }

    /// Write back a fetched envelope, including edits made to its `extra` fields
    pub async fn save(&self, stored: &Stored<T>) -> StoreResult<()> {
        let doc = stored.encode_full(self.config.timestamp_format);
        self.update(&stored.id, FieldMap::from(doc)).await
    }

    /// Removing an id that does not exist succeeds
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.deadline("delete", self.backend.remove(&self.collection, id))
            .await?;
        info!(id = %id, "Document deleted");
        Ok(())
    }

    pub async fn list(&self) -> StoreResult<Vec<Stored<T>>> {
        self.query(&Filter::new()).await
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn query(&self, filter: &Filter) -> StoreResult<Vec<Stored<T>>> {
        let snapshots = self
            .deadline("query", self.backend.find(&self.collection, filter))
            .await?;

        snapshots
            .into_iter()
            .map(|snapshot| codec::decode(snapshot.id, &snapshot.fields))
            .collect()
    }

    /// First match in the filter's order (store order when unordered)
    pub async fn find_first(&self, filter: &Filter) -> StoreResult<Option<Stored<T>>> {
        let filter = filter.clone().limit(1);
        Ok(self.query(&filter).await?.into_iter().next())
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn ensure_unique(&self, field: &str) -> StoreResult<()> {
        self.deadline(
            "ensure_unique",
            self.backend.ensure_unique(&self.collection, field),
        )
        .await
    }
}
