//! Product Registry - code-addressed access to the `products` collection

use std::sync::Arc;

use core_config::StoreConfig;
use docstore::{DocumentBackend, DocumentStore, FieldMap, Filter, StoreError};
use mongodb::bson::Bson;
use tracing::{info, instrument};

use crate::error::{ProductError, ProductResult};
use crate::models::{fields, Product, ProductPatch, StoredProduct, COLLECTION};

/// Registry over the product collection.
///
/// Callers address products by business code; the registry resolves the
/// code to the store id before every id-addressed write.
#[derive(Clone)]
pub struct ProductRegistry {
    store: DocumentStore<Product>,
}

impl ProductRegistry {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self::from_store(DocumentStore::new(backend, COLLECTION))
    }

    pub fn with_config(backend: Arc<dyn DocumentBackend>, config: StoreConfig) -> Self {
        Self::from_store(DocumentStore::new(backend, COLLECTION).with_config(config))
    }

    pub fn from_store(store: DocumentStore<Product>) -> Self {
        Self { store }
    }

    /// Get the underlying store for other collaborators
    pub fn store(&self) -> &DocumentStore<Product> {
        &self.store
    }

    /// Install the unique constraint on `code`; call once at startup
    #[instrument(skip(self))]
    pub async fn init_indexes(&self) -> ProductResult<()> {
        self.store.ensure_unique(fields::CODE).await?;
        info!("Product indexes created successfully");
        Ok(())
    }

    /// Create a new product, rejecting a code that is already taken
    #[instrument(skip(self, product), fields(code = %product.code))]
    pub async fn create(&self, product: Product) -> ProductResult<StoredProduct> {
        product.validate()?;

        let existing = self
            .store
            .find_first(&key_filter(fields::CODE, &product.code))
            .await?;
        if existing.is_some() {
            return Err(ProductError::DuplicateCode(product.code));
        }

        let code = product.code.clone();
        let created = self.store.create(product).await.map_err(|e| match e {
            // Lost the race to a concurrent create; the unique constraint caught it
            StoreError::DuplicateKey { .. } => ProductError::DuplicateCode(code.clone()),
            other => other.into(),
        })?;

        info!(product_id = %created.id, code = %code, "Product created successfully");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> ProductResult<StoredProduct> {
        self.find_one(fields::CODE, "code", code).await
    }

    /// First product carrying `barcode`, in store order
    #[instrument(skip(self))]
    pub async fn find_by_barcode(&self, barcode: &str) -> ProductResult<StoredProduct> {
        self.find_one(fields::BARCODE_VALUE, "barcode", barcode)
            .await
    }

    /// First product named exactly `name`, in store order
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> ProductResult<StoredProduct> {
        self.find_one(fields::NAME, "name", name).await
    }

    /// Blank keys never match; stored blanks are "unset", not a value.
    ///
    /// Keys are compared as the codec presents them, so a legacy numeric
    /// `123` is found by `"123"`.
    async fn find_one(
        &self,
        field: &str,
        key: &'static str,
        value: &str,
    ) -> ProductResult<StoredProduct> {
        if value.trim().is_empty() {
            return Err(ProductError::not_found(key, value));
        }
        self.store
            .find_first(&key_filter(field, value))
            .await?
            .ok_or_else(|| ProductError::not_found(key, value))
    }

    /// Set the image URL, barcode and recognition blob, leaving every other field alone
    #[instrument(skip(self, recognition_data))]
    pub async fn update_image_metadata(
        &self,
        code: &str,
        image_url: &str,
        barcode_value: &str,
        recognition_data: &str,
    ) -> ProductResult<()> {
        let existing = self.get_by_code(code).await?;

        let mut patch = FieldMap::new();
        patch
            .string(fields::IMAGE_URL, image_url)
            .string(fields::BARCODE_VALUE, barcode_value)
            .string(fields::IMAGE_RECOGNITION_DATA, recognition_data);
        self.store.update(&existing.id, patch).await?;

        info!(product_id = %existing.id, "Product image metadata updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> ProductResult<Vec<StoredProduct>> {
        Ok(self.store.list().await?)
    }

    #[instrument(skip(self))]
    pub async fn list_by_company(&self, company_id: &str) -> ProductResult<Vec<StoredProduct>> {
        Ok(self
            .store
            .query(&key_filter(fields::COMPANY_ID, company_id))
            .await?)
    }

    /// Apply a partial update and return the product as now stored
    #[instrument(skip(self, patch))]
    pub async fn update_by_code(
        &self,
        code: &str,
        patch: ProductPatch,
    ) -> ProductResult<StoredProduct> {
        patch.validate()?;
        let existing = self.get_by_code(code).await?;

        self.store.update(&existing.id, patch.to_fields()).await?;

        info!(product_id = %existing.id, "Product updated successfully");
        Ok(self.store.get(&existing.id).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_by_code(&self, code: &str) -> ProductResult<()> {
        let existing = self.get_by_code(code).await?;
        self.store.delete(&existing.id).await?;

        info!(product_id = %existing.id, "Product deleted successfully");
        Ok(())
    }
}

/// Match a string key, plus its integer form when the key is canonical integer text.
///
/// Older documents stored numeric codes as numbers; the codec reads them back
/// as text, so lookups accept both. The unique constraint still treats `"123"`
/// and `123` as different values.
fn key_filter(field: &str, value: &str) -> Filter {
    match value.parse::<i64>() {
        Ok(n) if n.to_string() == value => {
            Filter::new().one_of(field, [Bson::from(value), Bson::Int64(n)])
        }
        _ => Filter::new().eq(field, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docstore::{MemoryBackend, Snapshot, StoreResult};
    use mongodb::bson::Document;

    fn registry() -> ProductRegistry {
        ProductRegistry::new(Arc::new(MemoryBackend::new()))
    }

    /// Backend whose every call fails as if the network were down
    struct DownBackend;

    #[async_trait]
    impl DocumentBackend for DownBackend {
        async fn insert(&self, _: &str, _: Document) -> StoreResult<String> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn fetch(&self, _: &str, _: &str) -> StoreResult<Option<Snapshot>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn merge(&self, _: &str, _: &str, _: Document) -> StoreResult<bool> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn remove(&self, _: &str, _: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn find(&self, _: &str, _: &Filter) -> StoreResult<Vec<Snapshot>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn ensure_unique(&self, _: &str, _: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_product() {
        let registry = registry();

        let result = registry.create(Product::new("", "Nameless code")).await;
        assert!(matches!(result, Err(ProductError::Validation(_))));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_lookups_never_match() {
        let registry = registry();
        registry.create(Product::new("A1", "No barcode")).await.unwrap();

        let result = registry.find_by_barcode("").await;
        assert!(matches!(result, Err(ProductError::NotFound { key: "barcode", .. })));
    }

    #[tokio::test]
    async fn test_store_unavailable_propagates() {
        let registry = ProductRegistry::new(Arc::new(DownBackend));

        let err = registry.get_by_code("A1").await.unwrap_err();
        assert!(matches!(err, ProductError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        let err = registry.create(Product::new("A1", "Cola")).await.unwrap_err();
        assert!(matches!(err, ProductError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_update_by_code_rejects_empty_patch() {
        let registry = registry();
        registry.create(Product::new("A1", "Cola")).await.unwrap();

        let result = registry.update_by_code("A1", ProductPatch::default()).await;
        assert!(matches!(result, Err(ProductError::Validation(_))));
    }
}
