//! Typed records over a schema-less document collection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   DocumentStore<T>  │  ← Typed CRUD, deadlines, timestamps
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │     RecordCodec     │  ← Record ↔ field map, coercion, defaults
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   DocumentBackend   │  ← MongoBackend / MemoryBackend
//! └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use docstore::{DocumentStore, Filter, MemoryBackend};
//! use std::sync::Arc;
//!
//! let store: DocumentStore<Product> = DocumentStore::new(Arc::new(MemoryBackend::new()), "products");
//! let created = store.create(product).await?;
//! let cheap = store.query(&Filter::new().lt("sale_price", 5.0)).await?;
//! ```

pub mod backend;
pub mod codec;
pub mod error;
pub mod memory;
pub mod mongodb;
pub mod query;
pub mod store;

pub use backend::{DocumentBackend, Snapshot};
pub use codec::{FieldMap, FieldReader, Record, Stored};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use self::mongodb::MongoBackend;
pub use query::{Filter, Op, SortOrder};
pub use store::DocumentStore;

#[cfg(test)]
pub use backend::MockDocumentBackend;
