//! Products Domain
//!
//! Product catalog on top of the document store, plus the pipeline that
//! identifies a product from an uploaded image.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐     ┌─────────────┐
//! │ RecognitionPipeline │ ──▶ │ Recognizer  │  ← Barcode scan, classification (external)
//! └──────────┬──────────┘     └─────────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   ProductRegistry   │  ← Code-addressed access, unique codes
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │ DocumentStore<Prod> │  ← docstore crate
//! └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use core_config::{FromEnv, MongoConfig, RecognitionConfig, StoreConfig};
//! use docstore::MongoBackend;
//! use domain_products::{ProductRegistry, RecognitionPipeline};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MongoBackend::connect(&MongoConfig::from_env()?).await?);
//! let registry = ProductRegistry::with_config(backend, StoreConfig::from_env()?);
//! registry.init_indexes().await?;
//!
//! let pipeline = RecognitionPipeline::with_config(my_recognizer, registry, RecognitionConfig::from_env()?);
//! let outcome = pipeline.identify(&image_bytes).await?;
//! ```

pub mod error;
pub mod models;
pub mod pipeline;
pub mod recognizer;
pub mod registry;

// Re-export commonly used types
pub use error::{ProductError, ProductResult};
pub use models::{Product, ProductPatch, StoredProduct};
pub use pipeline::{MatchSource, RecognitionOutcome, RecognitionPipeline};
pub use recognizer::{Classification, Recognizer, RecognizerError};
pub use registry::ProductRegistry;
