//! Recognition Pipeline - identify a product from an uploaded image
//!
//! ```text
//! scan barcode ──found──▶ find by barcode ──hit──▶ Matched(Barcode)
//!      │                        │ miss
//!      ▼ none                   ▼
//!  classify ◀───────────────────┘
//!      │ error ──────────────────────────────────▶ Failed
//!      ▼
//!  confidence > threshold? ──no──────────────────▶ Suggested
//!      │ yes
//!      ▼
//!  find by name ──hit──▶ Matched(Label)
//!      │ miss
//!      ▼
//!  Suggested
//! ```

use std::sync::Arc;

use core_config::RecognitionConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::{Display, EnumString};
use tracing::{debug, info, instrument, warn};

use crate::error::{ProductError, ProductResult};
use crate::models::StoredProduct;
use crate::recognizer::{Classification, Recognizer, RecognizerError};
use crate::registry::ProductRegistry;

/// Reason reported when the classifier cannot be used
pub const RECOGNITION_UNAVAILABLE: &str = "recognition unavailable";

/// Which identification stage produced the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchSource {
    Barcode,
    Label,
}

/// Result of one recognition attempt; callers branch on the variant
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Matched {
        product: StoredProduct,
        source: MatchSource,
        /// Barcode decoded from the image, if any
        barcode: Option<String>,
    },
    /// No catalog entry; a hint for creating one
    Suggested {
        name: String,
        confidence: f64,
        barcode: Option<String>,
    },
    Failed {
        reason: String,
    },
}

impl RecognitionOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, RecognitionOutcome::Matched { .. })
    }

    /// Barcode decoded from the image, if any
    pub fn barcode(&self) -> Option<&str> {
        match self {
            RecognitionOutcome::Matched { barcode, .. }
            | RecognitionOutcome::Suggested { barcode, .. } => barcode.as_deref(),
            RecognitionOutcome::Failed { .. } => None,
        }
    }

    /// JSON blob stored as the product's recognition data
    pub fn metadata(&self) -> String {
        let value = match self {
            RecognitionOutcome::Matched {
                product,
                source,
                barcode,
            } => json!({
                "action": "matched",
                "source": source.to_string(),
                "product_code": product.code,
                "product_name": product.name,
                "barcode": barcode,
            }),
            RecognitionOutcome::Suggested {
                name,
                confidence,
                barcode,
            } => json!({
                "action": "create_product",
                "suggested_name": name,
                "confidence": confidence,
                "barcode": barcode,
            }),
            RecognitionOutcome::Failed { reason } => json!({
                "action": "failed",
                "reason": reason,
            }),
        };
        value.to_string()
    }
}

/// Classifier confidence as the gate sees it: finite and within `[0, 1]`
fn sanitize_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Orchestrates the recognizer and the product registry.
///
/// Stateless between calls; one pipeline is shared by all in-flight requests.
pub struct RecognitionPipeline<R: Recognizer> {
    recognizer: Arc<R>,
    registry: ProductRegistry,
    config: RecognitionConfig,
}

impl<R: Recognizer> Clone for RecognitionPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: Recognizer> RecognitionPipeline<R> {
    pub fn new(recognizer: R, registry: ProductRegistry) -> Self {
        Self::with_config(recognizer, registry, RecognitionConfig::default())
    }

    pub fn with_config(
        recognizer: R,
        registry: ProductRegistry,
        config: RecognitionConfig,
    ) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &ProductRegistry {
        &self.registry
    }

    /// Identify the product in `image`.
    ///
    /// Recognizer problems and lookup misses become outcomes; only store
    /// failures come back as errors.
    #[instrument(skip(self, image), fields(image_bytes = image.len()))]
    pub async fn identify(&self, image: &[u8]) -> ProductResult<RecognitionOutcome> {
        let barcode = self.scan_barcode(image).await;

        if let Some(ref value) = barcode {
            match self.registry.find_by_barcode(value).await {
                Ok(product) => {
                    info!(code = %product.code, barcode = %value, "Matched product by barcode");
                    return Ok(RecognitionOutcome::Matched {
                        product,
                        source: MatchSource::Barcode,
                        barcode,
                    });
                }
                Err(ProductError::NotFound { .. }) => {
                    debug!(
                        barcode = %value,
                        "Barcode not in catalog, falling back to classification"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let Classification { label, confidence } = match self.classify(image).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(error = %e, "Classification failed");
                return Ok(RecognitionOutcome::Failed {
                    reason: RECOGNITION_UNAVAILABLE.to_string(),
                });
            }
        };

        let label = label.trim().to_string();
        if label.is_empty() {
            warn!("Classifier returned an empty label");
            return Ok(RecognitionOutcome::Failed {
                reason: "classifier returned no label".to_string(),
            });
        }

        let confidence = sanitize_confidence(confidence);
        if confidence <= self.config.confidence_threshold {
            debug!(%label, confidence, "Low confidence, suggesting without lookup");
            return Ok(RecognitionOutcome::Suggested {
                name: label,
                confidence,
                barcode,
            });
        }

        match self.registry.find_by_name(&label).await {
            Ok(product) => {
                info!(code = %product.code, %label, confidence, "Matched product by label");
                Ok(RecognitionOutcome::Matched {
                    product,
                    source: MatchSource::Label,
                    barcode,
                })
            }
            Err(ProductError::NotFound { .. }) => {
                debug!(%label, confidence, "No product with label, suggesting creation");
                Ok(RecognitionOutcome::Suggested {
                    name: label,
                    confidence,
                    barcode,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Run recognition for an uploaded product image and record the result on the product.
    ///
    /// The stored barcode becomes the one decoded from the image, or stays as
    /// it was when none was decoded. Nothing is written when recognition fails.
    #[instrument(skip(self, image), fields(image_bytes = image.len()))]
    pub async fn attach_image(
        &self,
        code: &str,
        image_url: &str,
        image: &[u8],
    ) -> ProductResult<RecognitionOutcome> {
        let existing = self.registry.get_by_code(code).await?;

        let outcome = self.identify(image).await?;
        if let RecognitionOutcome::Failed { ref reason } = outcome {
            return Err(ProductError::RecognitionUnavailable(reason.clone()));
        }

        let barcode = outcome
            .barcode()
            .map(str::to_string)
            .unwrap_or_else(|| existing.barcode_value.clone());

        self.registry
            .update_image_metadata(code, image_url, &barcode, &outcome.metadata())
            .await?;

        Ok(outcome)
    }

    /// A scan that times out counts as "no barcode"
    async fn scan_barcode(&self, image: &[u8]) -> Option<String> {
        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, self.recognizer.scan_barcode(image)).await {
            Ok(Some(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
            Ok(_) => {
                debug!("No barcode in image");
                None
            }
            Err(_) => {
                warn!(?timeout, "Barcode scan timed out");
                None
            }
        }
    }

    async fn classify(&self, image: &[u8]) -> Result<Classification, RecognizerError> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, self.recognizer.classify(image))
            .await
            .unwrap_or(Err(RecognizerError::TimedOut(timeout)))
    }
}
