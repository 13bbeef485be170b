//! Boundary to the image recognition service.
//!
//! Implementations wrap whatever barcode decoder and classifier the
//! deployment uses; the pipeline only sees this trait and applies its own
//! timeout around every call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifier verdict; `confidence` is expected in `[0.0, 1.0]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("Classifier unreachable: {0}")]
    Unreachable(String),

    #[error("Classifier rejected the image: {0}")]
    Rejected(String),

    #[error("Classifier timed out after {0:?}")]
    TimedOut(Duration),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Decoded barcode, or `None` when the image holds no readable barcode
    async fn scan_barcode(&self, image: &[u8]) -> Option<String>;

    /// Remote classification of the image contents
    async fn classify(&self, image: &[u8]) -> Result<Classification, RecognizerError>;
}
