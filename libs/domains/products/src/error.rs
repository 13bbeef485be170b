use docstore::StoreError;
use thiserror::Error;

use crate::recognizer::RecognizerError;

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("No product with {key} '{value}'")]
    NotFound { key: &'static str, value: String },

    #[error("Product with code '{0}' already exists")]
    DuplicateCode(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Malformed product data in field '{field}': {message}")]
    Decode { field: String, message: String },

    #[error("Product store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Recognition unavailable: {0}")]
    RecognitionUnavailable(String),
}

pub type ProductResult<T> = Result<T, ProductError>;

impl ProductError {
    pub fn not_found(key: &'static str, value: &str) -> Self {
        ProductError::NotFound {
            key,
            value: value.to_string(),
        }
    }

    /// Whether the caller may retry the operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProductError::StoreUnavailable(_) | ProductError::RecognitionUnavailable(_)
        )
    }
}

impl From<StoreError> for ProductError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => ProductError::NotFound { key: "id", value: id },
            StoreError::Decode { field, message } => ProductError::Decode { field, message },
            StoreError::Unavailable(msg) => ProductError::StoreUnavailable(msg),
            StoreError::DuplicateKey { value, .. } => ProductError::DuplicateCode(value),
        }
    }
}

impl From<RecognizerError> for ProductError {
    fn from(err: RecognizerError) -> Self {
        ProductError::RecognitionUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_kind() {
        let err: ProductError = StoreError::not_found("products", "abc").into();
        assert!(matches!(err, ProductError::NotFound { key: "id", ref value } if value == "abc"));

        let err: ProductError = StoreError::decode("sale_price", "'x' is not a number").into();
        assert!(matches!(err, ProductError::Decode { ref field, .. } if field == "sale_price"));

        let err: ProductError = StoreError::Unavailable("timed out".to_string()).into();
        assert!(err.is_retryable());

        let err: ProductError = StoreError::DuplicateKey {
            field: "code".to_string(),
            value: "A1".to_string(),
        }
        .into();
        assert!(matches!(err, ProductError::DuplicateCode(ref code) if code == "A1"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ProductError::not_found("barcode", "123").to_string(),
            "No product with barcode '123'"
        );
        assert_eq!(
            ProductError::DuplicateCode("A1".to_string()).to_string(),
            "Product with code 'A1' already exists"
        );
    }
}
