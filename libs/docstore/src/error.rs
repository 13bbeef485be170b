use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("Failed to decode field '{field}': {message}")]
    Decode { field: String, message: String },

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate value '{value}' for unique field '{field}'")]
    DuplicateKey { field: String, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn decode(field: &str, message: impl Into<String>) -> Self {
        StoreError::Decode {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        crate::mongodb::classify_error(err)
    }
}
