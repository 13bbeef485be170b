use std::time::Duration;

use crate::{env_parse, ConfigError, FromEnv};

/// Settings for the product recognition pipeline
#[derive(Clone, Debug)]
pub struct RecognitionConfig {
    /// Classifications at or below this confidence are never looked up
    pub confidence_threshold: f64,
    /// Applied to every call into the recognizer
    pub timeout: Duration,
}

impl RecognitionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl FromEnv for RecognitionConfig {
    /// Environment variables:
    /// - `RECOGNITION_CONFIDENCE_THRESHOLD` (default: 0.5)
    /// - `RECOGNITION_TIMEOUT_MS` (default: 10000)
    fn from_env() -> Result<Self, ConfigError> {
        let confidence_threshold: f64 = env_parse("RECOGNITION_CONFIDENCE_THRESHOLD", 0.5)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::ParseError {
                key: "RECOGNITION_CONFIDENCE_THRESHOLD".to_string(),
                details: format!("{} is outside [0, 1]", confidence_threshold),
            });
        }
        let timeout_ms: u64 = env_parse("RECOGNITION_TIMEOUT_MS", 10_000)?;

        Ok(Self {
            confidence_threshold,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}
