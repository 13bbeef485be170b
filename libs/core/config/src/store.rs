use std::time::Duration;

use strum::{Display, EnumString};

use crate::{env_parse, ConfigError, FromEnv};

/// Canonical form the record codec writes timestamps in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TimestampFormat {
    /// The store's native datetime type
    #[default]
    Native,
    /// RFC 3339 text with millisecond precision
    Rfc3339,
}

/// Settings shared by every document store handle
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Deadline for a single backend round-trip
    pub operation_timeout: Duration,
    pub timestamp_format: TimestampFormat,
}

impl StoreConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(5_000),
            timestamp_format: TimestampFormat::Native,
        }
    }
}

impl FromEnv for StoreConfig {
    /// Environment variables:
    /// - `STORE_OPERATION_TIMEOUT_MS` (default: 5000)
    /// - `STORE_TIMESTAMP_FORMAT`: `native` or `rfc3339` (default: native)
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_ms: u64 = env_parse("STORE_OPERATION_TIMEOUT_MS", 5_000)?;
        let timestamp_format = env_parse("STORE_TIMESTAMP_FORMAT", TimestampFormat::Native)?;

        Ok(Self {
            operation_timeout: Duration::from_millis(timeout_ms),
            timestamp_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        temp_env::with_vars(
            [
                ("STORE_OPERATION_TIMEOUT_MS", None::<&str>),
                ("STORE_TIMESTAMP_FORMAT", None::<&str>),
            ],
            || {
                let config = StoreConfig::from_env().unwrap();
                assert_eq!(config.operation_timeout, Duration::from_secs(5));
                assert_eq!(config.timestamp_format, TimestampFormat::Native);
            },
        );
    }

    #[test]
    fn test_store_config_rfc3339() {
        temp_env::with_vars(
            [
                ("STORE_OPERATION_TIMEOUT_MS", Some("250")),
                ("STORE_TIMESTAMP_FORMAT", Some("RFC3339")),
            ],
            || {
                let config = StoreConfig::from_env().unwrap();
                assert_eq!(config.operation_timeout, Duration::from_millis(250));
                assert_eq!(config.timestamp_format, TimestampFormat::Rfc3339);
            },
        );
    }

    #[test]
    fn test_store_config_unknown_format() {
        temp_env::with_var("STORE_TIMESTAMP_FORMAT", Some("epoch"), || {
            let err = StoreConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("STORE_TIMESTAMP_FORMAT"));
        });
    }
}
