//! Environment-driven configuration shared by the inventory crates.
//!
//! Every config struct implements [`FromEnv`] and [`Default`], so tests and
//! embedded callers can build one by hand while deployments read the process
//! environment.

pub mod mongodb;
pub mod recognition;
pub mod store;
pub mod tracing;

use std::env;
use std::str::FromStr;
use thiserror::Error;

pub use mongodb::MongoConfig;
pub use recognition::RecognitionConfig;
pub use store::{StoreConfig, TimestampFormat};

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load an environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load an environment variable or return an error
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Load the first variable that is set out of `keys`
pub fn env_required_any(keys: &[&str]) -> Result<String, ConfigError> {
    keys.iter()
        .find_map(|key| env::var(key).ok())
        .ok_or_else(|| ConfigError::MissingEnvVar(keys.join(" or ")))
}

/// Parse an environment variable, falling back to `default` when unset
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_to_development() {
        temp_env::with_var_unset("APP_ENV", || {
            let env = Environment::from_env();
            assert_eq!(env, Environment::Development);
            assert!(env.is_development());
            assert!(!env.is_production());
        });
    }

    #[test]
    fn test_environment_production_case_insensitive() {
        temp_env::with_var("APP_ENV", Some("PRODUCTION"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("MISSING_REQUIRED", || {
            let err = env_required("MISSING_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("MISSING_REQUIRED"));
            assert!(err.to_string().contains("required"));
        });
    }

    #[test]
    fn test_env_required_any_prefers_first() {
        temp_env::with_vars(
            [("FIRST_KEY", Some("one")), ("SECOND_KEY", Some("two"))],
            || {
                let value = env_required_any(&["FIRST_KEY", "SECOND_KEY"]).unwrap();
                assert_eq!(value, "one");
            },
        );
    }

    #[test]
    fn test_env_required_any_names_all_keys() {
        temp_env::with_vars(
            [("FIRST_KEY", None::<&str>), ("SECOND_KEY", None::<&str>)],
            || {
                let err = env_required_any(&["FIRST_KEY", "SECOND_KEY"]).unwrap_err();
                assert!(err.to_string().contains("FIRST_KEY or SECOND_KEY"));
            },
        );
    }

    #[test]
    fn test_env_parse_default_and_error() {
        temp_env::with_var_unset("PARSE_ME", || {
            assert_eq!(env_parse("PARSE_ME", 7u64).unwrap(), 7);
        });
        temp_env::with_var("PARSE_ME", Some(" 42 "), || {
            assert_eq!(env_parse("PARSE_ME", 7u64).unwrap(), 42);
        });
        temp_env::with_var("PARSE_ME", Some("nope"), || {
            let err = env_parse("PARSE_ME", 7u64).unwrap_err();
            assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == "PARSE_ME"));
        });
    }
}
