use crate::{env_or_default, env_parse, env_required_any, ConfigError, FromEnv};

/// MongoDB connection settings for the document store backend
///
/// Format of `url`: mongodb://[username:password@]host[:port][/database][?options]
#[derive(Clone, Debug)]
pub struct MongoConfig {
    pub url: String,
    pub database: String,
    /// Reported to the server for its logs
    pub app_name: Option<String>,
    pub connect_timeout_secs: u64,
    pub server_selection_timeout_secs: u64,
}

impl MongoConfig {
    pub fn with_database(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://localhost:27017".to_string(),
            database: "inventory".to_string(),
            app_name: None,
            connect_timeout_secs: 10,
            server_selection_timeout_secs: 30,
        }
    }
}

impl FromEnv for MongoConfig {
    /// Environment variables:
    /// - `MONGODB_URL` or `MONGO_URL` (required)
    /// - `MONGODB_DATABASE` or `MONGO_DATABASE` (required)
    /// - `MONGODB_APP_NAME` (optional)
    /// - `MONGODB_CONNECT_TIMEOUT_SECS` (default: 10)
    /// - `MONGODB_SERVER_SELECTION_TIMEOUT_SECS` (default: 30)
    fn from_env() -> Result<Self, ConfigError> {
        let url = env_required_any(&["MONGODB_URL", "MONGO_URL"])?;
        let database = env_required_any(&["MONGODB_DATABASE", "MONGO_DATABASE"])?;
        let app_name = Some(env_or_default("MONGODB_APP_NAME", "")).filter(|n| !n.is_empty());

        Ok(Self {
            url,
            database,
            app_name,
            connect_timeout_secs: env_parse("MONGODB_CONNECT_TIMEOUT_SECS", 10)?,
            server_selection_timeout_secs: env_parse("MONGODB_SERVER_SELECTION_TIMEOUT_SECS", 30)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mongo_config_with_database() {
        let config =
            MongoConfig::with_database("mongodb://db:27017", "stock").with_app_name("scan");
        assert_eq!(config.url, "mongodb://db:27017");
        assert_eq!(config.database, "stock");
        assert_eq!(config.app_name.as_deref(), Some("scan"));
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_mongo_config_from_env_fallback_keys() {
        temp_env::with_vars(
            [
                ("MONGODB_URL", None::<&str>),
                ("MONGO_URL", Some("mongodb://fallback:27017")),
                ("MONGODB_DATABASE", None::<&str>),
                ("MONGO_DATABASE", Some("fallbackdb")),
                ("MONGODB_APP_NAME", None::<&str>),
            ],
            || {
                let config = MongoConfig::from_env().unwrap();
                assert_eq!(config.url, "mongodb://fallback:27017");
                assert_eq!(config.database, "fallbackdb");
                assert!(config.app_name.is_none());
            },
        );
    }

    #[test]
    fn test_mongo_config_from_env_missing_url() {
        temp_env::with_vars(
            [
                ("MONGODB_URL", None::<&str>),
                ("MONGO_URL", None::<&str>),
                ("MONGODB_DATABASE", Some("testdb")),
            ],
            || {
                let err = MongoConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::MissingEnvVar(_)));
            },
        );
    }

    #[test]
    fn test_mongo_config_from_env_bad_timeout() {
        temp_env::with_vars(
            [
                ("MONGODB_URL", Some("mongodb://localhost:27017")),
                ("MONGODB_DATABASE", Some("testdb")),
                ("MONGODB_CONNECT_TIMEOUT_SECS", Some("soon")),
            ],
            || {
                let err = MongoConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("MONGODB_CONNECT_TIMEOUT_SECS"));
            },
        );
    }
}
