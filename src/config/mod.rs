//! Application configuration.
//!
//! All settings come from environment variables. The Redis connection
//! variables are required and every missing one is reported in a single error
//! at startup; the remaining settings have defaults.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::storage::IndexType;
use crate::{DEFAULT_INDEX_NAME, DEFAULT_SEARCH_TYPE};

/// Errors that can occur while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required variables are not set
    #[error("The following env variables haven't been set: {0:?}")]
    MissingVariables(Vec<String>),

    /// A variable is set but cannot be parsed
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection settings for the Redis server.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl RedisConfig {
    /// Connection URL understood by the redis client.
    pub fn url(&self) -> String {
        format!(
            "redis://:{}@{}:{}/{}",
            self.password, self.host, self.port, self.db
        )
    }
}

// Keep the password out of logs.
impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Redis connection settings
    pub redis: RedisConfig,

    /// Name of the vector search index
    pub index_name: String,

    /// Index structure created by the loader
    pub index_type: IndexType,

    /// Vector clause keyword used in queries
    pub search_type: String,

    /// Number of documents fetched by the retriever
    pub top_k_retriever: usize,

    /// Number of answers kept by the reader
    pub top_k_reader: usize,

    /// Endpoint of the extractive QA model
    pub qa_reader_url: Option<String>,

    /// Bearer token for the QA endpoint
    pub qa_reader_token: Option<String>,

    /// Query embedding model; must be the model that produced the stored
    /// vectors. `None` selects the embedder's default.
    pub embedding_model: Option<String>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        const REQUIRED: [&str; 4] = ["REDIS_HOST", "REDIS_PORT", "REDIS_PASSWORD", "REDIS_DB"];

        let values: Vec<Option<String>> = REQUIRED.iter().map(|name| lookup(name)).collect();
        let missing: Vec<String> = REQUIRED
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVariables(missing));
        }

        let value = |i: usize| values[i].clone().unwrap_or_default();
        let redis = RedisConfig {
            host: value(0),
            port: parse_value("REDIS_PORT", &value(1))?,
            password: value(2),
            db: parse_value("REDIS_DB", &value(3))?,
        };

        let index_type = match lookup("REDIS_INDEX_TYPE") {
            Some(raw) => parse_value("REDIS_INDEX_TYPE", &raw)?,
            None => IndexType::Hnsw,
        };

        let top_k_retriever = match lookup("TOP_K_RETRIEVER") {
            Some(raw) => parse_value("TOP_K_RETRIEVER", &raw)?,
            None => 10,
        };
        let top_k_reader = match lookup("TOP_K_READER") {
            Some(raw) => parse_value("TOP_K_READER", &raw)?,
            None => 5,
        };

        Ok(Self {
            redis,
            index_name: lookup("INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            index_type,
            search_type: lookup("SEARCH_TYPE").unwrap_or_else(|| DEFAULT_SEARCH_TYPE.to_string()),
            top_k_retriever,
            top_k_reader,
            qa_reader_url: lookup("QA_READER_URL"),
            qa_reader_token: lookup("QA_READER_TOKEN"),
            embedding_model: lookup("EMBEDDING_MODEL").filter(|name| !name.trim().is_empty()),
        })
    }

    /// The QA endpoint, which is required only by the dashboard.
    pub fn reader_url(&self) -> ConfigResult<String> {
        self.qa_reader_url
            .clone()
            .ok_or_else(|| ConfigError::MissingVariables(vec!["QA_READER_URL".to_string()]))
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
    })
}
