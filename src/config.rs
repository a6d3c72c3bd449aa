use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search engine and query configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Metadata cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Relational store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("LORE_SEARCH_CONFIG")
            .unwrap_or_else(|_| "config/lore-search.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration, overriding the defaults with the file at `config_path` if present
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: LORE_SEARCH__)
            .add_source(
                config::Environment::with_prefix("LORE_SEARCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds; 0 disables caching
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of entries per cache
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot used to seed the in-memory store
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let config = Config::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.search.chunk_size, 100);
        assert_eq!(config.search.page_length, 10);
        assert!(config.search.create_if_missing);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_serde_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cache.max_capacity, 10_000);
        assert!(config.store.snapshot_path.is_none());
    }
}
