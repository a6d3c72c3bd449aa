//! Search configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Path to the search index directory
    pub index_path: PathBuf,

    /// Index writer heap size in bytes (default: 50MB)
    pub writer_heap_size: usize,

    /// Create the index when it does not exist yet; otherwise a missing
    /// index is reported as unavailable
    pub create_if_missing: bool,

    /// Resources per bulk write
    pub chunk_size: usize,

    /// Default results per page
    pub page_length: usize,

    /// Upper bound for a requested page length
    pub max_page_length: usize,

    /// Base URL of the LMS used to build preview links
    pub preview_base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("./data/search_index"),
            writer_heap_size: 50_000_000, // 50MB
            create_if_missing: true,
            chunk_size: 100,
            page_length: 10,
            max_page_length: 1000,
            preview_base_url: "https://www.sandbox.edx.org/".to_string(),
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn index_path(mut self, path: PathBuf) -> Self {
        self.config.index_path = path;
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn page_length(mut self, length: usize) -> Self {
        self.config.page_length = length;
        self
    }

    pub fn max_page_length(mut self, length: usize) -> Self {
        self.config.max_page_length = length;
        self
    }

    pub fn preview_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.preview_base_url = url.into();
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
