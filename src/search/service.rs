//! Main search service implementation

use crate::config::Config;
use crate::search::aggregation::{AggregationTranslator, FacetSummaries};
use crate::search::config::SearchConfig;
use crate::search::cursor::SearchCursor;
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::{IndexManager, IndexStats};
use crate::search::indexer::{BulkIndexer, IndexOptions, IndexReport};
use crate::search::metadata::MetadataCache;
use crate::search::query::{QueryBuilder, SearchSort, SortOption};
use crate::state::ResourceStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A search as requested by a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Free text; empty matches everything in scope
    pub text: String,

    /// Repository slug to scope to
    pub repository: Option<String>,

    /// Sort identifier (`nr_views`, `-title`, ...)
    pub sort_by: Option<String>,

    /// Filters in `<field>_exact:<value>` form
    pub filters: Vec<String>,

    /// Results per page; the configured length when unset
    pub page_length: Option<usize>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn repository(mut self, slug: impl Into<String>) -> Self {
        self.repository = Some(slug.into());
        self
    }

    pub fn sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn page_length(mut self, length: usize) -> Self {
        self.page_length = Some(length);
        self
    }
}

/// Search response: a lazy cursor plus the facets of the whole result set
#[derive(Clone)]
pub struct SearchResponse {
    /// Pages over the matches
    pub cursor: SearchCursor,

    /// Facet summaries keyed by facet
    pub facets: FacetSummaries,

    /// Sort that was applied
    pub sort: SearchSort,
}

/// Main search service
pub struct SearchService {
    /// Index manager
    index_manager: Arc<IndexManager>,

    indexer: BulkIndexer,
    query_builder: QueryBuilder,
    translator: AggregationTranslator,

    /// Configuration
    config: SearchConfig,
}

impl SearchService {
    /// Create a new search service
    pub async fn new(config: &Config, store: Arc<dyn ResourceStore>) -> SearchResult<Self> {
        let index_manager = Arc::new(IndexManager::new(config.search.clone()).await?);
        let metadata = MetadataCache::new(store.clone(), &config.cache);
        Ok(Self::from_parts(index_manager, store, metadata, config.search.clone()))
    }

    /// Assemble a service around an existing client and cache
    pub fn from_parts(
        index_manager: Arc<IndexManager>,
        store: Arc<dyn ResourceStore>,
        metadata: MetadataCache,
        config: SearchConfig,
    ) -> Self {
        Self {
            indexer: BulkIndexer::new(index_manager.clone(), store.clone(), metadata, &config),
            query_builder: QueryBuilder::new(store.clone()),
            translator: AggregationTranslator::new(store),
            index_manager,
            config,
        }
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }

    pub fn indexer(&self) -> &BulkIndexer {
        &self.indexer
    }

    /// Sort options offered to callers, with labels
    pub fn sort_options() -> Vec<(&'static str, &'static str)> {
        SortOption::ALL
            .iter()
            .map(|option| (option.id(), option.label()))
            .collect()
    }

    /// Run a search.
    ///
    /// Facets are computed eagerly; hits are fetched through the returned
    /// cursor. Engine failures surface as `SearchError::Unavailable`.
    pub async fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        let query = self
            .query_builder
            .build(
                &request.text,
                request.repository.as_deref(),
                request.sort_by.as_deref(),
                &request.filters,
            )
            .await?;

        let raw = self
            .index_manager
            .aggregate(&query)
            .await
            .map_err(unavailable)?;
        let facets = self.translator.convert(&raw).await?;

        let page_length = request
            .page_length
            .unwrap_or(self.config.page_length)
            .clamp(1, self.config.max_page_length.max(1));
        let sort = query.sort;

        tracing::debug!(
            text = %request.text,
            repository = ?request.repository,
            facets = facets.len(),
            "Executed search"
        );

        Ok(SearchResponse {
            cursor: SearchCursor::new(self.index_manager.clone(), query, page_length),
            facets,
            sort,
        })
    }

    /// Index resources by id with the configured chunk size
    pub async fn index_resources<I>(&self, ids: I) -> SearchResult<IndexReport>
    where
        I: IntoIterator<Item = i64>,
    {
        self.indexer.index_resources(ids, IndexOptions::default()).await
    }

    /// Reindex a single resource
    pub async fn index_resource(&self, id: i64) -> SearchResult<IndexReport> {
        self.indexer.index_resource(id).await
    }

    /// Remove a resource from the index
    pub async fn delete_resource(&self, id: i64) -> SearchResult<()> {
        self.indexer.delete_from_index(id).await
    }

    /// Recreate the index and reindex everything
    pub async fn rebuild_index(&self) -> SearchResult<IndexReport> {
        self.indexer.recreate_index().await
    }

    /// Get index statistics
    pub async fn get_stats(&self) -> SearchResult<IndexStats> {
        self.index_manager.get_stats().await.map_err(unavailable)
    }
}

fn unavailable(err: SearchError) -> SearchError {
    if err.is_unavailable() {
        SearchError::Unavailable(err.to_string())
    } else {
        err
    }
}
