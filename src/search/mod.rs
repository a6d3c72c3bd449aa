//! Full-text and faceted resource search powered by Tantivy
//!
//! This module indexes educational resources and serves repository-scoped
//! queries over them:
//!
//! - **Full-Text Search**: title, description and markup-stripped content
//! - **Faceted Search**: run, course, item type and one facet per taxonomy vocabulary
//! - **Schema Evolution**: vocabulary facets are admitted as vocabularies appear
//! - **Chunked Indexing**: bulk writes per chunk, one refresh per run
//! - **Aggregations**: labelled facet summaries with missing counts
//! - **Pagination**: lazy cursors with a memoized total count
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           Search Service API                     │
//! ├─────────────────────────────────────────────────┤
//! │  - search()          - index_resources()        │
//! │  - delete_resource() - rebuild_index()          │
//! └─────────────────────────────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌────────────────────┐   ┌────────────────────────┐
//! │ Query Builder      │   │ Bulk Indexer           │
//! │ Aggregation        │   │ Document Builder       │
//! │   Translator       │   │ Metadata Cache         │
//! │ Search Cursor      │   │ Mapping Manager        │
//! └────────────────────┘   └────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌─────────────────────────────────────────────────┐
//! │           Index Manager                          │
//! ├─────────────────────────────────────────────────┤
//! │  - Tantivy index, writer and manual reader       │
//! │  - mapping.json (vocabulary facet fields)        │
//! │  - Verification and round-trip counters          │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lore_search::config::Config;
//! use lore_search::search::{SearchRequest, SearchService};
//! use lore_search::state::create_in_memory_store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let search = SearchService::new(&config, create_in_memory_store()).await?;
//!
//!     let request = SearchRequest::new("ohm's law")
//!         .repository("physics")
//!         .sort_by("-nr_views")
//!         .filter("vocab_7_exact:70");
//!
//!     let response = search.search(&request).await?;
//!     println!("Found {} resources", response.cursor.count().await?);
//!
//!     Ok(())
//! }
//! ```

mod aggregation;
mod config;
mod cursor;
mod document;
mod error;
mod facet;
mod index;
mod indexer;
mod mapping;
mod metadata;
mod query;
mod service;

pub use aggregation::{
    AggregationTranslator, FacetInfo, FacetSummaries, FacetSummary, FacetValue, RawAggregations,
    RawBucket,
};
pub use config::{SearchConfig, SearchConfigBuilder};
pub use cursor::SearchCursor;
pub use document::{
    build_resource_schema, normalize_text, strip_markup, titlesort, DocumentBuilder,
    ResourceDocument, SearchDocument, BLANK_TITLE_SORT,
};
pub use error::{DocumentError, SearchError, SearchResult};
pub use facet::{BuiltinFacet, FacetKey, EXACT_SUFFIX, MISSING_SENTINEL};
pub use index::{EngineStats, IndexManager, IndexStats, ResourceHit};
pub use indexer::{BulkIndexer, IndexOptions, IndexReport};
pub use mapping::{Mapping, MappingManager, MAPPING_FILE};
pub use metadata::{prune_stale, CourseMetadata, MetadataCache, TermMap, VocabularyTerms};
pub use query::{
    Aggregation, QueryBuilder, SearchFilter, SearchQuery, SearchSort, SortOption, SortOrder,
};
pub use service::{SearchRequest, SearchResponse, SearchService};
