//! Chunked bulk indexing of resources

use crate::search::config::SearchConfig;
use crate::search::document::{DocumentBuilder, ResourceDocument};
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::IndexManager;
use crate::search::mapping::MappingManager;
use crate::search::metadata::{prune_stale, MetadataCache, TermMap};
use crate::state::ResourceStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Per-call indexing options
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Resources per bulk write; the configured size when unset
    pub chunk_size: Option<usize>,

    /// Stops new chunks from starting once it reads `true`
    pub cancel: Option<watch::Receiver<bool>>,
}

impl IndexOptions {
    pub fn chunk_size(size: usize) -> Self {
        Self {
            chunk_size: Some(size),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Outcome of an indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Documents written
    pub indexed: usize,

    /// Bulk writes issued
    pub chunks: usize,

    /// Requested ids with no live resource; any document they had is deleted
    pub skipped: usize,

    /// Stopped early on request
    pub cancelled: bool,
}

/// Writes resources to the index in chunks
pub struct BulkIndexer {
    index: Arc<IndexManager>,
    mapping: MappingManager,
    metadata: MetadataCache,
    store: Arc<dyn ResourceStore>,
    builder: DocumentBuilder,
    chunk_size: usize,
}

impl BulkIndexer {
    pub fn new(
        index: Arc<IndexManager>,
        store: Arc<dyn ResourceStore>,
        metadata: MetadataCache,
        config: &SearchConfig,
    ) -> Self {
        Self {
            mapping: MappingManager::new(index.clone()),
            index,
            metadata,
            store,
            builder: DocumentBuilder::new(config.preview_base_url.clone()),
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Index resources by id.
    ///
    /// Ids are consumed lazily, one chunk at a time. Each chunk is written in
    /// one bulk request, which also deletes the documents of ids no longer in
    /// the store; the index is refreshed once at the end. When a chunk
    /// reports per-document errors the chunks already written are refreshed,
    /// later chunks are not attempted, and `SearchError::Reindex` is returned.
    pub async fn index_resources<I>(&self, ids: I, options: IndexOptions) -> SearchResult<IndexReport>
    where
        I: IntoIterator<Item = i64>,
    {
        let chunk_size = options.chunk_size.unwrap_or(self.chunk_size).max(1);
        let mut ids = ids.into_iter();
        let mut report = IndexReport::default();

        loop {
            if let Some(ref cancel) = options.cancel {
                if *cancel.borrow() {
                    report.cancelled = true;
                    tracing::info!(chunks = report.chunks, "Indexing cancelled");
                    break;
                }
            }

            let chunk: Vec<i64> = ids.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }

            let documents = match self.build_chunk(&chunk).await {
                Ok(documents) => documents,
                Err(e) => {
                    self.refresh_after_failure(report.chunks);
                    return Err(e);
                }
            };
            let live: HashSet<i64> = documents.iter().map(|document| document.id).collect();
            let removed: Vec<i64> = chunk.iter().copied().filter(|id| !live.contains(id)).collect();
            report.skipped += removed.len();

            let errors = match self.index.bulk_write(&documents, &removed).await {
                Ok(errors) => errors,
                Err(e) => {
                    self.refresh_after_failure(report.chunks);
                    return Err(e);
                }
            };
            report.chunks += 1;

            if !errors.is_empty() {
                tracing::error!(
                    chunk = report.chunks,
                    failed = errors.len(),
                    "Bulk write rejected documents"
                );
                self.refresh_after_failure(report.chunks);
                return Err(SearchError::Reindex { errors });
            }

            report.indexed += documents.len();
            tracing::debug!(
                chunk = report.chunks,
                documents = documents.len(),
                "Indexed chunk"
            );
        }

        self.index.refresh()?;
        tracing::info!(
            indexed = report.indexed,
            chunks = report.chunks,
            skipped = report.skipped,
            "Refreshed index"
        );
        Ok(report)
    }

    fn refresh_after_failure(&self, chunks: usize) {
        if chunks == 0 {
            return;
        }
        if let Err(e) = self.index.refresh() {
            tracing::warn!(error = %e, "Refresh after failed chunk failed");
        }
    }

    async fn build_chunk(&self, ids: &[i64]) -> SearchResult<Vec<ResourceDocument>> {
        let resources = self.store.get_resources(ids).await?;
        let term_map = self.live_terms(self.metadata.get_resource_terms(ids).await?).await?;

        let vocabulary_ids: BTreeSet<i64> = term_map
            .values()
            .flat_map(|terms| terms.keys().copied())
            .collect();
        self.mapping.ensure_vocabulary_fields(vocabulary_ids).await?;

        let mut documents = Vec::with_capacity(resources.len());
        for resource in &resources {
            let course = self.metadata.get_course_metadata(resource.course_id).await?;
            let terms = term_map.get(&resource.id).cloned().unwrap_or_default();
            documents.push(self.builder.build(resource, &course, &terms));
        }
        Ok(documents)
    }

    /// Drop cached references to vocabularies and terms deleted since caching
    async fn live_terms(&self, term_map: TermMap) -> SearchResult<TermMap> {
        let vocabulary_ids: BTreeSet<i64> = term_map
            .values()
            .flat_map(|terms| terms.keys().copied())
            .collect();
        let term_ids: BTreeSet<i64> = term_map
            .values()
            .flat_map(|terms| terms.values().flatten().copied())
            .collect();
        if vocabulary_ids.is_empty() {
            return Ok(term_map);
        }

        let vocabulary_ids: Vec<i64> = vocabulary_ids.into_iter().collect();
        let live_vocabularies: HashSet<i64> = self
            .store
            .get_vocabularies(&vocabulary_ids)
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();
        let live_terms: HashSet<i64> = if term_ids.is_empty() {
            HashSet::new()
        } else {
            let term_ids: Vec<i64> = term_ids.into_iter().collect();
            self.store
                .get_terms(&term_ids)
                .await?
                .into_iter()
                .map(|t| t.id)
                .collect()
        };

        Ok(term_map
            .into_iter()
            .map(|(resource_id, terms)| {
                let pruned = prune_stale(&terms, &live_vocabularies, &live_terms);
                if pruned != terms {
                    tracing::warn!(resource_id, "Omitting deleted vocabulary or term references");
                }
                (resource_id, pruned)
            })
            .collect())
    }

    /// Reindex one resource, re-reading its term assignments
    pub async fn index_resource(&self, id: i64) -> SearchResult<IndexReport> {
        self.metadata.invalidate_resource(id).await;
        self.index_resources([id], IndexOptions::default()).await
    }

    /// Remove one resource's document; absent ids are not an error
    pub async fn delete_from_index(&self, id: i64) -> SearchResult<()> {
        self.index.delete_document(id).await?;
        self.index.refresh()?;
        tracing::debug!(resource_id = id, "Deleted resource from index");
        Ok(())
    }

    /// Reindex every resource of a repository
    pub async fn index_repository(&self, slug: &str) -> SearchResult<IndexReport> {
        let ids = self.store.resource_ids_for_repository(slug).await?;
        self.index_resources(ids, IndexOptions::default()).await
    }

    /// Recreate the mapping and reindex every resource
    pub async fn recreate_index(&self) -> SearchResult<IndexReport> {
        self.mapping.create_or_replace_mapping().await?;
        self.metadata.clear().await;
        let ids = self.store.all_resource_ids().await?;
        self.index_resources(ids, IndexOptions::default()).await
    }
}
