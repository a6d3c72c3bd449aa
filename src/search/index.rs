//! Search index management

use crate::search::aggregation::{RawAggregations, RawBucket};
use crate::search::config::SearchConfig;
use crate::search::document::{build_resource_schema, ResourceDocument, SearchDocument, FACETS_FIELD};
use crate::search::error::{DocumentError, SearchError, SearchResult};
use crate::search::mapping::{Mapping, MAPPING_FILE};
use crate::search::query::{has_facet_query, Aggregation, SearchQuery, SortOrder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tantivy::collector::{Count, FacetCollector, TopDocs};
use tantivy::columnar::{Column, StrColumn};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Facet, FieldType, IndexRecordOption, Schema, Value};
use tantivy::{
    DocAddress, DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, SegmentReader,
    TantivyDocument, Term,
};
use tokio::sync::{Mutex, RwLock};

/// Round trips issued against the engine since the client was created
#[derive(Debug, Default)]
struct EngineCounters {
    searches: AtomicU64,
    counts: AtomicU64,
    aggregations: AtomicU64,
    bulk_writes: AtomicU64,
    deletes: AtomicU64,
    refreshes: AtomicU64,
    mapping_writes: AtomicU64,
}

/// Snapshot of engine round trips
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub searches: u64,
    pub counts: u64,
    pub aggregations: u64,
    pub bulk_writes: u64,
    pub deletes: u64,
    pub refreshes: u64,
    pub mapping_writes: u64,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of documents in the index
    pub total_documents: u64,

    /// Index size in bytes
    pub index_size_bytes: u64,

    /// Number of segments
    pub num_segments: usize,

    /// Vocabulary facet fields in the mapping
    pub vocabulary_fields: usize,

    /// Engine round trips
    pub engine: EngineStats,
}

/// A resource as read back from the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHit {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub description_path: String,
    pub content_xml: String,
    pub resource_type: String,
    pub run: String,
    pub course: String,
    pub repository: String,
    pub preview_url: String,
    pub xa_nr_views: i64,
    pub xa_nr_attempts: i64,
    pub xa_avg_grade: f64,

    /// Relevance score; zero when sorted by a field
    pub score: f32,
}

impl ResourceHit {
    fn from_doc(doc: &TantivyDocument, schema: &Schema, score: f32) -> Self {
        Self {
            id: get_i64(doc, schema, "id"),
            title: get_text(doc, schema, "title"),
            description: get_text(doc, schema, "description"),
            description_path: get_text(doc, schema, "description_path"),
            content_xml: get_text(doc, schema, "content_xml"),
            resource_type: get_text(doc, schema, "resource_type"),
            run: get_text(doc, schema, "run"),
            course: get_text(doc, schema, "course"),
            repository: get_text(doc, schema, "repository"),
            preview_url: get_text(doc, schema, "preview_url"),
            xa_nr_views: get_i64(doc, schema, "xa_nr_views"),
            xa_nr_attempts: get_i64(doc, schema, "xa_nr_attempts"),
            xa_avg_grade: get_f64(doc, schema, "xa_avg_grade"),
            score,
        }
    }
}

fn get_text(doc: &TantivyDocument, schema: &Schema, name: &str) -> String {
    schema
        .get_field(name)
        .ok()
        .and_then(|field| doc.get_first(field).and_then(|v| v.as_str()).map(|s| s.to_string()))
        .unwrap_or_default()
}

fn get_i64(doc: &TantivyDocument, schema: &Schema, name: &str) -> i64 {
    schema
        .get_field(name)
        .ok()
        .and_then(|field| doc.get_first(field).and_then(|v| v.as_i64()))
        .unwrap_or_default()
}

fn get_f64(doc: &TantivyDocument, schema: &Schema, name: &str) -> f64 {
    schema
        .get_field(name)
        .ok()
        .and_then(|field| doc.get_first(field).and_then(|v| v.as_f64()))
        .unwrap_or_default()
}

/// Value of a sort field for one document
#[derive(Debug, Clone)]
enum SortKey {
    Int(i64),
    Float(f64),
    Text(String),
    Absent,
}

impl SortKey {
    fn compare(&self, other: &Self) -> CmpOrdering {
        match (self, other) {
            (SortKey::Int(a), SortKey::Int(b)) => a.cmp(b),
            (SortKey::Float(a), SortKey::Float(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => CmpOrdering::Equal,
        }
    }
}

/// Column type of a sort field
#[derive(Debug, Clone, Copy)]
enum SortKind {
    Int,
    Float,
    Text,
}

impl SortKind {
    fn of(schema: &Schema, name: &str) -> SearchResult<Self> {
        let field = schema.get_field(name)?;
        Ok(match schema.get_field_entry(field).field_type() {
            FieldType::I64(_) => SortKind::Int,
            FieldType::F64(_) => SortKind::Float,
            _ => SortKind::Text,
        })
    }
}

/// Fast-field column of a sort field within one segment
enum SortColumn {
    Int(Column<i64>),
    Float(Column<f64>),
    Text(StrColumn),
    Absent,
}

impl SortColumn {
    fn open(segment: &SegmentReader, name: &str, kind: SortKind) -> Self {
        let fast_fields = segment.fast_fields();
        let column = match kind {
            SortKind::Int => fast_fields.i64(name).ok().map(SortColumn::Int),
            SortKind::Float => fast_fields.f64(name).ok().map(SortColumn::Float),
            SortKind::Text => fast_fields.str(name).ok().flatten().map(SortColumn::Text),
        };
        column.unwrap_or(SortColumn::Absent)
    }

    fn value(&self, doc: DocId) -> SortKey {
        match self {
            SortColumn::Int(column) => column.first(doc).map_or(SortKey::Absent, SortKey::Int),
            SortColumn::Float(column) => column.first(doc).map_or(SortKey::Absent, SortKey::Float),
            SortColumn::Text(column) => {
                let mut text = String::new();
                match column.term_ords(doc).next() {
                    Some(ord) if column.ord_to_str(ord, &mut text).unwrap_or(false) => {
                        SortKey::Text(text)
                    }
                    _ => SortKey::Absent,
                }
            }
            SortColumn::Absent => SortKey::Absent,
        }
    }
}

/// Collector score for field sorts; higher ranks are returned first
#[derive(Debug, Clone)]
struct SortRank {
    key: SortKey,
    id: i64,
    order: SortOrder,
}

impl SortRank {
    fn rank(&self, other: &Self) -> CmpOrdering {
        // Absent keys rank last in either direction
        let by_key = match (&self.key, &other.key) {
            (SortKey::Absent, SortKey::Absent) => CmpOrdering::Equal,
            (SortKey::Absent, _) => CmpOrdering::Less,
            (_, SortKey::Absent) => CmpOrdering::Greater,
            (a, b) => match self.order {
                SortOrder::Ascending => b.compare(a),
                SortOrder::Descending => a.compare(b),
            },
        };
        by_key.then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialEq for SortRank {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == CmpOrdering::Equal
    }
}

impl PartialOrd for SortRank {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.rank(other))
    }
}

/// Manages the Tantivy search index
pub struct IndexManager {
    /// The Tantivy index
    index: Index,

    /// The schema
    schema: Schema,

    /// Index writer (wrapped in RwLock for thread-safety)
    writer: Arc<RwLock<IndexWriter>>,

    /// Index reader, reloaded on explicit refresh only
    reader: IndexReader,

    /// Serializes mapping read-modify-write cycles
    mapping_lock: Mutex<()>,

    /// Set once the index and its mapping have been found
    verified: AtomicBool,

    counters: EngineCounters,

    /// Configuration
    config: SearchConfig,
}

impl IndexManager {
    /// Open the index at the configured path, creating it when allowed
    pub async fn new(config: SearchConfig) -> SearchResult<Self> {
        let schema = build_resource_schema();
        let exists = Self::index_exists(&config.index_path);

        if !exists && !config.create_if_missing {
            return Err(SearchError::ConnectionUnavailable(format!(
                "no index at {}",
                config.index_path.display()
            )));
        }

        // Create index directory if it doesn't exist
        std::fs::create_dir_all(&config.index_path).map_err(|e| {
            SearchError::ConnectionUnavailable(format!("Failed to create index directory: {}", e))
        })?;

        let index = if exists {
            Index::open_in_dir(&config.index_path).map_err(|e| {
                SearchError::ConnectionUnavailable(format!("Failed to open existing index: {}", e))
            })?
        } else {
            let index = Index::create_in_dir(&config.index_path, schema.clone()).map_err(|e| {
                SearchError::ConnectionUnavailable(format!("Failed to create new index: {}", e))
            })?;
            write_mapping(&config.index_path, &Mapping::for_schema(&schema))?;
            tracing::info!(path = %config.index_path.display(), "Created resource index");
            index
        };

        let writer = index.writer(config.writer_heap_size).map_err(|e| {
            SearchError::ConnectionUnavailable(format!("Failed to create writer: {}", e))
        })?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| {
                SearchError::ConnectionUnavailable(format!("Failed to create reader: {}", e))
            })?;

        Ok(Self {
            index,
            schema,
            writer: Arc::new(RwLock::new(writer)),
            reader,
            mapping_lock: Mutex::new(()),
            verified: AtomicBool::new(false),
            counters: EngineCounters::default(),
            config,
        })
    }

    /// Check if an index exists at the given path
    fn index_exists(path: &Path) -> bool {
        path.join("meta.json").exists()
    }

    /// Get the schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get the index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Directory holding the index
    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    fn mapping_path(&self) -> PathBuf {
        self.config.index_path.join(MAPPING_FILE)
    }

    /// Confirm the index and its mapping are present.
    ///
    /// The outcome is remembered; later calls return immediately once
    /// verification has succeeded.
    pub fn verify(&self) -> SearchResult<()> {
        if self.verified.load(Ordering::Acquire) {
            return Ok(());
        }
        if !Self::index_exists(&self.config.index_path) {
            return Err(SearchError::ConnectionUnavailable(format!(
                "index missing at {}",
                self.config.index_path.display()
            )));
        }
        if !self.mapping_path().exists() {
            return Err(SearchError::ConnectionUnavailable(format!(
                "mapping missing at {}",
                self.mapping_path().display()
            )));
        }
        self.verified.store(true, Ordering::Release);
        tracing::debug!(path = %self.config.index_path.display(), "Verified resource index");
        Ok(())
    }

    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    /// Round trips so far
    pub fn engine_stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            searches: c.searches.load(Ordering::Relaxed),
            counts: c.counts.load(Ordering::Relaxed),
            aggregations: c.aggregations.load(Ordering::Relaxed),
            bulk_writes: c.bulk_writes.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            refreshes: c.refreshes.load(Ordering::Relaxed),
            mapping_writes: c.mapping_writes.load(Ordering::Relaxed),
        }
    }

    /// Current mapping
    pub async fn read_mapping(&self) -> SearchResult<Mapping> {
        self.verify()?;
        let raw = tokio::fs::read(self.mapping_path()).await.map_err(|e| {
            SearchError::ConnectionUnavailable(format!("Failed to read mapping: {}", e))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            SearchError::ConnectionUnavailable(format!("Mapping is unreadable: {}", e))
        })
    }

    /// Apply a change to the mapping, persisting it when `change` reports
    /// a non-zero number of modifications
    pub async fn update_mapping<F>(&self, change: F) -> SearchResult<usize>
    where
        F: FnOnce(&mut Mapping) -> usize,
    {
        let _guard = self.mapping_lock.lock().await;
        let mut mapping = self.read_mapping().await?;
        let changed = change(&mut mapping);
        if changed > 0 {
            write_mapping(&self.config.index_path, &mapping)?;
            self.counters.mapping_writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(changed)
    }

    /// Overwrite the mapping
    pub async fn replace_mapping(&self, mapping: Mapping) -> SearchResult<()> {
        let _guard = self.mapping_lock.lock().await;
        write_mapping(&self.config.index_path, &mapping)?;
        self.counters.mapping_writes.fetch_add(1, Ordering::Relaxed);
        self.verified.store(false, Ordering::Release);
        self.verify()
    }

    /// Write documents in one bulk request.
    ///
    /// Each document replaces any previous one with the same id. Documents
    /// carrying a vocabulary key the mapping does not know are rejected and
    /// reported; the rest are committed.
    pub async fn bulk_upsert(&self, documents: &[ResourceDocument]) -> SearchResult<Vec<DocumentError>> {
        self.bulk_write(documents, &[]).await
    }

    /// Upsert `documents` and delete the documents of `removed` ids in one
    /// commit. Removing an id that was never indexed is a no-op.
    pub async fn bulk_write(
        &self,
        documents: &[ResourceDocument],
        removed: &[i64],
    ) -> SearchResult<Vec<DocumentError>> {
        let mapping = self.read_mapping().await?;
        let id_field = self.schema.get_field("id")?;
        let mut errors = Vec::new();

        let mut writer = self.writer.write().await;
        for id in removed {
            writer.delete_term(Term::from_field_i64(id_field, *id));
        }
        for document in documents {
            let unmapped = mapping.unmapped_keys(document);
            if !unmapped.is_empty() {
                let names: Vec<String> = unmapped.iter().map(|key| key.field_name()).collect();
                errors.push(DocumentError {
                    id: document.document_id(),
                    reason: format!("unmapped field {}", names.join(", ")),
                });
                continue;
            }

            writer.delete_term(Term::from_field_i64(id_field, document.document_id()));
            if let Err(e) = writer.add_document(document.to_tantivy_doc(&self.schema)) {
                errors.push(DocumentError {
                    id: document.document_id(),
                    reason: e.to_string(),
                });
            }
        }

        writer
            .commit()
            .map_err(|e| SearchError::Unavailable(format!("Failed to commit batch: {}", e)))?;
        self.counters.bulk_writes.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            documents = documents.len(),
            removed = removed.len(),
            rejected = errors.len(),
            "Bulk write committed"
        );
        Ok(errors)
    }

    /// Delete a document by id; deleting an absent id succeeds
    pub async fn delete_document(&self, id: i64) -> SearchResult<()> {
        self.verify()?;
        let id_field = self.schema.get_field("id")?;

        let mut writer = self.writer.write().await;
        writer.delete_term(Term::from_field_i64(id_field, id));
        writer
            .commit()
            .map_err(|e| SearchError::DeletionFailed(format!("Failed to commit deletion: {}", e)))?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Clear the entire index
    pub async fn delete_all(&self) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        writer
            .delete_all_documents()
            .map_err(|e| SearchError::DeletionFailed(format!("Failed to clear index: {}", e)))?;
        writer
            .commit()
            .map_err(|e| SearchError::DeletionFailed(format!("Failed to commit clear: {}", e)))?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Make committed writes visible to searches
    pub fn refresh(&self) -> SearchResult<()> {
        self.reader
            .reload()
            .map_err(|e| SearchError::Unavailable(format!("Failed to refresh: {}", e)))?;
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn searcher(&self) -> SearchResult<Searcher> {
        self.verify()?;
        Ok(self.reader.searcher())
    }

    /// Number of matching documents
    pub async fn count(&self, query: &SearchQuery) -> SearchResult<usize> {
        let searcher = self.searcher()?;
        let compiled = query.to_tantivy_query(&self.index, &self.schema)?;
        self.counters.counts.fetch_add(1, Ordering::Relaxed);
        searcher
            .search(&*compiled, &Count)
            .map_err(|e| SearchError::Unavailable(format!("Count failed: {}", e)))
    }

    /// One window of matching documents in the query's sort order
    pub async fn search(
        &self,
        query: &SearchQuery,
        offset: usize,
        limit: usize,
    ) -> SearchResult<Vec<ResourceHit>> {
        let searcher = self.searcher()?;
        let compiled = query.to_tantivy_query(&self.index, &self.schema)?;
        self.counters.searches.fetch_add(1, Ordering::Relaxed);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let window: Vec<(f32, DocAddress)> = match query.sort.option.field() {
            None => searcher
                .search(&*compiled, &TopDocs::with_limit(limit).and_offset(offset))
                .map_err(|e| SearchError::Unavailable(format!("Search execution failed: {}", e)))?,
            Some(field) => self
                .sorted_window(&searcher, &*compiled, field, query.sort.order, offset, limit)?
                .into_iter()
                .map(|address| (0.0, address))
                .collect(),
        };

        let mut hits = Vec::with_capacity(window.len());
        for (score, address) in window {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| SearchError::Unavailable(format!("Failed to retrieve doc: {}", e)))?;
            hits.push(ResourceHit::from_doc(&doc, &self.schema, score));
        }
        Ok(hits)
    }

    /// One window of matches ordered by a fast field, ties broken by
    /// ascending id
    fn sorted_window(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        field: &str,
        order: SortOrder,
        offset: usize,
        limit: usize,
    ) -> SearchResult<Vec<DocAddress>> {
        let kind = SortKind::of(&self.schema, field)?;
        let field = field.to_string();
        let collector = TopDocs::with_limit(limit)
            .and_offset(offset)
            .custom_score(move |segment: &SegmentReader| {
                let column = SortColumn::open(segment, &field, kind);
                let ids = segment.fast_fields().i64("id").ok();
                move |doc: DocId| SortRank {
                    key: column.value(doc),
                    id: ids.as_ref().and_then(|ids| ids.first(doc)).unwrap_or_default(),
                    order,
                }
            });

        let top = searcher
            .search(query, &collector)
            .map_err(|e| SearchError::Unavailable(format!("Search execution failed: {}", e)))?;
        Ok(top.into_iter().map(|(_, address)| address).collect())
    }

    /// Compute the query's aggregations in one round trip
    pub async fn aggregate(&self, query: &SearchQuery) -> SearchResult<RawAggregations> {
        let searcher = self.searcher()?;
        let compiled = query.to_tantivy_query(&self.index, &self.schema)?;
        self.counters.aggregations.fetch_add(1, Ordering::Relaxed);

        let mut raw = RawAggregations::default();
        let terms: Vec<String> = query
            .aggregations
            .iter()
            .filter_map(|aggregation| match aggregation {
                Aggregation::Terms(key) => Some(key.field_name()),
                Aggregation::Missing(_) => None,
            })
            .collect();

        if !terms.is_empty() {
            let mut collector = FacetCollector::for_field(FACETS_FIELD);
            for name in &terms {
                collector.add_facet(Facet::from_path([name.as_str()]));
            }
            let counts = searcher
                .search(&*compiled, &collector)
                .map_err(|e| SearchError::Unavailable(format!("Facet aggregation failed: {}", e)))?;

            for name in terms {
                let mut buckets: Vec<RawBucket> = counts
                    .get(Facet::from_path([name.as_str()]))
                    .filter_map(|(facet, count)| {
                        facet.to_path().last().map(|value| RawBucket {
                            key: value.to_string(),
                            count,
                        })
                    })
                    .collect();
                buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
                raw.terms.insert(name, buckets);
            }
        }

        for aggregation in &query.aggregations {
            let Aggregation::Missing(key) = aggregation else {
                continue;
            };
            let lacking = BooleanQuery::new(vec![
                (Occur::Must, query.to_tantivy_query(&self.index, &self.schema)?),
                (Occur::MustNot, has_facet_query(&self.schema, key)?),
            ]);
            let missing = searcher
                .search(&lacking, &Count)
                .map_err(|e| SearchError::Unavailable(format!("Missing aggregation failed: {}", e)))?;
            raw.missing.insert(key.field_name(), missing as u64);
        }

        Ok(raw)
    }

    /// Stored document for a resource id
    pub async fn get_document(&self, id: i64) -> SearchResult<Option<ResourceHit>> {
        let searcher = self.searcher()?;
        let id_field = self.schema.get_field("id")?;
        let query = TermQuery::new(Term::from_field_i64(id_field, id), IndexRecordOption::Basic);
        self.counters.searches.fetch_add(1, Ordering::Relaxed);

        let top = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| SearchError::Unavailable(format!("Lookup failed: {}", e)))?;
        match top.into_iter().next() {
            Some((score, address)) => {
                let doc: TantivyDocument = searcher
                    .doc(address)
                    .map_err(|e| SearchError::Unavailable(format!("Failed to retrieve doc: {}", e)))?;
                Ok(Some(ResourceHit::from_doc(&doc, &self.schema, score)))
            }
            None => Ok(None),
        }
    }

    /// Get index statistics
    pub async fn get_stats(&self) -> SearchResult<IndexStats> {
        let searcher = self.searcher()?;

        let total_documents = searcher
            .search(&tantivy::query::AllQuery, &Count)
            .map_err(|e| SearchError::Unavailable(format!("Failed to count documents: {}", e)))?
            as u64;

        let num_segments = searcher.segment_readers().len();

        // Calculate approximate index size
        let index_size_bytes = std::fs::read_dir(&self.config.index_path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);

        let vocabulary_fields = self.read_mapping().await?.vocabularies.len();

        Ok(IndexStats {
            total_documents,
            index_size_bytes,
            num_segments,
            vocabulary_fields,
            engine: self.engine_stats(),
        })
    }
}

/// Persist a mapping, replacing the previous file atomically
fn write_mapping(index_path: &Path, mapping: &Mapping) -> SearchResult<()> {
    let path = index_path.join(MAPPING_FILE);
    let tmp = index_path.join(format!("{}.tmp", MAPPING_FILE));
    let body = serde_json::to_vec_pretty(mapping)
        .map_err(|e| SearchError::SchemaEvolution(format!("Failed to encode mapping: {}", e)))?;
    std::fs::write(&tmp, body)
        .and_then(|_| std::fs::rename(&tmp, &path))
        .map_err(|e| SearchError::SchemaEvolution(format!("Failed to write mapping: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use crate::search::document::DocumentBuilder;
    use crate::search::facet::FacetKey;
    use crate::search::metadata::{CourseMetadata, VocabularyTerms};
    use crate::search::query::{SearchFilter, SearchSort};
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> SearchConfig {
        SearchConfig {
            index_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn document(id: i64, title: &str, views: i64, terms: VocabularyTerms) -> ResourceDocument {
        let course = CourseMetadata {
            org: "MITx".to_string(),
            course_number: "8.01".to_string(),
            run: "2015_T1".to_string(),
            repository: "physics".to_string(),
        };
        let resource = Resource::new(id, 1, "problem", title).with_stats(views, 0, 0.0);
        DocumentBuilder::new("").build(&resource, &course, &terms)
    }

    #[tokio::test]
    async fn test_index_creation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await;
        assert!(manager.is_ok());
        assert!(temp_dir.path().join(MAPPING_FILE).exists());
    }

    #[tokio::test]
    async fn test_missing_index_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let config = SearchConfig {
            index_path: temp_dir.path().join("absent"),
            create_if_missing: false,
            ..Default::default()
        };

        let result = IndexManager::new(config).await;
        assert!(matches!(result, Err(SearchError::ConnectionUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_mapping_fails_verification() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();
        std::fs::remove_file(temp_dir.path().join(MAPPING_FILE)).unwrap();

        assert!(matches!(manager.verify(), Err(SearchError::ConnectionUnavailable(_))));
        assert!(!manager.is_verified());
    }

    #[tokio::test]
    async fn test_corrupt_mapping_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();
        std::fs::write(temp_dir.path().join(MAPPING_FILE), b"{ not json").unwrap();

        let result = manager.read_mapping().await;
        assert!(matches!(result, Err(SearchError::ConnectionUnavailable(_))));
    }

    #[tokio::test]
    async fn test_index_stats() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();
        let stats = manager.get_stats().await.unwrap();

        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.vocabulary_fields, 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_rejects_unmapped() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();

        let tagged = document(2, "Tagged", 0, VocabularyTerms::from([(7, vec![70])]));
        let errors = manager
            .bulk_upsert(&[document(1, "First", 0, VocabularyTerms::new()), tagged.clone()])
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, 2);

        manager
            .bulk_upsert(&[document(1, "Renamed", 0, VocabularyTerms::new())])
            .await
            .unwrap();
        manager.refresh().unwrap();

        assert_eq!(manager.count(&SearchQuery::all()).await.unwrap(), 1);
        let hit = manager.get_document(1).await.unwrap().unwrap();
        assert_eq!(hit.title, "Renamed");
        assert!(manager.get_document(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sorted_search_and_missing_aggregation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();
        manager
            .update_mapping(|m| usize::from(m.vocabularies.insert(FacetKey::vocabulary(7))))
            .await
            .unwrap();

        manager
            .bulk_upsert(&[
                document(1, "a", 5, VocabularyTerms::from([(7, vec![70])])),
                document(2, "b", 9, VocabularyTerms::from([(7, vec![])])),
                document(3, "c", 5, VocabularyTerms::from([(7, vec![71])])),
            ])
            .await
            .unwrap();
        manager.refresh().unwrap();

        let query = SearchQuery::all().with_sort(SearchSort::parse(Some("nr_views")));
        let ids: Vec<i64> = manager
            .search(&query, 0, 10)
            .await
            .unwrap()
            .iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);

        let query = SearchQuery::all()
            .with_aggregation(Aggregation::Terms(FacetKey::vocabulary(7)))
            .with_aggregation(Aggregation::Missing(FacetKey::vocabulary(7)));
        let raw = manager.aggregate(&query).await.unwrap();
        assert_eq!(raw.missing["vocab_7"], 1);
        assert_eq!(raw.terms["vocab_7"].len(), 2);

        let missing = SearchQuery::all().with_filter(SearchFilter::Missing {
            key: FacetKey::vocabulary(7),
        });
        assert_eq!(manager.count(&missing).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_field_sort_windows_tile_full_order() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();

        // Two commits so the sort runs across segments
        let first: Vec<ResourceDocument> = (1..=12)
            .map(|id| document(id, &format!("t{:02}", 30 - id), id % 4, VocabularyTerms::new()))
            .collect();
        let second: Vec<ResourceDocument> = (13..=25)
            .map(|id| document(id, &format!("t{:02}", 30 - id), id % 4, VocabularyTerms::new()))
            .collect();
        manager.bulk_upsert(&first).await.unwrap();
        manager.bulk_upsert(&second).await.unwrap();
        manager.refresh().unwrap();

        for sort in ["nr_views", "title", "-title"] {
            let query = SearchQuery::all().with_sort(SearchSort::parse(Some(sort)));
            let full: Vec<i64> = manager
                .search(&query, 0, 100)
                .await
                .unwrap()
                .iter()
                .map(|hit| hit.id)
                .collect();

            let mut windowed = Vec::new();
            for offset in (0..25).step_by(7) {
                let page = manager.search(&query, offset, 7).await.unwrap();
                windowed.extend(page.iter().map(|hit| hit.id));
            }
            assert_eq!(full.len(), 25, "{}", sort);
            assert_eq!(windowed, full, "{}", sort);
        }

        let by_views = SearchQuery::all().with_sort(SearchSort::parse(Some("nr_views")));
        let top: Vec<i64> = manager
            .search(&by_views, 0, 3)
            .await
            .unwrap()
            .iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(top, vec![3, 7, 11]);

        let by_title = SearchQuery::all().with_sort(SearchSort::parse(Some("title")));
        let first_titles: Vec<i64> = manager
            .search(&by_title, 0, 2)
            .await
            .unwrap()
            .iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(first_titles, vec![25, 24]);
    }

    #[tokio::test]
    async fn test_bulk_write_removes_ids() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();
        manager
            .bulk_upsert(&[
                document(1, "a", 0, VocabularyTerms::new()),
                document(2, "b", 0, VocabularyTerms::new()),
            ])
            .await
            .unwrap();

        let errors = manager
            .bulk_write(&[document(3, "c", 0, VocabularyTerms::new())], &[2, 404])
            .await
            .unwrap();
        manager.refresh().unwrap();

        assert!(errors.is_empty());
        assert_eq!(manager.count(&SearchQuery::all()).await.unwrap(), 2);
        assert!(manager.get_document(2).await.unwrap().is_none());
        assert_eq!(manager.engine_stats().bulk_writes, 2);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let manager = IndexManager::new(config(&temp_dir)).await.unwrap();

        manager
            .bulk_upsert(&[document(1, "a", 0, VocabularyTerms::new())])
            .await
            .unwrap();
        manager.delete_document(1).await.unwrap();
        manager.delete_document(1).await.unwrap();
        manager.delete_document(999).await.unwrap();
        manager.refresh().unwrap();

        assert_eq!(manager.count(&SearchQuery::all()).await.unwrap(), 0);
        assert_eq!(manager.engine_stats().deletes, 3);
    }
}
