//! Field mapping of the resource index
//!
//! Tantivy schemas are fixed once an index is created, so vocabulary facets
//! live as paths under the single `facets` field. The set of vocabulary keys
//! the index accepts is recorded in `mapping.json` next to the index files;
//! writes carrying a vocabulary key outside that set are rejected per document.

use crate::search::document::ResourceDocument;
use crate::search::error::{SearchError, SearchResult};
use crate::search::facet::FacetKey;
use crate::search::index::IndexManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tantivy::schema::Schema;

/// File name of the persisted mapping inside the index directory
pub const MAPPING_FILE: &str = "mapping.json";

/// Fields the index accepts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Fixed schema fields
    pub fields: BTreeSet<String>,

    /// Vocabulary facet keys added over the index lifetime
    pub vocabularies: BTreeSet<FacetKey>,
}

impl Mapping {
    /// Mapping with the fixed fields only
    pub fn for_schema(schema: &Schema) -> Self {
        Self {
            fields: schema
                .fields()
                .map(|(_, entry)| entry.name().to_string())
                .collect(),
            vocabularies: BTreeSet::new(),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        if self.fields.contains(name) {
            return true;
        }
        match FacetKey::parse(name) {
            Some(key @ FacetKey::Vocabulary(_)) => self.vocabularies.contains(&key),
            Some(FacetKey::Builtin(builtin)) => self.fields.contains(builtin.field_name()),
            None => false,
        }
    }

    /// Vocabulary keys of a document the mapping does not know
    pub fn unmapped_keys(&self, document: &ResourceDocument) -> Vec<FacetKey> {
        document
            .vocabularies
            .keys()
            .filter(|key| !self.vocabularies.contains(key))
            .copied()
            .collect()
    }
}

/// Creates the index mapping and evolves it as vocabularies appear
pub struct MappingManager {
    index: Arc<IndexManager>,
}

impl MappingManager {
    pub fn new(index: Arc<IndexManager>) -> Self {
        Self { index }
    }

    /// Drop every document and reset the mapping to the fixed fields
    pub async fn create_or_replace_mapping(&self) -> SearchResult<()> {
        self.index.delete_all().await?;
        self.index
            .replace_mapping(Mapping::for_schema(self.index.schema()))
            .await?;
        self.index.refresh()?;

        tracing::info!(path = %self.index.path().display(), "Recreated resource index mapping");
        Ok(())
    }

    /// Make sure a facet field exists for each vocabulary.
    ///
    /// Idempotent: a field that already exists counts as success. Writers are
    /// serialized, and the index is refreshed only when something was added.
    /// Returns the number of fields added.
    pub async fn ensure_vocabulary_fields(
        &self,
        vocabulary_ids: impl IntoIterator<Item = i64>,
    ) -> SearchResult<usize> {
        let wanted: BTreeSet<FacetKey> = vocabulary_ids
            .into_iter()
            .map(FacetKey::vocabulary)
            .collect();
        if wanted.is_empty() {
            return Ok(0);
        }

        let current = self.index.read_mapping().await?;
        if wanted.is_subset(&current.vocabularies) {
            return Ok(0);
        }

        let added = self
            .index
            .update_mapping(|mapping| {
                wanted
                    .iter()
                    .filter(|key| mapping.vocabularies.insert(**key))
                    .count()
            })
            .await
            .map_err(|e| match e {
                SearchError::SchemaEvolution(_) => e,
                other => SearchError::SchemaEvolution(other.to_string()),
            })?;

        if added > 0 {
            self.index.refresh()?;
            tracing::info!(added, "Added vocabulary facet fields");
        }
        Ok(added)
    }

    /// Whether the index accepts a field (fixed, or a known vocabulary key)
    pub async fn has_field(&self, name: &str) -> SearchResult<bool> {
        Ok(self.index.read_mapping().await?.has_field(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfig;
    use crate::search::document::build_resource_schema;
    use tempfile::TempDir;

    async fn manager(temp_dir: &TempDir) -> (Arc<IndexManager>, MappingManager) {
        let config = SearchConfig {
            index_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let index = Arc::new(IndexManager::new(config).await.unwrap());
        (index.clone(), MappingManager::new(index))
    }

    #[test]
    fn test_mapping_for_schema() {
        let mapping = Mapping::for_schema(&build_resource_schema());
        assert!(mapping.has_field("title"));
        assert!(mapping.has_field("run_exact"));
        assert!(!mapping.has_field("vocab_7"));
        assert!(!mapping.has_field("bogus"));
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (index, mapping) = manager(&temp_dir).await;

        assert_eq!(mapping.ensure_vocabulary_fields([7, 8]).await.unwrap(), 2);
        let writes = index.engine_stats().mapping_writes;
        let refreshes = index.engine_stats().refreshes;

        assert_eq!(mapping.ensure_vocabulary_fields([8, 7]).await.unwrap(), 0);
        assert_eq!(mapping.ensure_vocabulary_fields([]).await.unwrap(), 0);
        assert_eq!(index.engine_stats().mapping_writes, writes);
        assert_eq!(index.engine_stats().refreshes, refreshes);
        assert!(mapping.has_field("vocab_7").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_ensure_adds_once() {
        let temp_dir = TempDir::new().unwrap();
        let (index, mapping) = manager(&temp_dir).await;
        let mapping = Arc::new(mapping);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let mapping = mapping.clone();
                tokio::spawn(async move { mapping.ensure_vocabulary_fields([7]).await })
            })
            .collect();

        let mut added = 0;
        for task in tasks {
            added += task.await.unwrap().unwrap();
        }
        assert_eq!(added, 1);
        assert!(index.read_mapping().await.unwrap().has_field("vocab_7"));
    }

    #[tokio::test]
    async fn test_recreate_resets_vocabularies() {
        let temp_dir = TempDir::new().unwrap();
        let (index, mapping) = manager(&temp_dir).await;

        mapping.ensure_vocabulary_fields([7]).await.unwrap();
        mapping.create_or_replace_mapping().await.unwrap();

        let current = index.read_mapping().await.unwrap();
        assert!(current.vocabularies.is_empty());
        assert!(current.has_field("titlesort"));
    }
}
