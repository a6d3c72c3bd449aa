//! Cached per-course and per-resource metadata used while indexing

use crate::config::CacheConfig;
use crate::error::AppError;
use crate::search::error::SearchResult;
use crate::state::{AppCache, Clock, ResourceStore, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Term ids per vocabulary id for one resource
pub type VocabularyTerms = BTreeMap<i64, Vec<i64>>;

/// Vocabulary terms per resource id
pub type TermMap = HashMap<i64, VocabularyTerms>;

/// Denormalized course fields written into every document of the course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMetadata {
    pub org: String,
    pub course_number: String,
    pub run: String,

    /// Slug of the owning repository
    pub repository: String,
}

/// Time-bounded cache of course metadata and resource term assignments.
///
/// Safe to share between concurrent indexing tasks in one process. Errors from
/// the store are propagated and never cached.
#[derive(Clone)]
pub struct MetadataCache {
    store: Arc<dyn ResourceStore>,
    courses: AppCache<i64, CourseMetadata>,
    terms: AppCache<i64, VocabularyTerms>,
}

impl MetadataCache {
    pub fn new(store: Arc<dyn ResourceStore>, config: &CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn ResourceStore>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        Self {
            store,
            courses: AppCache::with_clock(config.max_capacity, ttl, clock.clone()),
            terms: AppCache::with_clock(config.max_capacity, ttl, clock),
        }
    }

    /// Org, course number, run and repository slug of a course
    pub async fn get_course_metadata(&self, course_id: i64) -> SearchResult<CourseMetadata> {
        if let Some(metadata) = self.courses.get(&course_id).await {
            return Ok(metadata);
        }

        let course = self
            .store
            .get_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))?;
        let repository = self
            .store
            .get_repository(course.repository_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Repository {} not found", course.repository_id))
            })?;

        let metadata = CourseMetadata {
            org: course.org,
            course_number: course.course_number,
            run: course.run,
            repository: repository.slug,
        };
        self.courses.insert(course_id, metadata.clone()).await;
        Ok(metadata)
    }

    /// Vocabulary → term ids for each resource.
    ///
    /// Every vocabulary of the resource's repository gets an entry, with an empty
    /// list when nothing is assigned. Assignments to vocabularies that no longer
    /// belong to the repository are dropped. Ids unknown to the store are absent
    /// from the result.
    pub async fn get_resource_terms(&self, resource_ids: &[i64]) -> SearchResult<TermMap> {
        let mut result = TermMap::with_capacity(resource_ids.len());
        let mut missing = Vec::new();
        for id in resource_ids {
            match self.terms.get(id).await {
                Some(terms) => {
                    result.insert(*id, terms);
                }
                None => missing.push(*id),
            }
        }
        if missing.is_empty() {
            return Ok(result);
        }

        let fetched = self.fetch_resource_terms(&missing).await?;
        for (id, terms) in fetched {
            self.terms.insert(id, terms.clone()).await;
            result.insert(id, terms);
        }
        Ok(result)
    }

    async fn fetch_resource_terms(&self, resource_ids: &[i64]) -> SearchResult<TermMap> {
        let resources = self.store.get_resources(resource_ids).await?;

        // Vocabulary ids per repository slug, fetched once per repository
        let mut repository_vocabularies: HashMap<String, Vec<i64>> = HashMap::new();
        let mut resource_repository: HashMap<i64, String> = HashMap::new();
        for resource in &resources {
            let course = self.get_course_metadata(resource.course_id).await?;
            if !repository_vocabularies.contains_key(&course.repository) {
                let vocabularies = self.store.list_vocabularies(&course.repository).await?;
                repository_vocabularies.insert(
                    course.repository.clone(),
                    vocabularies.into_iter().map(|v| v.id).collect(),
                );
            }
            resource_repository.insert(resource.id, course.repository);
        }

        let mut term_map: TermMap = resource_repository
            .iter()
            .map(|(resource_id, repository)| {
                let terms = repository_vocabularies[repository]
                    .iter()
                    .map(|vocabulary_id| (*vocabulary_id, Vec::new()))
                    .collect();
                (*resource_id, terms)
            })
            .collect();

        let ids: Vec<i64> = resource_repository.keys().copied().collect();
        for assignment in self.store.term_assignments(&ids).await? {
            let Some(terms) = term_map.get_mut(&assignment.resource_id) else {
                continue;
            };
            match terms.get_mut(&assignment.vocabulary_id) {
                Some(term_ids) => term_ids.push(assignment.term_id),
                None => tracing::warn!(
                    resource_id = assignment.resource_id,
                    vocabulary_id = assignment.vocabulary_id,
                    "Dropping term from a vocabulary outside the resource's repository"
                ),
            }
        }

        for terms in term_map.values_mut() {
            for term_ids in terms.values_mut() {
                term_ids.sort_unstable();
                term_ids.dedup();
            }
        }

        Ok(term_map)
    }

    /// Forget the cached terms of one resource (after its tags change)
    pub async fn invalidate_resource(&self, resource_id: i64) {
        self.terms.invalidate(&resource_id).await;
    }

    /// Forget the cached metadata of one course
    pub async fn invalidate_course(&self, course_id: i64) {
        self.courses.invalidate(&course_id).await;
    }

    /// Drop every cached entry
    pub async fn clear(&self) {
        self.courses.invalidate_all().await;
        self.terms.invalidate_all().await;
    }
}

/// Remove vocabularies and terms deleted after a term map was cached.
///
/// `live_vocabularies` is the current vocabulary set of the repository and
/// `live_terms` the set of term ids that still exist.
pub fn prune_stale(
    terms: &VocabularyTerms,
    live_vocabularies: &HashSet<i64>,
    live_terms: &HashSet<i64>,
) -> VocabularyTerms {
    terms
        .iter()
        .filter(|(vocabulary_id, _)| live_vocabularies.contains(vocabulary_id))
        .map(|(vocabulary_id, term_ids)| {
            let kept = term_ids
                .iter()
                .copied()
                .filter(|term_id| live_terms.contains(term_id))
                .collect();
            (*vocabulary_id, kept)
        })
        .collect()
}
