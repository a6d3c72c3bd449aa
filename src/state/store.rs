use crate::error::{AppError, Result};
use crate::models::{Course, Repository, Resource, Term, TermAssignment, Vocabulary};
use crate::state::ResourceStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use validator::Validate;

/// Serialized contents of a store, used to seed the in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub vocabularies: Vec<Vocabulary>,
    #[serde(default)]
    pub terms: Vec<Term>,
}

/// In-memory resource store (for the CLI and testing)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    repositories: Arc<DashMap<i64, Repository>>,
    courses: Arc<DashMap<i64, Course>>,
    resources: Arc<DashMap<i64, Resource>>,
    vocabularies: Arc<DashMap<i64, Vocabulary>>,
    terms: Arc<DashMap<i64, Term>>,
    reads: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, validating every record
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        for repository in snapshot.repositories {
            store.save_repository(repository)?;
        }
        for course in snapshot.courses {
            store.save_course(course)?;
        }
        for vocabulary in snapshot.vocabularies {
            store.save_vocabulary(vocabulary)?;
        }
        for term in snapshot.terms {
            store.save_term(term)?;
        }
        for resource in snapshot.resources {
            store.save_resource(resource)?;
        }
        Ok(store)
    }

    /// Load a JSON snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            resources = snapshot.resources.len(),
            vocabularies = snapshot.vocabularies.len(),
            "Loaded store snapshot"
        );
        Self::from_snapshot(snapshot)
    }

    /// Number of read calls served so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn save_repository(&self, repository: Repository) -> Result<()> {
        repository.validate().map_err(|e| AppError::Validation(e.to_string()))?;
        self.repositories.insert(repository.id, repository);
        Ok(())
    }

    pub fn save_course(&self, course: Course) -> Result<()> {
        course.validate().map_err(|e| AppError::Validation(e.to_string()))?;
        if !self.repositories.contains_key(&course.repository_id) {
            return Err(AppError::NotFound(format!(
                "Repository {} not found",
                course.repository_id
            )));
        }
        self.courses.insert(course.id, course);
        Ok(())
    }

    pub fn save_resource(&self, resource: Resource) -> Result<()> {
        resource.validate().map_err(|e| AppError::Validation(e.to_string()))?;
        if !self.courses.contains_key(&resource.course_id) {
            return Err(AppError::NotFound(format!(
                "Course {} not found",
                resource.course_id
            )));
        }
        tracing::debug!(resource_id = resource.id, "Resource saved");
        self.resources.insert(resource.id, resource);
        Ok(())
    }

    pub fn delete_resource(&self, id: i64) -> Result<()> {
        self.resources
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Resource {} not found", id)))
    }

    pub fn save_vocabulary(&self, vocabulary: Vocabulary) -> Result<()> {
        vocabulary.validate().map_err(|e| AppError::Validation(e.to_string()))?;
        if !self.repositories.contains_key(&vocabulary.repository_id) {
            return Err(AppError::NotFound(format!(
                "Repository {} not found",
                vocabulary.repository_id
            )));
        }
        self.vocabularies.insert(vocabulary.id, vocabulary);
        Ok(())
    }

    /// Delete a vocabulary together with its terms
    pub fn delete_vocabulary(&self, id: i64) -> Result<()> {
        self.vocabularies
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Vocabulary {} not found", id)))?;
        self.terms.retain(|_, term| term.vocabulary_id != id);
        Ok(())
    }

    pub fn save_term(&self, term: Term) -> Result<()> {
        term.validate().map_err(|e| AppError::Validation(e.to_string()))?;
        if !self.vocabularies.contains_key(&term.vocabulary_id) {
            return Err(AppError::NotFound(format!(
                "Vocabulary {} not found",
                term.vocabulary_id
            )));
        }
        self.terms.insert(term.id, term);
        Ok(())
    }

    pub fn delete_term(&self, id: i64) -> Result<()> {
        self.terms
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Term {} not found", id)))
    }

    /// Replace the terms assigned to a resource
    pub fn tag_resource(&self, resource_id: i64, term_ids: Vec<i64>) -> Result<()> {
        let mut resource = self
            .resources
            .get_mut(&resource_id)
            .ok_or_else(|| AppError::NotFound(format!("Resource {} not found", resource_id)))?;
        resource.term_ids = term_ids;
        Ok(())
    }

    fn repository_by_slug(&self, slug: &str) -> Option<Repository> {
        self.repositories
            .iter()
            .find(|entry| entry.slug == slug)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_resources(&self, ids: &[i64]) -> Result<Vec<Resource>> {
        self.record_read();
        Ok(ids
            .iter()
            .filter_map(|id| self.resources.get(id).map(|entry| entry.clone()))
            .collect())
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>> {
        self.record_read();
        Ok(self.courses.get(&id).map(|entry| entry.clone()))
    }

    async fn get_repository(&self, id: i64) -> Result<Option<Repository>> {
        self.record_read();
        Ok(self.repositories.get(&id).map(|entry| entry.clone()))
    }

    async fn list_vocabularies(&self, repo_slug: &str) -> Result<Vec<Vocabulary>> {
        self.record_read();
        let Some(repository) = self.repository_by_slug(repo_slug) else {
            return Ok(Vec::new());
        };
        let mut vocabularies: Vec<Vocabulary> = self
            .vocabularies
            .iter()
            .filter(|entry| entry.repository_id == repository.id)
            .map(|entry| entry.value().clone())
            .collect();
        vocabularies.sort_by_key(|v| v.id);
        Ok(vocabularies)
    }

    async fn get_vocabularies(&self, ids: &[i64]) -> Result<Vec<Vocabulary>> {
        self.record_read();
        Ok(ids
            .iter()
            .filter_map(|id| self.vocabularies.get(id).map(|entry| entry.clone()))
            .collect())
    }

    async fn get_terms(&self, ids: &[i64]) -> Result<Vec<Term>> {
        self.record_read();
        Ok(ids
            .iter()
            .filter_map(|id| self.terms.get(id).map(|entry| entry.clone()))
            .collect())
    }

    async fn term_assignments(&self, resource_ids: &[i64]) -> Result<Vec<TermAssignment>> {
        self.record_read();
        let mut assignments = Vec::new();
        for resource_id in resource_ids {
            let Some(resource) = self.resources.get(resource_id) else {
                continue;
            };
            for term_id in &resource.term_ids {
                if let Some(term) = self.terms.get(term_id) {
                    assignments.push(TermAssignment {
                        resource_id: *resource_id,
                        vocabulary_id: term.vocabulary_id,
                        term_id: *term_id,
                    });
                }
            }
        }
        Ok(assignments)
    }

    async fn resource_ids_for_repository(&self, repo_slug: &str) -> Result<Vec<i64>> {
        self.record_read();
        let Some(repository) = self.repository_by_slug(repo_slug) else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<i64> = self
            .resources
            .iter()
            .filter(|entry| {
                self.courses
                    .get(&entry.course_id)
                    .map(|course| course.repository_id == repository.id)
                    .unwrap_or(false)
            })
            .map(|entry| entry.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn all_resource_ids(&self) -> Result<Vec<i64>> {
        self.record_read();
        let mut ids: Vec<i64> = self.resources.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
