//! Common fixtures for search integration tests
//!
//! Builds an in-memory resource store with one course per repository and a
//! search service over a temporary index directory.

#![allow(dead_code)]

use lore_search::config::Config;
use lore_search::models::{Course, Repository, Resource, Term, Vocabulary};
use lore_search::search::SearchService;
use lore_search::state::InMemoryStore;
use std::sync::Arc;
use tempfile::TempDir;

/// Store, index directory and service wired together
pub struct Fixture {
    pub store: InMemoryStore,
    pub service: SearchService,
    pub temp_dir: TempDir,
}

impl Fixture {
    /// Fixture with caching disabled so every index run sees the store as is
    pub async fn new(store: InMemoryStore) -> Self {
        Self::with_ttl(store, 0).await
    }

    pub async fn with_ttl(store: InMemoryStore, ttl_secs: u64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.search.index_path = temp_dir.path().to_path_buf();
        config.cache.ttl_secs = ttl_secs;

        let service = SearchService::new(&config, Arc::new(store.clone()))
            .await
            .unwrap();
        Self {
            store,
            service,
            temp_dir,
        }
    }
}

/// Add a repository with a single course whose id is `repository_id * 10`
pub fn seed_repository(store: &InMemoryStore, repository_id: i64, slug: &str) -> i64 {
    store
        .save_repository(Repository {
            id: repository_id,
            slug: slug.to_string(),
            name: slug.to_uppercase(),
        })
        .unwrap();

    let course_id = repository_id * 10;
    store
        .save_course(Course {
            id: course_id,
            repository_id,
            org: "MITx".to_string(),
            course_number: format!("{}.01", repository_id),
            run: "2015_T1".to_string(),
        })
        .unwrap();
    course_id
}

/// Add a vocabulary with the given terms
pub fn seed_vocabulary(store: &InMemoryStore, repository_id: i64, id: i64, name: &str, terms: &[(i64, &str)]) {
    store
        .save_vocabulary(Vocabulary {
            id,
            repository_id,
            name: name.to_string(),
            slug: name.to_lowercase(),
        })
        .unwrap();
    for (term_id, label) in terms {
        store
            .save_term(Term {
                id: *term_id,
                vocabulary_id: id,
                label: label.to_string(),
            })
            .unwrap();
    }
}

/// Add resources `ids` to a course; types alternate between problem and video
pub fn seed_resources(store: &InMemoryStore, course_id: i64, ids: impl IntoIterator<Item = i64>) {
    for id in ids {
        let resource_type = if id % 2 == 0 { "problem" } else { "video" };
        let resource = Resource::new(id, course_id, resource_type, &format!("Resource {:04}", id))
            .with_content(&format!("<p>Body of resource {}</p>", id))
            .with_stats(id % 7, id % 3, (id % 5) as f64 / 5.0);
        store.save_resource(resource).unwrap();
    }
}
