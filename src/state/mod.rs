pub mod cache;
pub mod factory;
pub mod store;

pub use cache::*;
pub use factory::{create_in_memory_store, create_store};
pub use store::*;

use crate::error::Result;
use crate::models::{Course, Repository, Resource, Term, TermAssignment, Vocabulary};
use async_trait::async_trait;

/// Read API over the relational records the search subsystem indexes.
///
/// Missing ids are omitted from batch results rather than reported as errors;
/// callers compare the returned set against what they asked for.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch resources by id
    async fn get_resources(&self, ids: &[i64]) -> Result<Vec<Resource>>;

    /// Get a course by id
    async fn get_course(&self, id: i64) -> Result<Option<Course>>;

    /// Get a repository by id
    async fn get_repository(&self, id: i64) -> Result<Option<Repository>>;

    /// List the vocabularies of a repository, ordered by id
    async fn list_vocabularies(&self, repo_slug: &str) -> Result<Vec<Vocabulary>>;

    /// Fetch vocabularies by id
    async fn get_vocabularies(&self, ids: &[i64]) -> Result<Vec<Vocabulary>>;

    /// Fetch terms by id
    async fn get_terms(&self, ids: &[i64]) -> Result<Vec<Term>>;

    /// Term assignments of the given resources
    async fn term_assignments(&self, resource_ids: &[i64]) -> Result<Vec<TermAssignment>>;

    /// Ids of every resource in a repository, ordered
    async fn resource_ids_for_repository(&self, repo_slug: &str) -> Result<Vec<i64>>;

    /// Ids of every resource, ordered
    async fn all_resource_ids(&self) -> Result<Vec<i64>>;
}
