use serde::{Deserialize, Serialize};
use validator::Validate;

/// A named facet dimension scoped to a repository
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Vocabulary {
    /// Unique identifier
    pub id: i64,

    /// Owning repository
    pub repository_id: i64,

    /// Display name
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// URL-safe name
    #[validate(length(min = 1, max = 255))]
    pub slug: String,
}

/// One allowed value within a vocabulary
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Term {
    /// Unique identifier
    pub id: i64,

    /// Owning vocabulary
    pub vocabulary_id: i64,

    /// Display label
    #[validate(length(min = 1, max = 255))]
    pub label: String,
}

/// A single (resource, vocabulary, term) assignment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TermAssignment {
    pub resource_id: i64,
    pub vocabulary_id: i64,
    pub term_id: i64,
}
