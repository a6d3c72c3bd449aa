//! Error types for search operations

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// One document rejected by a bulk write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentError {
    /// Resource id of the rejected document
    pub id: i64,

    /// Why the engine rejected it
    pub reason: String,
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resource {}: {}", self.id, self.reason)
    }
}

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Engine unreachable, or the index or mapping is missing
    #[error("Search engine unavailable: {0}")]
    ConnectionUnavailable(String),

    /// A bulk write reported per-document errors
    #[error("Reindex failed for {} document(s): {}", .errors.len(), join_errors(.errors))]
    Reindex { errors: Vec<DocumentError> },

    /// Adding a dynamic facet field to the mapping failed
    #[error("Schema evolution failed: {0}")]
    SchemaEvolution(String),

    /// Content could not be stripped of markup
    #[error("Malformed content: {0}")]
    MalformedContent(String),

    /// Query execution failed; search is unavailable to the caller
    #[error("Search unavailable: {0}")]
    Unavailable(String),

    /// Query parsing failed
    #[error("Query parsing failed: {0}")]
    QueryParsingFailed(String),

    /// Document deletion failed
    #[error("Document deletion failed: {0}")]
    DeletionFailed(String),

    /// Reading records needed to build documents failed
    #[error("Store error: {0}")]
    Store(#[from] AppError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A document or mapping could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Tantivy error
    #[error("Tantivy error: {0}")]
    TantivyError(String),
}

fn join_errors(errors: &[DocumentError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SearchError {
    /// Whether the caller should present this as "search unavailable"
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SearchError::ConnectionUnavailable(_)
                | SearchError::Unavailable(_)
                | SearchError::TantivyError(_)
                | SearchError::IoError(_)
        )
    }

    /// Ids of the documents a failed reindex rejected
    pub fn failed_ids(&self) -> Vec<i64> {
        match self {
            SearchError::Reindex { errors } => errors.iter().map(|e| e.id).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        SearchError::TantivyError(err.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        SearchError::QueryParsingFailed(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Store(err) => err,
            SearchError::IoError(err) => AppError::Io(err),
            SearchError::Serialization(err) => AppError::Serialization(err.to_string()),
            _ => AppError::Search(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reindex_error_lists_documents() {
        let err = SearchError::Reindex {
            errors: vec![
                DocumentError {
                    id: 4,
                    reason: "unmapped field vocab_9".to_string(),
                },
                DocumentError {
                    id: 5,
                    reason: "unmapped field vocab_9".to_string(),
                },
            ],
        };

        assert_eq!(err.failed_ids(), vec![4, 5]);
        let message = err.to_string();
        assert!(message.contains("2 document(s)"));
        assert!(message.contains("resource 4"));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(SearchError::ConnectionUnavailable("down".into()).is_unavailable());
        assert!(SearchError::Unavailable("down".into()).is_unavailable());
        assert!(!SearchError::SchemaEvolution("x".into()).is_unavailable());
    }

    #[test]
    fn test_json_errors_are_serialization_errors() {
        let err: SearchError = serde_json::from_str::<DocumentError>("{").unwrap_err().into();
        assert!(matches!(err, SearchError::Serialization(_)));
        assert!(!err.is_unavailable());

        let app: AppError = err.into();
        assert_eq!(app.error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_store_error_round_trips_to_app_error() {
        let err: SearchError = AppError::Database("gone".into()).into();
        let app: AppError = err.into();
        assert_eq!(app.error_code(), "DATABASE_ERROR");
    }
}
