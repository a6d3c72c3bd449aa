//! Faceted full-text search over taxonomy-tagged educational resources.
//!
//! Resources live in a relational store ([`state::ResourceStore`]); the
//! [`search`] module projects them into a Tantivy index, keeps one facet per
//! taxonomy vocabulary, and serves repository-scoped queries with labelled
//! facet summaries.

pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod state;

pub use error::{AppError, Result};
