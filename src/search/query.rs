//! Search query building and parsing

use crate::search::document::FACETS_FIELD;
use crate::search::error::{SearchError, SearchResult};
use crate::search::facet::{BuiltinFacet, FacetKey, EXACT_SUFFIX, MISSING_SENTINEL};
use crate::state::ResourceStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Facet, IndexRecordOption, Schema};
use tantivy::{Index, Term};

/// Fields matched by free text
pub const TEXT_FIELDS: [&str; 3] = ["title", "description", "content_stripped"];

/// Sort order for search results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort options offered to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    NrViews,
    NrAttempts,
    AvgGrade,
    Title,
    #[default]
    Relevance,
}

impl SortOption {
    pub const ALL: [SortOption; 5] = [
        SortOption::NrViews,
        SortOption::NrAttempts,
        SortOption::AvgGrade,
        SortOption::Title,
        SortOption::Relevance,
    ];

    /// Identifier accepted from callers
    pub fn id(&self) -> &'static str {
        match self {
            SortOption::NrViews => "nr_views",
            SortOption::NrAttempts => "nr_attempts",
            SortOption::AvgGrade => "avg_grade",
            SortOption::Title => "title",
            SortOption::Relevance => "relevance",
        }
    }

    /// Engine field sorted on; `None` sorts by score
    pub fn field(&self) -> Option<&'static str> {
        match self {
            SortOption::NrViews => Some("xa_nr_views"),
            SortOption::NrAttempts => Some("xa_nr_attempts"),
            SortOption::AvgGrade => Some("xa_avg_grade"),
            SortOption::Title => Some("titlesort"),
            SortOption::Relevance => None,
        }
    }

    pub fn default_order(&self) -> SortOrder {
        match self {
            SortOption::Title => SortOrder::Ascending,
            _ => SortOrder::Descending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortOption::NrViews => "Number of Views (desc)",
            SortOption::NrAttempts => "Number of Attempts (desc)",
            SortOption::AvgGrade => "Average Grade (desc)",
            SortOption::Title => "Title (asc)",
            SortOption::Relevance => "Relevance",
        }
    }
}

/// Resolved sort: option plus direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchSort {
    pub option: SortOption,
    pub order: SortOrder,
}

impl SearchSort {
    /// Resolve a caller's sort identifier.
    ///
    /// A leading `-` forces descending order; otherwise the option's default
    /// order applies. Unset or unknown identifiers resolve to relevance.
    pub fn parse(sort_by: Option<&str>) -> Self {
        let raw = sort_by.unwrap_or("").trim();
        let (descending, id) = match raw.strip_prefix('-') {
            Some(id) => (true, id),
            None => (false, raw),
        };
        let option = SortOption::ALL
            .into_iter()
            .find(|option| option.id() == id)
            .unwrap_or_default();
        let order = if descending || option == SortOption::Relevance {
            SortOrder::Descending
        } else {
            option.default_order()
        };
        Self { option, order }
    }
}

impl Default for SearchSort {
    fn default() -> Self {
        Self::parse(None)
    }
}

/// One filter on the result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFilter {
    /// Facet has exactly this value
    Exact { key: FacetKey, value: String },
    /// Facet is absent
    Missing { key: FacetKey },
    /// Analyzed field matches the text
    Text { field: String, value: String },
}

impl SearchFilter {
    /// Parse the caller convention: `<field>_exact:<value>`, `<field>:<value>`,
    /// or `_missing_` in place of the value (either side of the colon).
    pub fn parse(raw: &str) -> SearchResult<Self> {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| SearchError::QueryParsingFailed(format!("invalid filter: {}", raw)))?;

        let facet = |name: &str| {
            FacetKey::parse(name).ok_or_else(|| {
                SearchError::QueryParsingFailed(format!("unknown facet in filter: {}", raw))
            })
        };

        if key == MISSING_SENTINEL {
            return Ok(SearchFilter::Missing { key: facet(value)? });
        }
        if value == MISSING_SENTINEL {
            return Ok(SearchFilter::Missing { key: facet(key)? });
        }
        if key.ends_with(EXACT_SUFFIX) {
            return Ok(SearchFilter::Exact {
                key: facet(key)?,
                value: value.to_string(),
            });
        }
        if TEXT_FIELDS.contains(&key) {
            return Ok(SearchFilter::Text {
                field: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok(SearchFilter::Exact {
            key: facet(key)?,
            value: value.to_string(),
        })
    }
}

/// Aggregation requested alongside a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Value buckets of a facet
    Terms(FacetKey),
    /// Number of documents without the facet
    Missing(FacetKey),
}

/// Engine-independent description of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free text; empty matches everything in scope
    pub text: String,

    /// Repository slug the query is scoped to
    pub repository: Option<String>,

    /// Filters to apply
    pub filters: Vec<SearchFilter>,

    /// Sorting criteria
    pub sort: SearchSort,

    /// Aggregations to compute
    pub aggregations: Vec<Aggregation>,
}

impl SearchQuery {
    /// Query matching every document
    pub fn all() -> Self {
        Self {
            text: String::new(),
            repository: None,
            filters: Vec::new(),
            sort: SearchSort::default(),
            aggregations: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_repository(mut self, slug: impl Into<String>) -> Self {
        self.repository = Some(slug.into());
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sort(mut self, sort: SearchSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Build the Tantivy query
    pub fn to_tantivy_query(&self, index: &Index, schema: &Schema) -> SearchResult<Box<dyn Query>> {
        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        // Main text query (title, description, stripped content)
        let text = self.text.trim();
        if !text.is_empty() {
            let text_fields = TEXT_FIELDS
                .iter()
                .filter_map(|name| schema.get_field(name).ok())
                .collect();
            let query_parser = QueryParser::for_index(index, text_fields);
            let (parsed_query, errors) = query_parser.parse_query_lenient(text);
            if !errors.is_empty() {
                tracing::debug!(text, errors = ?errors, "Lenient query parse dropped clauses");
            }
            subqueries.push((Occur::Must, parsed_query));
        }

        if let Some(ref repository) = self.repository {
            let field = schema.get_field("repository")?;
            subqueries.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(field, repository),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        for filter in &self.filters {
            match filter {
                SearchFilter::Exact { key, value } => {
                    subqueries.push((Occur::Must, exact_query(schema, key, value)?));
                }
                SearchFilter::Missing { key } => {
                    subqueries.push((Occur::MustNot, has_facet_query(schema, key)?));
                }
                SearchFilter::Text { field, value } => {
                    let field = schema.get_field(field)?;
                    let query_parser = QueryParser::for_index(index, vec![field]);
                    let (parsed_query, _) = query_parser.parse_query_lenient(value);
                    subqueries.push((Occur::Must, parsed_query));
                }
            }
        }

        // Only negative clauses would match nothing
        if !subqueries.iter().any(|(occur, _)| *occur == Occur::Must) {
            subqueries.push((Occur::Must, Box::new(AllQuery)));
        }

        if subqueries.len() == 1 {
            let (_, query) = subqueries.remove(0);
            Ok(query)
        } else {
            Ok(Box::new(BooleanQuery::new(subqueries)))
        }
    }
}

/// Exact-match query on a facet value
pub fn exact_query(schema: &Schema, key: &FacetKey, value: &str) -> SearchResult<Box<dyn Query>> {
    let query: Box<dyn Query> = match key {
        FacetKey::Builtin(builtin) => {
            let field = schema.get_field(builtin.field_name())?;
            Box::new(TermQuery::new(
                Term::from_field_text(field, value),
                IndexRecordOption::Basic,
            ))
        }
        FacetKey::Vocabulary(_) => {
            let field = schema.get_field(FACETS_FIELD)?;
            let facet = Facet::from_path([key.field_name(), value.to_string()]);
            Box::new(TermQuery::new(
                Term::from_facet(field, &facet),
                IndexRecordOption::Basic,
            ))
        }
    };
    Ok(query)
}

/// Query matching documents carrying any value for the facet
pub fn has_facet_query(schema: &Schema, key: &FacetKey) -> SearchResult<Box<dyn Query>> {
    let field = schema.get_field(FACETS_FIELD)?;
    let facet = Facet::from_path([key.field_name()]);
    Ok(Box::new(TermQuery::new(
        Term::from_facet(field, &facet),
        IndexRecordOption::Basic,
    )))
}

/// Builds scoped queries with the facet aggregations the UI renders
pub struct QueryBuilder {
    store: Arc<dyn ResourceStore>,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Build a query from caller input.
    ///
    /// Requests buckets for the built-in facets and, for every vocabulary of
    /// the repository, both a terms and a missing aggregation, whether or not
    /// anything is tagged yet.
    pub async fn build(
        &self,
        tokens: &str,
        repo_slug: Option<&str>,
        sort_by: Option<&str>,
        facet_filters: &[String],
    ) -> SearchResult<SearchQuery> {
        let mut query = SearchQuery::all()
            .with_text(tokens.trim())
            .with_sort(SearchSort::parse(sort_by));

        for raw in facet_filters {
            query = query.with_filter(SearchFilter::parse(raw)?);
        }

        for builtin in BuiltinFacet::ALL {
            query = query.with_aggregation(Aggregation::Terms(FacetKey::Builtin(builtin)));
        }

        if let Some(slug) = repo_slug {
            query = query.with_repository(slug);
            for vocabulary in self.store.list_vocabularies(slug).await? {
                let key = FacetKey::vocabulary(vocabulary.id);
                query = query
                    .with_aggregation(Aggregation::Missing(key))
                    .with_aggregation(Aggregation::Terms(key));
            }
        }

        Ok(query)
    }
}
