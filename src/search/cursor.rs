//! Lazy, paginated view over one search

use crate::search::error::{SearchError, SearchResult};
use crate::search::index::{IndexManager, ResourceHit};
use crate::search::query::SearchQuery;
use futures::stream::{self, Stream, TryStreamExt};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Pages over the results of a query.
///
/// Nothing is fetched until asked for. The total count is fetched at most
/// once per cursor; every page or slice is a fresh search.
#[derive(Clone)]
pub struct SearchCursor {
    index: Arc<IndexManager>,
    query: Arc<SearchQuery>,
    page_length: usize,
    count: Arc<OnceCell<usize>>,
}

impl SearchCursor {
    pub fn new(index: Arc<IndexManager>, query: SearchQuery, page_length: usize) -> Self {
        Self {
            index,
            query: Arc::new(query),
            page_length: page_length.max(1),
            count: Arc::new(OnceCell::new()),
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn page_length(&self) -> usize {
        self.page_length
    }

    /// Total number of matches
    pub async fn count(&self) -> SearchResult<usize> {
        self.count
            .get_or_try_init(|| self.index.count(&self.query))
            .await
            .copied()
    }

    pub async fn page_count(&self) -> SearchResult<usize> {
        Ok(self.count().await?.div_ceil(self.page_length))
    }

    /// Results of a 1-indexed page; empty when out of range
    pub async fn get_page(&self, page: usize) -> SearchResult<Vec<ResourceHit>> {
        if page == 0 || page > self.page_count().await? {
            return Ok(Vec::new());
        }
        self.index
            .search(&self.query, (page - 1) * self.page_length, self.page_length)
            .await
    }

    /// Result at a 0-indexed position
    pub async fn get(&self, position: usize) -> SearchResult<Option<ResourceHit>> {
        Ok(self.index.search(&self.query, position, 1).await?.into_iter().next())
    }

    /// Results in a 0-indexed half-open range
    pub async fn slice(&self, range: Range<usize>) -> SearchResult<Vec<ResourceHit>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.index.search(&self.query, range.start, range.len()).await
    }

    /// Every page in order
    pub fn pages(&self) -> impl Stream<Item = SearchResult<Vec<ResourceHit>>> + '_ {
        stream::try_unfold(1usize, move |page| async move {
            if page > self.page_count().await? {
                return Ok::<_, SearchError>(None);
            }
            let hits = self.get_page(page).await?;
            Ok(Some((hits, page + 1)))
        })
    }

    /// Every result in order; each call starts from the first page
    pub fn all(&self) -> impl Stream<Item = SearchResult<ResourceHit>> + '_ {
        self.pages()
            .map_ok(|hits| stream::iter(hits.into_iter().map(Ok::<_, SearchError>)))
            .try_flatten()
    }
}
