// src/query/paged.rs

//! Page-at-a-time enumeration of a single source
//!
//! Each page is fetched by re-issuing the source's plan with `skip(start)` and
//! `take(page_size)` appended. A page shorter than the page size means the
//! source is exhausted, so no further request is made.

use super::QuerySource;
use super::plan::QueryPlan;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default number of items requested per page
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// A source bound to a plan, enumerable in fixed-size pages
///
/// Cursors created by [`iter`](Self::iter) are independent: each holds only
/// its current page and nothing is cached across enumerations.
pub struct PagedSource<T> {
    source: Arc<dyn QuerySource<T>>,
    plan: QueryPlan<T>,
    page_size: usize,
}

impl<T> PagedSource<T> {
    pub fn new(source: Arc<dyn QuerySource<T>>, plan: QueryPlan<T>, page_size: usize) -> Self {
        Self {
            source,
            plan,
            page_size: page_size.max(1),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// The plan pushed down to the source, without paging clauses
    pub fn plan(&self) -> &QueryPlan<T> {
        &self.plan
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Start a fresh enumeration
    pub fn iter(&self) -> PagedCursor<T> {
        PagedCursor {
            source: Arc::clone(&self.source),
            plan: self.plan.clone(),
            page_size: self.page_size,
            page: Vec::new().into_iter(),
            next_start: 0,
            exhausted: false,
        }
    }
}

impl<T> Clone for PagedSource<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            plan: self.plan.clone(),
            page_size: self.page_size,
        }
    }
}

/// A lazy cursor over one source, fetching a page whenever the last is used up
///
/// A failed page fetch yields the error once and ends the cursor.
pub struct PagedCursor<T> {
    source: Arc<dyn QuerySource<T>>,
    plan: QueryPlan<T>,
    page_size: usize,
    page: std::vec::IntoIter<T>,
    next_start: usize,
    exhausted: bool,
}

impl<T> PagedCursor<T> {
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn fetch_page(&mut self) -> Result<()> {
        let name = self.source.name();
        let page_plan = self.plan.skip(self.next_start).take(self.page_size);
        debug!(
            "[query] Fetching page from '{}' at offset {} (size {})",
            name, self.next_start, self.page_size
        );

        let items = self
            .source
            .query(&page_plan)
            .and_then(|stream| stream.collect::<Result<Vec<T>>>())
            .map_err(|e| e.into_source_failure(name))?;

        if items.len() < self.page_size {
            trace!(
                "[query] Short page ({} items) from '{}', source exhausted",
                items.len(),
                name
            );
            self.exhausted = true;
        }

        self.next_start += items.len();
        self.page = items.into_iter();
        Ok(())
    }
}

impl<T> Iterator for PagedCursor<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.page.next() {
                return Some(Ok(item));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
