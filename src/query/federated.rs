// src/query/federated.rs

//! Fan-out of one query plan to many sources, merged into one stream
//!
//! Each source gets the plan with its Skip/Take clauses removed, enumerated
//! page by page. The per-source streams are then combined:
//!
//! 1. Unordered plans concatenate the sources in registration order.
//! 2. Ordered plans run a k-way merge. Every round peeks the head of every
//!    live source in parallel, then yields the smallest head (ties go to the
//!    source registered first).
//!
//! Duplicates (per the query's [`Equivalence`]) are dropped as they appear,
//! and the plan's pagination window is applied once to the merged result.

use super::equivalence::{Equivalence, SeenSet};
use super::ordering::OrderingComparer;
use super::paged::{DEFAULT_PAGE_SIZE, PagedCursor, PagedSource};
use super::peek::PeekQueue;
use super::plan::{Clause, Direction, Filter, QueryPlan, SortKey, SortValue};
use super::{QuerySource, build_worker_pool};
use crate::error::Result;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Behavior of a federated query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Drop failing sources instead of failing the whole query
    pub ignore_failures: bool,
    /// Items requested from a source per page
    pub page_size: usize,
    /// Upper bound on worker threads
    pub max_parallelism: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            ignore_failures: true,
            page_size: DEFAULT_PAGE_SIZE,
            max_parallelism: 8,
        }
    }
}

/// Scalar operations over a federated query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Count,
    Any,
    First,
    Last,
}

/// Result of a scalar operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarValue<T> {
    Count(usize),
    Bool(bool),
    Item(Option<T>),
}

/// A query over several sources, behaving like a query over one
///
/// Composing a clause returns a new query; the original is unchanged.
/// Filter and ordering clauses rebuild the per-source sub-queries, pagination
/// clauses share them.
pub struct FederatedQuery<T, E> {
    sources: Arc<[Arc<dyn QuerySource<T>>]>,
    plan: QueryPlan<T>,
    sub_queries: Arc<[PagedSource<T>]>,
    equivalence: Arc<E>,
    options: MergeOptions,
    pool: Arc<ThreadPool>,
}

impl<T, E> Clone for FederatedQuery<T, E> {
    fn clone(&self) -> Self {
        Self {
            sources: Arc::clone(&self.sources),
            plan: self.plan.clone(),
            sub_queries: Arc::clone(&self.sub_queries),
            equivalence: Arc::clone(&self.equivalence),
            options: self.options,
            pool: Arc::clone(&self.pool),
        }
    }
}

fn build_sub_queries<T>(
    sources: &[Arc<dyn QuerySource<T>>],
    plan: &QueryPlan<T>,
    page_size: usize,
) -> Arc<[PagedSource<T>]> {
    let pushed_down = plan.without_pagination();
    sources
        .iter()
        .map(|source| PagedSource::new(Arc::clone(source), pushed_down.clone(), page_size))
        .collect()
}

impl<T, E> FederatedQuery<T, E>
where
    T: Send + 'static,
    E: Equivalence<T>,
{
    /// Create a query over `sources` with its own worker pool
    pub fn new(
        sources: Vec<Arc<dyn QuerySource<T>>>,
        equivalence: E,
        options: MergeOptions,
    ) -> Result<Self> {
        let pool = build_worker_pool(sources.len(), options.max_parallelism)?;
        Ok(Self::with_pool(sources, equivalence, options, Arc::new(pool)))
    }

    /// Create a query sharing an existing worker pool
    pub fn with_pool(
        sources: Vec<Arc<dyn QuerySource<T>>>,
        equivalence: E,
        options: MergeOptions,
        pool: Arc<ThreadPool>,
    ) -> Self {
        let sources: Arc<[Arc<dyn QuerySource<T>>]> = sources.into();
        let plan = QueryPlan::new();
        let sub_queries = build_sub_queries(&sources, &plan, options.page_size);
        Self {
            sources,
            plan,
            sub_queries,
            equivalence: Arc::new(equivalence),
            options,
            pool,
        }
    }

    /// Replace the whole plan
    pub fn with_plan(&self, plan: QueryPlan<T>) -> Self {
        let sub_queries = build_sub_queries(&self.sources, &plan, self.options.page_size);
        Self {
            sources: Arc::clone(&self.sources),
            plan,
            sub_queries,
            equivalence: Arc::clone(&self.equivalence),
            options: self.options,
            pool: Arc::clone(&self.pool),
        }
    }

    /// Compose one more clause
    pub fn with(&self, clause: Clause<T>) -> Self {
        let rebuild = clause.changes_sub_queries();
        let plan = self.plan.with(clause);
        let sub_queries = if rebuild {
            build_sub_queries(&self.sources, &plan, self.options.page_size)
        } else {
            Arc::clone(&self.sub_queries)
        };
        Self {
            sources: Arc::clone(&self.sources),
            plan,
            sub_queries,
            equivalence: Arc::clone(&self.equivalence),
            options: self.options,
            pool: Arc::clone(&self.pool),
        }
    }

    pub fn filter(
        &self,
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.with(Clause::Filter(Filter::new(name, predicate)))
    }

    pub fn order_by<V, F>(&self, name: impl Into<String>, extract: F) -> Self
    where
        V: Into<SortValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.with(Clause::OrderBy(SortKey::new(name, Direction::Ascending, extract)))
    }

    pub fn order_by_descending<V, F>(&self, name: impl Into<String>, extract: F) -> Self
    where
        V: Into<SortValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.with(Clause::OrderBy(SortKey::new(name, Direction::Descending, extract)))
    }

    pub fn then_by<V, F>(&self, name: impl Into<String>, extract: F) -> Self
    where
        V: Into<SortValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.with(Clause::ThenBy(SortKey::new(name, Direction::Ascending, extract)))
    }

    pub fn then_by_descending<V, F>(&self, name: impl Into<String>, extract: F) -> Self
    where
        V: Into<SortValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.with(Clause::ThenBy(SortKey::new(name, Direction::Descending, extract)))
    }

    pub fn skip(&self, count: usize) -> Self {
        self.with(Clause::Skip(count))
    }

    pub fn take(&self, count: usize) -> Self {
        self.with(Clause::Take(count))
    }

    pub fn plan(&self) -> &QueryPlan<T> {
        &self.plan
    }

    pub fn options(&self) -> MergeOptions {
        self.options
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The plans pushed down to each source, in registration order
    pub fn sub_query_plans(&self) -> Vec<&QueryPlan<T>> {
        self.sub_queries.iter().map(PagedSource::plan).collect()
    }

    /// Start a fresh enumeration of the merged results
    pub fn iter(&self) -> MergeStream<T, E> {
        let window = self.plan.window();
        let state = match OrderingComparer::analyze(&self.plan) {
            Some(comparer) => MergeState::Ordered {
                queues: self
                    .sub_queries
                    .iter()
                    .map(|sub| SourceQueue {
                        name: sub.source_name().to_string(),
                        queue: PeekQueue::new(sub.iter()),
                    })
                    .collect(),
                comparer,
            },
            None => MergeState::Concatenated {
                cursors: self.sub_queries.iter().map(PagedSource::iter).collect(),
            },
        };

        debug!(
            "[query] Merging {} sources ({}) for plan: {}",
            self.sources.len(),
            if matches!(state, MergeState::Ordered { .. }) {
                "ordered"
            } else {
                "concatenated"
            },
            self.plan
        );

        MergeStream {
            state,
            seen: SeenSet::new(Arc::clone(&self.equivalence)),
            skip_remaining: window.skip,
            take_remaining: window.take,
            ignore_failures: self.options.ignore_failures,
            pool: Arc::clone(&self.pool),
            done: false,
        }
    }

    /// Run a scalar operation
    pub fn execute(&self, scalar: Scalar) -> Result<ScalarValue<T>> {
        Ok(match scalar {
            Scalar::Count => ScalarValue::Count(self.count()?),
            Scalar::Any => ScalarValue::Bool(self.any()?),
            Scalar::First => ScalarValue::Item(self.first()?),
            Scalar::Last => ScalarValue::Item(self.last()?),
        })
    }

    /// Approximate number of merged results
    ///
    /// Sums the per-source counts of the plan without pagination. Duplicates
    /// across sources are counted once per source and the pagination window
    /// is not applied, so the result can exceed `to_vec().len()`.
    pub fn count(&self) -> Result<usize> {
        let pushed_down = self.plan.without_pagination();
        let mut total = 0usize;

        for source in self.sources.iter() {
            match source.count(&pushed_down) {
                Ok(n) => total = total.saturating_add(n),
                Err(e) if self.options.ignore_failures && !e.is_fatal() => {
                    warn!("[query] Ignoring count failure from '{}': {}", source.name(), e);
                }
                Err(e) => return Err(e.into_source_failure(source.name())),
            }
        }

        Ok(total)
    }

    pub fn any(&self) -> Result<bool> {
        Ok(self.iter().next().transpose()?.is_some())
    }

    pub fn first(&self) -> Result<Option<T>> {
        self.iter().next().transpose()
    }

    pub fn last(&self) -> Result<Option<T>> {
        let mut last = None;
        for item in self.iter() {
            last = Some(item?);
        }
        Ok(last)
    }

    /// Materialize the merged results
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.iter().collect()
    }
}

impl<'a, T, E> IntoIterator for &'a FederatedQuery<T, E>
where
    T: Send + 'static,
    E: Equivalence<T>,
{
    type Item = Result<T>;
    type IntoIter = MergeStream<T, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

struct SourceQueue<T> {
    name: String,
    queue: PeekQueue<T, PagedCursor<T>>,
}

enum MergeState<T> {
    Concatenated {
        cursors: VecDeque<PagedCursor<T>>,
    },
    Ordered {
        queues: Vec<SourceQueue<T>>,
        comparer: OrderingComparer<T>,
    },
}

/// One enumeration of a [`FederatedQuery`]
///
/// Yields each distinct result once. After an error or the end of the
/// results, the stream stays finished.
pub struct MergeStream<T, E: Equivalence<T>> {
    state: MergeState<T>,
    seen: SeenSet<T, E>,
    skip_remaining: usize,
    take_remaining: Option<usize>,
    ignore_failures: bool,
    pool: Arc<ThreadPool>,
    done: bool,
}

impl<T, E> MergeStream<T, E>
where
    T: Send,
    E: Equivalence<T>,
{
    fn next_candidate(&mut self) -> Option<Result<T>> {
        let ignore_failures = self.ignore_failures;
        match &mut self.state {
            MergeState::Concatenated { cursors } => next_concatenated(cursors, ignore_failures),
            MergeState::Ordered { queues, comparer } => {
                next_ordered(queues, comparer, &self.pool, ignore_failures)
            }
        }
    }

    fn next_distinct(&mut self) -> Option<Result<T>> {
        loop {
            let item = match self.next_candidate()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            if self.seen.insert(&item) {
                return Some(Ok(item));
            }
            trace!("[query] Dropping duplicate result");
        }
    }
}

impl<T, E> Iterator for MergeStream<T, E>
where
    T: Send,
    E: Equivalence<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.take_remaining == Some(0) {
                self.done = true;
                return None;
            }

            let item = match self.next_distinct() {
                Some(Ok(item)) => item,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            if let Some(remaining) = self.take_remaining.as_mut() {
                *remaining -= 1;
            }
            return Some(Ok(item));
        }
    }
}

impl<T, E> FusedIterator for MergeStream<T, E>
where
    T: Send,
    E: Equivalence<T>,
{
}

fn next_concatenated<T>(
    cursors: &mut VecDeque<PagedCursor<T>>,
    ignore_failures: bool,
) -> Option<Result<T>> {
    while let Some(current) = cursors.front_mut() {
        match current.next() {
            Some(Ok(item)) => return Some(Ok(item)),
            Some(Err(e)) if ignore_failures && !e.is_fatal() => {
                warn!(
                    "[query] Source '{}' failed, continuing without it: {}",
                    current.source_name(),
                    e
                );
                cursors.pop_front();
            }
            Some(Err(e)) => return Some(Err(e)),
            None => {
                cursors.pop_front();
            }
        }
    }
    None
}

fn next_ordered<T: Send>(
    queues: &mut Vec<SourceQueue<T>>,
    comparer: &OrderingComparer<T>,
    pool: &ThreadPool,
    ignore_failures: bool,
) -> Option<Result<T>> {
    let outcomes: Vec<Result<bool>> = pool.install(|| {
        queues
            .par_iter_mut()
            .map(|source| source.queue.try_peek().map(|head| head.is_some()))
            .collect()
    });

    let mut live = Vec::with_capacity(queues.len());
    let mut failure = None;
    for (source, outcome) in queues.drain(..).zip(outcomes) {
        match outcome {
            Ok(true) => live.push(source),
            Ok(false) => trace!("[query] Source '{}' exhausted", source.name),
            Err(e) if ignore_failures && !e.is_fatal() => {
                warn!(
                    "[query] Source '{}' failed, continuing without it: {}",
                    source.name, e
                );
            }
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    *queues = live;

    if let Some(e) = failure {
        return Some(Err(e));
    }

    let mut min_index: Option<usize> = None;
    for (index, source) in queues.iter().enumerate() {
        let Some(head) = source.queue.peeked() else {
            continue;
        };
        let smaller = match min_index.and_then(|m| queues[m].queue.peeked()) {
            Some(current) => comparer.compare(head, current) == Ordering::Less,
            None => true,
        };
        if smaller {
            min_index = Some(index);
        }
    }

    queues[min_index?].queue.dequeue().map(Ok)
}
