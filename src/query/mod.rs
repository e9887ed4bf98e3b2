// src/query/mod.rs

//! Federated query engine
//!
//! Queries are described by immutable [`QueryPlan`]s and evaluated by
//! [`QuerySource`]s. A [`FederatedQuery`] fans a plan out to many sources and
//! merges the results into one duplicate-free stream:
//!
//! - without an ordering clause, sources are concatenated in registration order
//! - with an ordering clause, sources are k-way merged on the ordering
//!
//! Pagination (Skip/Take) is never pushed down to sources; it is applied once
//! to the merged stream.

mod equivalence;
mod federated;
mod ordering;
mod paged;
mod peek;
mod plan;

pub use equivalence::{Equivalence, Identity, PackageIdOnly, PackageIdentity, SeenSet, distinct_by};
pub use federated::{FederatedQuery, MergeOptions, MergeStream, Scalar, ScalarValue};
pub use ordering::OrderingComparer;
pub use paged::{DEFAULT_PAGE_SIZE, PagedCursor, PagedSource};
pub use peek::PeekQueue;
pub use plan::{Clause, Direction, Filter, KeyExtractor, Predicate, QueryPlan, SortKey, SortValue, Window};

use crate::error::{Error, Result};
use parking_lot::RwLock;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// A lazily evaluated stream of results from one source
pub type ItemStream<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Anything that can evaluate a query plan
///
/// Implementations receive plans that may carry Skip/Take clauses (the paged
/// enumerator appends them) and must honor every clause in chain order. A
/// source that cannot express a clause should fail with
/// [`Error::UnsupportedPlanClause`].
pub trait QuerySource<T>: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Evaluate a plan
    fn query(&self, plan: &QueryPlan<T>) -> Result<ItemStream<T>>;

    /// Count the results of a plan
    fn count(&self, plan: &QueryPlan<T>) -> Result<usize> {
        let mut count = 0;
        for item in self.query(plan)? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

/// A source backed by an in-memory vector
pub struct MemorySource<T> {
    name: String,
    items: RwLock<Vec<T>>,
}

impl<T: Clone> MemorySource<T> {
    pub fn new(name: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(items),
        }
    }

    pub fn push(&self, item: T) {
        self.items.write().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Evaluate a plan against a snapshot of the contents
    pub fn evaluate(&self, plan: &QueryPlan<T>) -> Vec<T> {
        plan.apply(self.items.read().iter().cloned())
    }
}

impl<T> QuerySource<T> for MemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, plan: &QueryPlan<T>) -> Result<ItemStream<T>> {
        Ok(Box::new(self.evaluate(plan).into_iter().map(Ok)))
    }

    fn count(&self, plan: &QueryPlan<T>) -> Result<usize> {
        Ok(self.evaluate(plan).len())
    }
}

/// Build the worker pool used for per-source fan-out
///
/// One thread per source, capped at `max_parallelism`, never fewer than one.
pub fn build_worker_pool(sources: usize, max_parallelism: usize) -> Result<ThreadPool> {
    let threads = sources.clamp(1, max_parallelism.max(1));
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("repofed-worker-{}", i))
        .build()
        .map_err(|e| Error::InitError(format!("Failed to create worker pool: {}", e)))
}
