// src/query/plan.rs

//! Immutable query plans
//!
//! A plan is an ordered list of clauses. Chaining a clause produces a new
//! plan; existing plans are never mutated, so they can be shared freely
//! between threads and between federated queries.

use crate::version::PackageVersion;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Predicate applied by a filter clause
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Extracts the value an ordering clause sorts on
pub type KeyExtractor<T> = Arc<dyn Fn(&T) -> SortValue + Send + Sync>;

/// A comparable sort key value
///
/// Variants are ordered `Null < Bool < Int < Text < Version`, so a null key
/// always sorts before any concrete value and two nulls compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Version(PackageVersion),
}

impl From<bool> for SortValue {
    fn from(value: bool) -> Self {
        SortValue::Bool(value)
    }
}

impl From<i64> for SortValue {
    fn from(value: i64) -> Self {
        SortValue::Int(value)
    }
}

impl From<i32> for SortValue {
    fn from(value: i32) -> Self {
        SortValue::Int(i64::from(value))
    }
}

impl From<u32> for SortValue {
    fn from(value: u32) -> Self {
        SortValue::Int(i64::from(value))
    }
}

impl From<String> for SortValue {
    fn from(value: String) -> Self {
        SortValue::Text(value)
    }
}

impl From<&str> for SortValue {
    fn from(value: &str) -> Self {
        SortValue::Text(value.to_string())
    }
}

impl From<PackageVersion> for SortValue {
    fn from(value: PackageVersion) -> Self {
        SortValue::Version(value)
    }
}

impl<V: Into<SortValue>> From<Option<V>> for SortValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(SortValue::Null, Into::into)
    }
}

/// Sort direction of an ordering clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "asc"),
            Direction::Descending => write!(f, "desc"),
        }
    }
}

/// A named filter predicate
///
/// The name lets remote sources translate well-known filters into their
/// native query language, or reject ones they cannot express.
pub struct Filter<T> {
    name: String,
    predicate: Predicate<T>,
}

impl<T> Filter<T> {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, item: &T) -> bool {
        (self.predicate)(item)
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("name", &self.name).finish()
    }
}

/// A named sort key with its direction
pub struct SortKey<T> {
    name: String,
    direction: Direction,
    extract: KeyExtractor<T>,
}

impl<T> SortKey<T> {
    pub fn new<V, F>(name: impl Into<String>, direction: Direction, extract: F) -> Self
    where
        V: Into<SortValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            direction,
            extract: Arc::new(move |item| extract(item).into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Extract this key's value from an item
    pub fn value(&self, item: &T) -> SortValue {
        (self.extract)(item)
    }

    /// Compare two items on this key alone, honoring the direction
    pub fn compare(&self, left: &T, right: &T) -> Ordering {
        let ordering = self.value(left).cmp(&self.value(right));
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            direction: self.direction,
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<T> fmt::Debug for SortKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortKey")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish()
    }
}

/// One operation in a query plan
pub enum Clause<T> {
    Filter(Filter<T>),
    /// Starts a new ordering, replacing any earlier one
    OrderBy(SortKey<T>),
    /// Adds a tie-breaker to the current ordering
    ThenBy(SortKey<T>),
    Skip(usize),
    Take(usize),
}

impl<T> Clause<T> {
    pub fn is_pagination(&self) -> bool {
        matches!(self, Clause::Skip(_) | Clause::Take(_))
    }

    /// Filter and ordering clauses change what each source has to return
    pub fn changes_sub_queries(&self) -> bool {
        matches!(
            self,
            Clause::Filter(_) | Clause::OrderBy(_) | Clause::ThenBy(_)
        )
    }
}

impl<T> Clone for Clause<T> {
    fn clone(&self) -> Self {
        match self {
            Clause::Filter(filter) => Clause::Filter(filter.clone()),
            Clause::OrderBy(key) => Clause::OrderBy(key.clone()),
            Clause::ThenBy(key) => Clause::ThenBy(key.clone()),
            Clause::Skip(n) => Clause::Skip(*n),
            Clause::Take(n) => Clause::Take(*n),
        }
    }
}

impl<T> fmt::Debug for Clause<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl<T> fmt::Display for Clause<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Filter(filter) => write!(f, "where {}", filter.name),
            Clause::OrderBy(key) => write!(f, "order by {} {}", key.name, key.direction),
            Clause::ThenBy(key) => write!(f, "then by {} {}", key.name, key.direction),
            Clause::Skip(n) => write!(f, "skip {}", n),
            Clause::Take(n) => write!(f, "take {}", n),
        }
    }
}

/// The combined effect of every Skip/Take clause in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub skip: usize,
    pub take: Option<usize>,
}

impl Window {
    /// Fold one more pagination clause into the window
    pub fn then(self, clause: &Clause<impl Sized>) -> Self {
        match clause {
            Clause::Skip(n) => Window {
                skip: self.skip.saturating_add(*n),
                take: self.take.map(|take| take.saturating_sub(*n)),
            },
            Clause::Take(n) => Window {
                skip: self.skip,
                take: Some(self.take.map_or(*n, |take| take.min(*n))),
            },
            _ => self,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.skip == 0 && self.take.is_none()
    }
}

/// An immutable, inspectable description of a query
pub struct QueryPlan<T> {
    clauses: Vec<Clause<T>>,
}

impl<T> QueryPlan<T> {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    pub fn clauses(&self) -> &[Clause<T>] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// A new plan with one more clause appended
    pub fn with(&self, clause: Clause<T>) -> Self {
        let mut clauses = self.clauses.clone();
        clauses.push(clause);
        Self { clauses }
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

    /// This plan followed by every clause of `next`
    pub fn chain(&self, next: &QueryPlan<T>) -> Self {
        let mut clauses = self.clauses.clone();
        clauses.extend(next.clauses.iter().cloned());
        Self { clauses }
    }

    /// The same plan with every Skip/Take clause removed
    ///
    /// Pagination only makes sense on the merged stream, so this is what gets
    /// pushed down to individual sources.
    pub fn without_pagination(&self) -> Self {
        Self {
            clauses: self
                .clauses
                .iter()
                .filter(|clause| !clause.is_pagination())
                .cloned()
                .collect(),
        }
    }

    pub fn has_pagination(&self) -> bool {
        self.clauses.iter().any(Clause::is_pagination)
    }

    /// Combined pagination window of the plan
    pub fn window(&self) -> Window {
        self.clauses
            .iter()
            .fold(Window::default(), |window, clause| window.then(clause))
    }

    /// The active ordering: the last OrderBy and the ThenBy clauses after it
    pub fn ordering(&self) -> Vec<&SortKey<T>> {
        let mut keys = Vec::new();
        for clause in &self.clauses {
            match clause {
                Clause::OrderBy(key) => {
                    keys.clear();
                    keys.push(key);
                }
                Clause::ThenBy(key) => keys.push(key),
                _ => {}
            }
        }
        keys
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter<T>> {
        self.clauses.iter().filter_map(|clause| match clause {
            Clause::Filter(filter) => Some(filter),
            _ => None,
        })
    }

    /// Evaluate the plan against an in-memory collection
    ///
    /// Clauses are applied in chain order, so `skip(5).filter(..)` filters
    /// what is left after skipping.
    pub fn apply(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let mut items: Vec<T> = items.into_iter().collect();
        let mut ordering: Vec<&SortKey<T>> = Vec::new();

        for clause in &self.clauses {
            match clause {
                Clause::Filter(filter) => items.retain(|item| filter.matches(item)),
                Clause::OrderBy(key) => {
                    ordering.clear();
                    ordering.push(key);
                    items.sort_by(|a, b| compare_by_keys(&ordering, a, b));
                }
                Clause::ThenBy(key) => {
                    ordering.push(key);
                    items.sort_by(|a, b| compare_by_keys(&ordering, a, b));
                }
                Clause::Skip(n) => {
                    let n = (*n).min(items.len());
                    items.drain(..n);
                }
                Clause::Take(n) => items.truncate(*n),
            }
        }

        items
    }
}

/// Compare two items key by key; the first differing key decides
pub(crate) fn compare_by_keys<T>(keys: &[&SortKey<T>], left: &T, right: &T) -> Ordering {
    keys.iter()
        .map(|key| key.compare(left, right))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

impl<T> Default for QueryPlan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for QueryPlan<T> {
    fn clone(&self) -> Self {
        Self {
            clauses: self.clauses.clone(),
        }
    }
}

impl<T> fmt::Debug for QueryPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.clauses).finish()
    }
}

impl<T> fmt::Display for QueryPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "all");
        }
        let parts: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(" | "))
    }
}
