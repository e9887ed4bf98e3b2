// src/query/ordering.rs

//! Comparison of items under a plan's ordering clauses

use super::plan::{QueryPlan, SortKey};
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Compares items using the ordering a query plan establishes
///
/// Only the last `OrderBy` and the `ThenBy` clauses chained after it are
/// active; an earlier `OrderBy` is superseded. Keys are compared in order and
/// the first non-equal key decides. Null key values sort before anything else
/// and two nulls move on to the next key.
pub struct OrderingComparer<T> {
    keys: Vec<SortKey<T>>,
}

impl<T> OrderingComparer<T> {
    /// Inspect a plan; `None` if it carries no ordering clause
    pub fn analyze(plan: &QueryPlan<T>) -> Option<Self> {
        let keys: Vec<SortKey<T>> = plan.ordering().into_iter().cloned().collect();
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    /// Like [`analyze`](Self::analyze) but an unordered plan is an error
    pub fn for_plan(plan: &QueryPlan<T>) -> Result<Self> {
        Self::analyze(plan).ok_or(Error::NoOrderingSpecified)
    }

    pub fn keys(&self) -> &[SortKey<T>] {
        &self.keys
    }

    pub fn compare(&self, left: &T, right: &T) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl<T> Clone for OrderingComparer<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<T> fmt::Debug for OrderingComparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderingComparer")
            .field("keys", &self.keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Row {
        name: &'static str,
        rank: Option<i64>,
    }

    fn row(name: &'static str, rank: Option<i64>) -> Row {
        Row { name, rank }
    }

    #[test]
    fn test_analyze_without_ordering() {
        let plan = QueryPlan::<Row>::new().filter("any", |_| true).take(3);
        assert!(OrderingComparer::analyze(&plan).is_none());
        assert!(matches!(
            OrderingComparer::for_plan(&plan),
            Err(Error::NoOrderingSpecified)
        ));
    }

    #[test]
    fn test_compare_single_key() {
        let plan = QueryPlan::<Row>::new().order_by("name", |r: &Row| r.name);
        let comparer = OrderingComparer::for_plan(&plan).unwrap();

        assert_eq!(
            comparer.compare(&row("a", None), &row("b", None)),
            Ordering::Less
        );
        assert_eq!(
            comparer.compare(&row("b", None), &row("b", Some(1))),
            Ordering::Equal
        );
    }

    #[test]
    fn test_compare_descending_flips() {
        let plan = QueryPlan::<Row>::new().order_by_descending("name", |r: &Row| r.name);
        let comparer = OrderingComparer::for_plan(&plan).unwrap();

        assert_eq!(
            comparer.compare(&row("a", None), &row("b", None)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_nulls() {
        let plan = QueryPlan::<Row>::new()
            .order_by("rank", |r: &Row| r.rank)
            .then_by("name", |r: &Row| r.name);
        let comparer = OrderingComparer::for_plan(&plan).unwrap();

        // null before any value
        assert_eq!(
            comparer.compare(&row("z", None), &row("a", Some(0))),
            Ordering::Less
        );
        // two nulls fall through to the next key
        assert_eq!(
            comparer.compare(&row("b", None), &row("a", None)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_last_order_by_wins() {
        let plan = QueryPlan::<Row>::new()
            .order_by("name", |r: &Row| r.name)
            .order_by_descending("rank", |r: &Row| r.rank);
        let comparer = OrderingComparer::for_plan(&plan).unwrap();

        assert_eq!(comparer.keys().len(), 1);
        assert_eq!(comparer.keys()[0].name(), "rank");
        assert_eq!(
            comparer.compare(&row("a", Some(1)), &row("b", Some(2))),
            Ordering::Greater
        );
    }
}
