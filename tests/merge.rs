// tests/merge.rs

//! Merge engine tests over generic sources: ordering, deduplication,
//! pagination and what gets pushed down to each source.

mod common;

use parking_lot::Mutex;
use repofed::query::{Identity, ItemStream, MemorySource};
use repofed::{
    Clause, Error, FederatedQuery, MergeOptions, QueryPlan, QuerySource, Result, Scalar,
    ScalarValue,
};
use std::sync::Arc;

/// Records every plan it receives and refuses ordering on `title`.
struct RemoteSource {
    inner: MemorySource<(i64, String)>,
    plans: Mutex<Vec<String>>,
}

impl RemoteSource {
    fn new(name: &str, rows: &[(i64, &str)]) -> Self {
        Self {
            inner: MemorySource::new(
                name,
                rows.iter().map(|(n, s)| (*n, s.to_string())).collect(),
            ),
            plans: Mutex::new(Vec::new()),
        }
    }
}

impl QuerySource<(i64, String)> for RemoteSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn query(&self, plan: &QueryPlan<(i64, String)>) -> Result<ItemStream<(i64, String)>> {
        self.plans.lock().push(plan.to_string());
        for clause in plan.clauses() {
            if let Clause::OrderBy(key) | Clause::ThenBy(key) = clause
                && key.name() == "title"
            {
                return Err(Error::UnsupportedPlanClause {
                    source_name: self.name().to_string(),
                    clause: clause.to_string(),
                });
            }
        }
        self.inner.query(plan)
    }
}

type Row = (i64, String);

fn rows(query: &FederatedQuery<Row, Identity>) -> Vec<i64> {
    query.to_vec().unwrap().into_iter().map(|(n, _)| n).collect()
}

fn federate(sources: Vec<Arc<RemoteSource>>) -> FederatedQuery<Row, Identity> {
    let sources: Vec<Arc<dyn QuerySource<Row>>> = sources
        .into_iter()
        .map(|s| s as Arc<dyn QuerySource<Row>>)
        .collect();
    FederatedQuery::new(sources, Identity, MergeOptions::default()).unwrap()
}

#[test]
fn test_ordered_and_unordered_merge() {
    common::init_tracing();
    let query = federate(vec![
        Arc::new(RemoteSource::new("a", &[(1, "x"), (3, "x"), (5, "x")])),
        Arc::new(RemoteSource::new("b", &[(2, "x"), (3, "x"), (6, "x")])),
    ]);

    assert_eq!(rows(&query), vec![1, 3, 5, 2, 6]);
    assert_eq!(rows(&query.order_by("n", |r: &Row| r.0)), vec![1, 2, 3, 5, 6]);
    assert_eq!(
        rows(&query.order_by_descending("n", |r: &Row| r.0)),
        vec![6, 5, 3, 2, 1]
    );
}

#[test]
fn test_then_by_orders_within_ties() {
    let query = federate(vec![
        Arc::new(RemoteSource::new("a", &[(1, "b"), (2, "a")])),
        Arc::new(RemoteSource::new("b", &[(1, "a"), (2, "c")])),
    ])
    .order_by("n", |r: &Row| r.0)
    .then_by_descending("s", |r: &Row| r.1.clone());

    let merged = query.to_vec().unwrap();
    let labels: Vec<String> = merged.iter().map(|(n, s)| format!("{n}{s}")).collect();
    assert_eq!(labels, vec!["1b", "1a", "2c", "2a"]);
}

#[test]
fn test_pagination_is_never_pushed_down() {
    let a = Arc::new(RemoteSource::new("a", &[(1, "x"), (4, "x")]));
    let b = Arc::new(RemoteSource::new("b", &[(2, "x"), (3, "x")]));
    let query = federate(vec![a.clone(), b.clone()])
        .skip(1)
        .filter("small", |r: &Row| r.0 < 10)
        .order_by("n", |r: &Row| r.0)
        .take(2);

    assert_eq!(rows(&query), vec![2, 3]);

    // Sources only ever see the paged enumerator's own window
    for plan in a.plans.lock().iter().chain(b.plans.lock().iter()) {
        assert_eq!(plan, "where small | order by n asc | skip 0 | take 30");
    }
}

#[test]
fn test_unsupported_clause_is_fatal() {
    let query = federate(vec![
        Arc::new(RemoteSource::new("a", &[(1, "x")])),
        Arc::new(RemoteSource::new("b", &[(2, "y")])),
    ]);

    let sorted = query.order_by("title", |r: &Row| r.1.clone());
    match sorted.to_vec() {
        Err(Error::UnsupportedPlanClause { clause, .. }) => {
            assert_eq!(clause, "order by title asc")
        }
        other => panic!("expected unsupported clause, got {other:?}"),
    }
}

#[test]
fn test_scalars_over_merged_stream() {
    let query = federate(vec![
        Arc::new(RemoteSource::new("a", &[(5, "x"), (7, "x")])),
        Arc::new(RemoteSource::new("b", &[(5, "x"), (6, "x")])),
    ])
    .order_by("n", |r: &Row| r.0);

    assert_eq!(query.count().unwrap(), 4);
    assert_eq!(query.to_vec().unwrap().len(), 3);
    assert_eq!(
        query.execute(Scalar::Last).unwrap(),
        ScalarValue::Item(Some((7, "x".to_string())))
    );
    assert_eq!(query.skip(2).first().unwrap().map(|r| r.0), Some(7));
    assert_eq!(query.skip(3).execute(Scalar::Any).unwrap(), ScalarValue::Bool(false));
}

#[test]
fn test_enumerations_are_independent() {
    let query = federate(vec![
        Arc::new(RemoteSource::new("a", &[(1, "x"), (2, "x")])),
        Arc::new(RemoteSource::new("b", &[(2, "x"), (3, "x")])),
    ])
    .order_by("n", |r: &Row| r.0);

    let mut first = query.iter();
    let mut second = query.iter();
    assert_eq!(first.next().unwrap().unwrap().0, 1);
    assert_eq!(first.next().unwrap().unwrap().0, 2);
    assert_eq!(second.next().unwrap().unwrap().0, 1);
    assert_eq!(first.next().unwrap().unwrap().0, 3);
    assert!(first.next().is_none());

    let all: Vec<i64> = (&query).into_iter().map(|r| r.unwrap().0).collect();
    assert_eq!(all, vec![1, 2, 3]);
}
