// src/query/equivalence.rs

//! Duplicate detection for merged query results
//!
//! An equivalence maps each item to a hashable key; two items with the same
//! key are considered the same result and only the first one seen survives a
//! merge.

use crate::package::Package;
use crate::version::PackageVersion;
use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Defines when two items are duplicates of each other
pub trait Equivalence<T>: Send + Sync + 'static {
    type Key: Hash + Eq + Send;

    fn key(&self, item: &T) -> Self::Key;
}

/// Items are duplicates when they are equal
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T> Equivalence<T> for Identity
where
    T: Hash + Eq + Clone + Send,
{
    type Key = T;

    fn key(&self, item: &T) -> T {
        item.clone()
    }
}

/// Packages are duplicates when id (case-insensitive) and version match
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageIdentity;

impl Equivalence<Package> for PackageIdentity {
    type Key = (String, PackageVersion);

    fn key(&self, package: &Package) -> Self::Key {
        (package.id.to_ascii_lowercase(), package.version.clone())
    }
}

/// Packages are duplicates when their ids match, whatever the version
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageIdOnly;

impl Equivalence<Package> for PackageIdOnly {
    type Key = String;

    fn key(&self, package: &Package) -> String {
        package.id.to_ascii_lowercase()
    }
}

/// The set of keys already emitted by one enumeration
pub struct SeenSet<T, E: Equivalence<T>> {
    equivalence: Arc<E>,
    keys: HashSet<E::Key>,
    _item: PhantomData<fn(&T)>,
}

impl<T, E: Equivalence<T>> SeenSet<T, E> {
    pub fn new(equivalence: Arc<E>) -> Self {
        Self {
            equivalence,
            keys: HashSet::new(),
            _item: PhantomData,
        }
    }

    /// Record an item; `false` if an equivalent item was already recorded
    pub fn insert(&mut self, item: &T) -> bool {
        self.keys.insert(self.equivalence.key(item))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Keep the first of every group of equivalent items, preserving order
pub fn distinct_by<T, E: Equivalence<T>>(
    items: impl IntoIterator<Item = T>,
    equivalence: &E,
) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(equivalence.key(item)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(id: &str, version: &str) -> Package {
        Package::parse(id, version).unwrap()
    }

    #[test]
    fn test_package_identity_ignores_case() {
        let eq = PackageIdentity;
        assert_eq!(eq.key(&package("Foo", "1.0")), eq.key(&package("foo", "1.0")));
        assert_ne!(eq.key(&package("foo", "1.0")), eq.key(&package("foo", "1.1")));
    }

    #[test]
    fn test_seen_set_rejects_duplicates() {
        let mut seen = SeenSet::new(Arc::new(PackageIdOnly));
        assert!(seen.insert(&package("a", "1.0")));
        assert!(!seen.insert(&package("A", "2.0")));
        assert!(seen.insert(&package("b", "1.0")));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_distinct_by_keeps_first() {
        let packages = vec![
            package("a", "1.0"),
            package("b", "1.0"),
            package("A", "1.0"),
            package("a", "2.0"),
        ];
        let distinct = distinct_by(packages, &PackageIdentity);
        assert_eq!(distinct.len(), 3);
        assert_eq!(distinct[0].id, "a");

        assert_eq!(distinct_by(vec![3, 1, 3, 2, 1], &Identity), vec![3, 1, 2]);
    }
}
