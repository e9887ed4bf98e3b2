// src/repository/memory.rs

//! In-memory package repository

use super::PackageRepository;
use crate::error::Result;
use crate::package::Package;
use crate::query::{ItemStream, MemorySource, QuerySource, QueryPlan};
use crate::version::PackageVersion;
use std::sync::Arc;

/// A repository holding its packages in memory
///
/// Plans are evaluated locally, clause by clause.
pub struct MemoryRepository {
    source: MemorySource<Package>,
}

impl MemoryRepository {
    pub fn new(name: impl Into<String>, packages: Vec<Package>) -> Self {
        Self {
            source: MemorySource::new(name, packages),
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn add(&self, package: Package) {
        self.source.push(package);
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn packages(&self) -> Vec<Package> {
        self.source.snapshot()
    }
}

impl PackageRepository for MemoryRepository {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn query(&self, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>> {
        self.source.query(plan)
    }

    fn clone_repository(&self) -> Result<Arc<dyn PackageRepository>> {
        Ok(Arc::new(Self::new(self.source.name(), self.source.snapshot())))
    }

    fn count(&self, plan: &QueryPlan<Package>) -> Result<usize> {
        self.source.count(plan)
    }

    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>> {
        Ok(self
            .source
            .snapshot()
            .into_iter()
            .find(|p| p.is(id, version)))
    }
}
