// src/repository/priority.rs

//! Primary/secondary repository pair
//!
//! Queries go to the primary only. Lookups try the primary first and consult
//! the secondary only when the primary has nothing.

use super::{OperationGuard, PackageRepository, SearchCriteria};
use crate::error::Result;
use crate::package::{Package, PackageName};
use crate::query::{ItemStream, PackageIdentity, QueryPlan, distinct_by};
use crate::version::PackageVersion;
use std::sync::Arc;
use tracing::debug;

pub struct PriorityRepository {
    primary: Arc<dyn PackageRepository>,
    secondary: Arc<dyn PackageRepository>,
}

impl PriorityRepository {
    pub fn new(primary: Arc<dyn PackageRepository>, secondary: Arc<dyn PackageRepository>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &Arc<dyn PackageRepository> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn PackageRepository> {
        &self.secondary
    }
}

impl PackageRepository for PriorityRepository {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn query(&self, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>> {
        self.primary.query(plan)
    }

    fn clone_repository(&self) -> Result<Arc<dyn PackageRepository>> {
        Ok(Arc::new(Self::new(
            self.primary.clone_repository()?,
            self.secondary.clone_repository()?,
        )))
    }

    fn count(&self, plan: &QueryPlan<Package>) -> Result<usize> {
        self.primary.count(plan)
    }

    fn search(
        &self,
        criteria: &SearchCriteria,
        plan: &QueryPlan<Package>,
    ) -> Result<ItemStream<Package>> {
        self.primary.search(criteria, plan)
    }

    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>> {
        match self.primary.find_package(id, version)? {
            Some(package) => Ok(Some(package)),
            None => {
                debug!(
                    "{} {} not in '{}', trying '{}'",
                    id,
                    version,
                    self.primary.name(),
                    self.secondary.name()
                );
                self.secondary.find_package(id, version)
            }
        }
    }

    fn exists(&self, id: &str, version: &PackageVersion) -> Result<bool> {
        Ok(self.primary.exists(id, version)? || self.secondary.exists(id, version)?)
    }

    fn find_packages_by_id(&self, id: &str) -> Result<Vec<Package>> {
        let mut packages = self.primary.find_packages_by_id(id)?;
        if packages.is_empty() {
            packages = self.secondary.find_packages_by_id(id)?;
        }
        Ok(distinct_by(packages, &PackageIdentity))
    }

    fn supports_prerelease(&self) -> bool {
        self.primary.supports_prerelease()
    }

    fn start_operation(&self, operation: &str, package: Option<&PackageName>) -> OperationGuard {
        OperationGuard::all([
            self.primary.start_operation(operation, package),
            self.secondary.start_operation(operation, package),
        ])
    }
}
