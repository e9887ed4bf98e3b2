// src/repository/mod.rs

//! Package repositories
//!
//! A [`PackageRepository`] evaluates query plans over its packages and answers
//! the lookups package managers need: exact lookups, all versions of an id,
//! available updates and dependency resolution. Only `name`, `query` and
//! `clone_repository` are required; every lookup has a default built on
//! `query` that remote implementations can override with a cheaper call.

mod memory;
mod operation;
mod priority;

pub use memory::MemoryRepository;
pub use operation::OperationGuard;
pub use priority::PriorityRepository;

use crate::error::Result;
use crate::federation::Federation;
use crate::package::{Package, PackageDependency, PackageName, collapse_by_id};
use crate::query::{ItemStream, QueryPlan};
use crate::resolver::{self, ConstraintSet, ResolveOptions};
use crate::version::PackageVersion;
use std::sync::Arc;

/// Options for [`PackageRepository::get_updates`]
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub include_prerelease: bool,
    /// Return every newer version instead of only the newest per id
    pub include_all_versions: bool,
    /// Updates outside these ranges are not offered
    pub constraints: ConstraintSet,
}

/// What [`PackageRepository::search`] looks for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Matched case-insensitively against id and description; empty matches all
    pub term: String,
    pub allow_prerelease: bool,
    /// Also return packages hidden from listings
    pub include_unlisted: bool,
}

impl SearchCriteria {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn allow_prerelease(mut self, allow: bool) -> Self {
        self.allow_prerelease = allow;
        self
    }

    pub fn include_unlisted(mut self, include: bool) -> Self {
        self.include_unlisted = include;
        self
    }

    pub fn matches(&self, package: &Package) -> bool {
        (self.allow_prerelease || package.is_release())
            && (self.include_unlisted || package.listed)
            && self.matches_term(package)
    }

    fn matches_term(&self, package: &Package) -> bool {
        let term = self.term.to_lowercase();
        package.id.to_lowercase().contains(&term)
            || package
                .description
                .as_ref()
                .is_some_and(|description| description.to_lowercase().contains(&term))
    }

    /// The criteria as a filter-only plan
    pub fn to_plan(&self) -> QueryPlan<Package> {
        let criteria = self.clone();
        QueryPlan::new().filter("search", move |package: &Package| criteria.matches(package))
    }
}

/// Builds repositories from source strings (URLs, paths, names)
pub trait RepositoryFactory {
    fn create_repository(&self, source: &str) -> Result<Arc<dyn PackageRepository>>;
}

impl<F> RepositoryFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn PackageRepository>>,
{
    fn create_repository(&self, source: &str) -> Result<Arc<dyn PackageRepository>> {
        self(source)
    }
}

/// A source of packages
pub trait PackageRepository: Send + Sync {
    /// Display name used in logs and errors
    fn name(&self) -> &str;

    /// Evaluate a query plan over all packages
    fn query(&self, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>>;

    /// An independent copy of this repository
    fn clone_repository(&self) -> Result<Arc<dyn PackageRepository>>;

    /// Count the packages a plan matches
    fn count(&self, plan: &QueryPlan<Package>) -> Result<usize> {
        let mut count = 0;
        for package in self.query(plan)? {
            package?;
            count += 1;
        }
        Ok(count)
    }

    /// Packages matching `criteria`, with `plan` applied to the matches
    ///
    /// Repositories with a native search should override this; the default
    /// filters `query`.
    fn search(
        &self,
        criteria: &SearchCriteria,
        plan: &QueryPlan<Package>,
    ) -> Result<ItemStream<Package>> {
        self.query(&criteria.to_plan().chain(plan))
    }

    /// Find one exact id + version
    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>> {
        let (id, version) = (id.to_string(), version.clone());
        let plan = QueryPlan::new()
            .filter("id_version", move |p: &Package| p.is(&id, &version))
            .take(1);
        self.query(&plan)?.next().transpose()
    }

    fn exists(&self, id: &str, version: &PackageVersion) -> Result<bool> {
        Ok(self.find_package(id, version)?.is_some())
    }

    /// Every version of an id
    fn find_packages_by_id(&self, id: &str) -> Result<Vec<Package>> {
        let id = id.to_string();
        let plan = QueryPlan::new().filter("id", move |p: &Package| p.has_id(&id));
        self.query(&plan)?.collect()
    }

    /// Versions newer than the installed ones
    fn get_updates(&self, packages: &[PackageName], options: &UpdateOptions) -> Result<Vec<Package>> {
        let mut updates = Vec::new();
        for installed in packages {
            let candidates = self.find_packages_by_id(&installed.id)?;
            updates.extend(candidates.into_iter().filter(|candidate| {
                candidate.version > installed.version
                    && (options.include_prerelease || candidate.is_release())
                    && options.constraints.allows(&candidate.id, &candidate.version)
            }));
        }

        if options.include_all_versions {
            Ok(updates)
        } else {
            Ok(collapse_by_id(updates))
        }
    }

    /// Pick the package that should satisfy a dependency
    fn resolve_dependency(
        &self,
        dependency: &PackageDependency,
        options: &ResolveOptions,
    ) -> Result<Option<Package>> {
        let candidates = self.find_packages_by_id(&dependency.id)?;
        Ok(resolver::resolve_dependency(candidates, dependency, options))
    }

    fn supports_prerelease(&self) -> bool {
        true
    }

    /// Announce an operation on `package`; it ends when the guard is dropped
    fn start_operation(&self, _operation: &str, _package: Option<&PackageName>) -> OperationGuard {
        OperationGuard::noop()
    }

    /// Federations expose themselves here so they can be flattened when nested
    fn as_federation(&self) -> Option<&Federation> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionSpec;

    fn repo() -> MemoryRepository {
        MemoryRepository::new(
            "local",
            vec![
                Package::parse("A", "1.0").unwrap(),
                Package::parse("A", "1.5").unwrap(),
                Package::parse("A", "2.0-rc.1").unwrap(),
                Package::parse("A", "2.0").unwrap(),
                Package::parse("B", "0.1").unwrap(),
            ],
        )
    }

    fn installed(id: &str, version: &str) -> PackageName {
        PackageName::new(id, PackageVersion::parse(version).unwrap())
    }

    #[test]
    fn test_default_lookups() {
        let repo = repo();
        let v15 = PackageVersion::parse("1.5").unwrap();

        assert_eq!(repo.find_package("a", &v15).unwrap().unwrap().version, v15);
        assert!(repo.exists("A", &v15).unwrap());
        assert!(!repo.exists("A", &PackageVersion::parse("9.9").unwrap()).unwrap());
        assert_eq!(repo.find_packages_by_id("a").unwrap().len(), 4);
        assert_eq!(repo.count(&QueryPlan::new()).unwrap(), 5);
    }

    #[test]
    fn test_get_updates_newest_only() {
        let updates = repo()
            .get_updates(&[installed("A", "1.0"), installed("B", "0.1")], &UpdateOptions::default())
            .unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].version.to_string(), "2.0.0");
    }

    #[test]
    fn test_get_updates_all_versions_with_prerelease() {
        let options = UpdateOptions {
            include_prerelease: true,
            include_all_versions: true,
            ..Default::default()
        };
        let updates = repo().get_updates(&[installed("A", "1.0")], &options).unwrap();
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn test_get_updates_respects_constraints() {
        let options = UpdateOptions {
            constraints: ConstraintSet::new().with("a", VersionSpec::parse("[1.0,2.0)").unwrap()),
            ..Default::default()
        };
        let updates = repo().get_updates(&[installed("A", "1.0")], &options).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].version.to_string(), "1.5.0");
    }

    #[test]
    fn test_default_search() {
        let repo = repo();
        repo.add(Package::parse("a-tools", "1.0").unwrap().unlisted());
        let by_version =
            QueryPlan::new().order_by_descending("version", |p: &Package| p.version.clone());

        let found: Vec<String> = repo
            .search(&SearchCriteria::new("A"), &by_version)
            .unwrap()
            .map(|p| p.unwrap().to_string())
            .collect();
        assert_eq!(found, vec!["A 2.0.0", "A 1.5.0", "A 1.0.0"]);

        let everything = SearchCriteria::new("a").allow_prerelease(true).include_unlisted(true);
        assert_eq!(repo.search(&everything, &QueryPlan::new()).unwrap().count(), 5);
    }

    #[test]
    fn test_search_criteria_matches_description() {
        let package = Package::parse("yaml", "1.0")
            .unwrap()
            .with_description("Parses YAML and JSON");
        assert!(SearchCriteria::new("json").matches(&package));
        assert!(SearchCriteria::new("").matches(&package));
        assert!(!SearchCriteria::new("json").matches(&package.clone().unlisted()));
    }

    #[test]
    fn test_default_start_operation_is_noop() {
        assert!(repo().start_operation("install", None).is_noop());
    }

    #[test]
    fn test_default_resolve_dependency() {
        let dependency = PackageDependency::parse("A", Some("[1.0,2.0)")).unwrap();
        let options = ResolveOptions::new().dependency_version(resolver::DependencyVersion::Highest);
        let chosen = repo().resolve_dependency(&dependency, &options).unwrap().unwrap();
        assert_eq!(chosen.version.to_string(), "1.5.0");
    }
}
