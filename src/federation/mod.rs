// src/federation/mod.rs
//! Repository Federation
//!
//! Presents several package repositories as one. A [`Federation`] is itself a
//! [`PackageRepository`], so federations can be nested; nested members are
//! flattened into the outer federation at construction.
//!
//! # Failure policy
//!
//! With `ignore_failures` (the default), a repository that fails a call is
//! marked as failing and contributes the operation's empty result from then
//! on. Without it, the first failure aborts the operation as a
//! [`Error::SourceFailure`]. Programming errors (a merged query without an
//! ordering, a clause a repository cannot express) always propagate.
//!
//! # Operations
//!
//! - **Queries** (`list_all`, `search`, `query`) merge the members' streams via
//!   [`FederatedQuery`], dropping duplicate id + version pairs. Searches run
//!   each member's own [`PackageRepository::search`].
//! - **Exact lookups** (`find_package`, `exists`) ask members one at a time in
//!   registration order and stop at the first hit.
//! - **Fan-out lookups** (`find_packages_by_id`, `get_updates`, vertical
//!   dependency resolution) ask all members in parallel on the federation's
//!   worker pool.
//!
//! # Usage
//!
//! ```toml
//! [federation]
//! ignore_failures = true
//! resolve_dependencies_vertically = false
//! ```

mod config;
mod tracker;

pub use config::FederationConfig;
pub use tracker::{FailureRecord, FailureTracker, SourceId};

use crate::error::{Error, Result};
use crate::package::{Package, PackageDependency, PackageName, collapse_by_id};
use crate::query::{
    FederatedQuery, ItemStream, PackageIdentity, QueryPlan, QuerySource, build_worker_pool,
    distinct_by,
};
use crate::repository::{
    OperationGuard, PackageRepository, RepositoryFactory, SearchCriteria, UpdateOptions,
};
use crate::resolver::{self, ResolveOptions};
use crate::version::PackageVersion;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name a federation reports as a repository
pub const AGGREGATE_NAME: &str = "(Aggregate source)";

/// A repository registered with a federation
#[derive(Clone)]
struct Member {
    id: SourceId,
    repository: Arc<dyn PackageRepository>,
}

impl Member {
    fn name(&self) -> &str {
        self.repository.name()
    }
}

/// Run one call against a member under the failure policy
fn guarded<R>(
    member: &Member,
    failures: &FailureTracker,
    ignore_failures: bool,
    default: R,
    op: impl FnOnce(&dyn PackageRepository) -> Result<R>,
) -> Result<R> {
    if !ignore_failures {
        return op(&*member.repository).map_err(|e| e.into_source_failure(member.name()));
    }

    if failures.should_skip(&member.id) {
        debug!("[federation] Skipping failing repository '{}'", member.name());
        return Ok(default);
    }

    match op(&*member.repository) {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            report_failure(member, failures, &e);
            Ok(default)
        }
    }
}

fn report_failure(member: &Member, failures: &FailureTracker, error: &Error) {
    warn!(
        "[federation] Repository '{}' failed, ignoring it from now on: {}",
        member.name(),
        error
    );
    failures.record_failure(member.id, member.name(), error);
}

/// What a guarded member is asked for
#[derive(Clone)]
enum Listing {
    All,
    Search(Arc<SearchCriteria>),
}

/// A member seen through the failure policy, for use in merged queries
struct GuardedRepository {
    member: Member,
    listing: Listing,
    failures: Arc<FailureTracker>,
    ignore_failures: bool,
}

impl GuardedRepository {
    fn list(&self, repository: &dyn PackageRepository, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>> {
        match &self.listing {
            Listing::All => repository.query(plan),
            Listing::Search(criteria) => repository.search(criteria, plan),
        }
    }
}

impl QuerySource<Package> for GuardedRepository {
    fn name(&self) -> &str {
        self.member.name()
    }

    fn query(&self, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>> {
        let empty: ItemStream<Package> = Box::new(std::iter::empty());
        guarded(
            &self.member,
            &self.failures,
            self.ignore_failures,
            empty,
            |repository| {
                let stream = self.list(repository, plan)?;
                if !self.ignore_failures {
                    return Ok(stream);
                }
                Ok(Box::new(TrackedStream {
                    inner: stream,
                    member: self.member.clone(),
                    failures: Arc::clone(&self.failures),
                    done: false,
                }) as ItemStream<Package>)
            },
        )
    }

    fn count(&self, plan: &QueryPlan<Package>) -> Result<usize> {
        guarded(&self.member, &self.failures, self.ignore_failures, 0, |repository| {
            match &self.listing {
                Listing::All => repository.count(plan),
                Listing::Search(criteria) => {
                    let mut count = 0;
                    for package in repository.search(criteria, plan)? {
                        package?;
                        count += 1;
                    }
                    Ok(count)
                }
            }
        })
    }
}

/// Ends a member's stream at its first non-fatal error, marking it failing
struct TrackedStream {
    inner: ItemStream<Package>,
    member: Member,
    failures: Arc<FailureTracker>,
    done: bool,
}

impl Iterator for TrackedStream {
    type Item = Result<Package>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Err(e)) if !e.is_fatal() => {
                report_failure(&self.member, &self.failures, &e);
                self.done = true;
                None
            }
            other => other,
        }
    }
}

/// Several repositories behaving as one
pub struct Federation {
    /// Flattened members in registration order
    members: Vec<Member>,
    /// Federation configuration
    config: FederationConfig,
    /// Repositories marked as failing
    failures: Arc<FailureTracker>,
    /// Workers for per-member fan-out and merge rounds
    pool: Arc<ThreadPool>,
    /// Computed on first use
    supports_prerelease: OnceLock<bool>,
}

impl Federation {
    /// Create a federation over `repositories`
    ///
    /// Nested federations contribute their members instead of themselves.
    pub fn new(
        repositories: Vec<Arc<dyn PackageRepository>>,
        config: FederationConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut members = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let nested = repository.as_federation().map(|f| f.members.clone());
            match nested {
                Some(nested) => {
                    debug!("[federation] Flattening nested federation ({} members)", nested.len());
                    members.extend(nested);
                }
                None => members.push(Member {
                    id: Uuid::new_v4(),
                    repository,
                }),
            }
        }

        let pool = build_worker_pool(members.len(), config.max_parallelism)?;

        info!(
            "[federation] Federating {} repositories (ignore_failures: {})",
            members.len(),
            config.ignore_failures
        );

        Ok(Self {
            members,
            config,
            failures: Arc::new(FailureTracker::new()),
            pool: Arc::new(pool),
            supports_prerelease: OnceLock::new(),
        })
    }

    /// Create a federation with the default configuration
    pub fn with_defaults(repositories: Vec<Arc<dyn PackageRepository>>) -> Result<Self> {
        Self::new(repositories, FederationConfig::default())
    }

    /// Create a federation over repositories built from source strings
    ///
    /// With `ignore_failures`, sources the factory cannot build are logged and
    /// left out; otherwise the first failure is returned.
    pub fn from_sources<S: AsRef<str>>(
        factory: &dyn RepositoryFactory,
        sources: &[S],
        config: FederationConfig,
    ) -> Result<Self> {
        let mut repositories = Vec::with_capacity(sources.len());
        for source in sources {
            let source = source.as_ref();
            match factory.create_repository(source) {
                Ok(repository) => repositories.push(repository),
                Err(e) if config.ignore_failures && !e.is_fatal() => {
                    warn!("[federation] Skipping source '{}': {}", source, e);
                }
                Err(e) => return Err(e.into_source_failure(source)),
            }
        }
        Self::new(repositories, config)
    }

    /// The repository to use for a list of sources
    ///
    /// No sources gives `None`. A single source is built directly, without a
    /// federation around it.
    pub fn create<S: AsRef<str>>(
        factory: &dyn RepositoryFactory,
        sources: &[S],
        config: FederationConfig,
    ) -> Result<Option<Arc<dyn PackageRepository>>> {
        match sources {
            [] => Ok(None),
            [single] => factory.create_repository(single.as_ref()).map(Some),
            _ => Ok(Some(Arc::new(Self::from_sources(factory, sources, config)?))),
        }
    }

    /// Member repositories in registration order
    pub fn repositories(&self) -> Vec<Arc<dyn PackageRepository>> {
        self.members
            .iter()
            .map(|member| Arc::clone(&member.repository))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Failure tracker of this federation
    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Names of the members currently marked as failing
    pub fn failing_repositories(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|member| self.failures.is_failing(&member.id))
            .map(|member| member.name().to_string())
            .collect()
    }

    /// A fresh federation over clones of every member
    ///
    /// The configuration carries over; failure marks do not.
    pub fn try_clone(&self) -> Result<Federation> {
        let repositories = self
            .members
            .iter()
            .map(|member| member.repository.clone_repository())
            .collect::<Result<Vec<_>>>()?;
        Federation::new(repositories, self.config.clone())
    }

    fn wrap<R>(
        &self,
        member: &Member,
        default: R,
        op: impl FnOnce(&dyn PackageRepository) -> Result<R>,
    ) -> Result<R> {
        guarded(member, &self.failures, self.config.ignore_failures, default, op)
    }

    /// Call every member in parallel; results come back in registration order
    fn fan_out<R: Send>(
        &self,
        default: impl Fn() -> R + Sync,
        op: impl Fn(&dyn PackageRepository) -> Result<R> + Sync,
    ) -> Result<Vec<R>> {
        let outcomes: Vec<Result<R>> = self.pool.install(|| {
            self.members
                .par_iter()
                .map(|member| self.wrap(member, default(), &op))
                .collect()
        });
        outcomes.into_iter().collect()
    }

    fn sources(&self, listing: Listing) -> Vec<Arc<dyn QuerySource<Package>>> {
        self.members
            .iter()
            .map(|member| {
                Arc::new(GuardedRepository {
                    member: member.clone(),
                    listing: listing.clone(),
                    failures: Arc::clone(&self.failures),
                    ignore_failures: self.config.ignore_failures,
                }) as Arc<dyn QuerySource<Package>>
            })
            .collect()
    }

    /// Every package of every member, merged
    pub fn list_all(&self) -> FederatedQuery<Package, PackageIdentity> {
        FederatedQuery::with_pool(
            self.sources(Listing::All),
            PackageIdentity,
            self.config.merge_options(),
            Arc::clone(&self.pool),
        )
    }

    /// Merged query running `plan`
    pub fn query_plan(&self, plan: QueryPlan<Package>) -> FederatedQuery<Package, PackageIdentity> {
        self.list_all().with_plan(plan)
    }

    /// Packages whose id or description contains `term` (case-insensitive)
    ///
    /// Prereleases and unlisted packages are left out unless asked for.
    pub fn search(
        &self,
        term: &str,
        allow_prerelease: bool,
        include_unlisted: bool,
    ) -> FederatedQuery<Package, PackageIdentity> {
        self.search_with(
            SearchCriteria::new(term)
                .allow_prerelease(allow_prerelease)
                .include_unlisted(include_unlisted),
        )
    }

    /// Merged results of every member's own search
    pub fn search_with(
        &self,
        criteria: SearchCriteria,
    ) -> FederatedQuery<Package, PackageIdentity> {
        FederatedQuery::with_pool(
            self.sources(Listing::Search(Arc::new(criteria))),
            PackageIdentity,
            self.config.merge_options(),
            Arc::clone(&self.pool),
        )
    }
}

impl PackageRepository for Federation {
    fn name(&self) -> &str {
        AGGREGATE_NAME
    }

    fn query(&self, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>> {
        Ok(Box::new(self.query_plan(plan.clone()).iter()))
    }

    fn clone_repository(&self) -> Result<Arc<dyn PackageRepository>> {
        Ok(Arc::new(self.try_clone()?))
    }

    fn count(&self, plan: &QueryPlan<Package>) -> Result<usize> {
        self.query_plan(plan.clone()).count()
    }

    fn search(
        &self,
        criteria: &SearchCriteria,
        plan: &QueryPlan<Package>,
    ) -> Result<ItemStream<Package>> {
        Ok(Box::new(
            self.search_with(criteria.clone()).with_plan(plan.clone()).iter(),
        ))
    }

    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>> {
        for member in &self.members {
            if let Some(package) = self.wrap(member, None, |repo| repo.find_package(id, version))? {
                debug!("[federation] Found {} {} in '{}'", id, version, member.name());
                return Ok(Some(package));
            }
        }
        Ok(None)
    }

    fn exists(&self, id: &str, version: &PackageVersion) -> Result<bool> {
        for member in &self.members {
            if self.wrap(member, false, |repo| repo.exists(id, version))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn find_packages_by_id(&self, id: &str) -> Result<Vec<Package>> {
        let results = self.fan_out(Vec::new, |repo| repo.find_packages_by_id(id))?;
        Ok(distinct_by(results.into_iter().flatten(), &PackageIdentity))
    }

    fn get_updates(&self, packages: &[PackageName], options: &UpdateOptions) -> Result<Vec<Package>> {
        let results = self.fan_out(Vec::new, |repo| repo.get_updates(packages, options))?;
        let mut updates = distinct_by(results.into_iter().flatten(), &PackageIdentity);

        if options.include_all_versions {
            updates.sort_by(|a, b| {
                a.id.to_ascii_lowercase()
                    .cmp(&b.id.to_ascii_lowercase())
                    .then_with(|| a.version.cmp(&b.version))
            });
            Ok(updates)
        } else {
            Ok(collapse_by_id(updates))
        }
    }

    fn resolve_dependency(
        &self,
        dependency: &PackageDependency,
        options: &ResolveOptions,
    ) -> Result<Option<Package>> {
        if self.config.resolve_dependencies_vertically {
            let results = self.fan_out(
                || None,
                |repo| repo.resolve_dependency(dependency, options),
            )?;
            return Ok(results.into_iter().flatten().next());
        }

        let id = dependency.id.clone();
        let candidates = self
            .list_all()
            .filter("id", move |package: &Package| package.has_id(&id))
            .to_vec()?;
        Ok(resolver::resolve_dependency(candidates, dependency, options))
    }

    fn supports_prerelease(&self) -> bool {
        *self.supports_prerelease.get_or_init(|| {
            self.members.iter().all(|member| {
                match self.wrap(member, true, |repo| Ok(repo.supports_prerelease())) {
                    Ok(supported) => supported,
                    Err(e) => {
                        warn!(
                            "[federation] Assuming '{}' supports prereleases: {}",
                            member.name(),
                            e
                        );
                        true
                    }
                }
            })
        })
    }

    fn start_operation(&self, operation: &str, package: Option<&PackageName>) -> OperationGuard {
        debug!(
            "[federation] Starting '{}' on {} repositories",
            operation,
            self.members.len()
        );
        OperationGuard::all(
            self.members
                .iter()
                .map(|member| member.repository.start_operation(operation, package)),
        )
    }

    fn as_federation(&self) -> Option<&Federation> {
        Some(self)
    }
}
