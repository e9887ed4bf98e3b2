// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use repofed::query::ItemStream;
use repofed::{
    Error, MemoryRepository, OperationGuard, Package, PackageDependency, PackageName,
    PackageRepository, PackageVersion, QueryPlan, ResolveOptions, Result, SearchCriteria,
    UpdateOptions,
};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness (RUST_LOG to adjust).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Parse a package, panicking on bad input.
pub fn pkg(id: &str, version: &str) -> Package {
    Package::parse(id, version).unwrap()
}

pub fn ver(version: &str) -> PackageVersion {
    PackageVersion::parse(version).unwrap()
}

pub fn installed(id: &str, version: &str) -> PackageName {
    PackageName::new(id, ver(version))
}

/// Ordered log of calls made against scripted repositories, shared between them.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A repository that records every call and can be told to fail.
pub struct ScriptedRepository {
    inner: MemoryRepository,
    log: CallLog,
    failing: bool,
}

impl ScriptedRepository {
    pub fn new(name: &str, packages: Vec<Package>, log: &CallLog) -> Self {
        Self {
            inner: MemoryRepository::new(name, packages),
            log: Arc::clone(log),
            failing: false,
        }
    }

    /// Every call fails with a source failure.
    pub fn failing(name: &str, log: &CallLog) -> Self {
        Self {
            inner: MemoryRepository::empty(name),
            log: Arc::clone(log),
            failing: true,
        }
    }

    pub fn shared(self) -> Arc<dyn PackageRepository> {
        Arc::new(self)
    }

    fn record(&self, operation: &str) -> Result<()> {
        self.log
            .lock()
            .push(format!("{}:{}", self.inner.name(), operation));
        if self.failing {
            return Err(Error::source_failure(self.inner.name(), "connection refused"));
        }
        Ok(())
    }
}

impl PackageRepository for ScriptedRepository {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn query(&self, plan: &QueryPlan<Package>) -> Result<ItemStream<Package>> {
        self.record("query")?;
        self.inner.query(plan)
    }

    fn clone_repository(&self) -> Result<Arc<dyn PackageRepository>> {
        Ok(Arc::new(Self {
            inner: MemoryRepository::new(self.inner.name(), self.inner.packages()),
            log: Arc::clone(&self.log),
            failing: self.failing,
        }))
    }

    fn count(&self, plan: &QueryPlan<Package>) -> Result<usize> {
        self.record("count")?;
        self.inner.count(plan)
    }

    fn search(
        &self,
        criteria: &SearchCriteria,
        plan: &QueryPlan<Package>,
    ) -> Result<ItemStream<Package>> {
        self.record("search")?;
        self.inner.search(criteria, plan)
    }

    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>> {
        self.record("find_package")?;
        self.inner.find_package(id, version)
    }

    fn exists(&self, id: &str, version: &PackageVersion) -> Result<bool> {
        self.record("exists")?;
        self.inner.exists(id, version)
    }

    fn find_packages_by_id(&self, id: &str) -> Result<Vec<Package>> {
        self.record("find_packages_by_id")?;
        self.inner.find_packages_by_id(id)
    }

    fn get_updates(&self, packages: &[PackageName], options: &UpdateOptions) -> Result<Vec<Package>> {
        self.record("get_updates")?;
        self.inner.get_updates(packages, options)
    }

    fn resolve_dependency(
        &self,
        dependency: &PackageDependency,
        options: &ResolveOptions,
    ) -> Result<Option<Package>> {
        self.record("resolve_dependency")?;
        self.inner.resolve_dependency(dependency, options)
    }

    fn start_operation(&self, operation: &str, _package: Option<&PackageName>) -> OperationGuard {
        let name = self.inner.name().to_string();
        self.log.lock().push(format!("{}:start {}", name, operation));

        let log = Arc::clone(&self.log);
        let operation = operation.to_string();
        OperationGuard::new(move || log.lock().push(format!("{}:end {}", name, operation)))
    }
}

/// Number of logged calls made to `name`.
pub fn calls_to(log: &CallLog, name: &str) -> usize {
    let prefix = format!("{}:", name);
    log.lock().iter().filter(|call| call.starts_with(&prefix)).count()
}

/// Number of logged `operation` calls made to `name`.
pub fn calls_to_op(log: &CallLog, name: &str, operation: &str) -> usize {
    let call = format!("{}:{}", name, operation);
    log.lock().iter().filter(|logged| **logged == call).count()
}
