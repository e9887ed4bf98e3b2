// src/lib.rs

//! Repofed: federated package repositories
//!
//! Query and merge engine that presents many package repositories as one.
//!
//! # Architecture
//!
//! - Query plans: immutable, inspectable clause lists pushed down to sources
//! - Federated queries: per-source paging, k-way ordered merge, deduplication
//! - Federation: failure isolation, sequential and parallel lookups, nesting
//! - Resolver: dependency candidate selection by version policy

mod error;
pub mod federation;
pub mod package;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
pub use federation::{FailureRecord, FailureTracker, Federation, FederationConfig, SourceId};
pub use package::{Package, PackageDependency, PackageName, collapse_by_id};
pub use query::{
    Clause, Direction, Equivalence, FederatedQuery, ItemStream, MemorySource, MergeOptions,
    MergeStream, OrderingComparer, PackageIdentity, QueryPlan, QuerySource, Scalar, ScalarValue,
    SortValue,
};
pub use repository::{
    MemoryRepository, OperationGuard, PackageRepository, PriorityRepository, RepositoryFactory,
    SearchCriteria, UpdateOptions,
};
pub use resolver::{ConstraintSet, DependencyVersion, ResolveOptions};
pub use version::{PackageVersion, VersionSpec};
