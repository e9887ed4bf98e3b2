// src/resolver/mod.rs

//! Dependency candidate selection
//!
//! Given every version of a package a repository (or a federation) offers,
//! pick the one that should satisfy a dependency. The rule is:
//!
//! 1. Drop versions excluded by a caller-supplied constraint for the id.
//! 2. Drop prereleases unless they are allowed.
//! 3. With `prefer_listed`, try the listed candidates first and fall back to
//!    all candidates only if none of them qualifies.
//! 4. With a version range, keep the satisfying versions and choose by the
//!    [`DependencyVersion`] policy; without one, take the highest version.

use crate::error::{Error, Result};
use crate::package::{Package, PackageDependency};
use crate::version::{PackageVersion, VersionSpec};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Which satisfying version to pick when a dependency carries a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DependencyVersion {
    /// The lowest satisfying version
    #[default]
    Lowest,
    /// The highest patch of the lowest satisfying major.minor
    HighestPatch,
    /// The highest minor of the lowest satisfying major
    HighestMinor,
    /// The highest satisfying version
    Highest,
}

impl fmt::Display for DependencyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyVersion::Lowest => write!(f, "lowest"),
            DependencyVersion::HighestPatch => write!(f, "highest_patch"),
            DependencyVersion::HighestMinor => write!(f, "highest_minor"),
            DependencyVersion::Highest => write!(f, "highest"),
        }
    }
}

impl FromStr for DependencyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "lowest" => Ok(DependencyVersion::Lowest),
            "highest_patch" | "highestpatch" => Ok(DependencyVersion::HighestPatch),
            "highest_minor" | "highestminor" => Ok(DependencyVersion::HighestMinor),
            "highest" => Ok(DependencyVersion::Highest),
            _ => Err(Error::ParseError(format!(
                "Unknown dependency version policy '{}'",
                s
            ))),
        }
    }
}

/// Per-id version constraints supplied by the caller
///
/// Ids are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: HashMap<String, VersionSpec>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, id: &str, spec: VersionSpec) -> Self {
        self.insert(id, spec);
        self
    }

    pub fn insert(&mut self, id: &str, spec: VersionSpec) {
        self.constraints.insert(id.to_ascii_lowercase(), spec);
    }

    pub fn get(&self, id: &str) -> Option<&VersionSpec> {
        self.constraints.get(&id.to_ascii_lowercase())
    }

    /// Whether `version` of `id` passes its constraint (unconstrained ids pass)
    pub fn allows(&self, id: &str, version: &PackageVersion) -> bool {
        self.get(id).is_none_or(|spec| spec.satisfies(version))
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Knobs for a single resolution
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub allow_prerelease: bool,
    pub prefer_listed: bool,
    pub dependency_version: DependencyVersion,
    pub constraints: ConstraintSet,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_prerelease(mut self, allow: bool) -> Self {
        self.allow_prerelease = allow;
        self
    }

    pub fn prefer_listed(mut self, prefer: bool) -> Self {
        self.prefer_listed = prefer;
        self
    }

    pub fn dependency_version(mut self, policy: DependencyVersion) -> Self {
        self.dependency_version = policy;
        self
    }

    pub fn constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Pick the candidate that should satisfy `dependency`
///
/// Candidates whose id differs from the dependency's are ignored.
pub fn resolve_dependency(
    candidates: impl IntoIterator<Item = Package>,
    dependency: &PackageDependency,
    options: &ResolveOptions,
) -> Option<Package> {
    let candidates: Vec<Package> = candidates
        .into_iter()
        .filter(|p| p.has_id(&dependency.id))
        .filter(|p| options.constraints.allows(&p.id, &p.version))
        .filter(|p| options.allow_prerelease || p.is_release())
        .collect();

    if options.prefer_listed {
        let listed: Vec<Package> = candidates.iter().filter(|p| p.listed).cloned().collect();
        if let Some(selected) = select_candidate(listed, dependency, options.dependency_version) {
            return Some(selected);
        }
    }

    select_candidate(candidates, dependency, options.dependency_version)
}

fn select_candidate(
    mut packages: Vec<Package>,
    dependency: &PackageDependency,
    policy: DependencyVersion,
) -> Option<Package> {
    match &dependency.version_spec {
        Some(spec) => {
            packages.retain(|p| spec.satisfies(&p.version));
            packages.sort_by(|a, b| a.version.cmp(&b.version));
            select_dependency(packages, policy)
        }
        // No range: newest wins, first seen on ties
        None => packages
            .into_iter()
            .reduce(|best, p| if p.version > best.version { p } else { best }),
    }
}

/// Choose from candidates sorted ascending by version
pub fn select_dependency(packages: Vec<Package>, policy: DependencyVersion) -> Option<Package> {
    let (major, minor) = {
        let lowest = packages.first()?;
        (lowest.version.major(), lowest.version.minor())
    };

    match policy {
        DependencyVersion::Lowest => packages.into_iter().next(),
        DependencyVersion::Highest => packages.into_iter().last(),
        DependencyVersion::HighestPatch => packages
            .into_iter()
            .filter(|p| p.version.major() == major && p.version.minor() == minor)
            .last(),
        DependencyVersion::HighestMinor => packages
            .into_iter()
            .filter(|p| p.version.major() == major)
            .last(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(version: &str) -> Package {
        Package::parse("Lib", version).unwrap()
    }

    fn candidates() -> Vec<Package> {
        ["1.0.0", "1.0.5", "1.2.0", "1.3.1", "2.0.0", "2.1.0-beta"]
            .iter()
            .map(|v| pkg(v))
            .collect()
    }

    fn dep(range: Option<&str>) -> PackageDependency {
        PackageDependency::parse("lib", range).unwrap()
    }

    fn resolve(range: Option<&str>, options: &ResolveOptions) -> Option<String> {
        resolve_dependency(candidates(), &dep(range), options).map(|p| p.version.to_string())
    }

    #[test]
    fn test_no_range_picks_highest_release() {
        assert_eq!(resolve(None, &ResolveOptions::new()).as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_prerelease_allowed() {
        let options = ResolveOptions::new().allow_prerelease(true);
        assert_eq!(resolve(None, &options).as_deref(), Some("2.1.0-beta"));
    }

    #[test]
    fn test_policies() {
        let range = Some("[1.0,2.0)");
        let pick = |policy| resolve(range, &ResolveOptions::new().dependency_version(policy));

        assert_eq!(pick(DependencyVersion::Lowest).as_deref(), Some("1.0.0"));
        assert_eq!(pick(DependencyVersion::HighestPatch).as_deref(), Some("1.0.5"));
        assert_eq!(pick(DependencyVersion::HighestMinor).as_deref(), Some("1.3.1"));
        assert_eq!(pick(DependencyVersion::Highest).as_deref(), Some("1.3.1"));
    }

    #[test]
    fn test_constraint_narrows_candidates() {
        let constraints = ConstraintSet::new().with("LIB", VersionSpec::parse("[1.2,)").unwrap());
        let options = ResolveOptions::new().constraints(constraints);
        assert_eq!(resolve(Some("1.0"), &options).as_deref(), Some("1.2.0"));
    }

    #[test]
    fn test_prefer_listed_falls_back() {
        let packages = vec![pkg("1.0.0").unlisted(), pkg("1.1.0")];
        let options = ResolveOptions::new().prefer_listed(true);

        let chosen = resolve_dependency(packages.clone(), &dep(Some("1.0")), &options).unwrap();
        assert_eq!(chosen.version.to_string(), "1.1.0");

        // Only the unlisted version satisfies the range
        let chosen = resolve_dependency(packages, &dep(Some("[1.0]")), &options).unwrap();
        assert_eq!(chosen.version.to_string(), "1.0.0");
    }

    #[test]
    fn test_no_candidates() {
        assert!(resolve(Some("[3.0,)"), &ResolveOptions::new()).is_none());
        assert!(resolve_dependency(Vec::new(), &dep(None), &ResolveOptions::new()).is_none());
    }

    #[test]
    fn test_other_ids_are_ignored() {
        let packages = vec![Package::parse("Other", "9.0").unwrap(), pkg("1.0")];
        let chosen = resolve_dependency(packages, &dep(None), &ResolveOptions::new()).unwrap();
        assert_eq!(chosen.id, "Lib");
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("highest-patch".parse::<DependencyVersion>().unwrap(), DependencyVersion::HighestPatch);
        assert_eq!("Highest".parse::<DependencyVersion>().unwrap(), DependencyVersion::Highest);
        assert!("newest".parse::<DependencyVersion>().is_err());
        assert_eq!(DependencyVersion::HighestMinor.to_string(), "highest_minor");
    }
}
