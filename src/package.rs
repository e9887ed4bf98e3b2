// src/package.rs

//! Package metadata as seen by the federation
//!
//! Package ids are case-insensitive: `Newtonsoft.Json` and `newtonsoft.json`
//! name the same package.

use crate::error::Result;
use crate::version::{PackageVersion, VersionSpec};
use std::fmt;

/// A dependency declared by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDependency {
    pub id: String,
    /// Acceptable versions (None = any version, newest preferred)
    pub version_spec: Option<VersionSpec>,
}

impl PackageDependency {
    pub fn new(id: impl Into<String>, version_spec: Option<VersionSpec>) -> Self {
        Self {
            id: id.into(),
            version_spec,
        }
    }

    /// Parse a dependency from an id and an optional range string
    pub fn parse(id: impl Into<String>, range: Option<&str>) -> Result<Self> {
        let version_spec = range.map(VersionSpec::parse).transpose()?;
        Ok(Self::new(id, version_spec))
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_spec {
            Some(spec) => write!(f, "{} {}", self.id, spec),
            None => write!(f, "{}", self.id),
        }
    }
}

/// An id + version pair identifying one installed or requested package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName {
    pub id: String,
    pub version: PackageVersion,
}

impl PackageName {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

/// A package available from a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: String,
    pub version: PackageVersion,
    /// Unlisted packages are hidden from searches but still resolvable
    pub listed: bool,
    pub description: Option<String>,
    pub dependencies: Vec<PackageDependency>,
}

impl Package {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
            listed: true,
            description: None,
            dependencies: Vec::new(),
        }
    }

    /// Convenience constructor parsing the version string
    pub fn parse(id: impl Into<String>, version: &str) -> Result<Self> {
        Ok(Self::new(id, PackageVersion::parse(version)?))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_dependency(mut self, dependency: PackageDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn unlisted(mut self) -> Self {
        self.listed = false;
        self
    }

    /// Case-insensitive id comparison
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// Whether this is the given id at exactly the given version
    pub fn is(&self, id: &str, version: &PackageVersion) -> bool {
        self.has_id(id) && &self.version == version
    }

    pub fn is_release(&self) -> bool {
        !self.version.is_prerelease()
    }

    pub fn name(&self) -> PackageName {
        PackageName::new(self.id.clone(), self.version.clone())
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Keep only the highest version of every id, in first-seen id order
pub fn collapse_by_id(packages: impl IntoIterator<Item = Package>) -> Vec<Package> {
    let mut collapsed: Vec<Package> = Vec::new();
    for package in packages {
        match collapsed.iter_mut().find(|p| p.has_id(&package.id)) {
            Some(existing) => {
                if package.version > existing.version {
                    *existing = package;
                }
            }
            None => collapsed.push(package),
        }
    }
    collapsed
}
