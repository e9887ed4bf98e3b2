// src/version/mod.rs

//! Package versions and version ranges
//!
//! Versions are parsed leniently (`1`, `1.2`, `1.2.3`, `1.2.3-beta.1`) and
//! normalized into `semver::Version` for comparison. Ranges use interval
//! notation:
//!
//! - `1.0`        → `>= 1.0`
//! - `[1.0]`      → exactly `1.0`
//! - `[1.0,2.0)`  → `>= 1.0, < 2.0`
//! - `(,2.0]`     → `<= 2.0`
//! - `(1.0,)`     → `> 1.0`

use crate::error::{Error, Result};
use semver::{Prerelease, Version};
use std::fmt;
use std::str::FromStr;

/// A package version, ordered by SemVer precedence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageVersion(Version);

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse a version string
    ///
    /// Missing minor/patch components default to zero and build metadata
    /// (`+...`) is discarded.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let without_build = s.split('+').next().unwrap_or(s);

        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if core.is_empty() || parts.len() > 3 {
            return Err(Error::ParseError(format!("Invalid version '{}'", s)));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid version component '{}' in '{}': {}", part, s, e))
            })?;
        }

        let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(pre) = pre {
            version.pre = Prerelease::new(pre).map_err(|e| {
                Error::ParseError(format!("Invalid prerelease tag in '{}': {}", s, e))
            })?;
        }

        Ok(Self(version))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Whether this version carries a prerelease tag
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    pub fn as_semver(&self) -> &Version {
        &self.0
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous range of acceptable versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub min: Option<PackageVersion>,
    pub min_inclusive: bool,
    pub max: Option<PackageVersion>,
    pub max_inclusive: bool,
}

impl VersionSpec {
    /// Exactly one version
    pub fn exact(version: PackageVersion) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// The given version or anything newer
    pub fn at_least(version: PackageVersion) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// Parse a range in interval notation
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("Empty version range".to_string()));
        }

        // A bare version means "this version or newer"
        if !s.starts_with('[') && !s.starts_with('(') {
            return Ok(Self::at_least(PackageVersion::parse(s)?));
        }

        let min_inclusive = s.starts_with('[');
        let max_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => {
                return Err(Error::ParseError(format!(
                    "Version range '{}' must end with ']' or ')'",
                    s
                )));
            }
        };
        if s.len() < 3 {
            return Err(Error::ParseError(format!("Invalid version range '{}'", s)));
        }

        let inner = &s[1..s.len() - 1];
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();

        match parts.as_slice() {
            [single] => {
                if !(min_inclusive && max_inclusive) || single.is_empty() {
                    return Err(Error::ParseError(format!(
                        "Single-version range '{}' must use '[version]'",
                        s
                    )));
                }
                Ok(Self::exact(PackageVersion::parse(single)?))
            }
            [low, high] => {
                if low.is_empty() && high.is_empty() {
                    return Err(Error::ParseError(format!(
                        "Version range '{}' has no bounds",
                        s
                    )));
                }
                let min = (!low.is_empty())
                    .then(|| PackageVersion::parse(low))
                    .transpose()?;
                let max = (!high.is_empty())
                    .then(|| PackageVersion::parse(high))
                    .transpose()?;

                if let (Some(min), Some(max)) = (&min, &max)
                    && max < min
                {
                    return Err(Error::ParseError(format!(
                        "Version range '{}' has an upper bound below its lower bound",
                        s
                    )));
                }

                Ok(Self {
                    min,
                    min_inclusive,
                    max,
                    max_inclusive,
                })
            }
            _ => Err(Error::ParseError(format!(
                "Version range '{}' has too many components",
                s
            ))),
        }
    }

    /// Check if a version falls inside this range
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let above_min = match &self.min {
            None => true,
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
        };
        let below_max = match &self.max {
            None => true,
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
        };
        above_min && below_max
    }
}

impl FromStr for VersionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(min), Some(max)) = (&self.min, &self.max)
            && min == max
            && self.min_inclusive
            && self.max_inclusive
        {
            return write!(f, "[{}]", min);
        }

        write!(f, "{}", if self.min_inclusive { '[' } else { '(' })?;
        if let Some(ref min) = self.min {
            write!(f, "{}", min)?;
        }
        write!(f, ", ")?;
        if let Some(ref max) = self.max {
            write!(f, "{}", max)?;
        }
        write!(f, "{}", if self.max_inclusive { ']' } else { ')' })
    }
}
