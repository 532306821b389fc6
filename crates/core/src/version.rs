//! Migration version keys
//!
//! A version carries a mandatory major component and optional minor and
//! patch components. Ordering is evaluated componentwise: equal present
//! values defer to the next component, and a present component outranks an
//! absent one at the same position, so `1.2.3 > 1.2`. The more-specific-wins
//! rule is deliberate and must not be collapsed into conventional semver
//! comparison.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparable version key parsed from script, resource, or handle names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationVersion {
    major: i32,
    minor: Option<i32>,
    patch: Option<i32>,
}

impl MigrationVersion {
    /// Create a version; all present components must be non-negative
    pub fn new(major: i32, minor: Option<i32>, patch: Option<i32>) -> Option<Self> {
        if major < 0 || minor.map_or(false, |m| m < 0) || patch.map_or(false, |p| p < 0) {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Major-only version
    pub fn from_major(major: i32) -> Option<Self> {
        Self::new(major, None, None)
    }

    /// Fully specified version
    pub fn from_parts(major: i32, minor: i32, patch: i32) -> Option<Self> {
        Self::new(major, Some(minor), Some(patch))
    }

    /// Parse a version from text split on `separator`.
    ///
    /// Returns `None` when the leading token is missing or is not a
    /// non-negative integer; this is a discovery filter, not an error. A
    /// minor or patch token that fails to parse leaves that component
    /// absent without failing the whole version.
    pub fn parse(text: &str, separator: &str) -> Option<Self> {
        if separator.is_empty() {
            return text.parse::<i32>().ok().and_then(Self::from_major);
        }
        let mut tokens = text.split(separator);
        let major = tokens.next()?.parse::<i32>().ok()?;
        let minor = tokens.next().and_then(|t| t.parse::<i32>().ok());
        let patch = tokens.next().and_then(|t| t.parse::<i32>().ok());
        Self::new(major, minor, patch)
    }

    pub fn major(&self) -> i32 {
        self.major
    }

    pub fn minor(&self) -> Option<i32> {
        self.minor
    }

    pub fn patch(&self) -> Option<i32> {
        self.patch
    }
}

/// Present values compare numerically and equal values defer; a present
/// component is greater than an absent one; two absent components carry no
/// ordering signal.
fn component_cmp(left: Option<i32>, right: Option<i32>) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => l.cmp(&r),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| component_cmp(self.minor, other.minor))
            .then_with(|| component_cmp(self.patch, other.patch))
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{}", minor)?;
        }
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        Ok(())
    }
}
