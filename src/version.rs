//! Object versioning utilities
//!
//! Object schemas carry a two-part `major.minor` version. Minor bumps are
//! additive; a major bump starts a new compatibility domain.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ObjectError, Result};

/// A `major.minor` object schema version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectVersion {
    version: Version,
}

impl ObjectVersion {
    /// Create a version from its components
    pub fn new(major: u64, minor: u64) -> Self {
        Self {
            version: Version::new(major, minor, 0),
        }
    }

    /// Parse "1.1", "v1.1" or "1.1.0"
    pub fn parse(version_str: &str) -> Result<Self> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let full = match trimmed.matches('.').count() {
            1 => format!("{}.0", trimmed),
            _ => trimmed.to_string(),
        };
        let version = Version::parse(&full)?;
        if version.patch != 0 || !version.pre.is_empty() || !version.build.is_empty() {
            return Err(ObjectError::InvalidVersion(format!(
                "{} (object versions are major.minor)",
                version_str
            )));
        }
        Ok(Self { version })
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }

    pub fn minor(&self) -> u64 {
        self.version.minor
    }

    /// Same major version, so payloads can be exchanged by truncation
    pub fn is_compatible_with(&self, other: &ObjectVersion) -> bool {
        self.version.major == other.version.major
    }

    /// Check if this is a minor version bump from another version
    pub fn is_minor_bump_from(&self, other: &ObjectVersion) -> bool {
        self.version.major == other.version.major && self.version.minor > other.version.minor
    }

    pub fn bump_minor(&self) -> Self {
        Self::new(self.version.major, self.version.minor + 1)
    }

    pub fn bump_major(&self) -> Self {
        Self::new(self.version.major + 1, 0)
    }
}

impl fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.version.major, self.version.minor)
    }
}

impl FromStr for ObjectVersion {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectVersion {
    type Error = ObjectError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectVersion> for String {
    fn from(value: ObjectVersion) -> Self {
        value.to_string()
    }
}
