//! Schema fingerprints
//!
//! A fingerprint hashes the canonical field set and remotable methods of one
//! schema version. Editing a schema without bumping its version changes the
//! fingerprint, which the `object-registry fingerprints --verify` command
//! reports.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::version::ObjectVersion;

/// `<version>-<sha256 prefix>` fingerprint of a schema version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Number of hex characters kept from the digest
    const DIGEST_LEN: usize = 32;

    /// Compute a fingerprint from a version and a canonical JSON value
    pub fn compute(version: &ObjectVersion, canonical: &serde_json::Value) -> Self {
        // serde_json::Map is ordered, so this string is canonical
        let content = serde_json::to_string(canonical).unwrap_or_default();
        let hash = format!("{:x}", Sha256::digest(content.as_bytes()));
        Self(format!("{}-{}", version, &hash[..Self::DIGEST_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_consistency() {
        let v = ObjectVersion::new(1, 0);
        let a = Fingerprint::compute(&v, &json!({"name": "string"}));
        let b = Fingerprint::compute(&v, &json!({"name": "string"}));
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("1.0-"));
        assert_eq!(a.as_str().len(), "1.0-".len() + 32);
    }

    #[test]
    fn test_fingerprint_different_content() {
        let v = ObjectVersion::new(1, 0);
        let a = Fingerprint::compute(&v, &json!({"name": "string"}));
        let b = Fingerprint::compute(&v, &json!({"name": "integer"}));
        assert_ne!(a, b);
    }
}
