//! Object Registry
//!
//! Maps object type names to their registered schema versions and resolves a
//! requested version to the closest compatible one. The registry is built
//! mutably during process start-up, then frozen behind an `Arc` and shared
//! read-only.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::compatibility::{CompatibilityChecker, CompatibilityResult};
use crate::error::{ObjectError, Result};
use crate::fingerprint::Fingerprint;
use crate::schema::ObjectSchema;
use crate::version::ObjectVersion;

static GLOBAL: OnceLock<Arc<ObjectRegistry>> = OnceLock::new();

/// Install the process-wide registry. Fails if one is already installed.
pub fn install(registry: ObjectRegistry) -> Result<Arc<ObjectRegistry>> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(Arc::clone(&registry))
        .map_err(|_| ObjectError::RegistryInitialized)?;
    Ok(registry)
}

/// The process-wide registry, if one was installed
pub fn global() -> Option<Arc<ObjectRegistry>> {
    GLOBAL.get().cloned()
}

/// Registry of object schemas keyed by type name and version
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, BTreeMap<ObjectVersion, Arc<ObjectSchema>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema version.
    ///
    /// Within a major version every registered minor must be an additive
    /// evolution of the minors below it.
    pub fn register(&mut self, schema: ObjectSchema) -> Result<Arc<ObjectSchema>> {
        let versions = self.objects.entry(schema.name.clone()).or_default();
        if versions.contains_key(&schema.version) {
            return Err(ObjectError::DuplicateRegistration {
                object: schema.name.clone(),
                version: schema.version.to_string(),
            });
        }

        let checker = CompatibilityChecker::new();
        let same_major = versions
            .values()
            .filter(|existing| existing.version.is_compatible_with(&schema.version));
        for existing in same_major {
            let (older, newer) = if existing.version < schema.version {
                (existing.as_ref(), &schema)
            } else {
                (&schema, existing.as_ref())
            };
            let result = checker.check(older, newer)?;
            if !result.is_compatible {
                return Err(ObjectError::IncompatibleSchema {
                    object: schema.name.clone(),
                    version: schema.version.to_string(),
                    reason: format!("against {}: {}", existing.version, result.summary),
                });
            }
        }

        debug!(object = %schema.name, version = %schema.version, "registered object schema");
        let schema = Arc::new(schema);
        versions.insert(schema.version.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Greatest registered version `<= requested` within the same major
    pub fn resolve(&self, name: &str, requested: &ObjectVersion) -> Result<Arc<ObjectSchema>> {
        let versions = self.versions_of(name)?;
        versions
            .range(..=requested)
            .next_back()
            .filter(|(v, _)| v.is_compatible_with(requested))
            .map(|(_, schema)| Arc::clone(schema))
            .ok_or_else(|| ObjectError::UnsupportedVersion {
                object: name.to_string(),
                version: requested.to_string(),
            })
    }

    /// Highest registered version of a type
    pub fn latest(&self, name: &str) -> Result<Arc<ObjectSchema>> {
        self.versions_of(name)?
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| ObjectError::UnregisteredObject {
                object: name.to_string(),
            })
    }

    /// Highest registered version sharing `major`
    pub fn latest_in_major(&self, name: &str, major: u64) -> Result<Arc<ObjectSchema>> {
        self.versions_of(name)?
            .iter()
            .rev()
            .find(|(v, _)| v.major() == major)
            .map(|(_, schema)| Arc::clone(schema))
            .ok_or_else(|| ObjectError::UnsupportedVersion {
                object: name.to_string(),
                version: format!("{}.x", major),
            })
    }

    /// Exact lookup without negotiation
    pub fn get(&self, name: &str, version: &ObjectVersion) -> Option<Arc<ObjectSchema>> {
        self.objects.get(name)?.get(version).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Registered versions of a type, ascending
    pub fn versions(&self, name: &str) -> Vec<&ObjectVersion> {
        self.objects
            .get(name)
            .map(|v| v.keys().collect())
            .unwrap_or_default()
    }

    /// All registered type names, sorted
    pub fn object_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.objects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Latest version of every registered type
    pub fn version_manifest(&self) -> BTreeMap<String, ObjectVersion> {
        self.objects
            .iter()
            .filter_map(|(name, versions)| {
                versions.keys().next_back().map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// Fingerprints of every registered type and version, keyed "Name"
    /// and ordered by version
    pub fn fingerprints(&self) -> BTreeMap<String, Vec<Fingerprint>> {
        self.objects
            .iter()
            .map(|(name, versions)| {
                (
                    name.clone(),
                    versions.values().map(|s| s.fingerprint()).collect(),
                )
            })
            .collect()
    }

    /// Compare two registered versions of a type
    pub fn check_compatibility(
        &self,
        name: &str,
        old: &ObjectVersion,
        new: &ObjectVersion,
    ) -> Result<CompatibilityResult> {
        let lookup = |v: &ObjectVersion| {
            self.get(name, v).ok_or_else(|| ObjectError::UnsupportedVersion {
                object: name.to_string(),
                version: v.to_string(),
            })
        };
        let old = lookup(old)?;
        let new = lookup(new)?;
        CompatibilityChecker::new().check(&old, &new)
    }

    fn versions_of(&self, name: &str) -> Result<&BTreeMap<ObjectVersion, Arc<ObjectSchema>>> {
        self.objects
            .get(name)
            .ok_or_else(|| ObjectError::UnregisteredObject {
                object: name.to_string(),
            })
    }
}
