//! Request context passed to every remotable operation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::ObjectRegistry;
use crate::version::ObjectVersion;

/// Where a call is allowed to execute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Execute against the local persistence adapter
    #[default]
    InProcess,
    /// Route remotable calls through the configured transport
    Remote,
}

/// Caller identity and negotiated versions. Sent over the wire for remote
/// calls, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
    /// Include soft-deleted rows in listings
    #[serde(default)]
    pub show_deleted: bool,
    /// Object versions this caller understands, by type name. Types without
    /// a pin use the latest registered version.
    #[serde(default)]
    pub version_pins: BTreeMap<String, ObjectVersion>,
    #[serde(skip)]
    pub boundary: Boundary,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
            user_id: None,
            project_id: None,
            roles: Vec::new(),
            is_admin: false,
            show_deleted: false,
            version_pins: BTreeMap::new(),
            boundary: Boundary::InProcess,
        }
    }

    pub fn admin() -> Self {
        Self {
            is_admin: true,
            roles: vec!["admin".to_string()],
            ..Self::new()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_pin(mut self, object: impl Into<String>, version: ObjectVersion) -> Self {
        self.version_pins.insert(object.into(), version);
        self
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn remote(self) -> Self {
        self.with_boundary(Boundary::Remote)
    }

    pub fn with_show_deleted(mut self, show_deleted: bool) -> Self {
        self.show_deleted = show_deleted;
        self
    }

    /// Version this caller wants for `object`
    pub fn requested_version(&self, registry: &ObjectRegistry, object: &str) -> Result<ObjectVersion> {
        match self.version_pins.get(object) {
            Some(pinned) => Ok(pinned.clone()),
            None => Ok(registry.latest(object)?.version.clone()),
        }
    }

    /// Resolved version of every registered type, honouring pins
    pub fn version_manifest(&self, registry: &ObjectRegistry) -> BTreeMap<String, ObjectVersion> {
        let mut manifest = registry.version_manifest();
        for (object, pinned) in &self.version_pins {
            if let Ok(schema) = registry.resolve(object, pinned) {
                manifest.insert(object.clone(), schema.version.clone());
            }
        }
        manifest
    }
}
