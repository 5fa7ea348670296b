//! Object schemas
//!
//! An [`ObjectSchema`] is the static declaration of one object type at one
//! version: its fields, their types, and which methods may run remotely.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::error::{ObjectError, Result};
use crate::fields::{FieldDescriptor, FieldType};
use crate::fingerprint::Fingerprint;
use crate::version::ObjectVersion;

/// Methods a persistent object exposes through the indirection gateway.
/// `destroy` is deliberately absent: it always runs in-process.
pub const PERSISTENT_REMOTABLES: &[&str] = &[
    "get_by_id",
    "get_by_uuid",
    "get_by_name",
    "list",
    "create",
    "save",
    "soft_delete",
];

/// A declared object-valued field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec<'a> {
    /// Name of the object field, e.g. "goal"
    pub field: &'a str,
    /// Referenced object type, e.g. "Goal"
    pub object: &'a str,
    /// Scalar field holding the referenced id, e.g. "goal_id"
    pub key: &'a str,
}

/// Schema of one object type at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub version: ObjectVersion,
    fields: BTreeMap<String, FieldDescriptor>,
    #[serde(default)]
    remotable: BTreeSet<String>,
}

impl ObjectSchema {
    pub fn builder(name: impl Into<String>, version: ObjectVersion) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            version,
            fields: BTreeMap::new(),
            remotable: BTreeSet::new(),
        }
    }

    /// Start the next version of this schema from its current declaration
    pub fn evolve(&self, version: ObjectVersion) -> SchemaBuilder {
        SchemaBuilder {
            name: self.name.clone(),
            version,
            fields: self.fields.clone(),
            remotable: self.remotable.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fields stored as scalars (everything except object references)
    pub fn scalar_fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields().filter(|(_, d)| !d.is_object())
    }

    pub fn relations(&self) -> impl Iterator<Item = RelationSpec<'_>> {
        self.fields.iter().filter_map(|(field, d)| match &d.field_type {
            FieldType::Object { object, key } => Some(RelationSpec {
                field,
                object,
                key,
            }),
            _ => None,
        })
    }

    pub fn relation(&self, field: &str) -> Option<RelationSpec<'_>> {
        self.relations().find(|r| r.field == field)
    }

    /// Relation fields backed by the given key
    pub fn relations_keyed_by<'a>(&'a self, key: &'a str) -> impl Iterator<Item = RelationSpec<'a>> {
        self.relations().filter(move |r| r.key == key)
    }

    pub fn is_remotable(&self, method: &str) -> bool {
        self.remotable.contains(method)
    }

    pub fn remotable_methods(&self) -> impl Iterator<Item = &str> {
        self.remotable.iter().map(String::as_str)
    }

    /// Keep only the entries of `record` this schema declares
    pub fn project(&self, record: &Map<String, Value>) -> Map<String, Value> {
        record
            .iter()
            .filter(|(k, _)| self.has_field(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, d)| {
                let mut ty = d.field_type.to_string();
                if d.nullable {
                    ty.push_str(" (nullable)");
                }
                (name.clone(), Value::String(ty))
            })
            .collect();
        let remotable: Vec<&str> = self.remotable_methods().collect();
        Fingerprint::compute(
            &self.version,
            &json!({ "fields": fields, "remotable": remotable }),
        )
    }
}

/// Builder for [`ObjectSchema`]
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    version: ObjectVersion,
    fields: BTreeMap<String, FieldDescriptor>,
    remotable: BTreeSet<String>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    /// Add identity and timestamp fields plus the persistent remotable set
    pub fn persistent(mut self) -> Self {
        self.fields.insert("id".into(), FieldDescriptor::integer());
        self.fields.insert("uuid".into(), FieldDescriptor::uuid());
        self.fields
            .insert("created_at".into(), FieldDescriptor::datetime().nullable());
        self.fields
            .insert("updated_at".into(), FieldDescriptor::datetime().nullable());
        self.fields
            .insert("deleted_at".into(), FieldDescriptor::datetime().nullable());
        self.remotable
            .extend(PERSISTENT_REMOTABLES.iter().map(|m| m.to_string()));
        self
    }

    pub fn remotable(mut self, method: impl Into<String>) -> Self {
        self.remotable.insert(method.into());
        self
    }

    pub fn build(self) -> Result<ObjectSchema> {
        static FIELD_NAME: OnceLock<Regex> = OnceLock::new();
        let field_name = FIELD_NAME.get_or_init(|| {
            Regex::new(r"^[a-z][a-z0-9_]*$").expect("field name pattern is valid")
        });

        if self.name.is_empty() {
            return Err(ObjectError::InvalidSchema("object name is empty".into()));
        }

        for (name, descriptor) in &self.fields {
            if !field_name.is_match(name) {
                return Err(ObjectError::InvalidSchema(format!(
                    "{}: field name '{}' is not lower snake case",
                    self.name, name
                )));
            }
            if let FieldType::Object { key, .. } = &descriptor.field_type {
                match self.fields.get(key) {
                    Some(k) if k.field_type == FieldType::Integer => {}
                    Some(_) => {
                        return Err(ObjectError::InvalidSchema(format!(
                            "{}: key '{}' of relation '{}' must be an integer field",
                            self.name, key, name
                        )))
                    }
                    None => {
                        return Err(ObjectError::InvalidSchema(format!(
                            "{}: relation '{}' references missing key field '{}'",
                            self.name, name, key
                        )))
                    }
                }
            }
        }

        Ok(ObjectSchema {
            name: self.name,
            version: self.version,
            fields: self.fields,
            remotable: self.remotable,
        })
    }
}
