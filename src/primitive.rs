//! Wire representation of a versioned object

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::version::ObjectVersion;

/// Namespace stamped on every primitive this crate produces
pub const NAMESPACE: &str = "versioned_objects";

const NAME_KEY: &str = "versioned_object.name";

/// A serialized object: type name, schema version and field data. Relation
/// fields that were loaded appear in `data` as nested primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPrimitive {
    #[serde(rename = "versioned_object.name")]
    pub name: String,
    #[serde(rename = "versioned_object.namespace")]
    pub namespace: String,
    #[serde(rename = "versioned_object.version")]
    pub version: ObjectVersion,
    #[serde(rename = "versioned_object.data")]
    pub data: Map<String, Value>,
    #[serde(
        rename = "versioned_object.changes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub changes: Vec<String>,
}

impl ObjectPrimitive {
    pub fn new(name: impl Into<String>, version: ObjectVersion, data: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            namespace: NAMESPACE.to_string(),
            version,
            data,
            changes: Vec::new(),
        }
    }

    /// True if `value` looks like a serialized primitive
    pub fn is_primitive(value: &Value) -> bool {
        value.as_object().is_some_and(|o| o.contains_key(NAME_KEY))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
