//! Field types, descriptors and value coercion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::{ObjectError, Result};

/// Semantic type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    String,
    Uuid,
    Boolean,
    DateTime,
    /// A list of free-form key/value objects
    FlexibleListOfDict,
    /// Reference to another versioned object, backed by a scalar key field
    Object { object: String, key: String },
}

impl FieldType {
    pub fn is_object(&self) -> bool {
        matches!(self, FieldType::Object { .. })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "integer"),
            FieldType::String => write!(f, "string"),
            FieldType::Uuid => write!(f, "uuid"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::FlexibleListOfDict => write!(f, "list of dict"),
            FieldType::Object { object, key } => write!(f, "object {} via {}", object, key),
        }
    }
}

/// Declared type and nullability of one field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
        }
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn uuid() -> Self {
        Self::new(FieldType::Uuid)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn datetime() -> Self {
        Self::new(FieldType::DateTime)
    }

    pub fn flexible_list_of_dict() -> Self {
        Self::new(FieldType::FlexibleListOfDict)
    }

    /// An object reference resolved through the integer field `key`
    pub fn object(object: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(FieldType::Object {
            object: object.into(),
            key: key.into(),
        })
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_object(&self) -> bool {
        self.field_type.is_object()
    }

    /// Coerce a JSON value into this field's type.
    ///
    /// `object` and `field` only label the `TypeMismatch` error.
    pub fn coerce(&self, object: &str, field: &str, value: &Value) -> Result<FieldValue> {
        let mismatch = || ObjectError::TypeMismatch {
            object: object.to_string(),
            field: field.to_string(),
            expected: if self.nullable {
                format!("nullable {}", self.field_type)
            } else {
                self.field_type.to_string()
            },
            value: value.to_string(),
        };

        if value.is_null() {
            return if self.nullable {
                Ok(FieldValue::Null)
            } else {
                Err(mismatch())
            };
        }

        let coerced = match &self.field_type {
            FieldType::Integer => coerce_integer(value).map(FieldValue::Integer),
            FieldType::String => match value {
                Value::String(s) => Some(FieldValue::String(s.clone())),
                Value::Number(n) => Some(FieldValue::String(n.to_string())),
                Value::Bool(b) => Some(FieldValue::String(b.to_string())),
                _ => None,
            },
            FieldType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::try_parse(s).ok())
                .map(FieldValue::Uuid),
            FieldType::Boolean => match value {
                Value::Bool(b) => Some(FieldValue::Boolean(*b)),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => Some(FieldValue::Boolean(true)),
                    "false" | "no" | "0" => Some(FieldValue::Boolean(false)),
                    _ => None,
                },
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(FieldValue::Boolean(false)),
                    Some(1) => Some(FieldValue::Boolean(true)),
                    _ => None,
                },
                _ => None,
            },
            FieldType::DateTime => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc))),
            FieldType::FlexibleListOfDict => value.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_object().cloned())
                    .collect::<Option<Vec<_>>>()
                    .map(FieldValue::ListOfDict)
            }),
            FieldType::Object { .. } => None,
        };

        coerced.ok_or_else(mismatch)
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => crate::identity::parse_int_like(s),
        _ => None,
    }
}

/// A typed field value held by an object instance
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    String(String),
    Uuid(Uuid),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    ListOfDict(Vec<Map<String, Value>>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_list_of_dict(&self) -> Option<&[Map<String, Value>]> {
        match self {
            FieldValue::ListOfDict(items) => Some(items),
            _ => None,
        }
    }

    /// JSON rendering used for adapter records and wire primitives
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Uuid(u) => Value::String(u.to_string()),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::ListOfDict(items) => {
                Value::Array(items.iter().cloned().map(Value::Object).collect())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
