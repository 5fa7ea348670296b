//! Identity dispatch for `get`
//!
//! A persisted object can be addressed by its numeric id or its uuid. Names are
//! looked up through a separate call because they are not unique across
//! deleted records.

use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{ObjectError, Result};

/// A parsed object identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Id(i64),
    Uuid(Uuid),
}

impl Identity {
    /// Int-like strings resolve to ids, uuid-like strings to uuids
    pub fn parse(identity: &str) -> Result<Self> {
        if let Some(id) = parse_int_like(identity) {
            Ok(Identity::Id(id))
        } else if let Ok(uuid) = Uuid::try_parse(identity) {
            Ok(Identity::Uuid(uuid))
        } else {
            Err(ObjectError::InvalidIdentity {
                identity: identity.to_string(),
            })
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Id(id) => write!(f, "{}", id),
            Identity::Uuid(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// Anything that can be dispatched by `get`
pub trait AsIdentity {
    fn to_identity(&self) -> Result<Identity>;
}

impl AsIdentity for str {
    fn to_identity(&self) -> Result<Identity> {
        Identity::parse(self)
    }
}

impl AsIdentity for String {
    fn to_identity(&self) -> Result<Identity> {
        Identity::parse(self)
    }
}

impl AsIdentity for i64 {
    fn to_identity(&self) -> Result<Identity> {
        Ok(Identity::Id(*self))
    }
}

impl AsIdentity for i32 {
    fn to_identity(&self) -> Result<Identity> {
        Ok(Identity::Id(i64::from(*self)))
    }
}

impl AsIdentity for Uuid {
    fn to_identity(&self) -> Result<Identity> {
        Ok(Identity::Uuid(*self))
    }
}

impl AsIdentity for Identity {
    fn to_identity(&self) -> Result<Identity> {
        Ok(*self)
    }
}

impl AsIdentity for Value {
    fn to_identity(&self) -> Result<Identity> {
        match self {
            Value::Number(n) => n.as_i64().map(Identity::Id).ok_or_else(|| {
                ObjectError::InvalidIdentity {
                    identity: n.to_string(),
                }
            }),
            Value::String(s) => Identity::parse(s),
            other => Err(ObjectError::InvalidIdentity {
                identity: other.to_string(),
            }),
        }
    }
}

/// Parse a string only if it is the canonical rendering of an integer.
///
/// "12" and "-3" qualify; "012", "+5" and " 7" do not.
pub fn parse_int_like(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().filter(|n| n.to_string() == s)
}
