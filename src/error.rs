//! Error types for the object framework

use thiserror::Error;

/// Result type for object operations
pub type Result<T> = std::result::Result<T, ObjectError>;

/// Object framework errors
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Expected a uuid or int but received {identity}")]
    InvalidIdentity { identity: String },

    #[error("{object} {identity} could not be found")]
    NotFound { object: String, identity: String },

    #[error("Multiple {object} records match {identity}")]
    MultipleResults { object: String, identity: String },

    #[error("Field {object}.{field} expects {expected}, got {value}")]
    TypeMismatch {
        object: String,
        field: String,
        expected: String,
        value: String,
    },

    #[error("{object} has no field named {field}")]
    UnknownField { object: String, field: String },

    #[error("Field {object}.{field} is not set")]
    FieldNotSet { object: String, field: String },

    #[error("{object} version {version} is already registered")]
    DuplicateRegistration { object: String, version: String },

    #[error("No compatible version of {object} for requested version {version}")]
    UnsupportedVersion { object: String, version: String },

    #[error("Object type {object} is not registered")]
    UnregisteredObject { object: String },

    #[error("{object} version {version} is not compatible with earlier minor versions: {reason}")]
    IncompatibleSchema {
        object: String,
        version: String,
        reason: String,
    },

    #[error("Remote peer unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Cannot {action} {object}: {reason}")]
    ObjectActionError {
        action: String,
        object: String,
        reason: String,
    },

    #[error("{object} {identity} was destroyed")]
    ObjectDestroyed { object: String, identity: String },

    #[error("{object} with {field} {value} already exists")]
    AlreadyExists {
        object: String,
        field: String,
        value: String,
    },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("The process-wide object registry is already initialized")]
    RegistryInitialized,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl ObjectError {
    pub fn not_found(object: impl Into<String>, identity: impl ToString) -> Self {
        Self::NotFound {
            object: object.into(),
            identity: identity.to_string(),
        }
    }

    pub fn action(
        action: impl Into<String>,
        object: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ObjectActionError {
            action: action.into(),
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// True for errors a caller may see on a lookup that matched nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
