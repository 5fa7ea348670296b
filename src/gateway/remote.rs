//! Remote execution
//!
//! A [`RemoteExecutor`] serializes an [`ObjectCall`] with the caller's context
//! and version manifest and hands it to a [`Transport`]. On the far side a
//! [`RemoteEndpoint`] executes the call against its own gateway and returns
//! primitives at the version the caller asked for, nesting relation objects at
//! the versions listed in the manifest. Errors travel back as a
//! [`RemoteFault`] and are rebuilt into the same [`ObjectError`] kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::{Boundary, RequestContext};
use crate::error::{ObjectError, Result};
use crate::gateway::{Gateway, LocalExecutor, ObjectCall, ObjectExecutor, Payload};
use crate::primitive::ObjectPrimitive;
use crate::relation::RelationResolver;
use crate::version::ObjectVersion;

/// Failure to deliver a request
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer disconnected: {0}")]
    Disconnected(String),

    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivers a serialized request and returns the serialized response
pub trait Transport: Send + Sync {
    fn send(&self, request: &str) -> std::result::Result<String, TransportError>;
}

/// A call as sent across the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub context: RequestContext,
    /// Version of the called type the caller understands
    pub target_version: ObjectVersion,
    /// Versions the caller understands for every type, used for nested
    /// relation objects
    pub version_manifest: BTreeMap<String, ObjectVersion>,
    pub call: ObjectCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteResponse {
    Objects { objects: Vec<ObjectPrimitive> },
    Fault { fault: RemoteFault },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    InvalidIdentity,
    NotFound,
    MultipleResults,
    TypeMismatch,
    UnknownField,
    FieldNotSet,
    UnsupportedVersion,
    UnregisteredObject,
    ObjectAction,
    AlreadyExists,
    Other,
}

/// Error reported by a remote endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub kind: FaultKind,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub message: String,
}

impl RemoteFault {
    fn new(kind: FaultKind, message: String, params: &[(&str, &String)]) -> Self {
        Self {
            kind,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), (*v).clone()))
                .collect(),
            message,
        }
    }

    fn param(&self, key: &str) -> String {
        self.params.get(key).cloned().unwrap_or_default()
    }

    /// Rebuild the error the endpoint raised
    pub fn into_error(self) -> ObjectError {
        let p = |key: &str| self.param(key);
        match self.kind {
            FaultKind::InvalidIdentity => ObjectError::InvalidIdentity {
                identity: p("identity"),
            },
            FaultKind::NotFound => ObjectError::NotFound {
                object: p("object"),
                identity: p("identity"),
            },
            FaultKind::MultipleResults => ObjectError::MultipleResults {
                object: p("object"),
                identity: p("identity"),
            },
            FaultKind::TypeMismatch => ObjectError::TypeMismatch {
                object: p("object"),
                field: p("field"),
                expected: p("expected"),
                value: p("value"),
            },
            FaultKind::UnknownField => ObjectError::UnknownField {
                object: p("object"),
                field: p("field"),
            },
            FaultKind::FieldNotSet => ObjectError::FieldNotSet {
                object: p("object"),
                field: p("field"),
            },
            FaultKind::UnsupportedVersion => ObjectError::UnsupportedVersion {
                object: p("object"),
                version: p("version"),
            },
            FaultKind::UnregisteredObject => ObjectError::UnregisteredObject {
                object: p("object"),
            },
            FaultKind::ObjectAction => ObjectError::ObjectActionError {
                action: p("action"),
                object: p("object"),
                reason: p("reason"),
            },
            FaultKind::AlreadyExists => ObjectError::AlreadyExists {
                object: p("object"),
                field: p("field"),
                value: p("value"),
            },
            FaultKind::Other => ObjectError::Storage(format!("remote: {}", self.message)),
        }
    }
}

impl From<&ObjectError> for RemoteFault {
    fn from(err: &ObjectError) -> Self {
        let message = err.to_string();
        match err {
            ObjectError::InvalidIdentity { identity } => {
                Self::new(FaultKind::InvalidIdentity, message, &[("identity", identity)])
            }
            ObjectError::NotFound { object, identity } => Self::new(
                FaultKind::NotFound,
                message,
                &[("object", object), ("identity", identity)],
            ),
            ObjectError::MultipleResults { object, identity } => Self::new(
                FaultKind::MultipleResults,
                message,
                &[("object", object), ("identity", identity)],
            ),
            ObjectError::TypeMismatch {
                object,
                field,
                expected,
                value,
            } => Self::new(
                FaultKind::TypeMismatch,
                message,
                &[
                    ("object", object),
                    ("field", field),
                    ("expected", expected),
                    ("value", value),
                ],
            ),
            ObjectError::UnknownField { object, field } => Self::new(
                FaultKind::UnknownField,
                message,
                &[("object", object), ("field", field)],
            ),
            ObjectError::FieldNotSet { object, field } => Self::new(
                FaultKind::FieldNotSet,
                message,
                &[("object", object), ("field", field)],
            ),
            ObjectError::UnsupportedVersion { object, version } => Self::new(
                FaultKind::UnsupportedVersion,
                message,
                &[("object", object), ("version", version)],
            ),
            ObjectError::UnregisteredObject { object } => {
                Self::new(FaultKind::UnregisteredObject, message, &[("object", object)])
            }
            ObjectError::ObjectActionError {
                action,
                object,
                reason,
            } => Self::new(
                FaultKind::ObjectAction,
                message,
                &[("action", action), ("object", object), ("reason", reason)],
            ),
            ObjectError::AlreadyExists {
                object,
                field,
                value,
            } => Self::new(
                FaultKind::AlreadyExists,
                message,
                &[("object", object), ("field", field), ("value", value)],
            ),
            _ => Self::new(FaultKind::Other, message, &[]),
        }
    }
}

/// Sends calls through a transport on behalf of a gateway
pub struct RemoteExecutor<'a> {
    gateway: &'a Gateway,
    transport: &'a dyn Transport,
}

impl<'a> RemoteExecutor<'a> {
    pub fn new(gateway: &'a Gateway, transport: &'a dyn Transport) -> Self {
        Self { gateway, transport }
    }
}

impl ObjectExecutor for RemoteExecutor<'_> {
    fn execute(&self, ctx: &RequestContext, call: &ObjectCall) -> Result<Vec<Payload>> {
        let registry = self.gateway.registry();
        let target_version = self.gateway.schema_for(ctx, call.object())?.version.clone();
        let request = RemoteRequest {
            context: ctx.clone(),
            target_version,
            version_manifest: ctx.version_manifest(registry),
            call: call.clone(),
        };
        let body = serde_json::to_string(&request)?;
        debug!(
            request_id = %ctx.request_id,
            object = call.object(),
            method = call.method(),
            target_version = %request.target_version,
            "sending remote call"
        );

        let reply = self
            .transport
            .send(&body)
            .map_err(|e| ObjectError::RemoteUnavailable(e.to_string()))?;
        let response: RemoteResponse = serde_json::from_str(&reply).map_err(|e| {
            ObjectError::RemoteUnavailable(format!("malformed response: {}", e))
        })?;

        match response {
            RemoteResponse::Objects { objects } => {
                Ok(objects.into_iter().map(Payload::Primitive).collect())
            }
            RemoteResponse::Fault { fault } => Err(fault.into_error()),
        }
    }
}

/// Serves remote calls against a local gateway
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    gateway: Gateway,
}

impl RemoteEndpoint {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Handle one serialized request and produce the serialized response
    pub fn handle(&self, request: &str) -> String {
        let response = match serde_json::from_str::<RemoteRequest>(request) {
            Ok(request) => match self.dispatch(request) {
                Ok(objects) => RemoteResponse::Objects { objects },
                Err(e) => {
                    warn!(error = %e, "remote call failed");
                    RemoteResponse::Fault {
                        fault: RemoteFault::from(&e),
                    }
                }
            },
            Err(e) => RemoteResponse::Fault {
                fault: RemoteFault::from(&ObjectError::Json(e)),
            },
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"fault","fault":{{"kind":"other","message":{:?}}}}}"#,
                e.to_string()
            )
        })
    }

    fn dispatch(&self, request: RemoteRequest) -> Result<Vec<ObjectPrimitive>> {
        let registry = self.gateway.registry();
        let object = request.call.object().to_string();

        // Answer in the caller's versions, not ours
        let mut ctx = request.context;
        ctx.boundary = Boundary::InProcess;
        for (name, version) in request.version_manifest {
            if registry.contains(&name) {
                ctx.version_pins.insert(name, version);
            }
        }
        ctx.version_pins
            .insert(object.clone(), request.target_version.clone());
        let schema = self.gateway.schema_for(&ctx, &object)?;
        debug!(
            request_id = %ctx.request_id,
            object = %object,
            method = request.call.method(),
            served_version = %schema.version,
            "serving remote call"
        );

        // Writes may carry fields from a newer minor than we store
        let stored = registry.latest_in_major(&object, request.target_version.major())?;
        let eager = request.call.is_eager();
        let call = match request.call {
            ObjectCall::Create { object, values } => ObjectCall::Create {
                object,
                values: stored.project(&values),
            },
            ObjectCall::Save {
                object,
                uuid,
                delta,
            } => ObjectCall::Save {
                object,
                uuid,
                delta: stored.project(&delta),
            },
            other => other,
        };

        let created = matches!(call, ObjectCall::Create { .. });
        let payloads = LocalExecutor::new(self.gateway.adapter().as_ref()).execute(&ctx, &call)?;
        let mut objects = self.gateway.materialize_all(&ctx, &schema, payloads, false)?;
        if eager {
            match RelationResolver::new(&self.gateway).resolve_batch(&mut objects) {
                Ok(()) => {}
                // The row is stored; hand it back so the caller keeps its
                // identity and resolves relations itself
                Err(e) if created => {
                    warn!(error = %e, object = %object, "created object has unresolvable relations");
                }
                Err(e) => return Err(e),
            }
        }
        objects.iter().map(|o| o.to_primitive()).collect()
    }
}

/// In-process transport straight into an endpoint
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    endpoint: RemoteEndpoint,
}

impl LoopbackTransport {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, request: &str) -> std::result::Result<String, TransportError> {
        Ok(self.endpoint.handle(request))
    }
}
