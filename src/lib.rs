//! Versioned Objects
//!
//! A framework for persistent business objects whose schemas evolve across
//! rolling upgrades, so that processes running different schema versions can
//! exchange objects safely.
//!
//! ## Features
//!
//! - **Version Negotiation**: A registry of `(type, major.minor)` schemas
//!   resolves each caller's requested version to the closest compatible one
//! - **Additive Minors**: Minor versions may only add fields or relax
//!   nullability; older consumers truncate newer payloads
//! - **Change Tracking**: Saves send only the fields assigned since the last
//!   synchronization
//! - **Lazy Relations**: Object-valued fields load on first access, or in
//!   batches with one fetch per relation field
//! - **Indirection**: Every operation picks a local or remote executor; remote
//!   replies come back at the caller's version
//!
//! ## Architecture
//!
//! ```text
//! caller ── ObjectInstance ── Gateway ─┬─ LocalExecutor ── PersistenceAdapter
//!                 │                    └─ RemoteExecutor ── Transport ── RemoteEndpoint
//!                 │
//!          ObjectRegistry (name, version) -> ObjectSchema
//! ```

pub mod adapter;
pub mod compatibility;
pub mod config;
pub mod context;
pub mod error;
pub mod fields;
pub mod fingerprint;
pub mod gateway;
pub mod identity;
pub mod notify;
pub mod object;
pub mod objects;
pub mod primitive;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod tracker;
pub mod version;

pub use adapter::{InMemoryAdapter, ListQuery, PersistenceAdapter, RawRecord, SortDir};
pub use compatibility::{CompatibilityChecker, CompatibilityResult};
pub use config::ObjectsConfig;
pub use context::{Boundary, RequestContext};
pub use error::{ObjectError, Result};
pub use fields::{FieldDescriptor, FieldType, FieldValue};
pub use fingerprint::Fingerprint;
pub use gateway::{Gateway, LoopbackTransport, ObjectCall, RemoteEndpoint, Transport, TransportError};
pub use identity::{AsIdentity, Identity};
pub use notify::{EventAction, LogNotifier, Notifier, ObjectEvent};
pub use object::{Lifecycle, ObjectInstance};
pub use objects::{AuditTemplate, Goal, PersistentObject, Strategy};
pub use primitive::ObjectPrimitive;
pub use registry::ObjectRegistry;
pub use schema::ObjectSchema;
pub use tracker::ChangeTracker;
pub use version::ObjectVersion;
