//! Indirection gateway
//!
//! Every persistence operation on an object goes through a [`Gateway`]. For
//! each call the gateway picks an [`Executor`]: the local persistence adapter,
//! or a remote endpoint reached through a [`Transport`] when the request
//! context sits on the remote side of a boundary and the method is remotable.
//! Results come back as raw rows or versioned primitives and are materialized
//! into [`ObjectInstance`]s at the caller's negotiated version.

pub mod remote;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{ListQuery, PersistenceAdapter, RawRecord};
use crate::config::ObjectsConfig;
use crate::context::{Boundary, RequestContext};
use crate::error::{ObjectError, Result};
use crate::identity::{AsIdentity, Identity};
use crate::notify::{EventAction, LogNotifier, Notifier, ObjectEvent};
use crate::object::{Lifecycle, ObjectInstance};
use crate::primitive::ObjectPrimitive;
use crate::registry::ObjectRegistry;
use crate::relation::RelationResolver;
use crate::schema::ObjectSchema;

pub use remote::{
    LoopbackTransport, RemoteEndpoint, RemoteExecutor, RemoteFault, RemoteRequest,
    RemoteResponse, Transport, TransportError,
};

/// A persistence operation as it crosses the executor seam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ObjectCall {
    GetById {
        object: String,
        id: i64,
        eager: bool,
    },
    GetByUuid {
        object: String,
        uuid: Uuid,
        eager: bool,
    },
    GetByName {
        object: String,
        name: String,
        eager: bool,
    },
    List {
        object: String,
        query: ListQuery,
    },
    GetManyById {
        object: String,
        ids: Vec<i64>,
    },
    Create {
        object: String,
        values: RawRecord,
    },
    Save {
        object: String,
        uuid: Uuid,
        delta: RawRecord,
    },
    SoftDelete {
        object: String,
        uuid: Uuid,
    },
    Destroy {
        object: String,
        uuid: Uuid,
    },
}

impl ObjectCall {
    pub fn object(&self) -> &str {
        match self {
            ObjectCall::GetById { object, .. }
            | ObjectCall::GetByUuid { object, .. }
            | ObjectCall::GetByName { object, .. }
            | ObjectCall::List { object, .. }
            | ObjectCall::GetManyById { object, .. }
            | ObjectCall::Create { object, .. }
            | ObjectCall::Save { object, .. }
            | ObjectCall::SoftDelete { object, .. }
            | ObjectCall::Destroy { object, .. } => object,
        }
    }

    /// Method name as checked against a schema's remotable set
    pub fn method(&self) -> &'static str {
        match self {
            ObjectCall::GetById { .. } => "get_by_id",
            ObjectCall::GetByUuid { .. } => "get_by_uuid",
            ObjectCall::GetByName { .. } => "get_by_name",
            ObjectCall::List { .. } | ObjectCall::GetManyById { .. } => "list",
            ObjectCall::Create { .. } => "create",
            ObjectCall::Save { .. } => "save",
            ObjectCall::SoftDelete { .. } => "soft_delete",
            ObjectCall::Destroy { .. } => "destroy",
        }
    }

    /// Whether results should come back with relations resolved
    pub fn is_eager(&self) -> bool {
        match self {
            ObjectCall::GetById { eager, .. }
            | ObjectCall::GetByUuid { eager, .. }
            | ObjectCall::GetByName { eager, .. } => *eager,
            ObjectCall::List { query, .. } => query.eager,
            ObjectCall::Create { .. } => true,
            _ => false,
        }
    }
}

/// What an executor returns for each affected object
#[derive(Debug, Clone)]
pub enum Payload {
    Record(RawRecord),
    Primitive(ObjectPrimitive),
}

/// Runs an [`ObjectCall`] somewhere
pub trait ObjectExecutor {
    fn execute(&self, ctx: &RequestContext, call: &ObjectCall) -> Result<Vec<Payload>>;
}

/// Executes against the persistence adapter in this process
pub struct LocalExecutor<'a> {
    adapter: &'a dyn PersistenceAdapter,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(adapter: &'a dyn PersistenceAdapter) -> Self {
        Self { adapter }
    }
}

impl ObjectExecutor for LocalExecutor<'_> {
    fn execute(&self, _ctx: &RequestContext, call: &ObjectCall) -> Result<Vec<Payload>> {
        let adapter = self.adapter;
        let records = match call {
            ObjectCall::GetById { object, id, eager } => {
                vec![adapter.get_by_id(object, *id, *eager)?]
            }
            ObjectCall::GetByUuid {
                object,
                uuid,
                eager,
            } => vec![adapter.get_by_uuid(object, uuid, *eager)?],
            ObjectCall::GetByName {
                object,
                name,
                eager,
            } => vec![adapter.get_by_name(object, name, *eager)?],
            ObjectCall::List { object, query } => adapter.list(object, query)?,
            ObjectCall::GetManyById { object, ids } => adapter.get_many_by_id(object, ids)?,
            ObjectCall::Create { object, values } => vec![adapter.create(object, values.clone())?],
            ObjectCall::Save {
                object,
                uuid,
                delta,
            } => vec![adapter.update(object, uuid, delta.clone())?],
            ObjectCall::SoftDelete { object, uuid } => {
                adapter.soft_delete(object, uuid)?;
                Vec::new()
            }
            ObjectCall::Destroy { object, uuid } => {
                adapter.destroy(object, uuid)?;
                Vec::new()
            }
        };
        Ok(records.into_iter().map(Payload::Record).collect())
    }
}

/// Execution strategy chosen for one call
pub enum Executor<'a> {
    Local(LocalExecutor<'a>),
    Remote(RemoteExecutor<'a>),
}

impl Executor<'_> {
    pub fn is_remote(&self) -> bool {
        matches!(self, Executor::Remote(_))
    }
}

impl ObjectExecutor for Executor<'_> {
    fn execute(&self, ctx: &RequestContext, call: &ObjectCall) -> Result<Vec<Payload>> {
        match self {
            Executor::Local(local) => local.execute(ctx, call),
            Executor::Remote(remote) => remote.execute(ctx, call),
        }
    }
}

struct GatewayInner {
    registry: Arc<ObjectRegistry>,
    adapter: Arc<dyn PersistenceAdapter>,
    transport: Option<Arc<dyn Transport>>,
    notifier: Option<Arc<dyn Notifier>>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
}

/// Entry point for object persistence. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("objects", &self.inner.registry.object_names())
            .field("remote", &self.inner.transport.is_some())
            .field("notify", &self.inner.notifier.is_some())
            .field("max_page_size", &self.inner.max_page_size)
            .finish()
    }
}

pub struct GatewayBuilder {
    registry: Arc<ObjectRegistry>,
    adapter: Arc<dyn PersistenceAdapter>,
    transport: Option<Arc<dyn Transport>>,
    notifier: Option<Arc<dyn Notifier>>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
}

impl GatewayBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = Some(size);
        self
    }

    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Apply paging limits and notification settings from configuration
    pub fn configure(mut self, config: &ObjectsConfig) -> Self {
        self.default_page_size = config.storage.default_page_size;
        self.max_page_size = Some(config.storage.max_page_size);
        if config.gateway.notify && self.notifier.is_none() {
            self.notifier = Some(Arc::new(LogNotifier));
        }
        self
    }

    pub fn build(self) -> Gateway {
        Gateway {
            inner: Arc::new(GatewayInner {
                registry: self.registry,
                adapter: self.adapter,
                transport: self.transport,
                notifier: self.notifier,
                default_page_size: self.default_page_size,
                max_page_size: self.max_page_size,
            }),
        }
    }
}

impl Gateway {
    pub fn builder(
        registry: Arc<ObjectRegistry>,
        adapter: Arc<dyn PersistenceAdapter>,
    ) -> GatewayBuilder {
        GatewayBuilder {
            registry,
            adapter,
            transport: None,
            notifier: None,
            default_page_size: None,
            max_page_size: None,
        }
    }

    /// Local-only gateway without notifications
    pub fn local(registry: Arc<ObjectRegistry>, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self::builder(registry, adapter).build()
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.inner.registry
    }

    pub fn adapter(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.inner.adapter
    }

    /// Schema of `object` at the version negotiated for `ctx`
    pub fn schema_for(&self, ctx: &RequestContext, object: &str) -> Result<Arc<ObjectSchema>> {
        let registry = self.registry();
        let requested = ctx.requested_version(registry, object)?;
        registry.resolve(object, &requested)
    }

    /// Choose where `call` runs. Remote execution needs a remote context, a
    /// remotable method and a configured transport.
    pub fn executor_for(&self, ctx: &RequestContext, call: &ObjectCall) -> Result<Executor<'_>> {
        let schema = self.schema_for(ctx, call.object())?;
        if ctx.boundary == Boundary::Remote && schema.is_remotable(call.method()) {
            let transport = self.inner.transport.as_deref().ok_or_else(|| {
                ObjectError::RemoteUnavailable(format!(
                    "no transport configured for remote {}.{}",
                    call.object(),
                    call.method()
                ))
            })?;
            debug!(object = call.object(), method = call.method(), "executing remotely");
            return Ok(Executor::Remote(RemoteExecutor::new(self, transport)));
        }
        Ok(Executor::Local(LocalExecutor::new(self.inner.adapter.as_ref())))
    }

    fn execute(&self, ctx: &RequestContext, call: &ObjectCall) -> Result<Vec<Payload>> {
        self.executor_for(ctx, call)?.execute(ctx, call)
    }

    /// A new, unsaved instance at the negotiated version
    pub fn new_object(&self, ctx: &RequestContext, object: &str) -> Result<ObjectInstance> {
        let schema = self.schema_for(ctx, object)?;
        let mut instance = ObjectInstance::new(ctx.clone(), schema);
        instance.bind(self.clone());
        Ok(instance)
    }

    /// Load by integer id or uuid, whichever `identity` is
    pub fn get<I>(
        &self,
        ctx: &RequestContext,
        object: &str,
        identity: &I,
        eager: bool,
    ) -> Result<ObjectInstance>
    where
        I: AsIdentity + ?Sized,
    {
        match identity.to_identity()? {
            Identity::Id(id) => self.get_by_id(ctx, object, id, eager),
            Identity::Uuid(uuid) => self.get_by_uuid(ctx, object, uuid, eager),
        }
    }

    pub fn get_by_id(
        &self,
        ctx: &RequestContext,
        object: &str,
        id: i64,
        eager: bool,
    ) -> Result<ObjectInstance> {
        let call = ObjectCall::GetById {
            object: object.to_string(),
            id,
            eager,
        };
        self.load_one(ctx, &call)
    }

    pub fn get_by_uuid(
        &self,
        ctx: &RequestContext,
        object: &str,
        uuid: Uuid,
        eager: bool,
    ) -> Result<ObjectInstance> {
        let call = ObjectCall::GetByUuid {
            object: object.to_string(),
            uuid,
            eager,
        };
        self.load_one(ctx, &call)
    }

    /// The single active object with this name
    pub fn get_by_name(
        &self,
        ctx: &RequestContext,
        object: &str,
        name: &str,
        eager: bool,
    ) -> Result<ObjectInstance> {
        let call = ObjectCall::GetByName {
            object: object.to_string(),
            name: name.to_string(),
            eager,
        };
        self.load_one(ctx, &call)
    }

    /// Filtered, paginated listing. Soft-deleted rows are included when the
    /// query or the context asks for them.
    pub fn list(
        &self,
        ctx: &RequestContext,
        object: &str,
        mut query: ListQuery,
    ) -> Result<Vec<ObjectInstance>> {
        query.include_deleted |= ctx.show_deleted;
        query.limit = query.limit.or(self.inner.default_page_size);
        if let Some(max) = self.inner.max_page_size {
            query.limit = Some(query.limit.map_or(max, |l| l.min(max)));
        }
        let eager = query.eager;
        let call = ObjectCall::List {
            object: object.to_string(),
            query,
        };
        let payloads = self.execute(ctx, &call)?;
        let schema = self.schema_for(ctx, object)?;
        self.materialize_all(ctx, &schema, payloads, eager)
    }

    /// Objects for the given ids in a single fetch; missing ids are skipped
    pub fn fetch_many_by_id(
        &self,
        ctx: &RequestContext,
        object: &str,
        ids: &[i64],
    ) -> Result<Vec<ObjectInstance>> {
        let call = ObjectCall::GetManyById {
            object: object.to_string(),
            ids: ids.to_vec(),
        };
        let payloads = self.execute(ctx, &call)?;
        let schema = self.schema_for(ctx, object)?;
        self.materialize_all(ctx, &schema, payloads, false)
    }

    /// Store a new instance and replace it with the stored copy, relations
    /// resolved. The instance is left untouched if storing fails; if only
    /// relation loading fails it already holds the stored identity.
    pub fn create(&self, instance: &mut ObjectInstance) -> Result<()> {
        instance.ensure_alive()?;
        if !instance.is_new() || instance.is_set("id") {
            return Err(ObjectError::action(
                "create",
                instance.object_name(),
                "already created",
            ));
        }

        let mut values = instance.to_record();
        if instance.uuid().is_none() {
            values.insert("uuid".to_string(), Uuid::new_v4().to_string().into());
        }
        let ctx = instance.context().clone();
        let schema = Arc::clone(instance.schema());
        let call = ObjectCall::Create {
            object: schema.name.clone(),
            values,
        };
        let payloads = self.execute(&ctx, &call)?;
        let created = self
            .materialize_all(&ctx, &schema, payloads, false)?
            .pop()
            .ok_or_else(|| {
                ObjectError::action("create", &schema.name, "storage returned no row")
            })?;

        // The row exists from here on, so the instance takes its identity
        // before relations are resolved
        info!(object = %schema.name, uuid = %created.identity_label(), "created object");
        *instance = created;
        RelationResolver::new(self).resolve_batch(std::slice::from_mut(instance))?;
        self.notify(&ctx, EventAction::Create, instance);
        Ok(())
    }

    /// Persist changed fields. A clean instance is not sent anywhere.
    pub fn save(&self, instance: &mut ObjectInstance) -> Result<()> {
        instance.ensure_alive()?;
        let uuid = match (instance.state(), instance.uuid()) {
            (Lifecycle::New, _) | (_, None) => {
                return Err(ObjectError::action(
                    "save",
                    instance.object_name(),
                    "object has not been created",
                ))
            }
            (_, Some(uuid)) => uuid,
        };
        if !instance.is_dirty() {
            debug!(object = instance.object_name(), %uuid, "nothing to save");
            return Ok(());
        }

        let ctx = instance.context().clone();
        let schema = Arc::clone(instance.schema());
        let call = ObjectCall::Save {
            object: schema.name.clone(),
            uuid,
            delta: instance.changes_record(),
        };
        let payloads = self.execute(&ctx, &call)?;
        if let Some(payload) = payloads.into_iter().next() {
            let stored = self.materialize(&ctx, &schema, payload)?;
            instance.merge_from(&stored);
        }
        debug!(object = %schema.name, %uuid, fields = ?instance.changed_fields(), "saved object");
        instance.reset_changes();
        self.notify(&ctx, EventAction::Update, instance);
        Ok(())
    }

    /// Reload and merge differing fields; local changes are discarded
    pub fn refresh(&self, instance: &mut ObjectInstance, eager: bool) -> Result<()> {
        instance.ensure_alive()?;
        let uuid = instance.uuid().ok_or_else(|| {
            ObjectError::action("refresh", instance.object_name(), "object has not been created")
        })?;
        let ctx = instance.context().clone();
        let schema = Arc::clone(instance.schema());
        let call = ObjectCall::GetByUuid {
            object: schema.name.clone(),
            uuid,
            eager,
        };
        let payloads = self.execute(&ctx, &call)?;
        let current = self
            .materialize_all(&ctx, &schema, payloads, eager)?
            .pop()
            .ok_or_else(|| ObjectError::not_found(&schema.name, uuid))?;
        instance.merge_from(&current);
        instance.reset_changes();
        Ok(())
    }

    /// Remove the stored row. Always runs locally.
    pub fn destroy(&self, instance: &mut ObjectInstance) -> Result<()> {
        instance.ensure_alive()?;
        let uuid = instance.uuid().ok_or_else(|| {
            ObjectError::action("destroy", instance.object_name(), "object has not been created")
        })?;
        let ctx = instance.context().clone();
        let call = ObjectCall::Destroy {
            object: instance.object_name().to_string(),
            uuid,
        };
        self.execute(&ctx, &call)?;
        info!(object = instance.object_name(), %uuid, "destroyed object");
        self.notify(&ctx, EventAction::Delete, instance);
        instance.mark_destroyed();
        Ok(())
    }

    /// Mark the stored row inactive
    pub fn soft_delete(&self, instance: &mut ObjectInstance) -> Result<()> {
        match instance.state() {
            Lifecycle::Persisted => {}
            Lifecycle::New => {
                return Err(ObjectError::action(
                    "soft_delete",
                    instance.object_name(),
                    "object has not been created",
                ))
            }
            Lifecycle::SoftDeleted | Lifecycle::Destroyed => {
                return Err(ObjectError::not_found(
                    instance.object_name(),
                    instance.identity_label(),
                ))
            }
        }
        let uuid = instance
            .uuid()
            .ok_or_else(|| ObjectError::not_found(instance.object_name(), instance.identity_label()))?;
        let ctx = instance.context().clone();
        let call = ObjectCall::SoftDelete {
            object: instance.object_name().to_string(),
            uuid,
        };
        self.execute(&ctx, &call)?;
        instance.mark_soft_deleted();
        info!(object = instance.object_name(), %uuid, "soft-deleted object");
        self.notify(&ctx, EventAction::SoftDelete, instance);
        Ok(())
    }

    /// Turn one payload into a bound, clean instance of `schema`. Primitives
    /// from another minor of the same major are accepted; unknown fields are
    /// dropped and nested relations are adopted.
    pub fn materialize(
        &self,
        ctx: &RequestContext,
        schema: &Arc<ObjectSchema>,
        payload: Payload,
    ) -> Result<ObjectInstance> {
        let data = match payload {
            Payload::Record(record) => record,
            Payload::Primitive(primitive) => {
                if primitive.name != schema.name {
                    return Err(ObjectError::InvalidSchema(format!(
                        "expected a {} primitive, got {}",
                        schema.name, primitive.name
                    )));
                }
                if !primitive.version.is_compatible_with(&schema.version) {
                    return Err(ObjectError::UnsupportedVersion {
                        object: primitive.name,
                        version: primitive.version.to_string(),
                    });
                }
                primitive.data
            }
        };
        let mut instance = ObjectInstance::from_record(ctx.clone(), Arc::clone(schema), &data)?;
        instance.bind(self.clone());
        RelationResolver::new(self).adopt_nested(&mut instance, &data)?;
        Ok(instance)
    }

    /// Materialize a result set, batch-resolving relations when `eager`
    pub fn materialize_all(
        &self,
        ctx: &RequestContext,
        schema: &Arc<ObjectSchema>,
        payloads: Vec<Payload>,
        eager: bool,
    ) -> Result<Vec<ObjectInstance>> {
        let mut objects = payloads
            .into_iter()
            .map(|payload| self.materialize(ctx, schema, payload))
            .collect::<Result<Vec<_>>>()?;
        if eager {
            RelationResolver::new(self).resolve_batch(&mut objects)?;
        }
        Ok(objects)
    }

    fn load_one(&self, ctx: &RequestContext, call: &ObjectCall) -> Result<ObjectInstance> {
        let payloads = self.execute(ctx, call)?;
        let schema = self.schema_for(ctx, call.object())?;
        self.materialize_all(ctx, &schema, payloads, call.is_eager())?
            .pop()
            .ok_or_else(|| ObjectError::not_found(call.object(), "<unknown>"))
    }

    fn notify(&self, ctx: &RequestContext, action: EventAction, instance: &ObjectInstance) {
        let Some(notifier) = &self.inner.notifier else {
            return;
        };
        let event = ObjectEvent::new(action, instance);
        if let Err(e) = notifier.publish(ctx, &event) {
            warn!(event_type = %event.event_type(), error = %e, "failed to publish object event");
        }
    }
}
