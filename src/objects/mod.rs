//! Domain objects
//!
//! Each domain type is a thin typed wrapper around an [`ObjectInstance`]
//! plus the schema versions it has shipped. CRUD comes from
//! [`PersistentObject`]'s default methods, which delegate to the gateway.

pub mod audit_template;
pub mod goal;
pub mod strategy;

use std::sync::Arc;
use uuid::Uuid;

use crate::adapter::ListQuery;
use crate::context::RequestContext;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::identity::AsIdentity;
use crate::object::ObjectInstance;
use crate::registry::ObjectRegistry;

pub use audit_template::AuditTemplate;
pub use goal::Goal;
pub use strategy::Strategy;

/// Typed access to a persistent object type
pub trait PersistentObject: Sized {
    /// Registered type name
    const OBJECT_NAME: &'static str;

    fn from_instance(instance: ObjectInstance) -> Self;

    fn instance(&self) -> &ObjectInstance;

    fn instance_mut(&mut self) -> &mut ObjectInstance;

    fn into_instance(self) -> ObjectInstance;

    /// A new, unsaved object at the version negotiated for `ctx`
    fn new(gateway: &Gateway, ctx: &RequestContext) -> Result<Self> {
        gateway
            .new_object(ctx, Self::OBJECT_NAME)
            .map(Self::from_instance)
    }

    /// Find by integer id or uuid
    fn get<I>(gateway: &Gateway, ctx: &RequestContext, identity: &I, eager: bool) -> Result<Self>
    where
        I: AsIdentity + ?Sized,
    {
        gateway
            .get(ctx, Self::OBJECT_NAME, identity, eager)
            .map(Self::from_instance)
    }

    fn get_by_id(gateway: &Gateway, ctx: &RequestContext, id: i64, eager: bool) -> Result<Self> {
        gateway
            .get_by_id(ctx, Self::OBJECT_NAME, id, eager)
            .map(Self::from_instance)
    }

    fn get_by_uuid(gateway: &Gateway, ctx: &RequestContext, uuid: Uuid, eager: bool) -> Result<Self> {
        gateway
            .get_by_uuid(ctx, Self::OBJECT_NAME, uuid, eager)
            .map(Self::from_instance)
    }

    fn get_by_name(gateway: &Gateway, ctx: &RequestContext, name: &str, eager: bool) -> Result<Self> {
        gateway
            .get_by_name(ctx, Self::OBJECT_NAME, name, eager)
            .map(Self::from_instance)
    }

    fn list(gateway: &Gateway, ctx: &RequestContext, query: ListQuery) -> Result<Vec<Self>> {
        Ok(gateway
            .list(ctx, Self::OBJECT_NAME, query)?
            .into_iter()
            .map(Self::from_instance)
            .collect())
    }

    fn create(&mut self) -> Result<()> {
        self.instance_mut().create()
    }

    fn save(&mut self) -> Result<()> {
        self.instance_mut().save()
    }

    fn refresh(&mut self, eager: bool) -> Result<()> {
        self.instance_mut().refresh(eager)
    }

    fn destroy(&mut self) -> Result<()> {
        self.instance_mut().destroy()
    }

    fn soft_delete(&mut self) -> Result<()> {
        self.instance_mut().soft_delete()
    }

    fn id(&self) -> Option<i64> {
        self.instance().id()
    }

    fn uuid(&self) -> Option<Uuid> {
        self.instance().uuid()
    }
}

/// Wrap a loaded relation as its typed object
pub(crate) fn typed_relation<T: PersistentObject>(
    related: Option<Arc<ObjectInstance>>,
) -> Option<T> {
    related.map(|r| T::from_instance(Arc::unwrap_or_clone(r)))
}

/// Register every domain schema, dependencies first
pub fn register_all(registry: &mut ObjectRegistry) -> Result<()> {
    let schemas = goal::schemas()?
        .into_iter()
        .chain(strategy::schemas()?)
        .chain(audit_template::schemas()?);
    for schema in schemas {
        registry.register(schema)?;
    }
    Ok(())
}

/// A frozen registry holding every domain schema
pub fn default_registry() -> Result<Arc<ObjectRegistry>> {
    let mut registry = ObjectRegistry::new();
    register_all(&mut registry)?;
    Ok(Arc::new(registry))
}
