//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;
use versioned_objects::gateway::TransportError;
use versioned_objects::objects::{audit_template, goal, strategy};
use versioned_objects::{
    AuditTemplate, Gateway, Goal, InMemoryAdapter, ListQuery, LoopbackTransport, Notifier,
    ObjectEvent, ObjectPrimitive, ObjectRegistry, ObjectSchema, ObjectVersion, PersistenceAdapter,
    PersistentObject, RawRecord, RemoteEndpoint, RequestContext, Result, Strategy, Transport,
};

/// In-memory adapter that counts calls per method
#[derive(Debug, Default)]
pub struct CountingAdapter {
    inner: InMemoryAdapter,
    calls: Mutex<BTreeMap<&'static str, usize>>,
}

impl CountingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_default() += 1;
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    /// Calls that read rows
    pub fn fetches(&self) -> usize {
        ["get_by_id", "get_by_uuid", "get_by_name", "list", "get_many_by_id"]
            .iter()
            .map(|m| self.count(m))
            .sum()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    pub fn raw_row(&self, object: &str, uuid: &Uuid) -> Option<RawRecord> {
        self.inner.raw_row(object, uuid)
    }
}

impl PersistenceAdapter for CountingAdapter {
    fn create(&self, object: &str, values: RawRecord) -> Result<RawRecord> {
        self.hit("create");
        self.inner.create(object, values)
    }

    fn get_by_id(&self, object: &str, id: i64, eager: bool) -> Result<RawRecord> {
        self.hit("get_by_id");
        self.inner.get_by_id(object, id, eager)
    }

    fn get_by_uuid(&self, object: &str, uuid: &Uuid, eager: bool) -> Result<RawRecord> {
        self.hit("get_by_uuid");
        self.inner.get_by_uuid(object, uuid, eager)
    }

    fn get_by_name(&self, object: &str, name: &str, eager: bool) -> Result<RawRecord> {
        self.hit("get_by_name");
        self.inner.get_by_name(object, name, eager)
    }

    fn list(&self, object: &str, query: &ListQuery) -> Result<Vec<RawRecord>> {
        self.hit("list");
        self.inner.list(object, query)
    }

    fn get_many_by_id(&self, object: &str, ids: &[i64]) -> Result<Vec<RawRecord>> {
        self.hit("get_many_by_id");
        self.inner.get_many_by_id(object, ids)
    }

    fn update(&self, object: &str, uuid: &Uuid, delta: RawRecord) -> Result<RawRecord> {
        self.hit("update");
        self.inner.update(object, uuid, delta)
    }

    fn destroy(&self, object: &str, uuid: &Uuid) -> Result<()> {
        self.hit("destroy");
        self.inner.destroy(object, uuid)
    }

    fn soft_delete(&self, object: &str, uuid: &Uuid) -> Result<()> {
        self.hit("soft_delete");
        self.inner.soft_delete(object, uuid)
    }
}

/// Notifier keeping every published event as (event type, primitive)
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, ObjectPrimitive)>>,
}

impl Notifier for RecordingNotifier {
    fn publish(&self, _ctx: &RequestContext, event: &ObjectEvent<'_>) -> Result<()> {
        let primitive = event.object.to_primitive()?;
        self.events.lock().push((event.event_type(), primitive));
        Ok(())
    }
}

/// Transport whose peer is always gone
#[derive(Debug, Default)]
pub struct DeadTransport;

impl Transport for DeadTransport {
    fn send(&self, _request: &str) -> std::result::Result<String, TransportError> {
        Err(TransportError::Disconnected("connection refused".into()))
    }
}

/// A gateway with its adapter and notifier exposed for inspection
pub struct Harness {
    pub gateway: Gateway,
    pub adapter: Arc<CountingAdapter>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn local() -> Self {
        Self::with_registry(full_registry())
    }

    pub fn with_registry(registry: ObjectRegistry) -> Self {
        let adapter = Arc::new(CountingAdapter::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Gateway::builder(Arc::new(registry), adapter.clone())
            .notifier(notifier.clone())
            .build();
        Self {
            gateway,
            adapter,
            notifier,
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.notifier.events.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

/// A client gateway whose remotable calls go to a server with its own
/// registry and storage
pub struct RemotePair {
    pub client: Gateway,
    pub server: Harness,
}

impl RemotePair {
    pub fn new(client_registry: ObjectRegistry, server_registry: ObjectRegistry) -> Self {
        let server = Harness::with_registry(server_registry);
        let endpoint = RemoteEndpoint::new(server.gateway.clone());
        let client = Gateway::builder(Arc::new(client_registry), Arc::new(InMemoryAdapter::new()))
            .transport(Arc::new(LoopbackTransport::new(endpoint)))
            .build();
        Self { client, server }
    }
}

pub fn v(major: u64, minor: u64) -> ObjectVersion {
    ObjectVersion::new(major, minor)
}

/// Goal, Strategy and AuditTemplate 1.0 and 1.1
pub fn full_registry() -> ObjectRegistry {
    let mut registry = ObjectRegistry::new();
    versioned_objects::objects::register_all(&mut registry).unwrap();
    registry
}

/// Goal, Strategy and AuditTemplate 1.0 only
pub fn registry_1_0() -> ObjectRegistry {
    let mut registry = ObjectRegistry::new();
    for schema in goal::schemas().unwrap().into_iter().chain(strategy::schemas().unwrap()) {
        registry.register(schema).unwrap();
    }
    let v1_0 = audit_template::schemas().unwrap().remove(0);
    registry.register(v1_0).unwrap();
    registry
}

/// The full registry plus an AuditTemplate 1.2 adding `audit_type`
pub fn registry_1_2() -> ObjectRegistry {
    let mut registry = full_registry();
    registry.register(audit_template_1_2(&registry)).unwrap();
    registry
}

pub fn audit_template_1_2(registry: &ObjectRegistry) -> ObjectSchema {
    registry
        .latest(AuditTemplate::OBJECT_NAME)
        .unwrap()
        .evolve(v(1, 2))
        .field(
            "audit_type",
            versioned_objects::FieldDescriptor::string().nullable(),
        )
        .build()
        .unwrap()
}

/// Goal, Strategy and an incompatible AuditTemplate 2.0
pub fn registry_2_0() -> ObjectRegistry {
    let mut registry = ObjectRegistry::new();
    for schema in goal::schemas().unwrap().into_iter().chain(strategy::schemas().unwrap()) {
        registry.register(schema).unwrap();
    }
    let v2_0 = ObjectSchema::builder(AuditTemplate::OBJECT_NAME, v(2, 0))
        .persistent()
        .field("name", versioned_objects::FieldDescriptor::string())
        .field("goal_uuid", versioned_objects::FieldDescriptor::uuid())
        .build()
        .unwrap();
    registry.register(v2_0).unwrap();
    registry
}

pub fn create_goal(gateway: &Gateway, ctx: &RequestContext, name: &str) -> Goal {
    let mut goal = Goal::new(gateway, ctx).unwrap();
    goal.set_name(name).unwrap();
    goal.set_display_name(name).unwrap();
    goal.create().unwrap();
    goal
}

pub fn create_strategy(gateway: &Gateway, ctx: &RequestContext, name: &str, goal: &Goal) -> Strategy {
    let mut strategy = Strategy::new(gateway, ctx).unwrap();
    strategy.set_name(name).unwrap();
    strategy.set_display_name(name).unwrap();
    strategy.set_goal_id(goal.id().unwrap()).unwrap();
    strategy.create().unwrap();
    strategy
}

pub fn create_template(
    gateway: &Gateway,
    ctx: &RequestContext,
    name: &str,
    goal: &Goal,
    strategy: Option<&Strategy>,
) -> AuditTemplate {
    let mut template = AuditTemplate::new(gateway, ctx).unwrap();
    template.set_name(name).unwrap();
    template.set_goal_id(goal.id().unwrap()).unwrap();
    template
        .set_strategy_id(strategy.and_then(|s| s.id()))
        .unwrap();
    template.create().unwrap();
    template
}
