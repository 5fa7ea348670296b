//! Live object instances
//!
//! An [`ObjectInstance`] holds typed field values for one schema version,
//! tracks which fields were assigned since it was last synchronized with
//! storage, and caches relation objects once they are loaded. Persistence
//! operations are delegated to the [`Gateway`] the instance is bound to.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use chrono::{DateTime, Utc};

use crate::adapter::RawRecord;
use crate::context::RequestContext;
use crate::error::{ObjectError, Result};
use crate::fields::{FieldDescriptor, FieldValue};
use crate::gateway::Gateway;
use crate::primitive::ObjectPrimitive;
use crate::relation::{RelationCache, RelationResolver};
use crate::schema::ObjectSchema;
use crate::tracker::ChangeTracker;
use crate::version::ObjectVersion;

static NULL: FieldValue = FieldValue::Null;

/// Where an instance is in its persistence lifecycle. Clean versus dirty is
/// derived from the change set, see [`ObjectInstance::is_dirty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed locally, never stored
    New,
    /// Stored and active
    Persisted,
    /// Stored but marked inactive
    SoftDeleted,
    /// Row removed; the instance is unusable
    Destroyed,
}

/// An object bound to a request context and a schema version
#[derive(Debug, Clone)]
pub struct ObjectInstance {
    context: RequestContext,
    schema: Arc<ObjectSchema>,
    values: BTreeMap<String, FieldValue>,
    changes: ChangeTracker,
    relations: RelationCache,
    state: Lifecycle,
    gateway: Option<Gateway>,
}

impl ObjectInstance {
    /// A new, unsaved instance
    pub fn new(context: RequestContext, schema: Arc<ObjectSchema>) -> Self {
        Self {
            context,
            schema,
            values: BTreeMap::new(),
            changes: ChangeTracker::new(),
            relations: RelationCache::default(),
            state: Lifecycle::New,
            gateway: None,
        }
    }

    /// Build a clean instance from a stored record. Keys the schema does not
    /// declare are ignored so newer payloads load into older schemas.
    pub(crate) fn from_record(
        context: RequestContext,
        schema: Arc<ObjectSchema>,
        record: &RawRecord,
    ) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (name, descriptor) in schema.scalar_fields() {
            if let Some(raw) = record.get(name) {
                values.insert(name.to_string(), descriptor.coerce(&schema.name, name, raw)?);
            }
        }
        let deleted = values.get("deleted_at").is_some_and(|v| !v.is_null());
        Ok(Self {
            context,
            schema,
            values,
            changes: ChangeTracker::new(),
            relations: RelationCache::default(),
            state: if deleted {
                Lifecycle::SoftDeleted
            } else {
                Lifecycle::Persisted
            },
            gateway: None,
        })
    }

    pub(crate) fn bind(&mut self, gateway: Gateway) {
        self.gateway = Some(gateway);
    }

    pub(crate) fn gateway(&self) -> Result<Gateway> {
        self.gateway.clone().ok_or_else(|| {
            ObjectError::action(
                "load",
                self.object_name(),
                "instance is not bound to a gateway",
            )
        })
    }

    pub fn object_name(&self) -> &str {
        &self.schema.name
    }

    pub fn version(&self) -> &ObjectVersion {
        &self.schema.version
    }

    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == Lifecycle::New
    }

    /// Has unsaved assignments
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.state == Lifecycle::SoftDeleted
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == Lifecycle::Destroyed
    }

    /// Stored id, if any
    pub fn id(&self) -> Option<i64> {
        self.values.get("id").and_then(FieldValue::as_i64)
    }

    /// Uuid, if assigned
    pub fn uuid(&self) -> Option<Uuid> {
        self.values.get("uuid").and_then(FieldValue::as_uuid)
    }

    pub(crate) fn identity_label(&self) -> String {
        match (self.uuid(), self.id()) {
            (Some(uuid), _) => uuid.to_string(),
            (None, Some(id)) => id.to_string(),
            (None, None) => "<new>".to_string(),
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(ObjectError::ObjectDestroyed {
                object: self.object_name().to_string(),
                identity: self.identity_label(),
            });
        }
        Ok(())
    }

    fn descriptor(&self, field: &str) -> Result<&FieldDescriptor> {
        self.schema
            .field(field)
            .ok_or_else(|| ObjectError::UnknownField {
                object: self.object_name().to_string(),
                field: field.to_string(),
            })
    }

    fn scalar_descriptor(&self, field: &str) -> Result<&FieldDescriptor> {
        let descriptor = self.descriptor(field)?;
        if descriptor.is_object() {
            return Err(ObjectError::TypeMismatch {
                object: self.object_name().to_string(),
                field: field.to_string(),
                expected: format!("scalar field ({} is a relation)", field),
                value: "field access".to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Current value of a scalar field. Unset nullable fields read as null.
    pub fn get(&self, field: &str) -> Result<&FieldValue> {
        self.ensure_alive()?;
        let descriptor = self.scalar_descriptor(field)?;
        match self.values.get(field) {
            Some(value) => Ok(value),
            None if descriptor.nullable => Ok(&NULL),
            None => Err(ObjectError::FieldNotSet {
                object: self.object_name().to_string(),
                field: field.to_string(),
            }),
        }
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    fn typed<'a, T>(
        &'a self,
        field: &str,
        expected: &str,
        extract: impl FnOnce(&'a FieldValue) -> Option<T>,
    ) -> Result<Option<T>> {
        let value = self.get(field)?;
        if value.is_null() {
            return Ok(None);
        }
        extract(value).map(Some).ok_or_else(|| ObjectError::TypeMismatch {
            object: self.object_name().to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_int(&self, field: &str) -> Result<Option<i64>> {
        self.typed(field, "integer", FieldValue::as_i64)
    }

    pub fn get_str(&self, field: &str) -> Result<Option<&str>> {
        self.typed(field, "string", FieldValue::as_str)
    }

    pub fn get_uuid(&self, field: &str) -> Result<Option<Uuid>> {
        self.typed(field, "uuid", FieldValue::as_uuid)
    }

    pub fn get_bool(&self, field: &str) -> Result<Option<bool>> {
        self.typed(field, "boolean", FieldValue::as_bool)
    }

    pub fn get_datetime(&self, field: &str) -> Result<Option<DateTime<Utc>>> {
        self.typed(field, "datetime", FieldValue::as_datetime)
    }

    pub fn get_list_of_dict(&self, field: &str) -> Result<Option<&[Map<String, Value>]>> {
        self.typed(field, "list of dict", FieldValue::as_list_of_dict)
    }

    /// Assign a field, coercing `value` to the declared type.
    ///
    /// Assigning the current value is a no-op and is not tracked. Changing a
    /// relation's key drops the cached relation object.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_alive()?;
        let descriptor = self.scalar_descriptor(field)?;
        let value = descriptor.coerce(&self.schema.name, field, &value.into())?;
        if self.values.get(field) == Some(&value) {
            return Ok(());
        }
        self.values.insert(field.to_string(), value);
        self.changes.record(field);
        for relation in self.schema.relations_keyed_by(field) {
            self.relations.invalidate(relation.field);
        }
        Ok(())
    }

    /// Changed fields mapped to their current values
    pub fn get_changes(&self) -> BTreeMap<String, FieldValue> {
        self.changes
            .fields()
            .iter()
            .filter_map(|f| self.values.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }

    /// Changed field names in assignment order
    pub fn changed_fields(&self) -> &[String] {
        self.changes.fields()
    }

    pub fn reset_changes(&mut self) {
        self.changes.reset();
    }

    /// All set scalar values
    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn to_record(&self) -> RawRecord {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    pub(crate) fn changes_record(&self) -> RawRecord {
        self.get_changes()
            .into_iter()
            .map(|(k, v)| (k, v.to_json()))
            .collect()
    }

    /// Serialize at this instance's own version, nesting loaded relations
    pub fn to_primitive(&self) -> Result<ObjectPrimitive> {
        let mut data = self.to_record();
        for (field, slot) in self.relations.iter() {
            let nested = match slot {
                Some(related) => related.to_primitive()?.to_value()?,
                None => Value::Null,
            };
            data.insert(field.to_string(), nested);
        }
        let mut primitive = ObjectPrimitive::new(self.object_name(), self.version().clone(), data);
        primitive.changes = self.changes.fields().to_vec();
        Ok(primitive)
    }

    /// Related object for an object field, fetched on first access
    pub fn relation(&mut self, field: &str) -> Result<Option<Arc<ObjectInstance>>> {
        self.ensure_alive()?;
        if let Some(slot) = self.relations.get(field) {
            return Ok(slot.clone());
        }
        let gateway = self.gateway()?;
        RelationResolver::new(&gateway).resolve_one(self, field)
    }

    /// Cached relation without triggering a fetch. `None` means not loaded.
    pub fn loaded_relation(&self, field: &str) -> Option<Option<&Arc<ObjectInstance>>> {
        self.relations.get(field).map(Option::as_ref)
    }

    pub fn is_relation_loaded(&self, field: &str) -> bool {
        self.relations.is_loaded(field)
    }

    pub(crate) fn cache_relation(&mut self, field: &str, related: Option<Arc<ObjectInstance>>) {
        self.relations.insert(field, related);
    }

    /// Pull in fields of a freshly loaded copy that differ from ours,
    /// without tracking them as changes
    pub(crate) fn merge_from(&mut self, current: &ObjectInstance) {
        let fields: Vec<String> = self
            .schema
            .scalar_fields()
            .map(|(name, _)| name.to_string())
            .collect();
        for field in fields {
            let Some(value) = current.values.get(&field) else {
                continue;
            };
            if self.values.get(&field) != Some(value) {
                self.values.insert(field.clone(), value.clone());
                for relation in self.schema.relations_keyed_by(&field) {
                    self.relations.invalidate(relation.field);
                }
            }
        }
        for (field, slot) in current.relations.iter() {
            if self.schema.has_field(field) {
                self.relations.insert(field, slot.clone());
            }
        }
        self.state = current.state;
    }

    pub(crate) fn mark_soft_deleted(&mut self) {
        self.state = Lifecycle::SoftDeleted;
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.changes.reset();
        self.relations.clear();
        self.state = Lifecycle::Destroyed;
    }

    /// Store this new instance, then reload it with relations resolved
    pub fn create(&mut self) -> Result<()> {
        self.gateway()?.create(self)
    }

    /// Send the changed fields to storage; a clean instance is a no-op
    pub fn save(&mut self) -> Result<()> {
        self.gateway()?.save(self)
    }

    /// Re-read from storage and merge fields that differ
    pub fn refresh(&mut self, eager: bool) -> Result<()> {
        self.gateway()?.refresh(self, eager)
    }

    /// Remove the stored row; the instance is unusable afterwards
    pub fn destroy(&mut self) -> Result<()> {
        self.gateway()?.destroy(self)
    }

    /// Mark the stored row inactive
    pub fn soft_delete(&mut self) -> Result<()> {
        self.gateway()?.soft_delete(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldDescriptor;
    use serde_json::json;

    fn schema() -> Arc<ObjectSchema> {
        Arc::new(
            ObjectSchema::builder("Widget", ObjectVersion::new(1, 0))
                .persistent()
                .field("name", FieldDescriptor::string())
                .field("note", FieldDescriptor::string().nullable())
                .field("owner_id", FieldDescriptor::integer().nullable())
                .field("owner", FieldDescriptor::object("Owner", "owner_id").nullable())
                .build()
                .unwrap(),
        )
    }

    fn widget() -> ObjectInstance {
        ObjectInstance::new(RequestContext::new(), schema())
    }

    #[test]
    fn test_change_isolation() {
        let mut w = widget();
        w.set("name", "a").unwrap();
        w.reset_changes();
        assert!(w.get_changes().is_empty());

        w.set("name", "b").unwrap();
        let changes = w.get_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes["name"], FieldValue::String("b".into()));

        w.reset_changes();
        w.set("name", "b").unwrap();
        assert!(w.get_changes().is_empty());
        assert_eq!(w.get_str("name").unwrap(), Some("b"));
    }

    #[test]
    fn test_unset_fields() {
        let w = widget();
        assert!(matches!(w.get("name"), Err(ObjectError::FieldNotSet { .. })));
        assert_eq!(w.get("note").unwrap(), &FieldValue::Null);
        assert_eq!(w.get_str("note").unwrap(), None);
    }

    #[test]
    fn test_schema_violations_leave_state_unchanged() {
        let mut w = widget();
        w.set("owner_id", 3).unwrap();
        w.reset_changes();
        assert!(matches!(
            w.set("owner_id", "three"),
            Err(ObjectError::TypeMismatch { .. })
        ));
        assert!(matches!(
            w.set("colour", "red"),
            Err(ObjectError::UnknownField { .. })
        ));
        assert!(w.set("owner", json!({"id": 1})).is_err());
        assert_eq!(w.get_int("owner_id").unwrap(), Some(3));
        assert!(w.get_changes().is_empty());
    }

    #[test]
    fn test_load_is_clean_and_truncates() {
        let mut record = RawRecord::new();
        record.insert("id".into(), json!(4));
        record.insert("uuid".into(), json!(Uuid::new_v4().to_string()));
        record.insert("name".into(), json!("loaded"));
        record.insert("future_field".into(), json!(true));
        let w = ObjectInstance::from_record(RequestContext::new(), schema(), &record).unwrap();
        assert!(!w.is_dirty());
        assert_eq!(w.state(), Lifecycle::Persisted);
        assert_eq!(w.id(), Some(4));
        assert!(!w.is_set("future_field"));
    }

    #[test]
    fn test_key_change_invalidates_relation() {
        let mut w = widget();
        w.set("owner_id", 1).unwrap();
        w.cache_relation("owner", None);
        assert!(w.is_relation_loaded("owner"));
        w.set("owner_id", 1).unwrap();
        assert!(w.is_relation_loaded("owner"));
        w.set("owner_id", 2).unwrap();
        assert!(!w.is_relation_loaded("owner"));
    }

    #[test]
    fn test_destroyed_fails_fast() {
        let mut w = widget();
        w.set("name", "gone").unwrap();
        w.mark_destroyed();
        assert!(matches!(w.get("name"), Err(ObjectError::ObjectDestroyed { .. })));
        assert!(w.set("name", "x").is_err());
        assert!(w.relation("owner").is_err());
    }

    #[test]
    fn test_unbound_instance_cannot_lazy_load() {
        let mut w = widget();
        w.set("owner_id", 1).unwrap();
        assert!(matches!(
            w.relation("owner"),
            Err(ObjectError::ObjectActionError { .. })
        ));
    }

    #[test]
    fn test_primitive_includes_changes() {
        let mut w = widget();
        w.set("name", "p").unwrap();
        let p = w.to_primitive().unwrap();
        assert_eq!(p.name, "Widget");
        assert_eq!(p.version, ObjectVersion::new(1, 0));
        assert_eq!(p.changes, vec!["name".to_string()]);
        assert_eq!(p.data["name"], "p");
    }
}
