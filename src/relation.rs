//! Relation loading
//!
//! Object-valued fields are resolved through their integer key field. A
//! relation is loaded at most once per instance: either adopted from data
//! nested in a payload, fetched lazily on first access, or batch-loaded for a
//! whole result set with a single fetch per relation field.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::adapter::RawRecord;
use crate::error::{ObjectError, Result};
use crate::gateway::{Gateway, Payload};
use crate::object::ObjectInstance;
use crate::primitive::ObjectPrimitive;

/// Loaded relation objects of one instance. A present `None` slot means the
/// relation was resolved and its key is null.
#[derive(Debug, Clone, Default)]
pub struct RelationCache {
    loaded: BTreeMap<String, Option<Arc<ObjectInstance>>>,
}

impl RelationCache {
    pub fn get(&self, field: &str) -> Option<&Option<Arc<ObjectInstance>>> {
        self.loaded.get(field)
    }

    pub fn insert(&mut self, field: &str, related: Option<Arc<ObjectInstance>>) {
        self.loaded.insert(field.to_string(), related);
    }

    pub fn invalidate(&mut self, field: &str) {
        self.loaded.remove(field);
    }

    pub fn is_loaded(&self, field: &str) -> bool {
        self.loaded.contains_key(field)
    }

    pub fn clear(&mut self) {
        self.loaded.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Option<Arc<ObjectInstance>>)> {
        self.loaded.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Resolves relation fields through a gateway
pub struct RelationResolver<'a> {
    gateway: &'a Gateway,
}

impl<'a> RelationResolver<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    /// Load one relation of one instance with a single fetch
    pub fn resolve_one(
        &self,
        instance: &mut ObjectInstance,
        field: &str,
    ) -> Result<Option<Arc<ObjectInstance>>> {
        let schema = Arc::clone(instance.schema());
        let spec = schema.relation(field).ok_or_else(|| ObjectError::UnknownField {
            object: schema.name.clone(),
            field: field.to_string(),
        })?;

        let related = match instance.get_int(spec.key)? {
            None => None,
            Some(id) => {
                debug!(
                    object = %schema.name,
                    relation = field,
                    related_id = id,
                    "lazy-loading relation"
                );
                let loaded = self
                    .gateway
                    .get_by_id(instance.context(), spec.object, id, false)?;
                Some(Arc::new(loaded))
            }
        };
        instance.cache_relation(field, related.clone());
        Ok(related)
    }

    /// Resolve every unloaded relation across `instances`, which must share
    /// one schema. Issues one fetch per relation field for the distinct
    /// non-null keys; instances with equal keys share the loaded object.
    pub fn resolve_batch(&self, instances: &mut [ObjectInstance]) -> Result<()> {
        let Some(first) = instances.first() else {
            return Ok(());
        };
        let schema = Arc::clone(first.schema());
        let ctx = first.context().clone();

        for spec in schema.relations() {
            let mut wanted = BTreeSet::new();
            for instance in instances.iter() {
                if instance.is_relation_loaded(spec.field) {
                    continue;
                }
                if let Some(id) = instance.get_int(spec.key)? {
                    wanted.insert(id);
                }
            }

            let fetched: HashMap<i64, Arc<ObjectInstance>> = if wanted.is_empty() {
                HashMap::new()
            } else {
                let ids: Vec<i64> = wanted.into_iter().collect();
                debug!(
                    object = %schema.name,
                    relation = spec.field,
                    keys = ids.len(),
                    "batch-loading relation"
                );
                self.gateway
                    .fetch_many_by_id(&ctx, spec.object, &ids)?
                    .into_iter()
                    .filter_map(|o| o.id().map(|id| (id, Arc::new(o))))
                    .collect()
            };

            for instance in instances.iter_mut() {
                if instance.is_relation_loaded(spec.field) {
                    continue;
                }
                let related = match instance.get_int(spec.key)? {
                    None => None,
                    Some(id) => Some(
                        fetched
                            .get(&id)
                            .cloned()
                            .ok_or_else(|| ObjectError::not_found(spec.object, id))?,
                    ),
                };
                instance.cache_relation(spec.field, related);
            }
        }
        Ok(())
    }

    /// Adopt relation data already nested in a payload, either a plain row or
    /// a serialized primitive, so no fetch is needed for it
    pub fn adopt_nested(&self, instance: &mut ObjectInstance, data: &RawRecord) -> Result<()> {
        let schema = Arc::clone(instance.schema());
        for spec in schema.relations() {
            let Some(value) = data.get(spec.field) else {
                continue;
            };
            let related = match value {
                Value::Null => None,
                Value::Object(row) => {
                    let payload = if ObjectPrimitive::is_primitive(value) {
                        Payload::Primitive(ObjectPrimitive::from_value(value.clone())?)
                    } else {
                        Payload::Record(row.clone())
                    };
                    let related_schema = self.gateway.schema_for(instance.context(), spec.object)?;
                    let related = self
                        .gateway
                        .materialize(instance.context(), &related_schema, payload)?;
                    Some(Arc::new(related))
                }
                other => {
                    return Err(ObjectError::TypeMismatch {
                        object: schema.name.clone(),
                        field: spec.field.to_string(),
                        expected: format!("nested {}", spec.object),
                        value: other.to_string(),
                    })
                }
            };
            instance.cache_relation(spec.field, related);
        }
        Ok(())
    }
}
