//! Audit Template
//!
//! An audit may be launched many times with the same settings, so those
//! settings are kept in a reusable preset: the goal to achieve, optionally the
//! strategy to reach it, and a scope restricting which resources the audit
//! looks at.

use serde_json::{Map, Value};

use crate::error::Result;
use crate::fields::FieldDescriptor;
use crate::object::ObjectInstance;
use crate::objects::{typed_relation, Goal, PersistentObject, Strategy};
use crate::schema::ObjectSchema;
use crate::version::ObjectVersion;

#[derive(Debug, Clone)]
pub struct AuditTemplate {
    instance: ObjectInstance,
}

// Version 1.0: Initial version
// Version 1.1: Added 'goal' and 'strategy' object fields
pub fn schemas() -> Result<Vec<ObjectSchema>> {
    let v1_0 = ObjectSchema::builder(AuditTemplate::OBJECT_NAME, ObjectVersion::new(1, 0))
        .persistent()
        .field("name", FieldDescriptor::string())
        .field("description", FieldDescriptor::string().nullable())
        .field("scope", FieldDescriptor::flexible_list_of_dict().nullable())
        .field("goal_id", FieldDescriptor::integer())
        .field("strategy_id", FieldDescriptor::integer().nullable())
        .build()?;
    let v1_1 = v1_0
        .evolve(ObjectVersion::new(1, 1))
        .field(
            "goal",
            FieldDescriptor::object(Goal::OBJECT_NAME, "goal_id").nullable(),
        )
        .field(
            "strategy",
            FieldDescriptor::object(Strategy::OBJECT_NAME, "strategy_id").nullable(),
        )
        .build()?;
    Ok(vec![v1_0, v1_1])
}

impl PersistentObject for AuditTemplate {
    const OBJECT_NAME: &'static str = "AuditTemplate";

    fn from_instance(instance: ObjectInstance) -> Self {
        Self { instance }
    }

    fn instance(&self) -> &ObjectInstance {
        &self.instance
    }

    fn instance_mut(&mut self) -> &mut ObjectInstance {
        &mut self.instance
    }

    fn into_instance(self) -> ObjectInstance {
        self.instance
    }
}

impl AuditTemplate {
    pub fn name(&self) -> Result<Option<&str>> {
        self.instance.get_str("name")
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.instance.set("name", name)
    }

    pub fn description(&self) -> Result<Option<&str>> {
        self.instance.get_str("description")
    }

    pub fn set_description(&mut self, description: Option<&str>) -> Result<()> {
        self.instance.set("description", description)
    }

    /// Resources the audit is restricted to
    pub fn scope(&self) -> Result<Option<&[Map<String, Value>]>> {
        self.instance.get_list_of_dict("scope")
    }

    pub fn set_scope(&mut self, scope: Vec<Map<String, Value>>) -> Result<()> {
        let scope: Vec<Value> = scope.into_iter().map(Value::Object).collect();
        self.instance.set("scope", scope)
    }

    pub fn goal_id(&self) -> Result<Option<i64>> {
        self.instance.get_int("goal_id")
    }

    pub fn set_goal_id(&mut self, goal_id: i64) -> Result<()> {
        self.instance.set("goal_id", goal_id)
    }

    pub fn strategy_id(&self) -> Result<Option<i64>> {
        self.instance.get_int("strategy_id")
    }

    pub fn set_strategy_id(&mut self, strategy_id: Option<i64>) -> Result<()> {
        self.instance.set("strategy_id", strategy_id)
    }

    /// The goal, loaded on first access. Needs version 1.1.
    pub fn goal(&mut self) -> Result<Option<Goal>> {
        self.instance.relation("goal").map(typed_relation)
    }

    /// The strategy, if one is set. Needs version 1.1.
    pub fn strategy(&mut self) -> Result<Option<Strategy>> {
        self.instance.relation("strategy").map(typed_relation)
    }
}
