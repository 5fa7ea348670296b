//! Strategy: an algorithm that achieves a goal

use crate::error::Result;
use crate::fields::FieldDescriptor;
use crate::object::ObjectInstance;
use crate::objects::PersistentObject;
use crate::schema::ObjectSchema;
use crate::version::ObjectVersion;

#[derive(Debug, Clone)]
pub struct Strategy {
    instance: ObjectInstance,
}

// Version 1.0: Initial version
pub fn schemas() -> Result<Vec<ObjectSchema>> {
    let v1_0 = ObjectSchema::builder(Strategy::OBJECT_NAME, ObjectVersion::new(1, 0))
        .persistent()
        .field("name", FieldDescriptor::string())
        .field("display_name", FieldDescriptor::string())
        .field("goal_id", FieldDescriptor::integer())
        .build()?;
    Ok(vec![v1_0])
}

impl PersistentObject for Strategy {
    const OBJECT_NAME: &'static str = "Strategy";

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

impl Strategy {
    pub fn name(&self) -> Result<Option<&str>> {
        self.instance.get_str("name")
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.instance.set("name", name)
    }

    pub fn display_name(&self) -> Result<Option<&str>> {
        self.instance.get_str("display_name")
    }

    pub fn set_display_name(&mut self, display_name: &str) -> Result<()> {
        self.instance.set("display_name", display_name)
    }

    pub fn goal_id(&self) -> Result<Option<i64>> {
        self.instance.get_int("goal_id")
    }

    pub fn set_goal_id(&mut self, goal_id: i64) -> Result<()> {
        self.instance.set("goal_id", goal_id)
    }
}
