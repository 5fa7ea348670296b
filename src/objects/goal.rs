//! Goal: what an audit tries to achieve

use serde_json::{Map, Value};

use crate::error::Result;
use crate::fields::FieldDescriptor;
use crate::object::ObjectInstance;
use crate::objects::PersistentObject;
use crate::schema::ObjectSchema;
use crate::version::ObjectVersion;

#[derive(Debug, Clone)]
pub struct Goal {
    instance: ObjectInstance,
}

// Version 1.0: Initial version
pub fn schemas() -> Result<Vec<ObjectSchema>> {
    let v1_0 = ObjectSchema::builder(Goal::OBJECT_NAME, ObjectVersion::new(1, 0))
        .persistent()
        .field("name", FieldDescriptor::string())
        .field("display_name", FieldDescriptor::string())
        .field(
            "efficacy_specification",
            FieldDescriptor::flexible_list_of_dict().nullable(),
        )
        .build()?;
    Ok(vec![v1_0])
}

impl PersistentObject for Goal {
    const OBJECT_NAME: &'static str = "Goal";

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

impl Goal {
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

    pub fn efficacy_specification(&self) -> Result<Option<&[Map<String, Value>]>> {
        self.instance.get_list_of_dict("efficacy_specification")
    }

    pub fn set_efficacy_specification(&mut self, spec: Vec<Map<String, Value>>) -> Result<()> {
        let spec: Vec<Value> = spec.into_iter().map(Value::Object).collect();
        self.instance.set("efficacy_specification", spec)
    }
}
