//! Schema compatibility checking
//!
//! Validates that a newer minor version of an object schema only adds fields
//! or relaxes nullability, so that an older consumer can always interpret a
//! subset of a newer payload.

use serde::{Deserialize, Serialize};

use crate::error::{ObjectError, Result};
use crate::schema::ObjectSchema;

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// Whether the schemas are compatible
    pub is_compatible: bool,
    /// List of changes detected
    pub changes: Vec<SchemaChange>,
    /// Summary of the compatibility check
    pub summary: String,
}

impl CompatibilityResult {
    fn from_changes(changes: Vec<SchemaChange>) -> Self {
        let breaking: Vec<&SchemaChange> = changes.iter().filter(|c| c.is_breaking).collect();
        if breaking.is_empty() {
            let summary = if changes.is_empty() {
                "No changes detected".to_string()
            } else {
                format!("{} compatible changes detected", changes.len())
            };
            Self {
                is_compatible: true,
                changes,
                summary,
            }
        } else {
            let summary = breaking
                .iter()
                .map(|c| c.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            Self {
                is_compatible: false,
                changes,
                summary,
            }
        }
    }

    pub fn breaking_changes(&self) -> impl Iterator<Item = &SchemaChange> {
        self.changes.iter().filter(|c| c.is_breaking)
    }
}

/// A detected change between two schema versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChange {
    pub change_type: ChangeType,
    pub field: String,
    pub old_type: Option<String>,
    pub new_type: Option<String>,
    pub is_breaking: bool,
    pub description: String,
}

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    FieldAdded,
    FieldRemoved,
    TypeChanged,
    /// Field became nullable
    NullabilityRelaxed,
    /// Field stopped accepting null
    NullabilityTightened,
    /// A method became remotable
    RemotableAdded,
    /// A method stopped being remotable
    RemotableRemoved,
}

impl ChangeType {
    /// Check if this change type breaks older consumers
    pub fn is_breaking(&self) -> bool {
        matches!(
            self,
            ChangeType::FieldRemoved
                | ChangeType::TypeChanged
                | ChangeType::NullabilityTightened
                | ChangeType::RemotableRemoved
        )
    }
}

/// Compatibility checker for object schema versions
#[derive(Debug, Default)]
pub struct CompatibilityChecker;

impl CompatibilityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check that `new` can replace `old` within one major version
    pub fn check(&self, old: &ObjectSchema, new: &ObjectSchema) -> Result<CompatibilityResult> {
        if old.name != new.name {
            return Err(ObjectError::InvalidSchema(format!(
                "cannot compare {} with {}",
                old.name, new.name
            )));
        }
        if !old.version.is_compatible_with(&new.version) {
            return Err(ObjectError::InvalidSchema(format!(
                "{} {} and {} are different major versions",
                old.name, old.version, new.version
            )));
        }

        let mut changes = Vec::new();
        self.detect_field_changes(old, new, &mut changes);
        self.detect_remotable_changes(old, new, &mut changes);
        Ok(CompatibilityResult::from_changes(changes))
    }

    fn detect_field_changes(
        &self,
        old: &ObjectSchema,
        new: &ObjectSchema,
        changes: &mut Vec<SchemaChange>,
    ) {
        for (name, old_field) in old.fields() {
            match new.field(name) {
                None => changes.push(change(
                    ChangeType::FieldRemoved,
                    name,
                    Some(old_field.field_type.to_string()),
                    None,
                    format!("Field '{}' was removed", name),
                )),
                Some(new_field) if new_field.field_type != old_field.field_type => {
                    changes.push(change(
                        ChangeType::TypeChanged,
                        name,
                        Some(old_field.field_type.to_string()),
                        Some(new_field.field_type.to_string()),
                        format!(
                            "Field '{}' changed from {} to {}",
                            name, old_field.field_type, new_field.field_type
                        ),
                    ))
                }
                Some(new_field) if new_field.nullable != old_field.nullable => {
                    let (change_type, verb) = if new_field.nullable {
                        (ChangeType::NullabilityRelaxed, "became nullable")
                    } else {
                        (ChangeType::NullabilityTightened, "is no longer nullable")
                    };
                    changes.push(change(
                        change_type,
                        name,
                        None,
                        None,
                        format!("Field '{}' {}", name, verb),
                    ))
                }
                Some(_) => {}
            }
        }

        for (name, new_field) in new.fields() {
            if !old.has_field(name) {
                changes.push(change(
                    ChangeType::FieldAdded,
                    name,
                    None,
                    Some(new_field.field_type.to_string()),
                    format!("Field '{}' was added", name),
                ));
            }
        }
    }

    fn detect_remotable_changes(
        &self,
        old: &ObjectSchema,
        new: &ObjectSchema,
        changes: &mut Vec<SchemaChange>,
    ) {
        for method in old.remotable_methods() {
            if !new.is_remotable(method) {
                changes.push(change(
                    ChangeType::RemotableRemoved,
                    method,
                    None,
                    None,
                    format!("Method '{}' is no longer remotable", method),
                ));
            }
        }
        for method in new.remotable_methods() {
            if !old.is_remotable(method) {
                changes.push(change(
                    ChangeType::RemotableAdded,
                    method,
                    None,
                    None,
                    format!("Method '{}' became remotable", method),
                ));
            }
        }
    }
}

fn change(
    change_type: ChangeType,
    field: &str,
    old_type: Option<String>,
    new_type: Option<String>,
    description: String,
) -> SchemaChange {
    SchemaChange {
        change_type,
        field: field.to_string(),
        old_type,
        new_type,
        is_breaking: change_type.is_breaking(),
        description,
    }
}
