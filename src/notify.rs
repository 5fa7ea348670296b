//! Change notifications
//!
//! The gateway publishes an event after every successful create, save, soft
//! delete and destroy. Publishing failures are logged and never fail the
//! operation that triggered them.

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::context::RequestContext;
use crate::error::Result;
use crate::object::ObjectInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Create,
    Update,
    SoftDelete,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::SoftDelete => "soft_delete",
            EventAction::Delete => "delete",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object lifecycle event
#[derive(Debug, Clone, Copy)]
pub struct ObjectEvent<'a> {
    pub action: EventAction,
    pub object: &'a ObjectInstance,
}

impl<'a> ObjectEvent<'a> {
    pub fn new(action: EventAction, object: &'a ObjectInstance) -> Self {
        Self { action, object }
    }

    /// Dotted event type, e.g. "audit_template.create"
    pub fn event_type(&self) -> String {
        format!("{}.{}", snake_case(self.object.object_name()), self.action)
    }
}

/// Sink for object events
pub trait Notifier: Send + Sync {
    fn publish(&self, ctx: &RequestContext, event: &ObjectEvent<'_>) -> Result<()>;
}

/// Publishes events as structured log records
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, ctx: &RequestContext, event: &ObjectEvent<'_>) -> Result<()> {
        let payload = serde_json::to_string(&event.object.to_primitive()?)?;
        info!(
            event_type = %event.event_type(),
            request_id = %ctx.request_id,
            identity = %event.object.identity_label(),
            payload = %payload,
            "object event"
        );
        Ok(())
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
