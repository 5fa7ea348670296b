//! Persistence adapter contract
//!
//! The object framework drives storage exclusively through
//! [`PersistenceAdapter`]. Records are untyped JSON maps; typing happens when
//! the framework coerces them through an object schema.

pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ObjectError, Result};

pub use memory::InMemoryAdapter;

/// A raw row as exchanged with the adapter
pub type RawRecord = Map<String, Value>;

/// Sort direction for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDir {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(ObjectError::Storage(format!(
                "sort direction must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDir::Asc => write!(f, "asc"),
            SortDir::Desc => write!(f, "desc"),
        }
    }
}

/// Filters, cursor pagination and sorting for a listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Field equality filters; an array value matches any of its elements
    #[serde(default)]
    pub filters: RawRecord,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Uuid of the last row of the previous page
    #[serde(default)]
    pub marker: Option<Uuid>,
    #[serde(default)]
    pub sort_key: Option<String>,
    #[serde(default)]
    pub sort_dir: Option<SortDir>,
    #[serde(default)]
    pub eager: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn marker(mut self, marker: Uuid) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn sort(mut self, key: impl Into<String>, dir: SortDir) -> Self {
        self.sort_key = Some(key.into());
        self.sort_dir = Some(dir);
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn include_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }
}

/// Database-facing CRUD contract.
///
/// `object` is the object type name; adapters map it to their own tables.
/// `eager` asks the adapter to nest related rows if it can join them; an
/// adapter may ignore it, in which case the framework batch-loads relations.
pub trait PersistenceAdapter: Send + Sync {
    /// Insert `values` and return the stored row with its assigned `id`
    fn create(&self, object: &str, values: RawRecord) -> Result<RawRecord>;

    fn get_by_id(&self, object: &str, id: i64, eager: bool) -> Result<RawRecord>;

    fn get_by_uuid(&self, object: &str, uuid: &Uuid, eager: bool) -> Result<RawRecord>;

    /// The single active row with this name
    fn get_by_name(&self, object: &str, name: &str, eager: bool) -> Result<RawRecord>;

    fn list(&self, object: &str, query: &ListQuery) -> Result<Vec<RawRecord>>;

    /// Rows for all `ids` that exist, in any order
    fn get_many_by_id(&self, object: &str, ids: &[i64]) -> Result<Vec<RawRecord>> {
        ids.iter()
            .filter_map(|id| match self.get_by_id(object, *id, false) {
                Err(e) if e.is_not_found() => None,
                other => Some(other),
            })
            .collect()
    }

    /// Apply `delta` to the row and return the updated row
    fn update(&self, object: &str, uuid: &Uuid, delta: RawRecord) -> Result<RawRecord>;

    fn destroy(&self, object: &str, uuid: &Uuid) -> Result<()>;

    /// Mark the row inactive; `NotFound` if it is missing or already inactive
    fn soft_delete(&self, object: &str, uuid: &Uuid) -> Result<()>;
}
