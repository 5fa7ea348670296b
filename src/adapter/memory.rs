//! In-memory persistence adapter
//!
//! Reference implementation of [`PersistenceAdapter`] used by tests and by
//! embedders without a database. Rows of every object type live in one
//! table per type, in insertion order. `eager` is ignored: relations are
//! batch-loaded by the framework.

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use super::{ListQuery, PersistenceAdapter, RawRecord, SortDir};
use crate::error::{ObjectError, Result};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<RawRecord>,
}

impl Table {
    fn position_by_uuid(&self, uuid: &Uuid) -> Option<usize> {
        let wanted = uuid.to_string();
        self.rows
            .iter()
            .position(|row| row.get("uuid").and_then(Value::as_str) == Some(wanted.as_str()))
    }

    fn active_with_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawRecord> {
        self.rows
            .iter()
            .filter(move |row| is_active(row) && row.get("name").and_then(Value::as_str) == Some(name))
    }
}

fn is_active(row: &RawRecord) -> bool {
    row.get("deleted_at").map_or(true, Value::is_null)
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `object`, including soft-deleted ones
    pub fn row_count(&self, object: &str) -> usize {
        self.tables.read().get(object).map_or(0, |t| t.rows.len())
    }

    /// Raw stored row, bypassing the object layer
    pub fn raw_row(&self, object: &str, uuid: &Uuid) -> Option<RawRecord> {
        let tables = self.tables.read();
        let table = tables.get(object)?;
        table.position_by_uuid(uuid).map(|i| table.rows[i].clone())
    }

    fn ensure_unique_name(table: &Table, object: &str, row: &RawRecord, skip: Option<usize>) -> Result<()> {
        let Some(name) = row.get("name").and_then(Value::as_str) else {
            return Ok(());
        };
        if !is_active(row) {
            return Ok(());
        }
        let clash = table
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, other)| is_active(other) && other.get("name").and_then(Value::as_str) == Some(name));
        if clash {
            return Err(ObjectError::AlreadyExists {
                object: object.to_string(),
                field: "name".to_string(),
                value: name.to_string(),
            });
        }
        Ok(())
    }
}

impl PersistenceAdapter for InMemoryAdapter {
    fn create(&self, object: &str, mut values: RawRecord) -> Result<RawRecord> {
        let mut tables = self.tables.write();
        let table = tables.entry(object.to_string()).or_default();

        if values.get("id").is_some_and(|v| !v.is_null()) {
            return Err(ObjectError::action("create", object, "id is assigned by storage"));
        }
        let uuid = match values.get("uuid").and_then(Value::as_str) {
            Some(u) => Uuid::try_parse(u).map_err(|_| ObjectError::InvalidIdentity {
                identity: u.to_string(),
            })?,
            None => Uuid::new_v4(),
        };
        if table.position_by_uuid(&uuid).is_some() {
            return Err(ObjectError::AlreadyExists {
                object: object.to_string(),
                field: "uuid".to_string(),
                value: uuid.to_string(),
            });
        }

        values.insert("deleted_at".into(), Value::Null);
        Self::ensure_unique_name(table, object, &values, None)?;

        table.next_id += 1;
        values.insert("id".into(), Value::from(table.next_id));
        values.insert("uuid".into(), Value::String(uuid.to_string()));
        values.insert("created_at".into(), now());
        values.insert("updated_at".into(), Value::Null);

        table.rows.push(values.clone());
        Ok(values)
    }

    fn get_by_id(&self, object: &str, id: i64, _eager: bool) -> Result<RawRecord> {
        self.tables
            .read()
            .get(object)
            .and_then(|t| {
                t.rows
                    .iter()
                    .find(|row| row.get("id").and_then(Value::as_i64) == Some(id))
            })
            .cloned()
            .ok_or_else(|| ObjectError::not_found(object, id))
    }

    fn get_by_uuid(&self, object: &str, uuid: &Uuid, _eager: bool) -> Result<RawRecord> {
        let tables = self.tables.read();
        tables
            .get(object)
            .and_then(|t| t.position_by_uuid(uuid).map(|i| t.rows[i].clone()))
            .ok_or_else(|| ObjectError::not_found(object, uuid))
    }

    fn get_by_name(&self, object: &str, name: &str, _eager: bool) -> Result<RawRecord> {
        let tables = self.tables.read();
        let table = tables
            .get(object)
            .ok_or_else(|| ObjectError::not_found(object, name))?;
        let mut matches = table.active_with_name(name);
        match (matches.next(), matches.next()) {
            (Some(row), None) => Ok(row.clone()),
            (None, _) => Err(ObjectError::not_found(object, name)),
            (Some(_), Some(_)) => Err(ObjectError::MultipleResults {
                object: object.to_string(),
                identity: name.to_string(),
            }),
        }
    }

    fn list(&self, object: &str, query: &ListQuery) -> Result<Vec<RawRecord>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(object) else {
            return match query.marker {
                Some(marker) => Err(ObjectError::not_found(object, marker)),
                None => Ok(Vec::new()),
            };
        };

        let mut rows: Vec<&RawRecord> = table
            .rows
            .iter()
            .filter(|row| query.include_deleted || is_active(row))
            .filter(|row| matches_filters(row, &query.filters))
            .collect();

        let sort_key = query.sort_key.as_deref().unwrap_or("id");
        let dir = query.sort_dir.unwrap_or_default();
        let order = |a: &RawRecord, b: &RawRecord| {
            let ord = compare_values(a.get(sort_key), b.get(sort_key))
                .then_with(|| compare_values(a.get("id"), b.get("id")));
            match dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        };
        rows.sort_by(|a, b| order(a, b));

        // The marker row may since have been soft-deleted or filtered out;
        // resume after its (sort key, id) position either way
        let start = match query.marker {
            Some(marker) => {
                let marker_row = table
                    .position_by_uuid(&marker)
                    .map(|i| &table.rows[i])
                    .ok_or_else(|| ObjectError::not_found(object, marker))?;
                rows.iter()
                    .position(|row| order(row, marker_row) == Ordering::Greater)
                    .unwrap_or(rows.len())
            }
            None => 0,
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(start).take(limit).cloned().collect())
    }

    fn get_many_by_id(&self, object: &str, ids: &[i64]) -> Result<Vec<RawRecord>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(object) else {
            return Ok(Vec::new());
        };
        Ok(table
            .rows
            .iter()
            .filter(|row| {
                row.get("id")
                    .and_then(Value::as_i64)
                    .is_some_and(|id| ids.contains(&id))
            })
            .cloned()
            .collect())
    }

    fn update(&self, object: &str, uuid: &Uuid, delta: RawRecord) -> Result<RawRecord> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(object)
            .ok_or_else(|| ObjectError::not_found(object, uuid))?;
        let pos = table
            .position_by_uuid(uuid)
            .ok_or_else(|| ObjectError::not_found(object, uuid))?;

        for immutable in ["id", "uuid"] {
            if let Some(new) = delta.get(immutable) {
                if table.rows[pos].get(immutable) != Some(new) {
                    return Err(ObjectError::action(
                        "update",
                        object,
                        format!("cannot overwrite {} of an existing record", immutable),
                    ));
                }
            }
        }

        let mut updated = table.rows[pos].clone();
        updated.extend(delta);
        updated.insert("updated_at".into(), now());
        Self::ensure_unique_name(table, object, &updated, Some(pos))?;
        table.rows[pos] = updated.clone();
        Ok(updated)
    }

    fn destroy(&self, object: &str, uuid: &Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(object)
            .ok_or_else(|| ObjectError::not_found(object, uuid))?;
        let pos = table
            .position_by_uuid(uuid)
            .ok_or_else(|| ObjectError::not_found(object, uuid))?;
        table.rows.remove(pos);
        Ok(())
    }

    fn soft_delete(&self, object: &str, uuid: &Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(object)
            .ok_or_else(|| ObjectError::not_found(object, uuid))?;
        let pos = table
            .position_by_uuid(uuid)
            .filter(|&i| is_active(&table.rows[i]))
            .ok_or_else(|| ObjectError::not_found(object, uuid))?;
        table.rows[pos].insert("deleted_at".into(), now());
        Ok(())
    }
}

fn matches_filters(row: &RawRecord, filters: &RawRecord) -> bool {
    filters.iter().all(|(key, wanted)| {
        let actual = row.get(key).unwrap_or(&Value::Null);
        match wanted {
            Value::Array(options) => options.iter().any(|o| o == actual),
            other => other == actual,
        }
    })
}

/// Total order over JSON scalars: null < bool < number < string < other
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            },
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str) -> RawRecord {
        let mut r = RawRecord::new();
        r.insert("uuid".into(), json!(Uuid::new_v4().to_string()));
        r.insert("name".into(), json!(name));
        r
    }

    fn uuid_of(row: &RawRecord) -> Uuid {
        Uuid::parse_str(row["uuid"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn test_create_assigns_ids() {
        let db = InMemoryAdapter::new();
        let a = db.create("Thing", record("a")).unwrap();
        let b = db.create("Thing", record("b")).unwrap();
        assert_eq!(a["id"], 1);
        assert_eq!(b["id"], 2);
        assert!(a["created_at"].is_string());
        assert!(db.create("Thing", record("a")).is_err());
    }

    #[test]
    fn test_name_lookup_ignores_deleted() {
        let db = InMemoryAdapter::new();
        let a = db.create("Thing", record("dup")).unwrap();
        db.soft_delete("Thing", &uuid_of(&a)).unwrap();
        let b = db.create("Thing", record("dup")).unwrap();
        assert_eq!(db.get_by_name("Thing", "dup", false).unwrap()["id"], b["id"]);
        assert!(db.soft_delete("Thing", &uuid_of(&a)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_marker_and_sort() {
        let db = InMemoryAdapter::new();
        let rows: Vec<RawRecord> = ["c", "a", "b"]
            .iter()
            .map(|n| db.create("Thing", record(n)).unwrap())
            .collect();

        let by_name = db
            .list("Thing", &ListQuery::new().sort("name", SortDir::Asc))
            .unwrap();
        let names: Vec<&str> = by_name.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        let page = db
            .list("Thing", &ListQuery::new().marker(uuid_of(&rows[0])).limit(1))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["name"], "a");

        let missing = db.list("Thing", &ListQuery::new().marker(Uuid::new_v4()));
        assert!(missing.unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_refuses_uuid_overwrite() {
        let db = InMemoryAdapter::new();
        let a = db.create("Thing", record("a")).unwrap();
        let mut delta = RawRecord::new();
        delta.insert("uuid".into(), json!(Uuid::new_v4().to_string()));
        assert!(db.update("Thing", &uuid_of(&a), delta).is_err());

        let mut delta = RawRecord::new();
        delta.insert("name".into(), json!("renamed"));
        let updated = db.update("Thing", &uuid_of(&a), delta).unwrap();
        assert_eq!(updated["name"], "renamed");
        assert!(updated["updated_at"].is_string());
    }

    #[test]
    fn test_filters_match_arrays() {
        let db = InMemoryAdapter::new();
        for n in ["a", "b", "c"] {
            db.create("Thing", record(n)).unwrap();
        }
        let rows = db
            .list("Thing", &ListQuery::new().filter("name", json!(["a", "c"])))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(db.get_many_by_id("Thing", &[1, 3, 9]).unwrap().len(), 2);
    }

    #[test]
    fn test_marker_survives_soft_delete() {
        let db = InMemoryAdapter::new();
        let rows: Vec<RawRecord> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| db.create("Thing", record(n)).unwrap())
            .collect();
        db.soft_delete("Thing", &uuid_of(&rows[1])).unwrap();

        let page = db
            .list("Thing", &ListQuery::new().marker(uuid_of(&rows[1])))
            .unwrap();
        let names: Vec<&str> = page.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["c", "d"]);
    }

    #[test]
    fn test_large_integers_sort_exactly() {
        let big = json!(9_007_199_254_740_993_i64);
        let bigger = json!(9_007_199_254_740_994_i64);
        assert_eq!(compare_values(Some(&big), Some(&bigger)), Ordering::Less);
        assert_eq!(compare_values(Some(&bigger), Some(&big)), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(u64::MAX)), Some(&json!(-1))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(2))), Ordering::Less);
    }
}
