//! CRUD Lifecycle Tests
//!
//! Create, load, change tracking, save, refresh, soft delete and destroy of
//! audit templates against a counting in-memory adapter.

mod common;

use std::sync::Arc;

use common::{create_goal, create_template, Harness};
use rstest::rstest;
use serde_json::json;
use versioned_objects::{
    AuditTemplate, FieldValue, Gateway, Lifecycle, ListQuery, ObjectError, ObjectsConfig,
    PersistentObject, RequestContext, SortDir,
};

// =============================================================================
// Create / Load
// =============================================================================

#[test]
fn test_create_then_load_round_trip() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");

    let mut template = AuditTemplate::new(&h.gateway, &ctx).unwrap();
    template.set_name("nightly").unwrap();
    template.set_description(Some("weekly consolidation")).unwrap();
    template
        .set_scope(vec![json!({"host_aggregates": [{"id": 1}]})
            .as_object()
            .cloned()
            .unwrap()])
        .unwrap();
    template.set_goal_id(goal.id().unwrap()).unwrap();
    template.create().unwrap();

    assert_eq!(template.instance().state(), Lifecycle::Persisted);
    assert!(template.id().is_some());
    let uuid = template.uuid().expect("uuid assigned on create");
    assert!(template.instance().get_changes().is_empty());

    let by_uuid = AuditTemplate::get_by_uuid(&h.gateway, &ctx, uuid, false).unwrap();
    let by_id = AuditTemplate::get_by_id(&h.gateway, &ctx, template.id().unwrap(), false).unwrap();
    for loaded in [&by_uuid, &by_id] {
        assert_eq!(loaded.name().unwrap(), Some("nightly"));
        assert_eq!(loaded.description().unwrap(), Some("weekly consolidation"));
        assert_eq!(loaded.goal_id().unwrap(), goal.id());
        assert_eq!(loaded.scope().unwrap().unwrap()[0]["host_aggregates"][0]["id"], 1);
        assert!(loaded.instance().get_changes().is_empty());
    }
}

#[test]
fn test_create_keeps_caller_uuid() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let uuid = uuid::Uuid::new_v4();

    let mut template = AuditTemplate::new(&h.gateway, &ctx).unwrap();
    template.set_name("t").unwrap();
    template.set_goal_id(goal.id().unwrap()).unwrap();
    template.instance_mut().set("uuid", uuid.to_string()).unwrap();
    template.create().unwrap();

    assert_eq!(template.uuid(), Some(uuid));
}

#[test]
fn test_create_twice_is_rejected() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut template = create_template(&h.gateway, &ctx, "t", &goal, None);

    let err = template.create().unwrap_err();
    assert!(matches!(err, ObjectError::ObjectActionError { .. }));
    assert_eq!(h.adapter.count("create"), 2);
}

#[test]
fn test_failed_create_leaves_instance_untouched() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    create_template(&h.gateway, &ctx, "taken", &goal, None);

    let mut clash = AuditTemplate::new(&h.gateway, &ctx).unwrap();
    clash.set_name("taken").unwrap();
    clash.set_goal_id(goal.id().unwrap()).unwrap();
    let err = clash.create().unwrap_err();

    assert!(matches!(err, ObjectError::AlreadyExists { .. }));
    assert!(clash.instance().is_new());
    assert!(clash.id().is_none());
    assert_eq!(clash.instance().changed_fields(), ["name", "goal_id"]);
}

#[test]
fn test_create_with_dangling_key_keeps_identity() {
    let h = Harness::local();
    let ctx = RequestContext::new();

    let mut template = AuditTemplate::new(&h.gateway, &ctx).unwrap();
    template.set_name("orphan").unwrap();
    template.set_goal_id(999).unwrap();
    let err = template.create().unwrap_err();
    assert!(err.is_not_found());

    // The row was stored, so the instance must still be able to reach it
    let uuid = template.uuid().expect("identity kept after relation failure");
    assert!(!template.instance().is_new());
    assert!(h.adapter.raw_row("AuditTemplate", &uuid).is_some());
    assert!(!template.instance().is_relation_loaded("goal"));

    template.destroy().unwrap();
    assert!(h.adapter.raw_row("AuditTemplate", &uuid).is_none());
}

// =============================================================================
// Change Tracking
// =============================================================================

#[test]
fn test_save_sends_only_changed_fields() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let created = create_template(&h.gateway, &ctx, "t", &goal, None);

    let mut template =
        AuditTemplate::get_by_uuid(&h.gateway, &ctx, created.uuid().unwrap(), false).unwrap();
    template.set_description(Some("changed")).unwrap();

    let changes = template.instance().get_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes["description"], FieldValue::String("changed".into()));

    template.save().unwrap();
    assert_eq!(h.adapter.count("update"), 1);
    assert!(template.instance().get_changes().is_empty());
    assert!(template.instance().get_datetime("updated_at").unwrap().is_some());

    let row = h
        .adapter
        .raw_row("AuditTemplate", &template.uuid().unwrap())
        .unwrap();
    assert_eq!(row["description"], "changed");
    assert_eq!(row["name"], "t");
}

#[test]
fn test_empty_save_touches_nothing() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut template = create_template(&h.gateway, &ctx, "t", &goal, None);

    h.adapter.reset();
    template.save().unwrap();
    template.set_name("t").unwrap();
    template.save().unwrap();

    assert_eq!(h.adapter.total(), 0);
}

#[test]
fn test_save_before_create_fails() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let mut template = AuditTemplate::new(&h.gateway, &ctx).unwrap();
    template.set_name("t").unwrap();

    assert!(matches!(
        template.save(),
        Err(ObjectError::ObjectActionError { .. })
    ));
    assert_eq!(h.adapter.total(), 0);
}

#[test]
fn test_refresh_merges_remote_edits() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let created = create_template(&h.gateway, &ctx, "t", &goal, None);
    let uuid = created.uuid().unwrap();

    let mut writer = AuditTemplate::get_by_uuid(&h.gateway, &ctx, uuid, false).unwrap();
    let mut reader = AuditTemplate::get_by_uuid(&h.gateway, &ctx, uuid, false).unwrap();

    writer.set_description(Some("from writer")).unwrap();
    writer.save().unwrap();

    reader.set_name("local edit").unwrap();
    reader.refresh(false).unwrap();
    assert_eq!(reader.description().unwrap(), Some("from writer"));
    assert_eq!(reader.name().unwrap(), Some("t"));
    assert!(reader.instance().get_changes().is_empty());
}

// =============================================================================
// Identity Resolution
// =============================================================================

#[rstest]
#[case::integer_string("1", Some("get_by_id"))]
#[case::padded_integer("01", None)]
#[case::signed_padded("+1", None)]
#[case::name("nightly", None)]
#[case::truncated_uuid("2a5a0d2c-6b4a-4a3e", None)]
fn test_identity_dispatch(#[case] identity: &str, #[case] method: Option<&str>) {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    create_template(&h.gateway, &ctx, "nightly", &goal, None);
    h.adapter.reset();

    let result = AuditTemplate::get(&h.gateway, &ctx, identity, false);
    match method {
        Some(method) => {
            assert_eq!(result.unwrap().name().unwrap(), Some("nightly"));
            assert_eq!(h.adapter.count(method), 1);
        }
        None => {
            assert!(matches!(result, Err(ObjectError::InvalidIdentity { .. })));
            assert_eq!(h.adapter.total(), 0);
        }
    }
}

#[test]
fn test_identity_dispatch_uuid() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let created = create_template(&h.gateway, &ctx, "nightly", &goal, None);
    h.adapter.reset();

    let uuid = created.uuid().unwrap().to_string();
    let loaded = AuditTemplate::get(&h.gateway, &ctx, &uuid, false).unwrap();
    assert_eq!(loaded.id(), created.id());
    assert_eq!(h.adapter.count("get_by_uuid"), 1);

    let by_int = AuditTemplate::get(&h.gateway, &ctx, &created.id().unwrap(), false).unwrap();
    assert_eq!(by_int.uuid(), created.uuid());
}

#[test]
fn test_get_by_name() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut first = create_template(&h.gateway, &ctx, "nightly", &goal, None);

    assert!(AuditTemplate::get_by_name(&h.gateway, &ctx, "nightly", false).is_ok());
    let missing = AuditTemplate::get_by_name(&h.gateway, &ctx, "weekly", false).unwrap_err();
    assert!(missing.is_not_found());

    // A soft-deleted template frees its name
    first.soft_delete().unwrap();
    assert!(AuditTemplate::get_by_name(&h.gateway, &ctx, "nightly", false)
        .unwrap_err()
        .is_not_found());
    let second = create_template(&h.gateway, &ctx, "nightly", &goal, None);
    let found = AuditTemplate::get_by_name(&h.gateway, &ctx, "nightly", false).unwrap();
    assert_eq!(found.uuid(), second.uuid());
}

// =============================================================================
// Listing
// =============================================================================

#[test]
fn test_list_pagination_and_sorting() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    for name in ["c", "a", "e", "b", "d"] {
        create_template(&h.gateway, &ctx, name, &goal, None);
    }

    let names = |page: &[AuditTemplate]| -> Vec<String> {
        page.iter()
            .map(|t| t.name().unwrap().unwrap().to_string())
            .collect()
    };

    let first = AuditTemplate::list(
        &h.gateway,
        &ctx,
        ListQuery::new().sort("name", SortDir::Asc).limit(2),
    )
    .unwrap();
    assert_eq!(names(&first), ["a", "b"]);

    let second = AuditTemplate::list(
        &h.gateway,
        &ctx,
        ListQuery::new()
            .sort("name", SortDir::Asc)
            .limit(2)
            .marker(first[1].uuid().unwrap()),
    )
    .unwrap();
    assert_eq!(names(&second), ["c", "d"]);

    let desc = AuditTemplate::list(
        &h.gateway,
        &ctx,
        ListQuery::new().sort("name", SortDir::Desc).limit(1),
    )
    .unwrap();
    assert_eq!(names(&desc), ["e"]);

    let filtered = AuditTemplate::list(
        &h.gateway,
        &ctx,
        ListQuery::new().filter("name", json!(["a", "e"])),
    )
    .unwrap();
    assert_eq!(filtered.len(), 2);
}

#[test]
fn test_list_limit_is_clamped() {
    let mut config = ObjectsConfig::default();
    config.storage.max_page_size = 3;
    config.gateway.notify = false;
    let adapter = Arc::new(versioned_objects::InMemoryAdapter::new());
    let gateway = Gateway::builder(common::full_registry().into(), adapter)
        .configure(&config)
        .build();
    let ctx = RequestContext::new();
    let goal = create_goal(&gateway, &ctx, "dummy");
    for i in 0..5 {
        create_template(&gateway, &ctx, &format!("t{}", i), &goal, None);
    }

    let unbounded = AuditTemplate::list(&gateway, &ctx, ListQuery::new()).unwrap();
    assert_eq!(unbounded.len(), 3);
    let large = AuditTemplate::list(&gateway, &ctx, ListQuery::new().limit(100)).unwrap();
    assert_eq!(large.len(), 3);
    let small = AuditTemplate::list(&gateway, &ctx, ListQuery::new().limit(2)).unwrap();
    assert_eq!(small.len(), 2);
}

#[test]
fn test_unknown_marker_is_not_found() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    create_template(&h.gateway, &ctx, "t", &goal, None);

    let err = AuditTemplate::list(
        &h.gateway,
        &ctx,
        ListQuery::new().marker(uuid::Uuid::new_v4()),
    )
    .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_marker_soft_deleted_between_pages() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    for name in ["a", "b", "c", "d"] {
        create_template(&h.gateway, &ctx, name, &goal, None);
    }

    let query = || ListQuery::new().sort("name", SortDir::Asc).limit(2);
    let first = AuditTemplate::list(&h.gateway, &ctx, query()).unwrap();
    let marker = first[1].uuid().unwrap();

    let mut last = AuditTemplate::get_by_uuid(&h.gateway, &ctx, marker, false).unwrap();
    last.soft_delete().unwrap();

    let second = AuditTemplate::list(&h.gateway, &ctx, query().marker(marker)).unwrap();
    let names: Vec<_> = second
        .iter()
        .map(|t| t.name().unwrap().unwrap().to_string())
        .collect();
    assert_eq!(names, ["c", "d"]);
}

// =============================================================================
// Soft Delete / Destroy
// =============================================================================

#[test]
fn test_soft_delete_visibility() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut gone = create_template(&h.gateway, &ctx, "gone", &goal, None);
    create_template(&h.gateway, &ctx, "kept", &goal, None);
    let uuid = gone.uuid().unwrap();

    gone.soft_delete().unwrap();
    assert!(gone.instance().is_soft_deleted());

    let active = AuditTemplate::list(&h.gateway, &ctx, ListQuery::new()).unwrap();
    assert_eq!(active.len(), 1);
    let all = AuditTemplate::list(&h.gateway, &ctx, ListQuery::new().include_deleted(true)).unwrap();
    assert_eq!(all.len(), 2);
    let admin = RequestContext::admin().with_show_deleted(true);
    assert_eq!(
        AuditTemplate::list(&h.gateway, &admin, ListQuery::new())
            .unwrap()
            .len(),
        2
    );

    let mut reloaded = AuditTemplate::get_by_uuid(&h.gateway, &ctx, uuid, false).unwrap();
    assert!(reloaded.instance().is_soft_deleted());
    assert!(reloaded.instance().get_datetime("deleted_at").unwrap().is_some());

    assert!(gone.soft_delete().unwrap_err().is_not_found());
    assert!(reloaded.soft_delete().unwrap_err().is_not_found());
}

#[test]
fn test_stale_handle_soft_delete_is_not_found() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut first = create_template(&h.gateway, &ctx, "t", &goal, None);
    let mut stale = AuditTemplate::get_by_uuid(&h.gateway, &ctx, first.uuid().unwrap(), false).unwrap();

    first.soft_delete().unwrap();
    assert!(stale.soft_delete().unwrap_err().is_not_found());
}

#[test]
fn test_destroyed_instance_fails_fast() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut template = create_template(&h.gateway, &ctx, "t", &goal, None);
    let uuid = template.uuid().unwrap();

    template.destroy().unwrap();
    assert!(h.adapter.raw_row("AuditTemplate", &uuid).is_none());
    assert_eq!(template.instance().state(), Lifecycle::Destroyed);

    h.adapter.reset();
    assert!(matches!(
        template.name(),
        Err(ObjectError::ObjectDestroyed { .. })
    ));
    assert!(matches!(
        template.set_name("again"),
        Err(ObjectError::ObjectDestroyed { .. })
    ));
    assert!(matches!(
        template.save(),
        Err(ObjectError::ObjectDestroyed { .. })
    ));
    assert!(matches!(
        template.destroy(),
        Err(ObjectError::ObjectDestroyed { .. })
    ));
    assert!(template.soft_delete().unwrap_err().is_not_found());
    assert_eq!(h.adapter.total(), 0);

    assert!(AuditTemplate::get_by_uuid(&h.gateway, &ctx, uuid, false)
        .unwrap_err()
        .is_not_found());
}

// =============================================================================
// Notifications
// =============================================================================

#[test]
fn test_lifecycle_events_are_published() {
    let h = Harness::local();
    let ctx = RequestContext::new();
    let goal = create_goal(&h.gateway, &ctx, "dummy");
    let mut template = create_template(&h.gateway, &ctx, "t", &goal, None);

    template.set_description(Some("d")).unwrap();
    template.save().unwrap();
    template.save().unwrap();
    template.soft_delete().unwrap();
    template.destroy().unwrap();

    assert_eq!(
        h.event_types(),
        [
            "goal.create",
            "audit_template.create",
            "audit_template.update",
            "audit_template.soft_delete",
            "audit_template.delete",
        ]
    );
}
