mod common;

use attrview_core::{
    apply_json_operations, apply_operations, Action, AvServiceError, ColumnType, ErrorKind,
    Operation, TxErrorCode,
};
use common::{load, paragraph, row_blocks, seed_rows, service, setup};
use serde_json::json;

#[test]
fn json_batch_applies_in_order() {
    let conn = setup();
    let service = service(&conn);
    let a = paragraph(&service, "a");
    let b = paragraph(&service, "b");
    let batch = json!([
        {"action": "createAttributeView", "avId": "av-1", "name": "Tasks"},
        {"action": "insertBlocks", "avId": "av-1", "srcIds": [a, b]},
        {"action": "addColumn", "avId": "av-1", "name": "Due", "columnType": "date"},
        {"action": "setName", "avId": "av-1", "name": "Sprint"}
    ]);

    let applied = apply_json_operations(&service, &batch.to_string()).unwrap();
    assert_eq!(applied, 4);

    let av = load(&service, "av-1");
    assert_eq!(av.name, "Sprint");
    assert_eq!(row_blocks(&av), vec![a, b]);
    assert_eq!(av.columns[1].column_type, ColumnType::Date);
    assert_eq!(av.revision, 4);
}

#[test]
fn batch_stops_at_first_failure() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["kept"]);
    let operations = vec![
        Operation::new(
            "av-1",
            Action::SetName {
                name: "first".to_string(),
            },
        ),
        Operation::new(
            "av-1",
            Action::InsertBlocks {
                src_ids: vec!["ghost".to_string()],
                previous_id: None,
            },
        ),
        Operation::new(
            "av-1",
            Action::SetName {
                name: "never".to_string(),
            },
        ),
    ];

    let err = apply_operations(&service, &operations).unwrap_err();
    assert_eq!(err.code, TxErrorCode::BlockNotFound);
    assert_eq!(err.code.code(), 0);
    assert_eq!(err.id, "ghost");
    assert_eq!(err.index, 1);
    assert_eq!(load(&service, "av-1").name, "first");
}

#[test]
fn failures_map_to_transaction_codes() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["b1"]);

    let err = apply_operations(
        &service,
        &[Operation::new(
            "av-1",
            Action::RemoveColumn {
                column_id: load(&service, "av-1").columns[0].id.clone(),
            },
        )],
    )
    .unwrap_err();
    assert_eq!(err.code, TxErrorCode::InvalidOperation);
    assert_eq!(err.code.code(), 2);
    assert_eq!(err.id, "av-1");

    let err = apply_operations(
        &service,
        &[Operation::new(
            "missing",
            Action::SetName {
                name: "x".to_string(),
            },
        )],
    )
    .unwrap_err();
    assert_eq!(err.code, TxErrorCode::InvalidOperation);
    assert_eq!(err.id, "missing");
}

#[test]
fn malformed_batch_is_rejected_before_anything_runs() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["b1"]);
    let revision = load(&service, "av-1").revision;

    for json in [
        "not json",
        r#"[{"action":"setName","avId":"av-1","name":"ok"},{"action":"explode","avId":"av-1"}]"#,
        r#"[{"action":"setName","avId":"  ","name":"blank"}]"#,
        r#"[{"action":"addColumn","avId":"av-1","name":"x","columnType":"formula"}]"#,
    ] {
        let err = apply_json_operations(&service, json).unwrap_err();
        assert_eq!(err.code, TxErrorCode::InvalidOperation, "{json}");
        assert_eq!(err.index, 0);
    }
    assert_eq!(load(&service, "av-1").revision, revision);
}

#[test]
fn create_attribute_view_rejects_existing_id() {
    let conn = setup();
    let service = service(&conn);
    service.create_attribute_view("av-1", "Tasks").unwrap();

    let av = load(&service, "av-1");
    assert_eq!(av.name, "Tasks");
    assert!(av.rows.is_empty());
    assert_eq!(av.views.len(), 1);
    assert_eq!(av.current_view_id, av.views[0].id);

    let err = service.create_attribute_view("av-1", "Again").unwrap_err();
    assert!(matches!(err, AvServiceError::AttributeViewExists(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn set_attribute_view_merges_patch() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["b1"]);
    let before = load(&service, "av-1");

    service
        .set_attribute_view(
            "av-1",
            &json!({"name": "Patched", "id": "hijacked", "revision": 99}),
        )
        .unwrap();

    let after = load(&service, "av-1");
    assert_eq!(after.name, "Patched");
    assert_eq!(after.id, "av-1");
    assert_eq!(after.revision, before.revision + 1);
    assert_eq!(after.rows, before.rows);
    assert_eq!(after.columns, before.columns);
}

#[test]
fn set_attribute_view_rejects_invalid_result() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["b1"]);
    let revision = load(&service, "av-1").revision;

    let err = service
        .set_attribute_view("av-1", &json!(["not", "an", "object"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = service
        .set_attribute_view("av-1", &json!({"columns": "nope"}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = service
        .set_attribute_view("av-1", &json!({"columns": []}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(load(&service, "av-1").revision, revision);
}

#[test]
fn move_row_through_operation() {
    let conn = setup();
    let service = service(&conn);
    let blocks = seed_rows(&service, "av-1", &["a", "b", "c"]);
    let av = load(&service, "av-1");
    let last = av.rows[2].id.clone();
    let first = av.rows[0].id.clone();

    let op = Operation::from_json(&format!(
        r#"{{"action":"moveRow","avId":"av-1","rowId":"{last}","previousId":"{first}"}}"#
    ))
    .unwrap();
    service.apply(&op).unwrap();

    assert_eq!(
        row_blocks(&load(&service, "av-1")),
        vec![blocks[0].clone(), blocks[2].clone(), blocks[1].clone()]
    );

    let head = Operation::new(
        "av-1",
        Action::MoveRow {
            row_id: first,
            previous_id: None,
        },
    );
    service.apply(&head).unwrap();
    assert_eq!(row_blocks(&load(&service, "av-1"))[0], blocks[0]);

    let err = service
        .move_row("av-1", "no-such-row", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
