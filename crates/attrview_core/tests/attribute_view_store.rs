use attrview_core::db::open_db_in_memory;
use attrview_core::{
    AttributeView, AttributeViewError, AttributeViewStore, AvRepoError, ColumnType,
    SqliteAttributeViewStore,
};

#[test]
fn save_then_load_round_trips_and_bumps_revision() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAttributeViewStore::try_new(&conn).unwrap();

    let mut av = AttributeView::new("av-1", "Tasks");
    av.add_column("Score", ColumnType::Number, None).unwrap();
    store.save(&mut av).unwrap();
    assert_eq!(av.revision, 1);

    let loaded = store.load("av-1").unwrap();
    assert_eq!(loaded, av);

    let mut again = loaded;
    again.name = "Renamed".to_string();
    store.save(&mut again).unwrap();
    assert_eq!(again.revision, 2);
    assert_eq!(store.load("av-1").unwrap().name, "Renamed");
    assert_eq!(store.list_ids().unwrap(), vec!["av-1".to_string()]);
}

#[test]
fn load_missing_view_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAttributeViewStore::try_new(&conn).unwrap();

    let err = store.load("missing").unwrap_err();
    assert!(matches!(err, AvRepoError::NotFound(ref id) if id == "missing"));
}

#[test]
fn stale_revision_is_rejected_as_conflict() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAttributeViewStore::try_new(&conn).unwrap();
    let mut av = AttributeView::new("av-1", "Tasks");
    store.save(&mut av).unwrap();

    let mut first = store.load("av-1").unwrap();
    let mut second = store.load("av-1").unwrap();
    first.name = "first".to_string();
    store.save(&mut first).unwrap();

    second.name = "second".to_string();
    let err = store.save(&mut second).unwrap_err();
    assert!(matches!(
        err,
        AvRepoError::RevisionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));
    assert_eq!(second.revision, 1);
    assert_eq!(store.load("av-1").unwrap().name, "first");
}

#[test]
fn saving_new_view_over_existing_id_conflicts() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAttributeViewStore::try_new(&conn).unwrap();
    store.save(&mut AttributeView::new("av-1", "a")).unwrap();

    let err = store
        .save(&mut AttributeView::new("av-1", "b"))
        .unwrap_err();
    assert!(matches!(err, AvRepoError::RevisionConflict { expected: 0, .. }));
}

#[test]
fn save_rejects_view_breaking_invariants() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAttributeViewStore::try_new(&conn).unwrap();

    let mut av = AttributeView::new("av-1", "Tasks");
    av.columns.clear();
    let err = store.save(&mut av).unwrap_err();
    assert!(matches!(
        err,
        AvRepoError::Validation(AttributeViewError::AnchorColumnCount(0))
    ));
    assert!(matches!(store.load("av-1"), Err(AvRepoError::NotFound(_))));
}

#[test]
fn load_rejects_corrupted_payload() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAttributeViewStore::try_new(&conn).unwrap();
    conn.execute(
        "INSERT INTO attribute_views (id, revision, payload) VALUES ('av-1', 1, '{\"id\":\"av-1\"}');",
        [],
    )
    .unwrap();

    assert!(matches!(
        store.load("av-1"),
        Err(AvRepoError::InvalidData(_))
    ));
}
