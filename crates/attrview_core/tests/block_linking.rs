mod common;

use attrview_core::service::attribute_mirror::{av_column_attr_name, NODE_ATTR_NAME_AVS};
use attrview_core::{
    AttributeView, AttributeViewService, AttributeViewStore, AvRepoError, AvRepoResult,
    AvServiceError, BlockKind, BlockRepository, CellValue, ColumnType, ErrorKind,
    SqliteAttributeViewStore, SqliteBlockRepository,
};
use common::{attrs, cell_id, load, number, paragraph, row_blocks, seed_rows, service, setup};
use std::cell::Cell;

#[test]
fn insert_blocks_creates_view_rows_and_mirror_attributes() {
    let conn = setup();
    let service = service(&conn);
    let block = paragraph(&service, "# Ship **release**");

    let inserted = service
        .insert_blocks("av-1", &[block.clone()], None)
        .unwrap();
    assert_eq!(inserted, 1);

    let av = load(&service, "av-1");
    assert_eq!(av.rows.len(), 1);
    av.validate().unwrap();
    let anchor = av.rows[0].block_cell().unwrap();
    assert_eq!(
        anchor.value,
        Some(CellValue::Block {
            id: block.clone(),
            content: "Ship release".to_string(),
        })
    );

    let block_attrs = attrs(&service, &block);
    assert_eq!(block_attrs[NODE_ATTR_NAME_AVS], "av-1");
}

#[test]
fn placeholders_exist_for_every_non_anchor_column() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["first"]);
    let score = service
        .add_column("av-1", "Score", ColumnType::Number, None)
        .unwrap();

    let block = paragraph(&service, "second");
    service
        .insert_blocks("av-1", &[block.clone()], None)
        .unwrap();

    let block_attrs = attrs(&service, &block);
    assert_eq!(block_attrs[&av_column_attr_name("av-1", &score)], "");
    let anchor_column = load(&service, "av-1").block_column().unwrap().id.clone();
    assert!(!block_attrs.contains_key(&av_column_attr_name("av-1", &anchor_column)));
}

#[test]
fn rows_follow_source_order_after_previous_row() {
    let conn = setup();
    let service = service(&conn);
    let existing = seed_rows(&service, "av-1", &["a", "d"]);
    let av = load(&service, "av-1");
    let first_row = av.rows[0].id.clone();

    let b = paragraph(&service, "b");
    let c = paragraph(&service, "c");
    service
        .insert_blocks("av-1", &[b.clone(), c.clone()], Some(&first_row))
        .unwrap();

    assert_eq!(
        row_blocks(&load(&service, "av-1")),
        vec![existing[0].clone(), b, c, existing[1].clone()]
    );
}

#[test]
fn duplicate_insert_is_a_no_op() {
    let conn = setup();
    let service = service(&conn);
    let blocks = seed_rows(&service, "av-1", &["only"]);
    let before = load(&service, "av-1");
    let attrs_before = attrs(&service, &blocks[0]);

    let inserted = service.insert_blocks("av-1", &blocks, None).unwrap();
    assert_eq!(inserted, 0);

    let after = load(&service, "av-1");
    assert_eq!(after.rows.len(), 1);
    assert_eq!(after.revision, before.revision);
    assert_eq!(attrs(&service, &blocks[0]), attrs_before);
}

#[test]
fn attribute_view_blocks_are_not_nested() {
    let conn = setup();
    let service = service(&conn);
    let nested = service
        .blocks()
        .create_block(None, BlockKind::AttributeView, "")
        .unwrap();
    let plain = paragraph(&service, "plain");

    let inserted = service
        .insert_blocks("av-1", &[nested.id.clone(), plain.clone()], None)
        .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(row_blocks(&load(&service, "av-1")), vec![plain]);
    assert!(attrs(&service, &nested.id).is_empty());
}

#[test]
fn block_in_two_views_lists_both() {
    let conn = setup();
    let service = service(&conn);
    let block = paragraph(&service, "shared");

    service.insert_blocks("av-1", &[block.clone()], None).unwrap();
    service.insert_blocks("av-2", &[block.clone()], None).unwrap();
    service.insert_blocks("av-1", &[block.clone()], None).unwrap();

    assert_eq!(attrs(&service, &block)[NODE_ATTR_NAME_AVS], "av-1,av-2");
}

#[test]
fn missing_block_aborts_without_saving() {
    let conn = setup();
    let service = service(&conn);
    let blocks = seed_rows(&service, "av-1", &["kept"]);
    service
        .add_column("av-1", "Score", ColumnType::Number, None)
        .unwrap();
    let fresh = paragraph(&service, "fresh");

    let err = service
        .insert_blocks("av-1", &[fresh.clone(), "ghost".to_string()], None)
        .unwrap_err();
    assert!(matches!(err, AvServiceError::BlockNotFound(ref id) if id == "ghost"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(row_blocks(&load(&service, "av-1")), blocks);
    assert!(attrs(&service, &fresh).is_empty());

    service.insert_blocks("av-1", &[fresh.clone()], None).unwrap();
    assert_eq!(attrs(&service, &fresh)[NODE_ATTR_NAME_AVS], "av-1");
}

#[test]
fn missing_block_leaves_no_membership_in_unsaved_view() {
    let conn = setup();
    let service = service(&conn);
    let fresh = paragraph(&service, "fresh");

    let err = service
        .insert_blocks("av-new", &[fresh.clone(), "ghost".to_string()], None)
        .unwrap_err();
    assert!(matches!(err, AvServiceError::BlockNotFound(ref id) if id == "ghost"));
    assert!(matches!(
        service.store().load("av-new"),
        Err(AvRepoError::NotFound(_))
    ));
    assert!(!attrs(&service, &fresh).contains_key(NODE_ATTR_NAME_AVS));
}

#[test]
fn duplicate_sources_in_one_call_insert_once() {
    let conn = setup();
    let service = service(&conn);
    let block = paragraph(&service, "twice");

    let inserted = service
        .insert_blocks("av-1", &[block.clone(), block.clone()], None)
        .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(row_blocks(&load(&service, "av-1")), vec![block]);
}

#[test]
fn remove_blocks_keeps_block_attributes() {
    let conn = setup();
    let service = service(&conn);
    let blocks = seed_rows(&service, "av-1", &["a", "b"]);
    let score = service
        .add_column("av-1", "Score", ColumnType::Number, None)
        .unwrap();
    let av = load(&service, "av-1");
    let (row_id, cell) = cell_id(&av, &blocks[0], &score);
    service
        .update_cell("av-1", &row_id, &cell, number(3.0))
        .unwrap();
    let attrs_before = attrs(&service, &blocks[0]);

    let removed = service
        .remove_blocks("av-1", &[blocks[0].clone(), "never-added".to_string()])
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(row_blocks(&load(&service, "av-1")), vec![blocks[1].clone()]);
    assert_eq!(attrs(&service, &blocks[0]), attrs_before);
    assert!(attrs_before.contains_key(&av_column_attr_name("av-1", &score)));
}

#[test]
fn remove_from_missing_view_is_not_found() {
    let conn = setup();
    let service = service(&conn);

    let err = service
        .remove_blocks("missing", &["b".to_string()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Store whose saves can be switched to fail.
struct FlakyStore<'conn> {
    inner: SqliteAttributeViewStore<'conn>,
    fail_saves: Cell<bool>,
}

impl AttributeViewStore for FlakyStore<'_> {
    fn load(&self, av_id: &str) -> AvRepoResult<AttributeView> {
        self.inner.load(av_id)
    }

    fn save(&self, av: &mut AttributeView) -> AvRepoResult<()> {
        if self.fail_saves.get() {
            return Err(AvRepoError::InvalidData("disk full".to_string()));
        }
        self.inner.save(av)
    }
}

#[test]
fn failed_save_leaves_mirror_ahead_and_retry_converges() {
    let conn = setup();
    let service = AttributeViewService::new(
        FlakyStore {
            inner: SqliteAttributeViewStore::try_new(&conn).unwrap(),
            fail_saves: Cell::new(false),
        },
        SqliteBlockRepository::try_new(&conn).unwrap(),
    );
    let blocks = service.blocks();
    let first = blocks.create_block(None, BlockKind::Paragraph, "first").unwrap();
    service
        .insert_blocks("av-1", &[first.id.clone()], None)
        .unwrap();

    service.store().fail_saves.set(true);
    let second = blocks.create_block(None, BlockKind::Paragraph, "second").unwrap();
    let err = service
        .insert_blocks("av-1", &[second.id.clone()], None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteFailure);

    assert_eq!(service.store().load("av-1").unwrap().rows.len(), 1);
    let dangling = blocks.get_block_attributes(&second.id).unwrap();
    assert_eq!(dangling[NODE_ATTR_NAME_AVS], "av-1");

    service.store().fail_saves.set(false);
    assert_eq!(
        service
            .insert_blocks("av-1", &[second.id.clone()], None)
            .unwrap(),
        1
    );
    assert_eq!(service.store().load("av-1").unwrap().rows.len(), 2);
}

#[test]
fn reconcile_rewrites_mirror_from_stored_view() {
    let conn = setup();
    let service = service(&conn);
    let blocks = seed_rows(&service, "av-1", &["a", "b"]);
    let score = service
        .add_column("av-1", "Score", ColumnType::Number, None)
        .unwrap();
    let av = load(&service, "av-1");
    let (row_id, cell) = cell_id(&av, &blocks[0], &score);
    service
        .update_cell("av-1", &row_id, &cell, number(7.0))
        .unwrap();

    service
        .blocks()
        .set_block_attributes(&blocks[0], &Default::default())
        .unwrap();
    conn.execute("DELETE FROM blocks WHERE id = ?1;", [blocks[1].as_str()])
        .unwrap();

    let report = service.reconcile_mirror("av-1").unwrap();
    assert_eq!(report.rows_linked, 1);
    assert_eq!(report.blocks_updated, 1);
    assert_eq!(report.missing_blocks, vec![blocks[1].clone()]);

    let repaired = attrs(&service, &blocks[0]);
    assert_eq!(repaired[NODE_ATTR_NAME_AVS], "av-1");
    assert_eq!(
        repaired[&av_column_attr_name("av-1", &score)],
        r#"{"type":"number","content":7.0}"#
    );

    let again = service.reconcile_mirror("av-1").unwrap();
    assert_eq!(again.blocks_updated, 0);
}
