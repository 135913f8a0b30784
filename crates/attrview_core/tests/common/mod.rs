#![allow(dead_code)]

use attrview_core::db::open_db_in_memory;
use attrview_core::{
    AttributeView, AttributeViewService, AttributeViewStore, BlockAttributes, BlockKind,
    BlockRepository, CellValue, SqliteAttributeViewStore, SqliteBlockRepository,
};
use rusqlite::Connection;

pub type Service<'conn> =
    AttributeViewService<SqliteAttributeViewStore<'conn>, SqliteBlockRepository<'conn>>;

pub fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

pub fn service(conn: &Connection) -> Service<'_> {
    AttributeViewService::new(
        SqliteAttributeViewStore::try_new(conn).unwrap(),
        SqliteBlockRepository::try_new(conn).unwrap(),
    )
}

/// Creates a paragraph block and returns its ID.
pub fn paragraph(service: &Service<'_>, content: &str) -> String {
    service
        .blocks()
        .create_block(None, BlockKind::Paragraph, content)
        .unwrap()
        .id
}

/// Creates one block per content entry and inserts them into `av_id` in order.
pub fn seed_rows(service: &Service<'_>, av_id: &str, contents: &[&str]) -> Vec<String> {
    let block_ids: Vec<String> = contents
        .iter()
        .map(|content| paragraph(service, content))
        .collect();
    service.insert_blocks(av_id, &block_ids, None).unwrap();
    block_ids
}

pub fn load(service: &Service<'_>, av_id: &str) -> AttributeView {
    service.store().load(av_id).unwrap()
}

pub fn attrs(service: &Service<'_>, block_id: &str) -> BlockAttributes {
    service.blocks().get_block_attributes(block_id).unwrap()
}

/// Anchor block IDs in row order.
pub fn row_blocks(av: &AttributeView) -> Vec<String> {
    av.rows
        .iter()
        .map(|row| row.anchor_block_id().unwrap().to_string())
        .collect()
}

/// Cell ID of `column_id` in the row anchored to `block_id`.
pub fn cell_id(av: &AttributeView, block_id: &str, column_id: &str) -> (String, String) {
    let row = av
        .rows
        .iter()
        .find(|row| row.anchor_block_id() == Some(block_id))
        .unwrap();
    (row.id.clone(), row.cells[column_id].id.clone())
}

pub fn number(content: f64) -> Option<CellValue> {
    Some(CellValue::Number { content })
}

pub fn text(content: &str) -> Option<CellValue> {
    Some(CellValue::Text {
        content: content.to_string(),
    })
}

pub fn options(ids: &[&str]) -> Option<CellValue> {
    Some(CellValue::Select {
        option_ids: ids.iter().map(|id| id.to_string()).collect(),
    })
}
