//! Core domain logic for attribute views: typed tables whose rows are
//! document blocks.
//! This crate is the single source of truth for attribute view invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod render;
pub mod repo;
pub mod service;

pub use config::CoreConfig;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::attribute_view::{
    AttributeView, AttributeViewError, CalcOperator, Cell, CellValue, Column, ColumnCalc,
    ColumnType, FilterOperator, FilterRule, OptionEdit, Row, SelectOption, SelectOptionInput,
    SortOrder, SortRule, Table, TableColumn, TableRow, View,
};
pub use model::block::{anchor_display_text, Block, BlockKind};
pub use model::operation::{Action, Operation, OperationDecodeError};
pub use render::{render_attribute_view, render_view, RenderError, RenderedView, Viewable};
pub use repo::attribute_view_repo::{
    AttributeViewStore, AvRepoError, AvRepoResult, SqliteAttributeViewStore,
};
pub use repo::block_repo::{
    BlockAttributes, BlockRepoError, BlockRepoResult, BlockRepository, SqliteBlockRepository,
};
pub use service::attribute_mirror::{AttributeMirror, MirrorError, MirrorReport};
pub use service::attribute_view_service::{AttributeViewService, AvServiceError, ErrorKind};
pub use service::transaction::{apply_json_operations, apply_operations, TxError, TxErrorCode};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
