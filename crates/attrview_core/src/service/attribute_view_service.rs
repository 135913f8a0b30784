//! Attribute view mutation use-cases.
//!
//! # Responsibility
//! - Apply typed mutation operations to one attribute view at a time.
//! - Keep block attribute mirrors in step with row membership and cells.
//! - Classify failures as not-found, invalid input, write failure or conflict.
//!
//! # Invariants
//! - Every mutation loads the whole view, edits it in memory, then saves it
//!   once; a failure before the save leaves the stored view untouched.
//! - Mirror writes happen after every input is checked and before the view
//!   save. Only a failed save can leave mirror attributes ahead of the view;
//!   `reconcile_mirror` repairs that.
//! - Removal of absent rows, columns or options is a no-op success.
//!
//! # See also
//! - docs/architecture/attribute-view.md

use crate::model::attribute_view::{
    AttributeView, AttributeViewError, CellValue, ColumnCalc, ColumnId, ColumnType, FilterRule,
    OptionEdit, Row, SelectOptionInput, SortRule,
};
use crate::model::block::{anchor_display_text, BlockKind};
use crate::model::operation::{Action, Operation};
use crate::render::{render_attribute_view, RenderError, RenderedView};
use crate::repo::attribute_view_repo::{AttributeViewStore, AvRepoError};
use crate::repo::block_repo::{BlockRepoError, BlockRepository};
use crate::service::attribute_mirror::{AttributeMirror, MirrorError, MirrorReport};
use log::{error, info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Coarse failure class exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    WriteFailure,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::WriteFailure => "write_failure",
            Self::Conflict => "conflict",
        }
    }
}

/// Service error for attribute view mutations.
#[derive(Debug)]
pub enum AvServiceError {
    AttributeViewNotFound(String),
    AttributeViewExists(String),
    BlockNotFound(String),
    /// Structural edit rejected by the model.
    Model(AttributeViewError),
    InvalidInput(String),
    /// View was saved by someone else since it was loaded.
    Conflict {
        av_id: String,
        expected: u64,
        actual: u64,
    },
    Store(AvRepoError),
    Mirror(MirrorError),
}

impl AvServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AttributeViewNotFound(_) | Self::BlockNotFound(_) => ErrorKind::NotFound,
            Self::Model(err) if err.is_not_found() => ErrorKind::NotFound,
            Self::Model(_) | Self::InvalidInput(_) | Self::AttributeViewExists(_) => {
                ErrorKind::InvalidInput
            }
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Store(_) | Self::Mirror(_) => ErrorKind::WriteFailure,
        }
    }
}

impl Display for AvServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttributeViewNotFound(id) => write!(f, "attribute view not found: {id}"),
            Self::AttributeViewExists(id) => write!(f, "attribute view already exists: {id}"),
            Self::BlockNotFound(id) => write!(f, "block not found: {id}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Conflict {
                av_id,
                expected,
                actual,
            } => write!(
                f,
                "attribute view {av_id} changed concurrently: expected revision {expected}, found {actual}"
            ),
            Self::Store(err) => write!(f, "{err}"),
            Self::Mirror(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AvServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Mirror(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AvRepoError> for AvServiceError {
    fn from(value: AvRepoError) -> Self {
        match value {
            AvRepoError::NotFound(id) => Self::AttributeViewNotFound(id),
            AvRepoError::Validation(err) => Self::Model(err),
            AvRepoError::RevisionConflict {
                av_id,
                expected,
                actual,
            } => Self::Conflict {
                av_id,
                expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

impl From<MirrorError> for AvServiceError {
    fn from(value: MirrorError) -> Self {
        match value {
            MirrorError::Blocks(BlockRepoError::NotFound(id)) => Self::BlockNotFound(id),
            other => Self::Mirror(other),
        }
    }
}

impl From<BlockRepoError> for AvServiceError {
    fn from(value: BlockRepoError) -> Self {
        MirrorError::Blocks(value).into()
    }
}

impl From<AttributeViewError> for AvServiceError {
    fn from(value: AttributeViewError) -> Self {
        Self::Model(value)
    }
}

pub type AvServiceResult<T> = Result<T, AvServiceError>;

/// Use-case service over an attribute view store and a block repository.
pub struct AttributeViewService<S: AttributeViewStore, B: BlockRepository> {
    store: S,
    blocks: B,
}

impl<S: AttributeViewStore, B: BlockRepository> AttributeViewService<S, B> {
    pub fn new(store: S, blocks: B) -> Self {
        Self { store, blocks }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn blocks(&self) -> &B {
        &self.blocks
    }

    /// Applies one decoded operation.
    ///
    /// # Side effects
    /// - Emits one `av_op` logging event per call with status and duration.
    pub fn apply(&self, operation: &Operation) -> AvServiceResult<()> {
        let started_at = Instant::now();
        let action = operation.action.name();
        let result = self.dispatch(operation);

        match &result {
            Ok(()) => info!(
                "event=av_op module=service status=ok action={} av_id={} duration_ms={}",
                action,
                operation.av_id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=av_op module=service status=error action={} av_id={} duration_ms={} error_kind={} error={}",
                action,
                operation.av_id,
                started_at.elapsed().as_millis(),
                err.kind().as_str(),
                err
            ),
        }
        result
    }

    fn dispatch(&self, operation: &Operation) -> AvServiceResult<()> {
        let av_id = operation.av_id.as_str();
        match &operation.action {
            Action::CreateAttributeView { name } => self.create_attribute_view(av_id, name),
            Action::SetName { name } => self.set_name(av_id, name),
            Action::SetFilters { view_id, filters } => {
                self.set_filters(av_id, view_id.as_deref(), filters.clone())
            }
            Action::SetSorts { view_id, sorts } => {
                self.set_sorts(av_id, view_id.as_deref(), sorts.clone())
            }
            Action::SetCurrentView { view_id } => self.set_current_view(av_id, view_id),
            Action::InsertBlocks {
                src_ids,
                previous_id,
            } => self
                .insert_blocks(av_id, src_ids, previous_id.as_deref())
                .map(drop),
            Action::RemoveBlocks { src_ids } => self.remove_blocks(av_id, src_ids).map(drop),
            Action::MoveRow {
                row_id,
                previous_id,
            } => self.move_row(av_id, row_id, previous_id.as_deref()),
            Action::MoveColumn {
                column_id,
                previous_id,
            } => self.move_column(av_id, column_id, previous_id.as_deref()),
            Action::AddColumn {
                name,
                column_type,
                view_id,
            } => self
                .add_column(av_id, name, *column_type, view_id.as_deref())
                .map(drop),
            Action::UpdateColumn {
                column_id,
                name,
                column_type,
            } => self.update_column(av_id, column_id, name, *column_type),
            Action::RemoveColumn { column_id } => self.remove_column(av_id, column_id),
            Action::SetColumnWidth {
                view_id,
                column_id,
                width,
            } => self.set_column_width(av_id, view_id.as_deref(), column_id, width),
            Action::SetColumnWrap {
                view_id,
                column_id,
                wrap,
            } => self.set_column_wrap(av_id, view_id.as_deref(), column_id, *wrap),
            Action::SetColumnHidden {
                view_id,
                column_id,
                hidden,
            } => self.set_column_hidden(av_id, view_id.as_deref(), column_id, *hidden),
            Action::SetColumnCalc {
                view_id,
                column_id,
                calc,
            } => self.set_column_calc(av_id, view_id.as_deref(), column_id, calc.clone()),
            Action::UpdateCell {
                row_id,
                cell_id,
                value,
            } => self.update_cell(av_id, row_id, cell_id, value.clone()),
            Action::UpdateColumnOption {
                column_id,
                old_name,
                new_name,
                color,
            } => self
                .update_column_option(av_id, column_id, old_name, new_name, color)
                .map(drop),
            Action::MergeColumnOptions {
                column_id,
                from,
                into,
            } => self
                .merge_column_options(av_id, column_id, from, into)
                .map(drop),
            Action::RemoveColumnOption { column_id, name } => {
                self.remove_column_option(av_id, column_id, name)
            }
            Action::SetColumnOptions { column_id, options } => {
                self.set_column_options(av_id, column_id, options.clone())
            }
            Action::SetAttributeView { patch } => self.set_attribute_view(av_id, patch),
        }
    }

    /// Materializes the current view of `av_id`.
    pub fn render(&self, av_id: &str) -> Result<(RenderedView, AttributeView), RenderError> {
        render_attribute_view(&self.store, av_id)
    }

    /// Creates an empty attribute view with an anchor column and one table view.
    pub fn create_attribute_view(&self, av_id: &str, name: &str) -> AvServiceResult<()> {
        match self.store.load(av_id) {
            Ok(_) => return Err(AvServiceError::AttributeViewExists(av_id.to_string())),
            Err(AvRepoError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        let mut av = AttributeView::new(av_id, name);
        self.store.save(&mut av)?;
        Ok(())
    }

    pub fn set_name(&self, av_id: &str, name: &str) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.name = name.to_string();
            Ok(())
        })
    }

    pub fn set_filters(
        &self,
        av_id: &str,
        view_id: Option<&str>,
        filters: Vec<FilterRule>,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.view_mut(view_id)?.table.filters = filters;
            Ok(())
        })
    }

    pub fn set_sorts(
        &self,
        av_id: &str,
        view_id: Option<&str>,
        sorts: Vec<SortRule>,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.view_mut(view_id)?.table.sorts = sorts;
            Ok(())
        })
    }

    pub fn set_current_view(&self, av_id: &str, view_id: &str) -> AvServiceResult<()> {
        self.mutate(av_id, |av| Ok(av.set_current_view(view_id)?))
    }

    /// Adds one row per source block, in order, after `previous_id`.
    ///
    /// Creates the attribute view on first use. Blocks that embed an attribute
    /// view and blocks already present are skipped. Returns inserted row count.
    pub fn insert_blocks(
        &self,
        av_id: &str,
        src_ids: &[String],
        previous_id: Option<&str>,
    ) -> AvServiceResult<usize> {
        if src_ids.is_empty() {
            return Err(AvServiceError::InvalidInput(
                "insertBlocks requires at least one block id".to_string(),
            ));
        }

        let mut av = self.load_or_init(av_id)?;

        // Every source resolves before any block attribute is touched.
        let mut pending: Vec<(&str, Row)> = Vec::with_capacity(src_ids.len());
        for block_id in src_ids {
            let block = self
                .blocks
                .resolve_block(block_id)?
                .ok_or_else(|| AvServiceError::BlockNotFound(block_id.clone()))?;
            if block.kind == BlockKind::AttributeView {
                info!(
                    "event=av_insert_block module=service status=skip reason=nested_attribute_view av_id={av_id} block_id={block_id}"
                );
                continue;
            }
            let queued = pending.iter().any(|(id, _)| *id == block_id.as_str());
            if queued || av.contains_block(block_id) {
                info!(
                    "event=av_insert_block module=service status=skip reason=duplicate_block av_id={av_id} block_id={block_id}"
                );
                continue;
            }
            pending.push((
                block_id.as_str(),
                av.new_row_for_block(block_id, &anchor_display_text(&block)),
            ));
        }

        let mirror = AttributeMirror::new(&self.blocks);
        let mut anchor = previous_id.map(str::to_string);
        let inserted = pending.len();
        for (block_id, row) in pending {
            mirror.link_row(block_id, av_id, &av.columns)?;
            let row_id = row.id.clone();
            av.insert_row_after(row, anchor.as_deref());
            anchor = Some(row_id);
        }

        if inserted > 0 {
            self.store.save(&mut av)?;
        }
        Ok(inserted)
    }

    /// Removes rows anchored to the given blocks. Mirror attributes stay on
    /// the blocks. Returns removed row count.
    pub fn remove_blocks(&self, av_id: &str, src_ids: &[String]) -> AvServiceResult<usize> {
        let mut av = self.store.load(av_id)?;
        let removed = src_ids
            .iter()
            .filter(|block_id| av.remove_row_by_block(block_id).is_some())
            .count();
        if removed > 0 {
            self.store.save(&mut av)?;
        }
        Ok(removed)
    }

    pub fn move_row(
        &self,
        av_id: &str,
        row_id: &str,
        previous_id: Option<&str>,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.move_row(row_id, previous_id)?;
            Ok(())
        })
    }

    pub fn move_column(
        &self,
        av_id: &str,
        column_id: &str,
        previous_id: Option<&str>,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.move_column(column_id, previous_id)?;
            Ok(())
        })
    }

    /// Adds a column with an empty cell in every row; returns its ID.
    pub fn add_column(
        &self,
        av_id: &str,
        name: &str,
        column_type: ColumnType,
        view_id: Option<&str>,
    ) -> AvServiceResult<ColumnId> {
        self.mutate(av_id, |av| Ok(av.add_column(name, column_type, view_id)?))
    }

    /// Renames/retypes a column. Cells keep their values until rewritten.
    pub fn update_column(
        &self,
        av_id: &str,
        column_id: &str,
        name: &str,
        column_type: ColumnType,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            let stale = av.update_column(column_id, name, column_type)?;
            if stale > 0 {
                warn!(
                    "event=av_update_column module=service status=stale_cells av_id={av_id} column_id={column_id} column_type={} stale_cells={stale}",
                    column_type.as_str()
                );
            }
            Ok(())
        })
    }

    pub fn remove_column(&self, av_id: &str, column_id: &str) -> AvServiceResult<()> {
        let mut av = self.store.load(av_id)?;
        if av.remove_column(column_id)?.is_none() {
            info!(
                "event=av_remove_column module=service status=skip reason=column_missing av_id={av_id} column_id={column_id}"
            );
            return Ok(());
        }
        self.store.save(&mut av)?;
        Ok(())
    }

    pub fn set_column_width(
        &self,
        av_id: &str,
        view_id: Option<&str>,
        column_id: &str,
        width: &str,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.view_mut(view_id)?.display_column_mut(column_id)?.width = width.to_string();
            Ok(())
        })
    }

    pub fn set_column_wrap(
        &self,
        av_id: &str,
        view_id: Option<&str>,
        column_id: &str,
        wrap: bool,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.view_mut(view_id)?.display_column_mut(column_id)?.wrap = wrap;
            Ok(())
        })
    }

    pub fn set_column_hidden(
        &self,
        av_id: &str,
        view_id: Option<&str>,
        column_id: &str,
        hidden: bool,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            av.view_mut(view_id)?.display_column_mut(column_id)?.hidden = hidden;
            Ok(())
        })
    }

    /// Sets or clears the aggregate shown under a display column.
    pub fn set_column_calc(
        &self,
        av_id: &str,
        view_id: Option<&str>,
        column_id: &str,
        calc: Option<ColumnCalc>,
    ) -> AvServiceResult<()> {
        let calc = calc.map(|calc| ColumnCalc {
            result: None,
            ..calc
        });
        self.mutate(av_id, |av| {
            av.view_mut(view_id)?.display_column_mut(column_id)?.calc = calc;
            Ok(())
        })
    }

    /// Writes a cell value and mirrors it onto the row's block.
    ///
    /// The anchor block must resolve before anything is written.
    pub fn update_cell(
        &self,
        av_id: &str,
        row_id: &str,
        cell_id: &str,
        value: Option<CellValue>,
    ) -> AvServiceResult<()> {
        let mut av = self.store.load(av_id)?;
        let mirrored = value.clone();
        let target = av.set_cell_value(row_id, cell_id, value)?;
        if self.blocks.resolve_block(&target.block_id)?.is_none() {
            return Err(AvServiceError::BlockNotFound(target.block_id));
        }

        if av.column(&target.column_id)?.column_type != ColumnType::Block {
            AttributeMirror::new(&self.blocks).write_cell(
                &target.block_id,
                av_id,
                &target.column_id,
                mirrored.as_ref(),
            )?;
        }
        self.store.save(&mut av)?;
        Ok(())
    }

    /// Renames/recolors an option, merging into an existing option on name
    /// collision.
    pub fn update_column_option(
        &self,
        av_id: &str,
        column_id: &str,
        old_name: &str,
        new_name: &str,
        color: &str,
    ) -> AvServiceResult<OptionEdit> {
        let mut av = self.store.load(av_id)?;
        let edit = av.rename_option(column_id, old_name, new_name, color)?;
        if let OptionEdit::Merged { cells_updated, .. } = &edit {
            if *cells_updated > 0 {
                self.mirror_column(&av, column_id)?;
            }
        }
        self.store.save(&mut av)?;
        Ok(edit)
    }

    /// Merges option `from` into option `into`; returns updated cell count.
    pub fn merge_column_options(
        &self,
        av_id: &str,
        column_id: &str,
        from: &str,
        into: &str,
    ) -> AvServiceResult<usize> {
        let mut av = self.store.load(av_id)?;
        let updated = av.merge_options(column_id, from, into)?;
        if updated > 0 {
            self.mirror_column(&av, column_id)?;
        }
        self.store.save(&mut av)?;
        Ok(updated)
    }

    /// Removes an option and clears references to it. Absent options are a no-op.
    pub fn remove_column_option(
        &self,
        av_id: &str,
        column_id: &str,
        name: &str,
    ) -> AvServiceResult<()> {
        let mut av = self.store.load(av_id)?;
        let Some(updated) = av.remove_option(column_id, name)? else {
            info!(
                "event=av_remove_option module=service status=skip reason=option_missing av_id={av_id} column_id={column_id}"
            );
            return Ok(());
        };
        if updated > 0 {
            self.mirror_column(&av, column_id)?;
        }
        self.store.save(&mut av)?;
        Ok(())
    }

    /// Replaces a column's options. Cells referencing dropped options keep
    /// their dangling IDs.
    pub fn set_column_options(
        &self,
        av_id: &str,
        column_id: &str,
        options: Vec<SelectOptionInput>,
    ) -> AvServiceResult<()> {
        self.mutate(av_id, |av| {
            if !av.column(column_id)?.column_type.uses_options() {
                return Err(AvServiceError::InvalidInput(format!(
                    "column {column_id} does not hold options"
                )));
            }
            av.replace_options(column_id, options)?;
            Ok(())
        })
    }

    /// Deep-merges `patch` into the stored view, then re-validates it.
    ///
    /// Objects merge key by key, everything else replaces. `id` and
    /// `revision` cannot be changed through a patch.
    pub fn set_attribute_view(&self, av_id: &str, patch: &Value) -> AvServiceResult<()> {
        if !patch.is_object() {
            return Err(AvServiceError::InvalidInput(
                "attribute view patch must be a JSON object".to_string(),
            ));
        }

        let current = self.store.load(av_id)?;
        let mut document = serde_json::to_value(&current).map_err(|err| {
            AvServiceError::InvalidInput(format!("attribute view cannot be encoded: {err}"))
        })?;
        merge_json(&mut document, patch);

        let mut patched: AttributeView = serde_json::from_value(document)
            .map_err(|err| AvServiceError::InvalidInput(format!("invalid patch: {err}")))?;
        patched.id = current.id;
        patched.revision = current.revision;
        patched.validate()?;
        self.store.save(&mut patched)?;
        Ok(())
    }

    /// Rewrites block mirrors from the stored view.
    pub fn reconcile_mirror(&self, av_id: &str) -> AvServiceResult<MirrorReport> {
        let av = self.store.load(av_id)?;
        Ok(AttributeMirror::new(&self.blocks).reconcile(&av)?)
    }

    fn load_or_init(&self, av_id: &str) -> AvServiceResult<AttributeView> {
        match self.store.load(av_id) {
            Ok(av) => Ok(av),
            Err(AvRepoError::NotFound(_)) => {
                info!("event=av_init module=service status=ok av_id={av_id}");
                Ok(AttributeView::new(av_id, ""))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn mutate<T>(
        &self,
        av_id: &str,
        edit: impl FnOnce(&mut AttributeView) -> AvServiceResult<T>,
    ) -> AvServiceResult<T> {
        let mut av = self.store.load(av_id)?;
        let output = edit(&mut av)?;
        self.store.save(&mut av)?;
        Ok(output)
    }

    fn mirror_column(&self, av: &AttributeView, column_id: &str) -> AvServiceResult<()> {
        let mirror = AttributeMirror::new(&self.blocks);
        for row in &av.rows {
            let (Some(block_id), Some(cell)) = (row.anchor_block_id(), row.cells.get(column_id))
            else {
                continue;
            };
            if self.blocks.resolve_block(block_id)?.is_none() {
                warn!(
                    "event=av_mirror module=service status=skip reason=block_missing av_id={} row_id={}",
                    av.id, row.id
                );
                continue;
            }
            mirror.write_cell(block_id, &av.id, column_id, cell.value.as_ref())?;
        }
        Ok(())
    }
}

/// Merges `patch` into `target`: objects recursively, other values replace.
fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value);
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
