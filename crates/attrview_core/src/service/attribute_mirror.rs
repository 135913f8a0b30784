//! Block attribute mirror for attribute view membership and cell values.
//!
//! # Responsibility
//! - Record on each anchored block which attribute views contain it
//!   (`custom-avs`, comma-separated view IDs).
//! - Mirror every cell value onto its block as
//!   `custom-av-col-{avID}-{columnID}` holding the cell JSON.
//! - Re-derive the mirror from a stored view after partial failures.
//!
//! # Invariants
//! - Writes are idempotent: repeating a link or a cell write converges to
//!   the same attribute map.
//! - Membership is a set union; existing view IDs are never dropped here.
//! - Unlinking a row leaves its attributes on the block.

use crate::model::attribute_view::{AttributeView, CellValue, Column, ColumnType};
use crate::repo::block_repo::{BlockAttributes, BlockRepoError, BlockRepository};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Block attribute listing attribute views a block belongs to.
pub const NODE_ATTR_NAME_AVS: &str = "custom-avs";
/// Prefix of per-column mirror attributes.
pub const NODE_ATTR_AV_COLUMN_PREFIX: &str = "custom-av-col-";

/// Attribute name mirroring column `column_id` of view `av_id`.
pub fn av_column_attr_name(av_id: &str, column_id: &str) -> String {
    format!("{NODE_ATTR_AV_COLUMN_PREFIX}{av_id}-{column_id}")
}

/// View IDs listed in `custom-avs`.
pub fn linked_av_ids(attrs: &BlockAttributes) -> Vec<&str> {
    attrs
        .get(NODE_ATTR_NAME_AVS)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Adds `av_id` to `custom-avs`. Returns whether the map changed.
pub fn merge_av_id(attrs: &mut BlockAttributes, av_id: &str) -> bool {
    let mut ids: Vec<String> = linked_av_ids(attrs)
        .into_iter()
        .map(str::to_string)
        .collect();
    if ids.iter().any(|id| id == av_id) {
        return false;
    }
    ids.push(av_id.to_string());
    attrs.insert(NODE_ATTR_NAME_AVS.to_string(), ids.join(","));
    true
}

/// Cell JSON as stored in a column attribute; empty cells mirror as "".
fn mirrored_value(value: Option<&CellValue>) -> Result<String, serde_json::Error> {
    value.map_or_else(|| Ok(String::new()), serde_json::to_string)
}

#[derive(Debug)]
pub enum MirrorError {
    Blocks(BlockRepoError),
    Serialization(serde_json::Error),
}

impl Display for MirrorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocks(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "cell value serialization failed: {err}"),
        }
    }
}

impl Error for MirrorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Blocks(err) => Some(err),
            Self::Serialization(err) => Some(err),
        }
    }
}

impl From<BlockRepoError> for MirrorError {
    fn from(value: BlockRepoError) -> Self {
        Self::Blocks(value)
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Summary of a mirror reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Rows whose block attributes were checked.
    pub rows_linked: usize,
    /// Rows whose block attribute map had to be rewritten.
    pub blocks_updated: usize,
    /// Anchor blocks that no longer resolve.
    pub missing_blocks: Vec<String>,
}

/// Writes attribute view state onto block attributes.
pub struct AttributeMirror<'a, B: BlockRepository> {
    blocks: &'a B,
}

impl<'a, B: BlockRepository> AttributeMirror<'a, B> {
    pub fn new(blocks: &'a B) -> Self {
        Self { blocks }
    }

    /// Records membership of `block_id` in `av_id` and creates empty
    /// placeholders for every non-anchor column that has none yet.
    ///
    /// Returns whether the attribute map changed.
    pub fn link_row(
        &self,
        block_id: &str,
        av_id: &str,
        columns: &[Column],
    ) -> Result<bool, MirrorError> {
        let mut attrs = self.blocks.get_block_attributes(block_id)?;
        let mut changed = merge_av_id(&mut attrs, av_id);
        for column in columns
            .iter()
            .filter(|column| column.column_type != ColumnType::Block)
        {
            let name = av_column_attr_name(av_id, &column.id);
            if !attrs.contains_key(&name) {
                attrs.insert(name, String::new());
                changed = true;
            }
        }

        if changed {
            self.blocks.set_block_attributes(block_id, &attrs)?;
        }
        Ok(changed)
    }

    /// Mirrors one cell value; an empty value clears the attribute to "".
    ///
    /// Returns whether the attribute map changed.
    pub fn write_cell(
        &self,
        block_id: &str,
        av_id: &str,
        column_id: &str,
        value: Option<&CellValue>,
    ) -> Result<bool, MirrorError> {
        let mut attrs = self.blocks.get_block_attributes(block_id)?;
        let mut changed = merge_av_id(&mut attrs, av_id);
        let serialized = mirrored_value(value)?;
        let name = av_column_attr_name(av_id, column_id);
        if attrs.get(&name) != Some(&serialized) {
            attrs.insert(name, serialized);
            changed = true;
        }

        if changed {
            self.blocks.set_block_attributes(block_id, &attrs)?;
        }
        Ok(changed)
    }

    /// Re-links every row of `av` and rewrites every mirrored cell value.
    ///
    /// Rows whose anchor block is gone are reported, not treated as errors.
    pub fn reconcile(&self, av: &AttributeView) -> Result<MirrorReport, MirrorError> {
        let mut report = MirrorReport::default();
        for row in &av.rows {
            let Some(block_id) = row.anchor_block_id() else {
                continue;
            };
            if self.blocks.resolve_block(block_id)?.is_none() {
                warn!(
                    "event=av_mirror_reconcile module=mirror status=skip reason=block_missing av_id={} row_id={}",
                    av.id, row.id
                );
                report.missing_blocks.push(block_id.to_string());
                continue;
            }

            let mut attrs = self.blocks.get_block_attributes(block_id)?;
            let before = attrs.clone();
            merge_av_id(&mut attrs, &av.id);
            for (column, cell) in row.cells_in_order(&av.columns) {
                if column.column_type == ColumnType::Block {
                    continue;
                }
                attrs.insert(
                    av_column_attr_name(&av.id, &column.id),
                    mirrored_value(cell.value.as_ref())?,
                );
            }

            report.rows_linked += 1;
            if attrs != before {
                self.blocks.set_block_attributes(block_id, &attrs)?;
                report.blocks_updated += 1;
            }
        }

        info!(
            "event=av_mirror_reconcile module=mirror status=ok av_id={} rows_linked={} blocks_updated={} missing_blocks={}",
            av.id,
            report.rows_linked,
            report.blocks_updated,
            report.missing_blocks.len()
        );
        Ok(report)
    }
}
