//! Mutation protocol.
//!
//! # Responsibility
//! - Define the typed operation envelope accepted by the mutation service.
//! - Decode JSON operations once at the boundary.
//!
//! # Invariants
//! - Every operation targets exactly one attribute view through `avId`.
//! - The action tag is `action`, field names are camelCase.

use crate::model::attribute_view::{
    CellValue, ColumnCalc, ColumnType, FilterRule, SelectOptionInput, SortRule,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One mutation request against one attribute view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub av_id: String,
    #[serde(flatten)]
    pub action: Action,
}

/// Mutation payloads, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    CreateAttributeView {
        #[serde(default)]
        name: String,
    },
    SetName {
        name: String,
    },
    SetFilters {
        #[serde(default)]
        view_id: Option<String>,
        filters: Vec<FilterRule>,
    },
    SetSorts {
        #[serde(default)]
        view_id: Option<String>,
        sorts: Vec<SortRule>,
    },
    SetCurrentView {
        view_id: String,
    },
    /// Adds rows for source blocks, in order, after `previous_id` (head when absent).
    InsertBlocks {
        src_ids: Vec<String>,
        #[serde(default)]
        previous_id: Option<String>,
    },
    RemoveBlocks {
        src_ids: Vec<String>,
    },
    MoveRow {
        row_id: String,
        #[serde(default)]
        previous_id: Option<String>,
    },
    MoveColumn {
        column_id: String,
        #[serde(default)]
        previous_id: Option<String>,
    },
    AddColumn {
        name: String,
        column_type: ColumnType,
        #[serde(default)]
        view_id: Option<String>,
    },
    UpdateColumn {
        column_id: String,
        name: String,
        column_type: ColumnType,
    },
    RemoveColumn {
        column_id: String,
    },
    SetColumnWidth {
        #[serde(default)]
        view_id: Option<String>,
        column_id: String,
        width: String,
    },
    SetColumnWrap {
        #[serde(default)]
        view_id: Option<String>,
        column_id: String,
        wrap: bool,
    },
    SetColumnHidden {
        #[serde(default)]
        view_id: Option<String>,
        column_id: String,
        hidden: bool,
    },
    SetColumnCalc {
        #[serde(default)]
        view_id: Option<String>,
        column_id: String,
        #[serde(default)]
        calc: Option<ColumnCalc>,
    },
    UpdateCell {
        row_id: String,
        cell_id: String,
        #[serde(default)]
        value: Option<CellValue>,
    },
    /// Renames/recolors an option; merges into another option on name collision.
    UpdateColumnOption {
        column_id: String,
        old_name: String,
        new_name: String,
        #[serde(default)]
        color: String,
    },
    MergeColumnOptions {
        column_id: String,
        from: String,
        into: String,
    },
    RemoveColumnOption {
        column_id: String,
        name: String,
    },
    SetColumnOptions {
        column_id: String,
        options: Vec<SelectOptionInput>,
    },
    /// Deep-merges a partial JSON document into the stored view.
    SetAttributeView {
        patch: serde_json::Value,
    },
}

impl Action {
    /// Protocol tag, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAttributeView { .. } => "createAttributeView",
            Self::SetName { .. } => "setName",
            Self::SetFilters { .. } => "setFilters",
            Self::SetSorts { .. } => "setSorts",
            Self::SetCurrentView { .. } => "setCurrentView",
            Self::InsertBlocks { .. } => "insertBlocks",
            Self::RemoveBlocks { .. } => "removeBlocks",
            Self::MoveRow { .. } => "moveRow",
            Self::MoveColumn { .. } => "moveColumn",
            Self::AddColumn { .. } => "addColumn",
            Self::UpdateColumn { .. } => "updateColumn",
            Self::RemoveColumn { .. } => "removeColumn",
            Self::SetColumnWidth { .. } => "setColumnWidth",
            Self::SetColumnWrap { .. } => "setColumnWrap",
            Self::SetColumnHidden { .. } => "setColumnHidden",
            Self::SetColumnCalc { .. } => "setColumnCalc",
            Self::UpdateCell { .. } => "updateCell",
            Self::UpdateColumnOption { .. } => "updateColumnOption",
            Self::MergeColumnOptions { .. } => "mergeColumnOptions",
            Self::RemoveColumnOption { .. } => "removeColumnOption",
            Self::SetColumnOptions { .. } => "setColumnOptions",
            Self::SetAttributeView { .. } => "setAttributeView",
        }
    }
}

/// Boundary decode failure.
#[derive(Debug)]
pub enum OperationDecodeError {
    /// JSON is malformed, the action is unknown or a field has the wrong shape.
    Malformed(serde_json::Error),
    /// `avId` is blank.
    MissingAvId,
}

impl Display for OperationDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed operation: {err}"),
            Self::MissingAvId => write!(f, "operation is missing avId"),
        }
    }
}

impl Error for OperationDecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::MissingAvId => None,
        }
    }
}

impl From<serde_json::Error> for OperationDecodeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value)
    }
}

impl Operation {
    pub fn new(av_id: impl Into<String>, action: Action) -> Self {
        Self {
            av_id: av_id.into(),
            action,
        }
    }

    /// Decodes one JSON operation.
    pub fn from_json(json: &str) -> Result<Self, OperationDecodeError> {
        let operation: Self = serde_json::from_str(json)?;
        operation.check()?;
        Ok(operation)
    }

    /// Decodes a JSON array of operations.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, OperationDecodeError> {
        let operations: Vec<Self> = serde_json::from_str(json)?;
        for operation in &operations {
            operation.check()?;
        }
        Ok(operations)
    }

    fn check(&self) -> Result<(), OperationDecodeError> {
        if self.av_id.trim().is_empty() {
            return Err(OperationDecodeError::MissingAvId);
        }
        Ok(())
    }
}
