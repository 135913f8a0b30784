//! Attribute view store model.
//!
//! # Responsibility
//! - Define the persisted shape of an attribute view: columns, rows, views.
//! - Provide in-memory structural edits used by the mutation service.
//! - Validate cross-entity invariants before persistence and after load.
//!
//! # Invariants
//! - `columns` is the only ordered list of columns; every row keys its cells
//!   by column ID, so a row holds exactly one cell per column.
//! - Exactly one column has type `Block`; the cell under it is the row anchor.
//! - No two rows anchor the same block.
//! - Option names and option IDs are unique within one column.
//! - `current_view_id` is empty or names an existing view.
//!
//! # See also
//! - docs/architecture/attribute-view.md

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

pub type AvId = String;
pub type ColumnId = String;
pub type RowId = String;
pub type CellId = String;
pub type ViewId = String;
pub type OptionId = String;

const DEFAULT_BLOCK_COLUMN_NAME: &str = "Block";
const DEFAULT_TABLE_VIEW_NAME: &str = "Table";

/// Generates a fresh stable identifier for rows, cells, columns, views and options.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Errors raised by structural edits and invariant validation.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeViewError {
    ViewNotFound(ViewId),
    RowNotFound(RowId),
    ColumnNotFound(ColumnId),
    CellNotFound(CellId),
    OptionNotFound {
        column_id: ColumnId,
        name: String,
    },
    /// Column type cannot be used for this edit (e.g. adding a second anchor column).
    ColumnTypeNotAllowed(ColumnType),
    /// The anchor column cannot be removed, retyped or cleared.
    AnchorColumnImmutable(ColumnId),
    /// Option name is blank after trim.
    InvalidOptionName,
    DuplicateOptionName {
        column_id: ColumnId,
        name: String,
    },
    DuplicateOptionId {
        column_id: ColumnId,
        option_id: OptionId,
    },
    ValueTypeMismatch {
        column_id: ColumnId,
        expected: ColumnType,
    },
    UnknownOption {
        column_id: ColumnId,
        option_id: OptionId,
    },
    /// Single-select column received more than one option.
    TooManyOptions(ColumnId),
    /// Block value would re-point the row anchor to another block.
    AnchorMismatch(RowId),
    AnchorColumnCount(usize),
    DuplicateColumn(ColumnId),
    DuplicateRow(RowId),
    DuplicateAnchor(String),
    RowCellMismatch(RowId),
    MissingAnchor(RowId),
    UnknownCurrentView(ViewId),
}

impl AttributeViewError {
    /// Returns whether the error reports a missing entity rather than bad input.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ViewNotFound(_)
                | Self::RowNotFound(_)
                | Self::ColumnNotFound(_)
                | Self::CellNotFound(_)
                | Self::OptionNotFound { .. }
        )
    }
}

impl Display for AttributeViewError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ViewNotFound(id) => write!(f, "view not found: {id}"),
            Self::RowNotFound(id) => write!(f, "row not found: {id}"),
            Self::ColumnNotFound(id) => write!(f, "column not found: {id}"),
            Self::CellNotFound(id) => write!(f, "cell not found: {id}"),
            Self::OptionNotFound { column_id, name } => {
                write!(f, "option `{name}` not found in column {column_id}")
            }
            Self::ColumnTypeNotAllowed(kind) => {
                write!(f, "invalid column type [{}]", kind.as_str())
            }
            Self::AnchorColumnImmutable(id) => {
                write!(f, "anchor column cannot be changed: {id}")
            }
            Self::InvalidOptionName => write!(f, "option name must not be blank"),
            Self::DuplicateOptionName { column_id, name } => {
                write!(f, "duplicate option `{name}` in column {column_id}")
            }
            Self::DuplicateOptionId {
                column_id,
                option_id,
            } => write!(f, "duplicate option id {option_id} in column {column_id}"),
            Self::ValueTypeMismatch { column_id, expected } => write!(
                f,
                "value does not match column {column_id} of type [{}]",
                expected.as_str()
            ),
            Self::UnknownOption {
                column_id,
                option_id,
            } => write!(f, "option {option_id} does not exist in column {column_id}"),
            Self::TooManyOptions(id) => {
                write!(f, "single-select column {id} accepts at most one option")
            }
            Self::AnchorMismatch(id) => {
                write!(f, "block value must keep the anchor block of row {id}")
            }
            Self::AnchorColumnCount(count) => {
                write!(f, "attribute view must have exactly one block column, got {count}")
            }
            Self::DuplicateColumn(id) => write!(f, "duplicate column id: {id}"),
            Self::DuplicateRow(id) => write!(f, "duplicate row id: {id}"),
            Self::DuplicateAnchor(block_id) => {
                write!(f, "block {block_id} anchors more than one row")
            }
            Self::RowCellMismatch(id) => {
                write!(f, "row {id} does not hold exactly one cell per column")
            }
            Self::MissingAnchor(id) => write!(f, "row {id} has no block anchor"),
            Self::UnknownCurrentView(id) => write!(f, "current view does not exist: {id}"),
        }
    }
}

impl Error for AttributeViewError {}

/// Column kinds supported by attribute views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// Row anchor referencing one document block.
    Block,
    Text,
    Number,
    /// Epoch milliseconds, optional end.
    Date,
    /// Single-select over column options.
    Select,
    /// Multi-select over column options.
    MSelect,
}

impl ColumnType {
    /// Stable protocol/storage tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Select => "select",
            Self::MSelect => "mSelect",
        }
    }

    /// Returns whether callers may add or retype a column to this kind.
    pub fn is_user_addable(self) -> bool {
        !matches!(self, Self::Block)
    }

    /// Returns whether the column carries select options.
    pub fn uses_options(self) -> bool {
        matches!(self, Self::Select | Self::MSelect)
    }
}

/// Rejected column type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidColumnType(pub String);

impl Display for InvalidColumnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid column type [{}]", self.0)
    }
}

impl Error for InvalidColumnType {}

impl FromStr for ColumnType {
    type Err = InvalidColumnType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "block" => Ok(Self::Block),
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "select" => Ok(Self::Select),
            "mSelect" => Ok(Self::MSelect),
            other => Err(InvalidColumnType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = InvalidColumnType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.as_str().to_string()
    }
}

/// Tag-style option owned by a select column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub id: OptionId,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Caller-provided option for wholesale option replacement.
///
/// `id` is optional: options without one keep the ID of an existing option
/// with the same name, or receive a fresh ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptionInput {
    #[serde(default)]
    pub id: Option<OptionId>,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Typed column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl Column {
    /// Creates a column with a generated ID.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            column_type,
            options: Vec::new(),
        }
    }

    pub fn option_by_name(&self, name: &str) -> Option<&SelectOption> {
        self.options.iter().find(|option| option.name == name)
    }

    pub fn option_by_id(&self, id: &str) -> Option<&SelectOption> {
        self.options.iter().find(|option| option.id == id)
    }

    /// Checks that `value` can be stored in a cell of this column.
    pub fn check_value(&self, value: &CellValue) -> Result<(), AttributeViewError> {
        if !value.fits(self.column_type) {
            return Err(AttributeViewError::ValueTypeMismatch {
                column_id: self.id.clone(),
                expected: self.column_type,
            });
        }

        if let CellValue::Select { option_ids } = value {
            if self.column_type == ColumnType::Select && option_ids.len() > 1 {
                return Err(AttributeViewError::TooManyOptions(self.id.clone()));
            }
            if let Some(unknown) = option_ids.iter().find(|id| self.option_by_id(id).is_none()) {
                return Err(AttributeViewError::UnknownOption {
                    column_id: self.id.clone(),
                    option_id: unknown.clone(),
                });
            }
        }

        Ok(())
    }

    fn validate_options(&self) -> Result<(), AttributeViewError> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for option in &self.options {
            if !names.insert(option.name.as_str()) {
                return Err(AttributeViewError::DuplicateOptionName {
                    column_id: self.id.clone(),
                    name: option.name.clone(),
                });
            }
            if !ids.insert(option.id.as_str()) {
                return Err(AttributeViewError::DuplicateOptionId {
                    column_id: self.id.clone(),
                    option_id: option.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Typed cell payload.
///
/// Select and multi-select cells both reference options by stable option ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CellValue {
    Block {
        id: String,
        content: String,
    },
    Text {
        content: String,
    },
    Number {
        content: f64,
    },
    Date {
        start: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<i64>,
    },
    Select {
        option_ids: Vec<OptionId>,
    },
}

impl CellValue {
    /// Returns whether this value can live under a column of `column_type`.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Self::Block { .. }, ColumnType::Block)
                | (Self::Text { .. }, ColumnType::Text)
                | (Self::Number { .. }, ColumnType::Number)
                | (Self::Date { .. }, ColumnType::Date)
                | (Self::Select { .. }, ColumnType::Select | ColumnType::MSelect)
        )
    }

    /// Blank text and empty option lists count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text { content } => content.is_empty(),
            Self::Select { option_ids } => option_ids.is_empty(),
            Self::Block { .. } | Self::Number { .. } | Self::Date { .. } => false,
        }
    }

    /// Text content for text-like values.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { content } | Self::Block { content, .. } => Some(content.as_str()),
            _ => None,
        }
    }
}

/// One cell of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: CellId,
    /// Type the cell was created (or last written) with. May lag behind a
    /// retyped column until the cell is written again.
    #[serde(rename = "type")]
    pub cell_type: ColumnType,
    #[serde(default)]
    pub value: Option<CellValue>,
}

impl Cell {
    /// Creates an empty placeholder cell.
    pub fn new(cell_type: ColumnType) -> Self {
        Self {
            id: new_id(),
            cell_type,
            value: None,
        }
    }

    /// Creates the anchor cell of a row.
    pub fn new_block(block_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            cell_type: ColumnType::Block,
            value: Some(CellValue::Block {
                id: block_id.into(),
                content: content.into(),
            }),
        }
    }

    /// Returns the value when it is set and not empty.
    pub fn present_value(&self) -> Option<&CellValue> {
        self.value.as_ref().filter(|value| !value.is_empty())
    }
}

/// One row, keyed by column identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub cells: BTreeMap<ColumnId, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            cells: BTreeMap::new(),
        }
    }

    /// Returns the anchor cell.
    pub fn block_cell(&self) -> Option<&Cell> {
        self.cells
            .values()
            .find(|cell| cell.cell_type == ColumnType::Block)
    }

    /// Returns the document block ID this row is anchored to.
    pub fn anchor_block_id(&self) -> Option<&str> {
        match self.block_cell()?.value.as_ref()? {
            CellValue::Block { id, .. } => Some(id.as_str()),
            _ => None,
        }
    }

    /// Yields `(column, cell)` pairs in display order.
    pub fn cells_in_order<'a>(
        &'a self,
        columns: &'a [Column],
    ) -> impl Iterator<Item = (&'a Column, &'a Cell)> + 'a {
        columns
            .iter()
            .filter_map(move |column| self.cells.get(&column.id).map(|cell| (column, cell)))
    }

    /// Finds a cell by cell ID and returns it with its column ID.
    pub fn cell_by_id(&self, cell_id: &str) -> Option<(&ColumnId, &Cell)> {
        self.cells.iter().find(|(_, cell)| cell.id == cell_id)
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewType {
    Table,
}

/// Per-view display copy of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub id: ColumnId,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub width: String,
    #[serde(default)]
    pub wrap: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calc: Option<ColumnCalc>,
}

impl TableColumn {
    pub fn from_column(column: &Column) -> Self {
        Self {
            id: column.id.clone(),
            name: column.name.clone(),
            column_type: column.column_type,
            width: String::new(),
            wrap: false,
            hidden: false,
            calc: None,
        }
    }
}

/// Aggregate configured on a display column; `result` is filled on render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnCalc {
    pub operator: CalcOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalcOperator {
    CountAll,
    CountValues,
    CountEmpty,
    CountNotEmpty,
    PercentEmpty,
    PercentNotEmpty,
    Sum,
    Average,
    Median,
    Min,
    Max,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    Gt,
    Ge,
    Lt,
    Le,
    IsBetween,
}

/// Row predicate over one column. Rules for missing columns are inert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    pub column_id: ColumnId,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<CellValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortRule {
    pub column_id: ColumnId,
    pub order: SortOrder,
}

/// Materialized cell of a display row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub column_id: ColumnId,
    #[serde(flatten)]
    pub cell: Cell,
}

/// Materialized display row; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub id: RowId,
    pub cells: Vec<TableCell>,
}

impl TableRow {
    pub fn cell(&self, column_id: &str) -> Option<&TableCell> {
        self.cells.iter().find(|cell| cell.column_id == column_id)
    }
}

/// Table view settings plus the rows materialized for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub sorts: Vec<SortRule>,
    #[serde(skip)]
    pub rows: Vec<TableRow>,
    /// Option ID to option name, filled on render for sorting and display.
    #[serde(skip)]
    pub option_names: HashMap<OptionId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: ViewId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub view_type: ViewType,
    #[serde(default)]
    pub table: Table,
}

impl View {
    /// Creates a table view displaying `columns`.
    pub fn new_table(name: impl Into<String>, columns: &[Column]) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            view_type: ViewType::Table,
            table: Table {
                columns: columns.iter().map(TableColumn::from_column).collect(),
                ..Table::default()
            },
        }
    }

    pub fn display_column_mut(
        &mut self,
        column_id: &str,
    ) -> Result<&mut TableColumn, AttributeViewError> {
        self.table
            .columns
            .iter_mut()
            .find(|column| column.id == column_id)
            .ok_or_else(|| AttributeViewError::ColumnNotFound(column_id.to_string()))
    }
}

/// Outcome of an option rename request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionEdit {
    /// Option metadata changed in place; no cell changed.
    Renamed { option_id: OptionId },
    /// Name collided with another option; the source was merged into it.
    Merged {
        into: OptionId,
        cells_updated: usize,
    },
}

/// Where a cell write landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTarget {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub block_id: String,
}

/// Persisted attribute view aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeView {
    pub id: AvId,
    #[serde(default)]
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub current_view_id: ViewId,
    /// Save counter; 0 means never persisted.
    #[serde(default)]
    pub revision: u64,
}

impl AttributeView {
    /// Creates an empty attribute view with its anchor column and one table view.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let columns = vec![Column::new(DEFAULT_BLOCK_COLUMN_NAME, ColumnType::Block)];
        let view = View::new_table(DEFAULT_TABLE_VIEW_NAME, &columns);
        Self {
            id: id.into(),
            name: name.into(),
            current_view_id: view.id.clone(),
            columns,
            rows: Vec::new(),
            views: vec![view],
            revision: 0,
        }
    }

    /// Checks every cross-entity invariant.
    pub fn validate(&self) -> Result<(), AttributeViewError> {
        let anchor_columns = self
            .columns
            .iter()
            .filter(|column| column.column_type == ColumnType::Block)
            .count();
        if anchor_columns != 1 {
            return Err(AttributeViewError::AnchorColumnCount(anchor_columns));
        }

        let mut column_ids = HashSet::new();
        for column in &self.columns {
            if !column_ids.insert(column.id.as_str()) {
                return Err(AttributeViewError::DuplicateColumn(column.id.clone()));
            }
            column.validate_options()?;
        }

        let mut row_ids = HashSet::new();
        let mut anchors = HashSet::new();
        for row in &self.rows {
            if !row_ids.insert(row.id.as_str()) {
                return Err(AttributeViewError::DuplicateRow(row.id.clone()));
            }
            if row.cells.len() != self.columns.len()
                || row.cells.keys().any(|key| !column_ids.contains(key.as_str()))
            {
                return Err(AttributeViewError::RowCellMismatch(row.id.clone()));
            }
            let block_cells = row
                .cells
                .values()
                .filter(|cell| cell.cell_type == ColumnType::Block)
                .count();
            let block_id = row
                .anchor_block_id()
                .filter(|_| block_cells == 1)
                .ok_or_else(|| AttributeViewError::MissingAnchor(row.id.clone()))?;
            if !anchors.insert(block_id) {
                return Err(AttributeViewError::DuplicateAnchor(block_id.to_string()));
            }
        }

        if !self.current_view_id.is_empty()
            && !self.views.iter().any(|view| view.id == self.current_view_id)
        {
            return Err(AttributeViewError::UnknownCurrentView(
                self.current_view_id.clone(),
            ));
        }

        Ok(())
    }

    pub fn block_column(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.column_type == ColumnType::Block)
    }

    pub fn column(&self, column_id: &str) -> Result<&Column, AttributeViewError> {
        self.columns
            .iter()
            .find(|column| column.id == column_id)
            .ok_or_else(|| AttributeViewError::ColumnNotFound(column_id.to_string()))
    }

    pub fn column_mut(&mut self, column_id: &str) -> Result<&mut Column, AttributeViewError> {
        self.columns
            .iter_mut()
            .find(|column| column.id == column_id)
            .ok_or_else(|| AttributeViewError::ColumnNotFound(column_id.to_string()))
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.id == column_id)
    }

    pub fn row_index(&self, row_id: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.id == row_id)
    }

    /// Returns whether some row is anchored to `block_id`.
    pub fn contains_block(&self, block_id: &str) -> bool {
        self.rows
            .iter()
            .any(|row| row.anchor_block_id() == Some(block_id))
    }

    /// Returns the current view, falling back to the first view when the
    /// selector is empty or stale.
    pub fn current_view(&self) -> Option<&View> {
        self.views
            .iter()
            .find(|view| view.id == self.current_view_id)
            .or_else(|| self.views.first())
    }

    /// Resolves an explicit view ID, or the current view when `view_id` is `None`.
    pub fn view_mut(&mut self, view_id: Option<&str>) -> Result<&mut View, AttributeViewError> {
        let index = self.view_index(view_id)?;
        Ok(&mut self.views[index])
    }

    fn view_index(&self, view_id: Option<&str>) -> Result<usize, AttributeViewError> {
        match view_id.filter(|id| !id.is_empty()) {
            Some(id) => self
                .views
                .iter()
                .position(|view| view.id == id)
                .ok_or_else(|| AttributeViewError::ViewNotFound(id.to_string())),
            None => {
                if self.views.is_empty() {
                    return Err(AttributeViewError::ViewNotFound(String::new()));
                }
                Ok(self
                    .views
                    .iter()
                    .position(|view| view.id == self.current_view_id)
                    .unwrap_or(0))
            }
        }
    }

    pub fn set_current_view(&mut self, view_id: &str) -> Result<(), AttributeViewError> {
        let index = self.view_index(Some(view_id))?;
        self.current_view_id = self.views[index].id.clone();
        Ok(())
    }

    /// Builds a row anchored to `block_id` with one placeholder per column.
    pub fn new_row_for_block(&self, block_id: &str, anchor_text: &str) -> Row {
        let mut row = Row::new();
        for column in &self.columns {
            let cell = if column.column_type == ColumnType::Block {
                Cell::new_block(block_id, anchor_text)
            } else {
                Cell::new(column.column_type)
            };
            row.cells.insert(column.id.clone(), cell);
        }
        row
    }

    /// Inserts `row` right after `previous_id`, or at the head when the marker
    /// is absent or unknown. Returns the insertion index.
    pub fn insert_row_after(&mut self, row: Row, previous_id: Option<&str>) -> usize {
        insert_after(&mut self.rows, row, previous_id, |row| row.id.as_str())
    }

    /// Removes the row anchored to `block_id`.
    pub fn remove_row_by_block(&mut self, block_id: &str) -> Option<Row> {
        let index = self
            .rows
            .iter()
            .position(|row| row.anchor_block_id() == Some(block_id))?;
        Some(self.rows.remove(index))
    }

    /// Moves a row right after `previous_id` (head when unresolvable).
    pub fn move_row(
        &mut self,
        row_id: &str,
        previous_id: Option<&str>,
    ) -> Result<usize, AttributeViewError> {
        let index = self
            .row_index(row_id)
            .ok_or_else(|| AttributeViewError::RowNotFound(row_id.to_string()))?;
        let row = self.rows.remove(index);
        Ok(self.insert_row_after(row, previous_id))
    }

    /// Appends a column, its display copy in one view, and an empty cell in every row.
    pub fn add_column(
        &mut self,
        name: &str,
        column_type: ColumnType,
        view_id: Option<&str>,
    ) -> Result<ColumnId, AttributeViewError> {
        if !column_type.is_user_addable() {
            return Err(AttributeViewError::ColumnTypeNotAllowed(column_type));
        }
        let view_index = self.view_index(view_id)?;

        let column = Column::new(name, column_type);
        let column_id = column.id.clone();
        self.views[view_index]
            .table
            .columns
            .push(TableColumn::from_column(&column));
        for row in &mut self.rows {
            row.cells.insert(column_id.clone(), Cell::new(column_type));
        }
        self.columns.push(column);
        Ok(column_id)
    }

    /// Renames/retypes a column and every display copy of it.
    ///
    /// Existing cells keep their values. Returns how many cells now hold a
    /// type different from the column type.
    pub fn update_column(
        &mut self,
        column_id: &str,
        name: &str,
        column_type: ColumnType,
    ) -> Result<usize, AttributeViewError> {
        if !column_type.is_user_addable() {
            return Err(AttributeViewError::ColumnTypeNotAllowed(column_type));
        }
        let column = self.column_mut(column_id)?;
        if column.column_type == ColumnType::Block {
            return Err(AttributeViewError::AnchorColumnImmutable(column_id.to_string()));
        }
        column.name = name.to_string();
        column.column_type = column_type;

        for view in &mut self.views {
            if let Some(display) = view
                .table
                .columns
                .iter_mut()
                .find(|display| display.id == column_id)
            {
                display.name = name.to_string();
                display.column_type = column_type;
            }
        }

        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.cells.get(column_id))
            .filter(|cell| cell.cell_type != column_type)
            .count())
    }

    /// Removes a column and its cell from every row. Unknown columns are a no-op.
    pub fn remove_column(&mut self, column_id: &str) -> Result<Option<Column>, AttributeViewError> {
        let Some(index) = self.column_index(column_id) else {
            return Ok(None);
        };
        if self.columns[index].column_type == ColumnType::Block {
            return Err(AttributeViewError::AnchorColumnImmutable(column_id.to_string()));
        }

        let column = self.columns.remove(index);
        for row in &mut self.rows {
            row.cells.remove(column_id);
        }
        for view in &mut self.views {
            view.table.columns.retain(|display| display.id != column_id);
        }
        Ok(Some(column))
    }

    /// Moves a column right after `previous_id` (head when unresolvable) and
    /// applies the same move to every view's display copy.
    pub fn move_column(
        &mut self,
        column_id: &str,
        previous_id: Option<&str>,
    ) -> Result<usize, AttributeViewError> {
        let index = self
            .column_index(column_id)
            .ok_or_else(|| AttributeViewError::ColumnNotFound(column_id.to_string()))?;
        let column = self.columns.remove(index);
        let new_index = insert_after(&mut self.columns, column, previous_id, |column| {
            column.id.as_str()
        });

        for view in &mut self.views {
            let displays = &mut view.table.columns;
            if let Some(position) = displays.iter().position(|display| display.id == column_id) {
                let display = displays.remove(position);
                insert_after(displays, display, previous_id, |display| display.id.as_str());
            }
        }

        Ok(new_index)
    }

    /// Renames/recolors an option; merges into an existing option on name collision.
    pub fn rename_option(
        &mut self,
        column_id: &str,
        old_name: &str,
        new_name: &str,
        color: &str,
    ) -> Result<OptionEdit, AttributeViewError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(AttributeViewError::InvalidOptionName);
        }

        let column = self.column(column_id)?;
        let source_id = column
            .option_by_name(old_name)
            .map(|option| option.id.clone())
            .ok_or_else(|| AttributeViewError::OptionNotFound {
                column_id: column_id.to_string(),
                name: old_name.to_string(),
            })?;
        let collision = column
            .options
            .iter()
            .find(|option| option.name == new_name && option.id != source_id)
            .map(|option| option.id.clone());

        if let Some(target_id) = collision {
            let cells_updated = self.merge_option_ids(column_id, &source_id, &target_id)?;
            return Ok(OptionEdit::Merged {
                into: target_id,
                cells_updated,
            });
        }

        let column = self.column_mut(column_id)?;
        if let Some(option) = column
            .options
            .iter_mut()
            .find(|option| option.id == source_id)
        {
            option.name = new_name.to_string();
            option.color = color.to_string();
        }
        Ok(OptionEdit::Renamed {
            option_id: source_id,
        })
    }

    /// Merges option `from_name` into `into_name`. Returns updated cell count.
    pub fn merge_options(
        &mut self,
        column_id: &str,
        from_name: &str,
        into_name: &str,
    ) -> Result<usize, AttributeViewError> {
        let column = self.column(column_id)?;
        let lookup = |name: &str| {
            column
                .option_by_name(name)
                .map(|option| option.id.clone())
                .ok_or_else(|| AttributeViewError::OptionNotFound {
                    column_id: column_id.to_string(),
                    name: name.to_string(),
                })
        };
        let from_id = lookup(from_name)?;
        let into_id = lookup(into_name)?;
        if from_id == into_id {
            return Ok(0);
        }
        self.merge_option_ids(column_id, &from_id, &into_id)
    }

    fn merge_option_ids(
        &mut self,
        column_id: &str,
        from_id: &str,
        into_id: &str,
    ) -> Result<usize, AttributeViewError> {
        let column = self.column_mut(column_id)?;
        column.options.retain(|option| option.id != from_id);

        let mut updated = 0;
        for row in &mut self.rows {
            let Some(CellValue::Select { option_ids }) = row
                .cells
                .get_mut(column_id)
                .and_then(|cell| cell.value.as_mut())
            else {
                continue;
            };
            if !option_ids.iter().any(|id| id == from_id) {
                continue;
            }

            let mut seen = HashSet::new();
            let merged: Vec<OptionId> = option_ids
                .drain(..)
                .map(|id| if id == from_id { into_id.to_string() } else { id })
                .filter(|id| seen.insert(id.clone()))
                .collect();
            *option_ids = merged;
            updated += 1;
        }
        Ok(updated)
    }

    /// Removes an option and every reference to it. Returns `None` when the
    /// option does not exist, else the number of cells changed.
    pub fn remove_option(
        &mut self,
        column_id: &str,
        name: &str,
    ) -> Result<Option<usize>, AttributeViewError> {
        let column = self.column_mut(column_id)?;
        let Some(position) = column.options.iter().position(|option| option.name == name) else {
            return Ok(None);
        };
        let removed = column.options.remove(position);

        let mut updated = 0;
        for row in &mut self.rows {
            let Some(cell) = row.cells.get_mut(column_id) else {
                continue;
            };
            let Some(CellValue::Select { option_ids }) = cell.value.as_mut() else {
                continue;
            };
            let before = option_ids.len();
            option_ids.retain(|id| *id != removed.id);
            if option_ids.len() == before {
                continue;
            }
            if option_ids.is_empty() {
                cell.value = None;
            }
            updated += 1;
        }
        Ok(Some(updated))
    }

    /// Replaces a column's options wholesale. Cell references are not repaired.
    pub fn replace_options(
        &mut self,
        column_id: &str,
        inputs: Vec<SelectOptionInput>,
    ) -> Result<(), AttributeViewError> {
        let column = self.column_mut(column_id)?;
        let mut options = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = input.name.trim().to_string();
            if name.is_empty() {
                return Err(AttributeViewError::InvalidOptionName);
            }
            let id = input
                .id
                .filter(|id| !id.is_empty())
                .or_else(|| column.option_by_name(&name).map(|option| option.id.clone()))
                .unwrap_or_else(new_id);
            options.push(SelectOption {
                id,
                name,
                color: input.color,
            });
        }

        let candidate = Column {
            options,
            ..column.clone()
        };
        candidate.validate_options()?;
        column.options = candidate.options;
        Ok(())
    }

    /// Writes a cell value located by row and cell ID.
    pub fn set_cell_value(
        &mut self,
        row_id: &str,
        cell_id: &str,
        value: Option<CellValue>,
    ) -> Result<CellTarget, AttributeViewError> {
        let row_index = self
            .row_index(row_id)
            .ok_or_else(|| AttributeViewError::RowNotFound(row_id.to_string()))?;
        let row = &self.rows[row_index];
        let block_id = row
            .anchor_block_id()
            .ok_or_else(|| AttributeViewError::MissingAnchor(row_id.to_string()))?
            .to_string();
        let column_id = row
            .cell_by_id(cell_id)
            .map(|(column_id, _)| column_id.clone())
            .ok_or_else(|| AttributeViewError::CellNotFound(cell_id.to_string()))?;

        let column = self.column(&column_id)?;
        let column_type = column.column_type;
        match &value {
            Some(value) => {
                column.check_value(value)?;
                if let CellValue::Block { id, .. } = value {
                    if *id != block_id {
                        return Err(AttributeViewError::AnchorMismatch(row_id.to_string()));
                    }
                }
            }
            None if column_type == ColumnType::Block => {
                return Err(AttributeViewError::AnchorColumnImmutable(column_id));
            }
            None => {}
        }

        let cell = self.rows[row_index]
            .cells
            .get_mut(&column_id)
            .ok_or_else(|| AttributeViewError::CellNotFound(cell_id.to_string()))?;
        cell.cell_type = column_type;
        cell.value = value;

        Ok(CellTarget {
            row_id: row_id.to_string(),
            column_id,
            block_id,
        })
    }
}

/// Inserts `item` after the element whose ID is `previous_id`; index 0 when
/// the marker is empty or cannot be resolved.
fn insert_after<T>(
    items: &mut Vec<T>,
    item: T,
    previous_id: Option<&str>,
    id_of: impl Fn(&T) -> &str,
) -> usize {
    let index = previous_id
        .filter(|id| !id.is_empty())
        .and_then(|previous| items.iter().position(|candidate| id_of(candidate) == previous))
        .map_or(0, |position| position + 1);
    items.insert(index, item);
    index
}
