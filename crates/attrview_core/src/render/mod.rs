//! View materialization.
//!
//! # Responsibility
//! - Turn a stored attribute view into the rows its current view displays.
//! - Apply filters, then sorts, then per-column aggregates, in that order.
//!
//! # Invariants
//! - Rendering never mutates or persists the stored view.
//! - Materialized rows list cells in `AttributeView::columns` order.
//! - Aggregates are computed over the filtered rows only.

mod calc;
mod filter;
mod sort;

use crate::model::attribute_view::{AttributeView, CellValue, Table, TableCell, TableRow};
use crate::repo::attribute_view_repo::{AttributeViewStore, AvRepoError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Rendering failure.
#[derive(Debug)]
pub enum RenderError {
    Store(AvRepoError),
    /// The attribute view has no view to render.
    ViewNotFound(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::ViewNotFound(av_id) => write!(f, "attribute view {av_id} has no view"),
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::ViewNotFound(_) => None,
        }
    }
}

impl From<AvRepoError> for RenderError {
    fn from(value: AvRepoError) -> Self {
        Self::Store(value)
    }
}

/// Materialization steps shared by every view kind.
pub trait Viewable {
    fn filter_rows(&mut self);
    fn sort_rows(&mut self);
    fn calc_cols(&mut self);
}

/// Materialized view, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedView {
    Table(Table),
}

impl RenderedView {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
        }
    }
}

impl Viewable for RenderedView {
    fn filter_rows(&mut self) {
        match self {
            Self::Table(table) => table.filter_rows(),
        }
    }

    fn sort_rows(&mut self) {
        match self {
            Self::Table(table) => table.sort_rows(),
        }
    }

    fn calc_cols(&mut self) {
        match self {
            Self::Table(table) => table.calc_cols(),
        }
    }
}

impl Viewable for Table {
    fn filter_rows(&mut self) {
        if self.filters.is_empty() {
            return;
        }
        let filters = &self.filters;
        self.rows.retain(|row| filter::row_matches(row, filters));
    }

    fn sort_rows(&mut self) {
        if self.sorts.is_empty() {
            return;
        }
        let sorts = &self.sorts;
        let option_names = &self.option_names;
        self.rows
            .sort_by(|a, b| sort::compare_rows(a, b, sorts, option_names));
    }

    fn calc_cols(&mut self) {
        let rows = &self.rows;
        for column in &mut self.columns {
            let Some(calc) = column.calc.as_mut() else {
                continue;
            };
            let values: Vec<Option<&CellValue>> = rows
                .iter()
                .map(|row| row.cell(&column.id).and_then(|cell| cell.cell.value.as_ref()))
                .collect();
            calc.result = calc::calculate(calc.operator, &values);
        }
    }
}

impl Table {
    /// Plain display text for a materialized cell value.
    pub fn display_text(&self, value: Option<&CellValue>) -> String {
        match value {
            None => String::new(),
            Some(CellValue::Block { content, .. } | CellValue::Text { content }) => {
                content.clone()
            }
            Some(CellValue::Number { content }) => content.to_string(),
            Some(CellValue::Date { start, end: None }) => start.to_string(),
            Some(CellValue::Date {
                start,
                end: Some(end),
            }) => format!("{start}..{end}"),
            Some(CellValue::Select { option_ids }) => option_ids
                .iter()
                .map(|id| self.option_names.get(id).unwrap_or(id).as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Materializes the current view of an in-memory attribute view.
///
/// A stale `current_view_id` falls back to the first view.
pub fn render_view(av: &AttributeView) -> Result<RenderedView, RenderError> {
    let view = av
        .current_view()
        .ok_or_else(|| RenderError::ViewNotFound(av.id.clone()))?;

    let mut table = view.table.clone();
    table.rows = av
        .rows
        .iter()
        .map(|row| TableRow {
            id: row.id.clone(),
            cells: row
                .cells_in_order(&av.columns)
                .map(|(column, cell)| TableCell {
                    column_id: column.id.clone(),
                    cell: cell.clone(),
                })
                .collect(),
        })
        .collect();
    table.option_names = av
        .columns
        .iter()
        .flat_map(|column| column.options.iter())
        .map(|option| (option.id.clone(), option.name.clone()))
        .collect();

    let mut rendered = RenderedView::Table(table);
    rendered.filter_rows();
    rendered.sort_rows();
    rendered.calc_cols();
    Ok(rendered)
}

/// Loads an attribute view and materializes its current view.
///
/// # Side effects
/// - Emits `av_render` logging events with row counts and duration.
pub fn render_attribute_view<S: AttributeViewStore>(
    store: &S,
    av_id: &str,
) -> Result<(RenderedView, AttributeView), RenderError> {
    let started_at = Instant::now();
    let result = store
        .load(av_id)
        .map_err(RenderError::from)
        .and_then(|av| render_view(&av).map(|rendered| (rendered, av)));

    match &result {
        Ok((rendered, av)) => info!(
            "event=av_render module=render status=ok av_id={} rows_total={} rows_shown={} duration_ms={}",
            av_id,
            av.rows.len(),
            rendered.as_table().map_or(0, |table| table.rows.len()),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=av_render module=render status=error av_id={} duration_ms={} error={}",
            av_id,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute_view::{
        CalcOperator, ColumnCalc, ColumnType, FilterOperator, FilterRule, SortOrder, SortRule,
    };

    fn scored_view(scores: &[Option<f64>]) -> (AttributeView, String) {
        let mut av = AttributeView::new("av-1", "Scores");
        let score = av.add_column("n", ColumnType::Number, None).unwrap();
        let mut previous: Option<String> = None;
        for (index, value) in scores.iter().enumerate() {
            let block_id = format!("b{index}");
            let mut row = av.new_row_for_block(&block_id, &block_id);
            if let Some(content) = value {
                row.cells.get_mut(&score).unwrap().value =
                    Some(CellValue::Number { content: *content });
            }
            let row_id = row.id.clone();
            av.insert_row_after(row, previous.as_deref());
            previous = Some(row_id);
        }
        (av, score)
    }

    fn shown_scores(rendered: &RenderedView, column_id: &str) -> Vec<Option<f64>> {
        rendered
            .as_table()
            .unwrap()
            .rows
            .iter()
            .map(|row| match row.cell(column_id).unwrap().cell.value {
                Some(CellValue::Number { content }) => Some(content),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn filter_then_sort_then_calc() {
        let (mut av, score) = scored_view(&[Some(5.0), Some(1.0), Some(9.0), Some(-3.0)]);
        let table = &mut av.views[0].table;
        table.filters.push(FilterRule {
            column_id: score.clone(),
            operator: FilterOperator::Gt,
            value: Some(CellValue::Number { content: 0.0 }),
        });
        table.sorts.push(SortRule {
            column_id: score.clone(),
            order: SortOrder::Asc,
        });
        table
            .columns
            .iter_mut()
            .find(|column| column.id == score)
            .unwrap()
            .calc = Some(ColumnCalc {
            operator: CalcOperator::Sum,
            result: None,
        });

        let rendered = render_view(&av).unwrap();
        assert_eq!(
            shown_scores(&rendered, &score),
            vec![Some(1.0), Some(5.0), Some(9.0)]
        );
        let calc = rendered
            .as_table()
            .unwrap()
            .columns
            .iter()
            .find(|column| column.id == score)
            .and_then(|column| column.calc.as_ref())
            .unwrap();
        assert_eq!(calc.result, Some(15.0));
        assert_eq!(av.rows.len(), 4);
    }

    #[test]
    fn cells_follow_column_order() {
        let (mut av, score) = scored_view(&[Some(1.0)]);
        av.move_column(&score, None).unwrap();
        let rendered = render_view(&av).unwrap();
        let row = &rendered.as_table().unwrap().rows[0];
        assert_eq!(row.cells[0].column_id, score);
        assert_eq!(row.cells[1].cell.cell_type, ColumnType::Block);
    }

    #[test]
    fn stale_current_view_falls_back_to_first_view() {
        let (mut av, _) = scored_view(&[Some(1.0)]);
        av.current_view_id = "gone".to_string();
        assert!(render_view(&av).is_ok());

        av.views.clear();
        assert!(matches!(
            render_view(&av),
            Err(RenderError::ViewNotFound(_))
        ));
    }
}
