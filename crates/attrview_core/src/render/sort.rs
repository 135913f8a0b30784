//! Multi-key row ordering.

use crate::model::attribute_view::{CellValue, SortOrder, SortRule, TableRow};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Compares two rows key by key. Empty cells sort last in both directions.
pub(crate) fn compare_rows(
    a: &TableRow,
    b: &TableRow,
    rules: &[SortRule],
    option_names: &HashMap<String, String>,
) -> Ordering {
    for rule in rules {
        let value_a = a
            .cell(&rule.column_id)
            .and_then(|cell| cell.cell.present_value());
        let value_b = b
            .cell(&rule.column_id)
            .and_then(|cell| cell.cell.present_value());

        let ordering = match (value_a, value_b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(value_a), Some(value_b)) => {
                let base = compare_values(value_a, value_b, option_names);
                match rule.order {
                    SortOrder::Asc => base,
                    SortOrder::Desc => base.reverse(),
                }
            }
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(
    a: &CellValue,
    b: &CellValue,
    option_names: &HashMap<String, String>,
) -> Ordering {
    match (a, b) {
        (CellValue::Number { content: a }, CellValue::Number { content: b }) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (
            CellValue::Date {
                start: start_a,
                end: end_a,
            },
            CellValue::Date {
                start: start_b,
                end: end_b,
            },
        ) => start_a.cmp(start_b).then_with(|| end_a.cmp(end_b)),
        (CellValue::Select { option_ids: a }, CellValue::Select { option_ids: b }) => {
            first_option_name(a, option_names).cmp(first_option_name(b, option_names))
        }
        _ => match (a.text(), b.text()) {
            (Some(a), Some(b)) => a.cmp(b),
            // Values of a retyped column that no longer compare keep their order.
            _ => Ordering::Equal,
        },
    }
}

fn first_option_name<'a>(ids: &'a [String], option_names: &'a HashMap<String, String>) -> &'a str {
    ids.first()
        .map(|id| option_names.get(id).unwrap_or(id).as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute_view::{Cell, ColumnType, TableCell};

    fn row(id: &str, value: Option<CellValue>) -> TableRow {
        TableRow {
            id: id.to_string(),
            cells: vec![TableCell {
                column_id: "c1".to_string(),
                cell: Cell {
                    id: format!("cell-{id}"),
                    cell_type: ColumnType::Number,
                    value,
                },
            }],
        }
    }

    fn sorted(mut rows: Vec<TableRow>, order: SortOrder) -> Vec<String> {
        let rules = [SortRule {
            column_id: "c1".to_string(),
            order,
        }];
        let names = HashMap::new();
        rows.sort_by(|a, b| compare_rows(a, b, &rules, &names));
        rows.into_iter().map(|row| row.id).collect()
    }

    fn number(value: f64) -> Option<CellValue> {
        Some(CellValue::Number { content: value })
    }

    #[test]
    fn empties_sort_last_in_both_directions() {
        let rows = vec![
            row("empty", None),
            row("nine", number(9.0)),
            row("one", number(1.0)),
        ];
        assert_eq!(sorted(rows.clone(), SortOrder::Asc), ["one", "nine", "empty"]);
        assert_eq!(sorted(rows, SortOrder::Desc), ["nine", "one", "empty"]);
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let rows = vec![
            row("a", number(1.0)),
            row("b", number(0.0)),
            row("c", number(1.0)),
        ];
        assert_eq!(sorted(rows, SortOrder::Asc), ["b", "a", "c"]);
    }

    #[test]
    fn select_values_sort_by_option_name() {
        let names = HashMap::from([
            ("o1".to_string(), "Zulu".to_string()),
            ("o2".to_string(), "Alpha".to_string()),
        ]);
        let select = |id: &str| CellValue::Select {
            option_ids: vec![id.to_string()],
        };
        assert_eq!(
            compare_values(&select("o1"), &select("o2"), &names),
            Ordering::Greater
        );
    }
}
