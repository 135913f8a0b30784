//! Filter rule evaluation.
//!
//! A rule that cannot be evaluated (missing column, missing operand, operator
//! not applicable to the value type) keeps the row.

use crate::model::attribute_view::{CellValue, FilterOperator, FilterRule, TableRow};
use std::collections::HashSet;

/// Returns whether `row` satisfies every rule.
pub(crate) fn row_matches(row: &TableRow, rules: &[FilterRule]) -> bool {
    rules.iter().all(|rule| rule_matches(row, rule))
}

fn rule_matches(row: &TableRow, rule: &FilterRule) -> bool {
    let Some(cell) = row.cell(&rule.column_id) else {
        return true;
    };
    let actual = cell.cell.present_value();

    match rule.operator {
        FilterOperator::IsEmpty => actual.is_none(),
        FilterOperator::IsNotEmpty => actual.is_some(),
        operator => {
            let Some(expected) = rule.value.as_ref() else {
                return true;
            };
            match actual {
                None => matches!(operator, FilterOperator::IsNot | FilterOperator::DoesNotContain),
                Some(actual) => compare(actual, expected, operator).unwrap_or(true),
            }
        }
    }
}

fn compare(actual: &CellValue, expected: &CellValue, operator: FilterOperator) -> Option<bool> {
    match (actual, expected) {
        (CellValue::Number { content: a }, CellValue::Number { content: b }) => {
            compare_numbers(*a, *b, operator)
        }
        (CellValue::Date { start: a, .. }, CellValue::Date { start: b, end }) => {
            compare_dates(*a, *b, *end, operator)
        }
        (CellValue::Select { option_ids: a }, CellValue::Select { option_ids: b }) => {
            compare_options(a, b, operator)
        }
        _ => compare_text(actual.text()?, expected.text()?, operator),
    }
}

fn compare_text(actual: &str, expected: &str, operator: FilterOperator) -> Option<bool> {
    Some(match operator {
        FilterOperator::Is => actual == expected,
        FilterOperator::IsNot => actual != expected,
        FilterOperator::Contains => actual.contains(expected),
        FilterOperator::DoesNotContain => !actual.contains(expected),
        FilterOperator::StartsWith => actual.starts_with(expected),
        FilterOperator::EndsWith => actual.ends_with(expected),
        _ => return None,
    })
}

fn compare_numbers(actual: f64, expected: f64, operator: FilterOperator) -> Option<bool> {
    Some(match operator {
        FilterOperator::Is => actual == expected,
        FilterOperator::IsNot => actual != expected,
        FilterOperator::Gt => actual > expected,
        FilterOperator::Ge => actual >= expected,
        FilterOperator::Lt => actual < expected,
        FilterOperator::Le => actual <= expected,
        _ => return None,
    })
}

fn compare_dates(
    actual: i64,
    expected: i64,
    expected_end: Option<i64>,
    operator: FilterOperator,
) -> Option<bool> {
    Some(match operator {
        FilterOperator::Is => actual == expected,
        FilterOperator::IsNot => actual != expected,
        FilterOperator::Gt => actual > expected,
        FilterOperator::Ge => actual >= expected,
        FilterOperator::Lt => actual < expected,
        FilterOperator::Le => actual <= expected,
        FilterOperator::IsBetween => {
            let end = expected_end?;
            expected <= actual && actual <= end
        }
        _ => return None,
    })
}

fn compare_options(actual: &[String], expected: &[String], operator: FilterOperator) -> Option<bool> {
    let actual: HashSet<&str> = actual.iter().map(String::as_str).collect();
    let expected: HashSet<&str> = expected.iter().map(String::as_str).collect();
    Some(match operator {
        FilterOperator::Is => actual == expected,
        FilterOperator::IsNot => actual != expected,
        FilterOperator::Contains => expected.iter().any(|id| actual.contains(id)),
        FilterOperator::DoesNotContain => expected.iter().all(|id| !actual.contains(id)),
        _ => return None,
    })
}
