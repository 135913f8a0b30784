//! Column aggregates.

use crate::model::attribute_view::{CalcOperator, CellValue};

/// Aggregates one column. `values` holds one entry per displayed row.
///
/// Returns `None` when the aggregate is undefined (no numbers to sum, no rows
/// to take a percentage of).
pub(crate) fn calculate(operator: CalcOperator, values: &[Option<&CellValue>]) -> Option<f64> {
    let total = values.len();
    let present: Vec<&CellValue> = values
        .iter()
        .flatten()
        .copied()
        .filter(|value| !value.is_empty())
        .collect();
    let empty = total - present.len();

    match operator {
        CalcOperator::CountAll => Some(total as f64),
        CalcOperator::CountValues => Some(
            present
                .iter()
                .map(|value| match value {
                    CellValue::Select { option_ids } => option_ids.len(),
                    _ => 1,
                })
                .sum::<usize>() as f64,
        ),
        CalcOperator::CountEmpty => Some(empty as f64),
        CalcOperator::CountNotEmpty => Some(present.len() as f64),
        CalcOperator::PercentEmpty => percent(empty, total),
        CalcOperator::PercentNotEmpty => percent(present.len(), total),
        numeric => {
            let numbers: Vec<f64> = present
                .iter()
                .filter_map(|value| match value {
                    CellValue::Number { content } => Some(*content),
                    _ => None,
                })
                .collect();
            aggregate_numbers(numeric, numbers)
        }
    }
}

fn percent(part: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(part as f64 * 100.0 / total as f64)
}

fn aggregate_numbers(operator: CalcOperator, mut numbers: Vec<f64>) -> Option<f64> {
    if numbers.is_empty() {
        return None;
    }
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = numbers.iter().sum();

    match operator {
        CalcOperator::Sum => Some(sum),
        CalcOperator::Average => Some(sum / numbers.len() as f64),
        CalcOperator::Min => Some(min),
        CalcOperator::Max => Some(max),
        CalcOperator::Range => Some(max - min),
        CalcOperator::Median => {
            numbers.sort_by(f64::total_cmp);
            let middle = numbers.len() / 2;
            if numbers.len() % 2 == 0 {
                Some((numbers[middle - 1] + numbers[middle]) / 2.0)
            } else {
                Some(numbers[middle])
            }
        }
        _ => None,
    }
}
