mod common;

use attrview_core::{
    CalcOperator, ColumnCalc, ColumnType, FilterOperator, FilterRule, RenderError, SortOrder,
    SortRule, Table,
};
use common::{cell_id, load, number, seed_rows, service, setup, text, Service};

/// Seeds one row per score and returns the block IDs and the score column.
fn scored_view(service: &Service<'_>, scores: &[f64]) -> (Vec<String>, String) {
    let contents: Vec<String> = (0..scores.len()).map(|i| format!("row {i}")).collect();
    let contents: Vec<&str> = contents.iter().map(String::as_str).collect();
    let blocks = seed_rows(service, "av-1", &contents);
    let score = service
        .add_column("av-1", "Score", ColumnType::Number, None)
        .unwrap();
    for (block, value) in blocks.iter().zip(scores) {
        let av = load(service, "av-1");
        let (row_id, cell) = cell_id(&av, block, &score);
        service
            .update_cell("av-1", &row_id, &cell, number(*value))
            .unwrap();
    }
    (blocks, score)
}

fn scores(table: &Table, score: &str) -> Vec<String> {
    table
        .rows
        .iter()
        .map(|row| table.display_text(row.cell(score).and_then(|cell| cell.cell.value.as_ref())))
        .collect()
}

#[test]
fn render_filters_then_sorts_then_calculates() {
    let conn = setup();
    let service = service(&conn);
    let (_, score) = scored_view(&service, &[5.0, 1.0, 9.0, -3.0]);

    service
        .set_filters(
            "av-1",
            None,
            vec![FilterRule {
                column_id: score.clone(),
                operator: FilterOperator::Gt,
                value: number(0.0),
            }],
        )
        .unwrap();
    service
        .set_sorts(
            "av-1",
            None,
            vec![SortRule {
                column_id: score.clone(),
                order: SortOrder::Desc,
            }],
        )
        .unwrap();
    service
        .set_column_calc(
            "av-1",
            None,
            &score,
            Some(ColumnCalc {
                operator: CalcOperator::Sum,
                result: Some(123.0),
            }),
        )
        .unwrap();

    let (rendered, av) = service.render("av-1").unwrap();
    let table = rendered.as_table().unwrap();
    assert_eq!(scores(table, &score), vec!["9", "5", "1"]);
    let calc = table
        .columns
        .iter()
        .find(|column| column.id == score)
        .and_then(|column| column.calc.as_ref())
        .unwrap();
    assert_eq!(calc.result, Some(15.0));

    // Rendering never writes back.
    assert_eq!(av.rows.len(), 4);
    let stored = load(&service, "av-1");
    assert_eq!(stored.revision, av.revision);
    let stored_calc = stored.current_view().unwrap().table.columns[1]
        .calc
        .clone()
        .unwrap();
    assert_eq!(stored_calc.result, None);
}

#[test]
fn rendered_cells_follow_column_order() {
    let conn = setup();
    let service = service(&conn);
    let (blocks, score) = scored_view(&service, &[2.0]);
    let note = service
        .add_column("av-1", "Note", ColumnType::Text, None)
        .unwrap();
    let av = load(&service, "av-1");
    let (row_id, cell) = cell_id(&av, &blocks[0], &note);
    service
        .update_cell("av-1", &row_id, &cell, text("memo"))
        .unwrap();
    service.move_column("av-1", &note, None).unwrap();

    let (rendered, av) = service.render("av-1").unwrap();
    let table = rendered.as_table().unwrap();
    let row_columns: Vec<&str> = table.rows[0]
        .cells
        .iter()
        .map(|cell| cell.column_id.as_str())
        .collect();
    let columns: Vec<&str> = av.columns.iter().map(|column| column.id.as_str()).collect();
    assert_eq!(row_columns, columns);
    assert_eq!(row_columns[0], note);
    assert_eq!(row_columns[2], score);
    assert_eq!(
        table.display_text(table.rows[0].cells[0].cell.value.as_ref()),
        "memo"
    );
}

#[test]
fn rules_on_removed_columns_are_inert() {
    let conn = setup();
    let service = service(&conn);
    let (_, score) = scored_view(&service, &[3.0, 1.0, 2.0]);
    service
        .set_filters(
            "av-1",
            None,
            vec![FilterRule {
                column_id: score.clone(),
                operator: FilterOperator::Lt,
                value: number(0.0),
            }],
        )
        .unwrap();
    let (rendered, _) = service.render("av-1").unwrap();
    assert!(rendered.as_table().unwrap().rows.is_empty());

    service.remove_column("av-1", &score).unwrap();

    let (rendered, _) = service.render("av-1").unwrap();
    assert_eq!(rendered.as_table().unwrap().rows.len(), 3);
}

#[test]
fn select_sorts_by_option_name_and_shows_names() {
    let conn = setup();
    let service = service(&conn);
    let blocks = seed_rows(&service, "av-1", &["x", "y", "z"]);
    let status = service
        .add_column("av-1", "Status", ColumnType::Select, None)
        .unwrap();
    service
        .set_column_options(
            "av-1",
            &status,
            ["Todo", "Doing", "Blocked"]
                .iter()
                .map(|name| attrview_core::SelectOptionInput {
                    id: None,
                    name: name.to_string(),
                    color: String::new(),
                })
                .collect(),
        )
        .unwrap();
    for (block, name) in blocks.iter().zip(["Todo", "Blocked"]) {
        let av = load(&service, "av-1");
        let option = av
            .column(&status)
            .unwrap()
            .option_by_name(name)
            .unwrap()
            .id
            .clone();
        let (row_id, cell) = cell_id(&av, block, &status);
        service
            .update_cell("av-1", &row_id, &cell, common::options(&[option.as_str()]))
            .unwrap();
    }
    service
        .set_sorts(
            "av-1",
            None,
            vec![SortRule {
                column_id: status.clone(),
                order: SortOrder::Asc,
            }],
        )
        .unwrap();

    let (rendered, _) = service.render("av-1").unwrap();
    let table = rendered.as_table().unwrap();
    let shown: Vec<String> = table
        .rows
        .iter()
        .map(|row| table.display_text(row.cell(&status).and_then(|cell| cell.cell.value.as_ref())))
        .collect();
    // Empty cells sort last.
    assert_eq!(shown, vec!["Blocked", "Todo", ""]);
}

#[test]
fn render_missing_view_is_a_store_error() {
    let conn = setup();
    let service = service(&conn);

    let err = service.render("missing").unwrap_err();
    assert!(matches!(err, RenderError::Store(_)));
}

#[test]
fn set_current_view_requires_known_view() {
    let conn = setup();
    let service = service(&conn);
    seed_rows(&service, "av-1", &["b1"]);
    let view_id = load(&service, "av-1").views[0].id.clone();

    service.set_current_view("av-1", &view_id).unwrap();
    assert_eq!(load(&service, "av-1").current_view_id, view_id);

    let err = service.set_current_view("av-1", "no-such-view").unwrap_err();
    assert_eq!(err.kind(), attrview_core::ErrorKind::NotFound);
}
