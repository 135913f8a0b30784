//! CLI entry point for attribute view storage.
//!
//! # Responsibility
//! - Apply JSON operation batches and print rendered views from a shell.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Storage and logging come from `ATTRVIEW_DB_PATH`, `ATTRVIEW_LOG_DIR` and
//! `ATTRVIEW_LOG_LEVEL`.

use attrview_core::{
    apply_json_operations, core_version, AttributeViewService, CoreConfig, RenderedView,
    SqliteAttributeViewStore, SqliteBlockRepository,
};
use log::error;
use std::io::Read;
use std::process::ExitCode;

const USAGE: &str = "usage: attrview [version | render <av_id> | apply <ops.json|-> | reconcile <av_id>]";

fn main() -> ExitCode {
    let config = CoreConfig::from_env();
    if let Err(err) = config.init_logging() {
        eprintln!("logging disabled: {err}");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    if matches!(args.as_slice(), [] | ["version"]) {
        println!("attrview_core version={}", core_version());
        return ExitCode::SUCCESS;
    }

    match run(&config, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &CoreConfig, args: &[&str]) -> Result<(), String> {
    let conn = config.open_db().map_err(|err| err.to_string())?;
    let store = SqliteAttributeViewStore::try_new(&conn).map_err(|err| err.to_string())?;
    let blocks = SqliteBlockRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let service = AttributeViewService::new(store, blocks);

    match args {
        ["render", av_id] => {
            let (rendered, av) = service.render(av_id).map_err(|err| err.to_string())?;
            println!("# {} ({})", av.name, av.id);
            print_rendered(&rendered);
            Ok(())
        }
        ["apply", source] => {
            let json = read_source(source)?;
            let applied = apply_json_operations(&service, &json).map_err(|err| err.to_string())?;
            println!("applied={applied}");
            Ok(())
        }
        ["reconcile", av_id] => {
            let report = service
                .reconcile_mirror(av_id)
                .map_err(|err| err.to_string())?;
            println!(
                "rows_linked={} blocks_updated={} missing_blocks={}",
                report.rows_linked,
                report.blocks_updated,
                report.missing_blocks.len()
            );
            Ok(())
        }
        _ => Err(USAGE.to_string()),
    }
}

fn read_source(source: &str) -> Result<String, String> {
    if source == "-" {
        let mut json = String::new();
        std::io::stdin()
            .read_to_string(&mut json)
            .map_err(|err| format!("failed to read stdin: {err}"))?;
        return Ok(json);
    }
    std::fs::read_to_string(source).map_err(|err| format!("failed to read `{source}`: {err}"))
}

fn print_rendered(rendered: &RenderedView) {
    let Some(table) = rendered.as_table() else {
        return;
    };
    let visible: Vec<_> = table.columns.iter().filter(|column| !column.hidden).collect();

    let header: Vec<&str> = visible.iter().map(|column| column.name.as_str()).collect();
    println!("{}", header.join("\t"));

    for row in &table.rows {
        let cells: Vec<String> = visible
            .iter()
            .map(|column| {
                let value = row
                    .cell(&column.id)
                    .and_then(|cell| cell.cell.value.as_ref());
                table.display_text(value)
            })
            .collect();
        println!("{}", cells.join("\t"));
    }

    let calcs: Vec<String> = visible
        .iter()
        .map(|column| {
            column
                .calc
                .as_ref()
                .and_then(|calc| calc.result)
                .map(|result| result.to_string())
                .unwrap_or_default()
        })
        .collect();
    if calcs.iter().any(|calc| !calc.is_empty()) {
        println!("{}", calcs.join("\t"));
    }
}
