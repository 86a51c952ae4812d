use std::path::PathBuf;

use colored::Colorize;

use super::open_db;
use crate::error::Result;
use crate::importer::{import_workbook, ImportOptions};
use crate::parser::ParseOptions;
use crate::settings::load_settings;

pub fn run(file: &str, year: Option<i32>) -> Result<()> {
    let settings = load_settings();
    let file_path = PathBuf::from(file);
    let conn = open_db()?;

    let bytes = std::fs::read(&file_path)?;
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    let opts = ImportOptions {
        parse: ParseOptions {
            header_scan_rows: settings.header_scan_rows,
            anomaly_ratio: settings.anomaly_ratio,
        },
        default_task_name: &settings.default_task_name,
        year,
    };

    let result = import_workbook(&conn, &bytes, filename, &opts)?;

    if result.previously_imported {
        println!(
            "{}",
            "This file was imported before; its budget lines have been added again.".yellow()
        );
    }
    if result.sheets == 0 {
        println!("{}", "No program sheet (P###, PROG ###, PROGRAMME ###) found.".yellow());
    }
    println!(
        "{} budget lines imported into fiscal year {} ({} sheets, {} invalid dropped)",
        result.inserted, result.fiscal_year, result.sheets, result.skipped_invalid
    );
    if result.anomalies > 0 {
        println!(
            "{}",
            format!("{} lines have engaged amounts well above their AE", result.anomalies).yellow()
        );
    }
    Ok(())
}
