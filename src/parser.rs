use std::sync::OnceLock;

use regex::Regex;

use crate::classifier::SheetClassifier;
use crate::error::Result;
use crate::models::ParsedLine;
use crate::validator::clean_lines;
use crate::workbook::{load_workbook, Sheet};

fn program_sheet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:PROGRAMME|PROG|P)\s*(\d{3})(?:\D.*)?$").expect("invalid program sheet regex")
    })
}

/// Program code for a sheet named like `P118`, `PROG 118` or `Programme 118`.
pub fn program_code_for_sheet(name: &str) -> Option<String> {
    let upper = name.trim().to_uppercase();
    program_sheet_re()
        .captures(&upper)
        .map(|caps| caps[1].to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub header_scan_rows: usize,
    pub anomaly_ratio: f64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            header_scan_rows: 50,
            anomaly_ratio: 1.5,
        }
    }
}

#[derive(Debug, Default)]
pub struct ParseReport {
    pub lines: Vec<ParsedLine>,
    pub sheets: usize,
    pub dropped: usize,
    pub anomalies: usize,
}

/// Classify every program sheet, then run the cleaner over the combined output.
pub fn parse_sheets(sheets: &[Sheet], opts: &ParseOptions) -> ParseReport {
    let mut raw = Vec::new();
    let mut processed = 0usize;
    for sheet in sheets {
        let Some(code) = program_code_for_sheet(&sheet.name) else {
            tracing::debug!(sheet = %sheet.name, "not a program sheet; skipped");
            continue;
        };
        processed += 1;
        raw.extend(SheetClassifier::new(sheet, &code, opts.header_scan_rows).run(sheet));
    }

    let cleaned = clean_lines(raw, opts.anomaly_ratio);
    ParseReport {
        lines: cleaned.lines,
        sheets: processed,
        dropped: cleaned.dropped,
        anomalies: cleaned.anomalies,
    }
}

pub fn parse_workbook(bytes: &[u8], opts: &ParseOptions) -> Result<ParseReport> {
    let sheets = load_workbook(bytes)?;
    Ok(parse_sheets(&sheets, opts))
}
