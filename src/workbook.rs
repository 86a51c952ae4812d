//! Workbook loading: opens a spreadsheet byte buffer into plain in-memory sheets.
//!
//! Every cell is flattened to [`Cell`] up front so the classifier never sees
//! calamine's richer cell types. Formula cells come through as their cached
//! result, rich-text runs as their concatenated text.

use std::io::Cursor;

use calamine::{Data, Reader};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

#[cfg(test)]
static EMPTY: Cell = Cell::Empty;

impl Cell {
    /// Effective display string. Integral numbers print without a fraction
    /// so a paragraph code stored as `612024.0` reads back as `"612024"`.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{:.0}", f)
                } else {
                    f.to_string()
                }
            }
            Cell::Bool(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
        }
    }

    pub fn trimmed(&self) -> String {
        self.text().trim().to_string()
    }

    /// Best-effort numeric value: unparsable or missing values are 0.
    pub fn amount(&self) -> f64 {
        match self {
            Cell::Number(f) if f.is_finite() => *f,
            Cell::Text(s) => parse_amount(s),
            _ => 0.0,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// Strip whitespace (including no-break spaces) and thousands separators, then parse.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }

    /// Build a sheet from string rows; empty strings become empty cells.
    #[cfg(test)]
    pub fn from_strings(name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|s| Cell::from(*s)).collect())
            .collect();
        Self::new(name, rows)
    }

    #[cfg(test)]
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Open a workbook from raw bytes. The format (xlsx, xls, xlsb, ods) is sniffed
/// from the content. Sheets that cannot be read are skipped with a warning.
pub fn load_workbook(bytes: &[u8]) -> Result<Vec<Sheet>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let names: Vec<String> = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(names.len());
    for name in &names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };
        sheets.push(range_to_sheet(name, &range));
    }
    Ok(sheets)
}

/// calamine ranges start at the first used cell; pad back to A1 so column
/// indices count from the sheet's first column.
fn range_to_sheet(name: &str, range: &calamine::Range<Data>) -> Sheet {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(Cell::from));
        rows.push(cells);
    }
    Sheet::new(name, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), 1234.56);
        assert_eq!(parse_amount("1 000 000"), 1_000_000.0);
        assert_eq!(parse_amount("2\u{a0}500"), 2500.0);
        assert_eq!(parse_amount("  -42.50  "), -42.5);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("n/a"), 0.0);
        assert_eq!(parse_amount("inf"), 0.0);
    }

    #[test]
    fn test_cell_text_drops_integral_fraction() {
        assert_eq!(Cell::Number(612024.0).text(), "612024");
        assert_eq!(Cell::Number(12.5).text(), "12.5");
        assert_eq!(Cell::Empty.text(), "");
        assert_eq!(Cell::Bool(true).text(), "TRUE");
    }

    #[test]
    fn test_cell_amount() {
        assert_eq!(Cell::Number(800.0).amount(), 800.0);
        assert_eq!(Cell::Text("1 500".into()).amount(), 1500.0);
        assert_eq!(Cell::Bool(true).amount(), 0.0);
        assert_eq!(Cell::Empty.amount(), 0.0);
        assert_eq!(Cell::Number(f64::NAN).amount(), 0.0);
    }

    #[test]
    fn test_cell_from_data() {
        assert_eq!(Cell::from(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(Cell::from(&Data::String("x".into())), Cell::Text("x".into()));
        assert_eq!(
            Cell::from(&Data::Error(calamine::CellErrorType::Div0)),
            Cell::Empty
        );
    }

    #[test]
    fn test_cell_out_of_bounds_is_empty() {
        let sheet = Sheet::from_strings("P118", &[&["a", "b"]]);
        assert_eq!(sheet.cell(0, 1), &Cell::Text("b".into()));
        assert_eq!(sheet.cell(0, 9), &Cell::Empty);
        assert_eq!(sheet.cell(5, 0), &Cell::Empty);
    }

    #[test]
    fn test_load_workbook_reads_every_sheet() {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("PROGRAMME 118").unwrap();
        ws.write_string(0, 1, "Paragraphe Code").unwrap();
        ws.write_number(1, 1, 612024.0).unwrap();
        let other = wb.add_worksheet();
        other.set_name("Notes").unwrap();
        other.write_string(0, 0, "hello").unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let sheets = load_workbook(&bytes).unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].name, "PROGRAMME 118");
        // Column A is empty, but indices still count from A.
        assert_eq!(sheets[0].cell(0, 1).text(), "Paragraphe Code");
        assert_eq!(sheets[0].cell(1, 1).text(), "612024");
        assert_eq!(sheets[1].cell(0, 0).text(), "hello");
    }

    #[test]
    fn test_load_workbook_rejects_garbage() {
        assert!(load_workbook(b"not a spreadsheet").is_err());
    }
}
