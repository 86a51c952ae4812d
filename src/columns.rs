use crate::workbook::Sheet;

/// Semantic field → column index for one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub paragraph: usize,
    pub paragraph_name: usize,
    pub ae: usize,
    pub cp: usize,
    pub engaged: usize,
    pub admin_code: usize,
    pub admin_name: Option<usize>,
    pub activity: Option<usize>,
    pub task: Option<usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            paragraph: 5,
            paragraph_name: 6,
            ae: 7,
            cp: 8,
            engaged: 9,
            admin_code: 3,
            admin_name: Some(4),
            activity: Some(1),
            task: Some(2),
        }
    }
}

/// Result of header detection. `header_row` is `None` when the default
/// layout was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub columns: ColumnMap,
    pub header_row: Option<usize>,
}

impl Layout {
    /// First row that holds data.
    pub fn data_start(&self) -> usize {
        self.header_row.map_or(0, |r| r + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Paragraph,
    ParagraphName,
    Ae,
    Cp,
    Engaged,
    Admin,
    Activity,
    Task,
}

// Ordered: a cell takes the first field whose predicate matches.
const HEADER_RULES: &[(Field, fn(&str) -> bool)] = &[
    (Field::Paragraph, |c: &str| c.contains("paragraph") && c.contains("code")),
    (Field::ParagraphName, |c: &str| {
        c.contains("paragraph") || c.contains("libellé") || c.contains("libelle") || c.contains("label")
    }),
    (Field::Ae, is_ae),
    (Field::Cp, |c: &str| c.contains("cp") || c.contains("crédit") || c.contains("credit")),
    (Field::Engaged, |c: &str| c.contains("engag")),
    (Field::Admin, |c: &str| c.contains("départ") || c.contains("depart") || c.contains("admin")),
    (Field::Activity, |c: &str| c.contains("activit")),
    (Field::Task, |c: &str| c.contains("tâche") || c.contains("tache") || c.contains("task")),
];

fn is_ae(cell: &str) -> bool {
    cell.contains("ae") || cell.contains("autorisation") || cell.contains("authorized")
}

fn is_header_row(cells: &[String]) -> bool {
    cells.iter().any(|c| c.contains("paragraph")) && cells.iter().any(|c| is_ae(c))
}

/// Find the header row within the first `scan_rows` rows and map its columns.
/// Falls back to the fixed default layout when no header row is found.
pub fn detect_columns(sheet: &Sheet, scan_rows: usize) -> Layout {
    for (idx, row) in sheet.rows.iter().take(scan_rows).enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.trimmed().to_lowercase()).collect();
        if !is_header_row(&cells) {
            continue;
        }
        let columns = map_header(&cells);
        tracing::debug!(sheet = %sheet.name, row = idx, ?columns, "header row detected");
        return Layout {
            columns,
            header_row: Some(idx),
        };
    }
    tracing::debug!(sheet = %sheet.name, "no header row; using default column layout");
    Layout {
        columns: ColumnMap::default(),
        header_row: None,
    }
}

fn map_header(cells: &[String]) -> ColumnMap {
    let mut found: Vec<(Field, usize)> = Vec::new();
    for (col, cell) in cells.iter().enumerate() {
        if cell.is_empty() {
            continue;
        }
        let Some(field) = HEADER_RULES
            .iter()
            .find(|(_, matches)| matches(cell))
            .map(|(f, _)| *f)
        else {
            continue;
        };
        if !found.iter().any(|(f, _)| *f == field) {
            found.push((field, col));
        }
    }

    let named: Vec<usize> = found.iter().map(|(_, col)| *col).collect();
    let named_activity = found.iter().any(|(f, _)| *f == Field::Activity);
    let named_task = found.iter().any(|(f, _)| *f == Field::Task);

    let mut map = ColumnMap::default();
    let mut admin_found = false;
    for (field, col) in found {
        match field {
            Field::Paragraph => map.paragraph = col,
            Field::ParagraphName => map.paragraph_name = col,
            Field::Ae => map.ae = col,
            Field::Cp => map.cp = col,
            Field::Engaged => map.engaged = col,
            Field::Admin => {
                map.admin_code = col;
                admin_found = true;
            }
            Field::Activity => map.activity = Some(col),
            Field::Task => map.task = Some(col),
        }
    }
    if admin_found {
        map.admin_name = Some(map.admin_code + 1);
    }
    // Unnamed context columns keep their default position unless a named column sits there.
    if !named_activity && map.activity.is_some_and(|c| named.contains(&c)) {
        map.activity = None;
    }
    if !named_task && map.task.is_some_and(|c| named.contains(&c)) {
        map.task = None;
    }
    if let Some(name_col) = map.admin_name {
        let taken = [map.paragraph, map.paragraph_name, map.ae, map.cp, map.engaged];
        let named_context = (named_activity && map.activity == Some(name_col))
            || (named_task && map.task == Some(name_col));
        if taken.contains(&name_col) || named_context {
            map.admin_name = None;
        }
    }
    // A derived admin name column outranks a default context column.
    if map.admin_name.is_some() {
        if !named_activity && map.activity == map.admin_name {
            map.activity = None;
        }
        if !named_task && map.task == map.admin_name {
            map.task = None;
        }
    }
    map
}
