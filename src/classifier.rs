//! Row classification and fill-down context tracking for one budget sheet.
//!
//! Rows are visited top to bottom in a single pass. Each row is offered to
//! [`ROW_RULES`] in order and the first rule that fires decides what the row
//! is; later rules never see it. Hierarchy context (action, activity, task,
//! admin unit) lives in [`RowContext`] and persists across rows until a header
//! or a non-empty inline cell replaces it.

use std::sync::OnceLock;

use regex::Regex;

use crate::columns::{detect_columns, ColumnMap, Layout};
use crate::models::ParsedLine;
use crate::workbook::{Cell, Sheet};

const DEFAULT_CODE: &str = "01";

const TOTAL_PATTERNS: &[&str] = &[
    "total programme",
    "total action",
    "total activité",
    "total activite",
    "montant total",
];

const LABEL_CELLS: &[&str] = &[
    "activités",
    "activites",
    "tâches",
    "taches",
    "paragraphes",
    "libellé",
    "libelle",
    "répartition",
    "repartition",
];

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^action\s+(\d+)\s*:(.+)").expect("invalid action regex"))
}

fn activity_res() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"^\[(\d+)\]\s*(.+)").expect("invalid bracket activity regex"),
            Regex::new(r"(?i)^activit[ée]\s+(\d+)\s*:\s*(.+)").expect("invalid activity regex"),
            Regex::new(r"^(\d{1,2})\s*-\s*(.+)").expect("invalid dash activity regex"),
        ]
    })
}

fn six_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{6}$").expect("invalid paragraph regex"))
}

fn pad_code(digits: &str) -> String {
    format!("{digits:0>2}")
}

pub fn is_paragraph_code(value: &str) -> bool {
    six_digits_re().is_match(value)
}

fn match_activity(value: &str) -> Option<(String, String)> {
    activity_res().iter().find_map(|re| {
        let caps = re.captures(value)?;
        Some((pad_code(&caps[1]), clean_activity_name(&caps[2])))
    })
}

fn clean_activity_name(raw: &str) -> String {
    let name = raw.trim();
    const PREFIX: &str = "total activité ";
    match name.get(..PREFIX.len()) {
        Some(head) if head.to_lowercase() == PREFIX => name[PREFIX.len()..].trim().to_string(),
        _ => name.to_string(),
    }
}

/// Hierarchy state in force while walking a sheet. Program fields are fixed
/// for the whole sheet; the rest fill down.
#[derive(Debug, Clone, PartialEq)]
pub struct RowContext {
    pub program_code: String,
    pub program_name: String,
    pub action_code: String,
    pub action_name: String,
    pub activity_code: String,
    pub activity_name: String,
    pub task_name: Option<String>,
    pub admin_code: Option<String>,
    pub admin_name: Option<String>,
}

impl RowContext {
    pub fn for_program(code: &str, name: &str) -> Self {
        Self {
            program_code: code.to_string(),
            program_name: name.to_string(),
            action_code: DEFAULT_CODE.to_string(),
            action_name: format!("Action {DEFAULT_CODE}"),
            activity_code: DEFAULT_CODE.to_string(),
            activity_name: format!("Activité {DEFAULT_CODE}"),
            task_name: None,
            admin_code: None,
            admin_name: None,
        }
    }

    fn set_action(&mut self, code: String, name: String) {
        self.action_code = code;
        self.action_name = name;
        self.set_activity(DEFAULT_CODE.to_string(), format!("Activité {DEFAULT_CODE}"));
    }

    fn set_activity(&mut self, code: String, name: String) {
        self.activity_code = code;
        self.activity_name = name;
        self.task_name = None;
    }
}

/// What a row turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Skipped,
    ActionHeader,
    ActivityHeader,
    AdminHeader,
    Line(Box<ParsedLine>),
    /// A budget-line row whose amounts are all zero.
    EmptyLine,
    /// No rule claimed the row; inline context (if any) was carried forward.
    Carried,
}

/// Borrowed view of one row with its text pre-flattened.
pub struct RowView<'a> {
    pub sheet: &'a str,
    pub index: usize,
    pub cells: &'a [Cell],
    pub columns: &'a ColumnMap,
    text: Vec<String>,
    lower: String,
}

impl<'a> RowView<'a> {
    pub fn new(sheet: &'a str, index: usize, cells: &'a [Cell], columns: &'a ColumnMap) -> Self {
        let text: Vec<String> = cells.iter().map(Cell::trimmed).collect();
        let lower = text.join(" ").to_lowercase();
        Self {
            sheet,
            index,
            cells,
            columns,
            text,
            lower,
        }
    }

    fn text_at(&self, col: usize) -> &str {
        self.text.get(col).map(String::as_str).unwrap_or("")
    }

    fn amount_at(&self, col: usize) -> f64 {
        self.cells.get(col).map_or(0.0, Cell::amount)
    }

    fn paragraph(&self) -> &str {
        self.text_at(self.columns.paragraph)
    }

    fn mentions_total(&self) -> bool {
        self.lower.contains("total")
    }
}

type Rule = fn(&RowView, &mut RowContext) -> Option<RowOutcome>;

/// Evaluated in order; the first rule returning `Some` wins.
pub const ROW_RULES: &[(&str, Rule)] = &[
    ("skip", skip_rule),
    ("action_header", action_header_rule),
    ("activity_header", activity_header_rule),
    ("admin_header", admin_header_rule),
    ("budget_line", budget_line_rule),
    ("carry", carry_rule),
];

pub fn classify_row(view: &RowView, ctx: &mut RowContext) -> RowOutcome {
    for (name, rule) in ROW_RULES {
        if let Some(outcome) = rule(view, ctx) {
            tracing::trace!(sheet = view.sheet, row = view.index, rule = *name, "row classified");
            return outcome;
        }
    }
    RowOutcome::Carried
}

fn skip_rule(view: &RowView, _ctx: &mut RowContext) -> Option<RowOutcome> {
    let is_total = TOTAL_PATTERNS.iter().any(|p| view.lower.contains(p));
    let is_label = view
        .text
        .iter()
        .any(|t| LABEL_CELLS.contains(&t.to_lowercase().as_str()));
    (is_total || is_label).then_some(RowOutcome::Skipped)
}

fn action_header_rule(view: &RowView, ctx: &mut RowContext) -> Option<RowOutcome> {
    let caps = view.text.iter().find_map(|t| action_re().captures(t))?;
    ctx.set_action(pad_code(&caps[1]), caps[2].trim().to_string());
    Some(RowOutcome::ActionHeader)
}

fn activity_header_rule(view: &RowView, ctx: &mut RowContext) -> Option<RowOutcome> {
    if !view.paragraph().is_empty() {
        return None;
    }
    let (code, name) = activity_res().iter().find_map(|re| {
        view.text.iter().find_map(|t| {
            let caps = re.captures(t)?;
            Some((pad_code(&caps[1]), clean_activity_name(&caps[2])))
        })
    })?;
    ctx.set_activity(code, name);
    Some(RowOutcome::ActivityHeader)
}

fn admin_header_rule(view: &RowView, ctx: &mut RowContext) -> Option<RowOutcome> {
    let code = view.text_at(view.columns.admin_code);
    if !is_admin_code(code) || view.mentions_total() || is_paragraph_code(view.paragraph()) {
        return None;
    }
    let name = admin_name(view, code);
    ctx.admin_code = Some(code.to_string());
    ctx.admin_name = Some(name);
    Some(RowOutcome::AdminHeader)
}

fn budget_line_rule(view: &RowView, ctx: &mut RowContext) -> Option<RowOutcome> {
    let paragraph = view.paragraph();
    if !is_paragraph_code(paragraph) || view.mentions_total() {
        return None;
    }
    fill_down(view, ctx);
    if let Some(code) = fill_value(view.text_at(view.columns.admin_code)) {
        if is_admin_code(code) {
            ctx.admin_name = Some(admin_name(view, code));
            ctx.admin_code = Some(code.to_string());
        }
    }

    let c = view.columns;
    let (ae, cp, engaged) = (view.amount_at(c.ae), view.amount_at(c.cp), view.amount_at(c.engaged));
    if ae == 0.0 && cp == 0.0 && engaged == 0.0 {
        return Some(RowOutcome::EmptyLine);
    }

    Some(RowOutcome::Line(Box::new(ParsedLine {
        sheet: view.sheet.to_string(),
        row: view.index,
        program_code: ctx.program_code.clone(),
        program_name: ctx.program_name.clone(),
        action_code: ctx.action_code.clone(),
        action_name: ctx.action_name.clone(),
        activity_code: ctx.activity_code.clone(),
        activity_name: ctx.activity_name.clone(),
        task_name: ctx.task_name.clone(),
        admin_code: ctx.admin_code.clone(),
        admin_name: ctx.admin_name.clone(),
        paragraph_code: paragraph.to_string(),
        paragraph_name: view.text_at(c.paragraph_name).to_string(),
        ae,
        cp,
        engaged,
    })))
}

fn carry_rule(view: &RowView, ctx: &mut RowContext) -> Option<RowOutcome> {
    if !view.mentions_total() {
        fill_down(view, ctx);
    }
    Some(RowOutcome::Carried)
}

/// Short, non-numeric codes only. Longer text in the admin column is a note.
fn is_admin_code(code: &str) -> bool {
    !code.is_empty() && code.chars().count() < 15 && !is_paragraph_code(code)
}

/// Only values longer than one character overwrite context.
fn fill_value(raw: &str) -> Option<&str> {
    (raw.chars().count() > 1).then_some(raw)
}

fn admin_name(view: &RowView, code: &str) -> String {
    view.columns
        .admin_name
        .map(|col| view.text_at(col))
        .filter(|n| !n.is_empty())
        .unwrap_or(code)
        .to_string()
}

/// Apply the row's inline activity and task cells to the context.
fn fill_down(view: &RowView, ctx: &mut RowContext) {
    if let Some(value) = view.columns.activity.and_then(|c| fill_value(view.text_at(c))) {
        match match_activity(value) {
            Some((code, name)) => {
                if code != ctx.activity_code || name != ctx.activity_name {
                    ctx.set_activity(code, name);
                }
            }
            None if value != ctx.activity_name => {
                ctx.activity_name = value.to_string();
                ctx.task_name = None;
            }
            None => {}
        }
    }
    if let Some(value) = view.columns.task.and_then(|c| fill_value(view.text_at(c))) {
        ctx.task_name = Some(value.to_string());
    }
}

/// Per-sheet classifier. Owns the context for exactly one sheet; a new sheet
/// gets a new classifier.
pub struct SheetClassifier {
    layout: Layout,
    ctx: RowContext,
}

impl SheetClassifier {
    pub fn new(sheet: &Sheet, program_code: &str, scan_rows: usize) -> Self {
        Self {
            layout: detect_columns(sheet, scan_rows),
            ctx: RowContext::for_program(program_code, sheet.name.trim()),
        }
    }

    #[cfg(test)]
    pub fn context(&self) -> &RowContext {
        &self.ctx
    }

    pub fn classify(&mut self, sheet: &Sheet, index: usize) -> RowOutcome {
        let cells = sheet.rows.get(index).map(Vec::as_slice).unwrap_or(&[]);
        let view = RowView::new(&sheet.name, index, cells, &self.layout.columns);
        classify_row(&view, &mut self.ctx)
    }

    /// Walk every data row and collect the budget lines.
    pub fn run(mut self, sheet: &Sheet) -> Vec<ParsedLine> {
        let mut lines = Vec::new();
        for index in self.layout.data_start()..sheet.rows.len() {
            if let RowOutcome::Line(line) = self.classify(sheet, index) {
                lines.push(*line);
            }
        }
        tracing::debug!(sheet = %sheet.name, lines = lines.len(), "sheet classified");
        lines
    }
}
