#[derive(Debug, Clone, PartialEq)]
pub struct FiscalYear {
    pub id: i64,
    pub year: i32,
    pub name: String,
    pub is_active: bool,
}

/// A budget line ready for insert, with every hierarchy reference resolved.
#[derive(Debug, Clone)]
pub struct NewBudgetLine<'a> {
    pub task_id: i64,
    pub admin_unit_id: Option<i64>,
    pub fiscal_year_id: Option<i64>,
    pub paragraph_code: &'a str,
    pub paragraph_name: &'a str,
    pub ae: f64,
    pub cp: f64,
    pub engaged: f64,
}

/// Intermediate representation from the workbook parser before DB insert.
/// Carries the hierarchy context that was in force on the row it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub sheet: String,
    pub row: usize,
    pub program_code: String,
    pub program_name: String,
    pub action_code: String,
    pub action_name: String,
    pub activity_code: String,
    pub activity_name: String,
    pub task_name: Option<String>,
    pub admin_code: Option<String>,
    pub admin_name: Option<String>,
    pub paragraph_code: String,
    pub paragraph_name: String,
    pub ae: f64,
    pub cp: f64,
    pub engaged: f64,
}
