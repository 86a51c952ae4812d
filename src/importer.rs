use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{NewBudgetLine, ParsedLine};
use crate::parser::{parse_workbook, ParseOptions};
use crate::store::BudgetStore;

// ---------------------------------------------------------------------------
// Fiscal year inference
// ---------------------------------------------------------------------------

fn year_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:19|20)\d{2}").expect("invalid year regex"))
}

/// First year-like substring of the filename that is plausible for a budget
/// (2000 up to two years ahead), otherwise `current_year`. Date stamps such
/// as `20240115` yield their leading year.
pub fn infer_fiscal_year(filename: &str, current_year: i32) -> i32 {
    let mut pos = 0;
    while let Some(m) = year_token_re().find_at(filename, pos) {
        if let Ok(year) = m.as_str().parse::<i32>() {
            if (2000..=current_year + 2).contains(&year) {
                return year;
            }
        }
        // Candidates overlap: in `192024`, `1920` is rejected and `2024` follows.
        pos = m.start() + 1;
    }
    current_year
}

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Upsert coordinator
// ---------------------------------------------------------------------------

/// Per-run caches from natural key to resolved id. Keys are tuples of
/// (parent id, code or name), never concatenated strings.
#[derive(Default)]
struct HierarchyCache {
    programs: HashMap<String, i64>,
    actions: HashMap<(i64, String), i64>,
    activities: HashMap<(i64, String), i64>,
    tasks: HashMap<(i64, String), i64>,
    admin_units: HashMap<String, i64>,
}

pub struct Upserter<'s, S: BudgetStore + ?Sized> {
    store: &'s S,
    fiscal_year_id: i64,
    default_task_name: String,
    cache: HierarchyCache,
}

impl<'s, S: BudgetStore + ?Sized> Upserter<'s, S> {
    pub fn new(store: &'s S, fiscal_year_id: i64, default_task_name: &str) -> Self {
        Self {
            store,
            fiscal_year_id,
            default_task_name: default_task_name.to_string(),
            cache: HierarchyCache::default(),
        }
    }

    fn program(&mut self, line: &ParsedLine) -> Result<i64> {
        if let Some(&id) = self.cache.programs.get(&line.program_code) {
            return Ok(id);
        }
        let id = match self.store.find_program(&line.program_code)? {
            Some(id) => id,
            None => self.store.insert_program(&line.program_code, &line.program_name)?,
        };
        self.cache.programs.insert(line.program_code.clone(), id);
        Ok(id)
    }

    fn action(&mut self, program_id: i64, line: &ParsedLine) -> Result<i64> {
        let key = (program_id, line.action_code.clone());
        if let Some(&id) = self.cache.actions.get(&key) {
            return Ok(id);
        }
        let id = match self.store.find_action(program_id, &line.action_code)? {
            Some(id) => id,
            None => self.store.insert_action(program_id, &line.action_code, &line.action_name)?,
        };
        self.cache.actions.insert(key, id);
        Ok(id)
    }

    fn activity(&mut self, action_id: i64, line: &ParsedLine) -> Result<i64> {
        let key = (action_id, line.activity_code.clone());
        if let Some(&id) = self.cache.activities.get(&key) {
            return Ok(id);
        }
        let id = match self.store.find_activity(action_id, &line.activity_code)? {
            Some(id) => id,
            None => self
                .store
                .insert_activity(action_id, &line.activity_code, &line.activity_name)?,
        };
        self.cache.activities.insert(key, id);
        Ok(id)
    }

    fn task(&mut self, activity_id: i64, line: &ParsedLine) -> Result<i64> {
        let name = line
            .task_name
            .as_deref()
            .unwrap_or(self.default_task_name.as_str())
            .to_string();
        let key = (activity_id, name);
        if let Some(&id) = self.cache.tasks.get(&key) {
            return Ok(id);
        }
        let id = match self.store.find_task(activity_id, &key.1)? {
            Some(id) => id,
            None => self.store.insert_task(activity_id, &key.1, None)?,
        };
        self.cache.tasks.insert(key, id);
        Ok(id)
    }

    fn admin_unit(&mut self, line: &ParsedLine) -> Result<Option<i64>> {
        let Some(code) = line.admin_code.as_deref() else {
            return Ok(None);
        };
        if let Some(&id) = self.cache.admin_units.get(code) {
            return Ok(Some(id));
        }
        let id = match self.store.find_admin_unit(code)? {
            Some(id) => id,
            None => {
                let name = line.admin_name.as_deref().unwrap_or(code);
                self.store.insert_admin_unit(code, name)?
            }
        };
        self.cache.admin_units.insert(code.to_string(), id);
        Ok(Some(id))
    }

    /// Resolve the line's hierarchy bottom-up and insert the budget line.
    pub fn insert(&mut self, line: &ParsedLine) -> Result<i64> {
        let program_id = self.program(line)?;
        let action_id = self.action(program_id, line)?;
        let activity_id = self.activity(action_id, line)?;
        let task_id = self.task(activity_id, line)?;
        let admin_unit_id = self.admin_unit(line)?;
        self.store.insert_budget_line(&NewBudgetLine {
            task_id,
            admin_unit_id,
            fiscal_year_id: Some(self.fiscal_year_id),
            paragraph_code: &line.paragraph_code,
            paragraph_name: &line.paragraph_name,
            ae: line.ae,
            cp: line.cp,
            engaged: line.engaged,
        })
    }
}

/// Find the fiscal year for `year`, creating it when missing. A new year is
/// only made active when no other year is.
pub fn resolve_fiscal_year<S: BudgetStore + ?Sized>(store: &S, year: i32) -> Result<i64> {
    if let Some(fy) = store.find_fiscal_year(year)? {
        return Ok(fy.id);
    }
    let activate = store.find_active_fiscal_year()?.is_none();
    store.insert_fiscal_year(year, &format!("Exercice {year}"), activate)
}

/// Insert every line through a fresh set of caches. Returns the number inserted.
pub fn upsert_lines<S: BudgetStore + ?Sized>(
    store: &S,
    lines: &[ParsedLine],
    fiscal_year_id: i64,
    default_task_name: &str,
) -> Result<usize> {
    let mut upserter = Upserter::new(store, fiscal_year_id, default_task_name);
    for line in lines {
        upserter.insert(line)?;
    }
    Ok(lines.len())
}

// ---------------------------------------------------------------------------
// import_workbook
// ---------------------------------------------------------------------------

pub struct ImportOptions<'a> {
    pub parse: ParseOptions,
    pub default_task_name: &'a str,
    /// Overrides the year inferred from the filename.
    pub year: Option<i32>,
}

#[derive(Debug)]
pub struct ImportResult {
    pub inserted: usize,
    pub fiscal_year: i32,
    pub sheets: usize,
    pub skipped_invalid: usize,
    pub anomalies: usize,
    pub previously_imported: bool,
}

/// Parse a workbook and persist its lines. There is no enclosing transaction:
/// a failure part way leaves the rows inserted so far in place.
pub fn import_workbook(
    conn: &Connection,
    bytes: &[u8],
    filename: &str,
    opts: &ImportOptions,
) -> Result<ImportResult> {
    let report = parse_workbook(bytes, &opts.parse)?;

    let year = opts
        .year
        .unwrap_or_else(|| infer_fiscal_year(filename, current_year()));
    let fiscal_year_id = resolve_fiscal_year(conn, year)?;

    let checksum = compute_checksum(bytes);
    let previously_imported = {
        let mut stmt = conn.prepare("SELECT 1 FROM imports WHERE checksum = ?1")?;
        stmt.exists(rusqlite::params![checksum])?
    };

    let inserted = upsert_lines(conn, &report.lines, fiscal_year_id, opts.default_task_name)?;

    conn.execute(
        "INSERT INTO imports (filename, fiscal_year_id, line_count, checksum) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![filename, fiscal_year_id, inserted as i64, checksum],
    )?;

    tracing::info!(
        filename,
        year,
        sheets = report.sheets,
        inserted,
        dropped = report.dropped,
        anomalies = report.anomalies,
        "import finished"
    );

    Ok(ImportResult {
        inserted,
        fiscal_year: year,
        sheets: report.sheets,
        skipped_invalid: report.dropped,
        anomalies: report.anomalies,
        previously_imported,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::db::{count_rows, get_connection, init_db};
    use crate::models::FiscalYear;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn line(activity: &str, task: Option<&str>, admin: Option<&str>, paragraph: &str) -> ParsedLine {
        ParsedLine {
            sheet: "PROGRAMME 118".into(),
            row: 1,
            program_code: "118".into(),
            program_name: "PROGRAMME 118".into(),
            action_code: "01".into(),
            action_name: "Action 01".into(),
            activity_code: activity.into(),
            activity_name: format!("Activité {activity}"),
            task_name: task.map(String::from),
            admin_code: admin.map(String::from),
            admin_name: admin.map(String::from),
            paragraph_code: paragraph.into(),
            paragraph_name: "Label".into(),
            ae: 1000.0,
            cp: 800.0,
            engaged: 500.0,
        }
    }

    fn two_line_workbook() -> Vec<u8> {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("PROGRAMME 118").unwrap();
        let header = ["Programme", "Activités", "Tâches", "", "Département", "Paragraphe Code", "Libellé", "AE", "CP", "Engagé"];
        for (col, text) in header.iter().enumerate() {
            if !text.is_empty() {
                ws.write_string(0, col as u16, *text).unwrap();
            }
        }
        ws.write_string(1, 1, "Activité X").unwrap();
        ws.write_string(1, 4, "DeptA").unwrap();
        ws.write_string(1, 5, "612024").unwrap();
        ws.write_string(1, 6, "Fournitures").unwrap();
        ws.write_number(1, 7, 1000.0).unwrap();
        ws.write_number(1, 8, 800.0).unwrap();
        ws.write_number(1, 9, 500.0).unwrap();
        ws.write_string(2, 5, "612025").unwrap();
        ws.write_string(2, 6, "Carburant").unwrap();
        ws.write_number(2, 7, 200.0).unwrap();
        ws.write_number(2, 8, 200.0).unwrap();
        ws.write_number(2, 9, 0.0).unwrap();
        wb.save_to_buffer().unwrap()
    }

    fn opts() -> ImportOptions<'static> {
        ImportOptions {
            parse: ParseOptions::default(),
            default_task_name: "Tâche par défaut",
            year: None,
        }
    }

    #[test]
    fn test_infer_fiscal_year() {
        assert_eq!(infer_fiscal_year("Budget_2024_final.xlsx", 2026), 2024);
        assert_eq!(infer_fiscal_year("budget.xlsx", 2026), 2026);
        assert_eq!(infer_fiscal_year("2023-budget.xlsx", 2026), 2023);
    }

    #[test]
    fn test_infer_fiscal_year_from_date_stamp() {
        assert_eq!(infer_fiscal_year("Budget_20240115.xlsx", 2026), 2024);
        assert_eq!(infer_fiscal_year("export-20251231-v2.xlsx", 2026), 2025);
        assert_eq!(infer_fiscal_year("ref192024.xlsx", 2026), 2024);
    }

    #[test]
    fn test_infer_fiscal_year_plausibility() {
        // Too far in the future, too old, or part of a longer number.
        assert_eq!(infer_fiscal_year("budget_2099.xlsx", 2026), 2026);
        assert_eq!(infer_fiscal_year("budget_1998.xlsx", 2026), 2026);
        assert_eq!(infer_fiscal_year("ref_120245.xlsx", 2026), 2024);
        assert_eq!(infer_fiscal_year("ref_1999.xlsx", 2026), 2026);
        assert_eq!(infer_fiscal_year("budget_2028.xlsx", 2026), 2028);
        // First plausible token wins.
        assert_eq!(infer_fiscal_year("v1999_2025_2024.xlsx", 2026), 2025);
    }

    #[test]
    fn test_resolve_fiscal_year_creates_once() {
        let (_dir, conn) = test_db();
        let a = resolve_fiscal_year(&conn, 2024).unwrap();
        let b = resolve_fiscal_year(&conn, 2024).unwrap();
        assert_eq!(a, b);
        assert_eq!(count_rows(&conn, "fiscal_years").unwrap(), 1);
        let fy = conn.find_fiscal_year(2024).unwrap().unwrap();
        assert!(fy.is_active);
        assert_eq!(fy.name, "Exercice 2024");

        // A second year does not steal the active flag.
        resolve_fiscal_year(&conn, 2025).unwrap();
        assert!(!conn.find_fiscal_year(2025).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_upsert_dedups_hierarchy() {
        let (_dir, conn) = test_db();
        let fy = resolve_fiscal_year(&conn, 2024).unwrap();
        let lines = vec![
            line("01", None, Some("DGS"), "612024"),
            line("01", None, Some("DGS"), "612025"),
            line("02", Some("Formation"), None, "612026"),
        ];
        let n = upsert_lines(&conn, &lines, fy, "Tâche par défaut").unwrap();
        assert_eq!(n, 3);
        assert_eq!(count_rows(&conn, "programs").unwrap(), 1);
        assert_eq!(count_rows(&conn, "actions").unwrap(), 1);
        assert_eq!(count_rows(&conn, "activities").unwrap(), 2);
        assert_eq!(count_rows(&conn, "tasks").unwrap(), 2);
        assert_eq!(count_rows(&conn, "admin_units").unwrap(), 1);
        assert_eq!(count_rows(&conn, "budget_lines").unwrap(), 3);

        let default_tasks: i64 = conn
            .query_row("SELECT count(*) FROM tasks WHERE name = 'Tâche par défaut'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(default_tasks, 1);
        let no_admin: i64 = conn
            .query_row("SELECT count(*) FROM budget_lines WHERE admin_unit_id IS NULL", [], |r| r.get(0))
            .unwrap();
        assert_eq!(no_admin, 1);
    }

    #[test]
    fn test_same_code_under_different_parents_is_distinct() {
        let (_dir, conn) = test_db();
        let fy = resolve_fiscal_year(&conn, 2024).unwrap();
        let mut other = line("01", None, None, "612024");
        other.program_code = "119".into();
        other.program_name = "PROGRAMME 119".into();
        upsert_lines(&conn, &[line("01", None, None, "612024"), other], fy, "T").unwrap();
        assert_eq!(count_rows(&conn, "programs").unwrap(), 2);
        assert_eq!(count_rows(&conn, "actions").unwrap(), 2);
        assert_eq!(count_rows(&conn, "activities").unwrap(), 2);
    }

    /// Wraps a connection and counts lookups and inserts per entity.
    struct CountingStore<'c> {
        inner: &'c Connection,
        finds: RefCell<HashMap<&'static str, usize>>,
        inserts: RefCell<HashMap<&'static str, usize>>,
    }

    impl<'c> CountingStore<'c> {
        fn new(inner: &'c Connection) -> Self {
            Self {
                inner,
                finds: RefCell::default(),
                inserts: RefCell::default(),
            }
        }
        fn found(&self, what: &'static str) {
            *self.finds.borrow_mut().entry(what).or_default() += 1;
        }
        fn inserted(&self, what: &'static str) {
            *self.inserts.borrow_mut().entry(what).or_default() += 1;
        }
    }

    impl BudgetStore for CountingStore<'_> {
        fn find_program(&self, code: &str) -> Result<Option<i64>> {
            self.found("program");
            self.inner.find_program(code)
        }
        fn insert_program(&self, code: &str, name: &str) -> Result<i64> {
            self.inserted("program");
            self.inner.insert_program(code, name)
        }
        fn find_action(&self, program_id: i64, code: &str) -> Result<Option<i64>> {
            self.found("action");
            self.inner.find_action(program_id, code)
        }
        fn insert_action(&self, program_id: i64, code: &str, name: &str) -> Result<i64> {
            self.inserted("action");
            self.inner.insert_action(program_id, code, name)
        }
        fn find_activity(&self, action_id: i64, code: &str) -> Result<Option<i64>> {
            self.found("activity");
            self.inner.find_activity(action_id, code)
        }
        fn insert_activity(&self, action_id: i64, code: &str, name: &str) -> Result<i64> {
            self.inserted("activity");
            self.inner.insert_activity(action_id, code, name)
        }
        fn find_task(&self, activity_id: i64, name: &str) -> Result<Option<i64>> {
            self.found("task");
            self.inner.find_task(activity_id, name)
        }
        fn insert_task(&self, activity_id: i64, name: &str, description: Option<&str>) -> Result<i64> {
            self.inserted("task");
            self.inner.insert_task(activity_id, name, description)
        }
        fn find_admin_unit(&self, code: &str) -> Result<Option<i64>> {
            self.found("admin_unit");
            self.inner.find_admin_unit(code)
        }
        fn insert_admin_unit(&self, code: &str, name: &str) -> Result<i64> {
            self.inserted("admin_unit");
            self.inner.insert_admin_unit(code, name)
        }
        fn find_fiscal_year(&self, year: i32) -> Result<Option<FiscalYear>> {
            self.inner.find_fiscal_year(year)
        }
        fn find_active_fiscal_year(&self) -> Result<Option<FiscalYear>> {
            self.inner.find_active_fiscal_year()
        }
        fn insert_fiscal_year(&self, year: i32, name: &str, is_active: bool) -> Result<i64> {
            self.inner.insert_fiscal_year(year, name, is_active)
        }
        fn insert_budget_line(&self, line: &NewBudgetLine) -> Result<i64> {
            self.inserted("budget_line");
            self.inner.insert_budget_line(line)
        }
    }

    #[test]
    fn test_cache_limits_round_trips() {
        let (_dir, conn) = test_db();
        let store = CountingStore::new(&conn);
        let fy = resolve_fiscal_year(&store, 2024).unwrap();
        let lines: Vec<ParsedLine> = (0..5)
            .map(|i| line("01", None, Some("DGS"), &format!("61202{i}")))
            .collect();
        upsert_lines(&store, &lines, fy, "Tâche par défaut").unwrap();

        let finds = store.finds.borrow();
        let inserts = store.inserts.borrow();
        for entity in ["program", "action", "activity", "task", "admin_unit"] {
            assert_eq!(finds.get(entity), Some(&1), "finds for {entity}");
            assert_eq!(inserts.get(entity), Some(&1), "inserts for {entity}");
        }
        assert_eq!(inserts.get("budget_line"), Some(&5));
    }

    #[test]
    fn test_import_workbook() {
        let (_dir, conn) = test_db();
        let bytes = two_line_workbook();
        let result = import_workbook(&conn, &bytes, "Budget_2024_final.xlsx", &opts()).unwrap();
        assert_eq!(result.inserted, 2);
        assert_eq!(result.fiscal_year, 2024);
        assert_eq!(result.sheets, 1);
        assert!(!result.previously_imported);

        let (paragraph, ae, admin, year): (String, f64, String, i32) = conn
            .query_row(
                "SELECT b.paragraph_code, b.ae, u.code, f.year FROM budget_lines b \
                 JOIN admin_units u ON b.admin_unit_id = u.id \
                 JOIN fiscal_years f ON b.fiscal_year_id = f.id ORDER BY b.id LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(paragraph, "612024");
        assert_eq!(ae, 1000.0);
        assert_eq!(admin, "DeptA");
        assert_eq!(year, 2024);
    }

    #[test]
    fn test_reimport_duplicates_lines_not_hierarchy() {
        let (_dir, conn) = test_db();
        let bytes = two_line_workbook();
        import_workbook(&conn, &bytes, "Budget_2024_final.xlsx", &opts()).unwrap();
        let second = import_workbook(&conn, &bytes, "Budget_2024_final.xlsx", &opts()).unwrap();
        assert_eq!(second.inserted, 2);
        assert!(second.previously_imported);

        assert_eq!(count_rows(&conn, "budget_lines").unwrap(), 4);
        for table in ["programs", "actions", "activities", "tasks", "admin_units", "fiscal_years"] {
            assert_eq!(count_rows(&conn, table).unwrap(), 1, "table {table}");
        }
        assert_eq!(count_rows(&conn, "imports").unwrap(), 2);
    }

    #[test]
    fn test_import_year_override() {
        let (_dir, conn) = test_db();
        let bytes = two_line_workbook();
        let opts = ImportOptions {
            year: Some(2022),
            ..opts()
        };
        let result = import_workbook(&conn, &bytes, "Budget_2024_final.xlsx", &opts).unwrap();
        assert_eq!(result.fiscal_year, 2022);
        assert!(conn.find_fiscal_year(2022).unwrap().is_some());
    }

    #[test]
    fn test_import_does_not_check_engaged_against_ae() {
        let (_dir, conn) = test_db();
        let fy = resolve_fiscal_year(&conn, 2024).unwrap();
        let mut over = line("01", None, None, "612024");
        over.engaged = over.ae * 3.0;
        assert_eq!(upsert_lines(&conn, &[over], fy, "T").unwrap(), 1);
    }

    #[test]
    fn test_import_rejects_unreadable_file() {
        let (_dir, conn) = test_db();
        assert!(import_workbook(&conn, b"garbage", "budget.xlsx", &opts()).is_err());
        assert_eq!(count_rows(&conn, "imports").unwrap(), 0);
    }
}
