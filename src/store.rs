//! Persistence seam for the importer: find-by-natural-key and insert
//! operations for each hierarchy entity, fiscal years and budget lines.

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{FiscalYear, NewBudgetLine};

pub trait BudgetStore {
    fn find_program(&self, code: &str) -> Result<Option<i64>>;
    fn insert_program(&self, code: &str, name: &str) -> Result<i64>;

    fn find_action(&self, program_id: i64, code: &str) -> Result<Option<i64>>;
    fn insert_action(&self, program_id: i64, code: &str, name: &str) -> Result<i64>;

    fn find_activity(&self, action_id: i64, code: &str) -> Result<Option<i64>>;
    fn insert_activity(&self, action_id: i64, code: &str, name: &str) -> Result<i64>;

    fn find_task(&self, activity_id: i64, name: &str) -> Result<Option<i64>>;
    fn insert_task(&self, activity_id: i64, name: &str, description: Option<&str>) -> Result<i64>;

    fn find_admin_unit(&self, code: &str) -> Result<Option<i64>>;
    fn insert_admin_unit(&self, code: &str, name: &str) -> Result<i64>;

    fn find_fiscal_year(&self, year: i32) -> Result<Option<FiscalYear>>;
    fn find_active_fiscal_year(&self) -> Result<Option<FiscalYear>>;
    fn insert_fiscal_year(&self, year: i32, name: &str, is_active: bool) -> Result<i64>;

    fn insert_budget_line(&self, line: &NewBudgetLine) -> Result<i64>;
}

fn fiscal_year_from_row(row: &rusqlite::Row) -> rusqlite::Result<FiscalYear> {
    Ok(FiscalYear {
        id: row.get(0)?,
        year: row.get(1)?,
        name: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
    })
}

impl BudgetStore for Connection {
    fn find_program(&self, code: &str) -> Result<Option<i64>> {
        let mut stmt = self.prepare_cached("SELECT id FROM programs WHERE code = ?1")?;
        Ok(stmt.query_row([code], |r| r.get(0)).optional()?)
    }

    fn insert_program(&self, code: &str, name: &str) -> Result<i64> {
        self.execute(
            "INSERT INTO programs (code, name) VALUES (?1, ?2)",
            rusqlite::params![code, name],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn find_action(&self, program_id: i64, code: &str) -> Result<Option<i64>> {
        let mut stmt =
            self.prepare_cached("SELECT id FROM actions WHERE program_id = ?1 AND code = ?2")?;
        Ok(stmt
            .query_row(rusqlite::params![program_id, code], |r| r.get(0))
            .optional()?)
    }

    fn insert_action(&self, program_id: i64, code: &str, name: &str) -> Result<i64> {
        self.execute(
            "INSERT INTO actions (program_id, code, name) VALUES (?1, ?2, ?3)",
            rusqlite::params![program_id, code, name],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn find_activity(&self, action_id: i64, code: &str) -> Result<Option<i64>> {
        let mut stmt =
            self.prepare_cached("SELECT id FROM activities WHERE action_id = ?1 AND code = ?2")?;
        Ok(stmt
            .query_row(rusqlite::params![action_id, code], |r| r.get(0))
            .optional()?)
    }

    fn insert_activity(&self, action_id: i64, code: &str, name: &str) -> Result<i64> {
        self.execute(
            "INSERT INTO activities (action_id, code, name) VALUES (?1, ?2, ?3)",
            rusqlite::params![action_id, code, name],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn find_task(&self, activity_id: i64, name: &str) -> Result<Option<i64>> {
        let mut stmt =
            self.prepare_cached("SELECT id FROM tasks WHERE activity_id = ?1 AND name = ?2")?;
        Ok(stmt
            .query_row(rusqlite::params![activity_id, name], |r| r.get(0))
            .optional()?)
    }

    fn insert_task(&self, activity_id: i64, name: &str, description: Option<&str>) -> Result<i64> {
        self.execute(
            "INSERT INTO tasks (activity_id, name, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![activity_id, name, description],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn find_admin_unit(&self, code: &str) -> Result<Option<i64>> {
        let mut stmt = self.prepare_cached("SELECT id FROM admin_units WHERE code = ?1")?;
        Ok(stmt.query_row([code], |r| r.get(0)).optional()?)
    }

    fn insert_admin_unit(&self, code: &str, name: &str) -> Result<i64> {
        self.execute(
            "INSERT INTO admin_units (code, name) VALUES (?1, ?2)",
            rusqlite::params![code, name],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn find_fiscal_year(&self, year: i32) -> Result<Option<FiscalYear>> {
        let mut stmt = self.prepare_cached(
            "SELECT id, year, name, is_active FROM fiscal_years WHERE year = ?1",
        )?;
        Ok(stmt.query_row([year], fiscal_year_from_row).optional()?)
    }

    fn find_active_fiscal_year(&self) -> Result<Option<FiscalYear>> {
        let mut stmt = self.prepare_cached(
            "SELECT id, year, name, is_active FROM fiscal_years WHERE is_active = 1 ORDER BY year DESC LIMIT 1",
        )?;
        Ok(stmt.query_row([], fiscal_year_from_row).optional()?)
    }

    fn insert_fiscal_year(&self, year: i32, name: &str, is_active: bool) -> Result<i64> {
        self.execute(
            "INSERT INTO fiscal_years (year, name, is_active) VALUES (?1, ?2, ?3)",
            rusqlite::params![year, name, is_active as i32],
        )?;
        Ok(self.last_insert_rowid())
    }

    fn insert_budget_line(&self, line: &NewBudgetLine) -> Result<i64> {
        self.execute(
            "INSERT INTO budget_lines (task_id, admin_unit_id, fiscal_year_id, paragraph_code, paragraph_name, ae, cp, engaged) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                line.task_id,
                line.admin_unit_id,
                line.fiscal_year_id,
                line.paragraph_code,
                line.paragraph_name,
                line.ae,
                line.cp,
                line.engaged,
            ],
        )?;
        Ok(self.last_insert_rowid())
    }
}
