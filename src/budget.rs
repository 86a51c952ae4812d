use rusqlite::{Connection, OptionalExtension};

use crate::error::{BudgetError, Result};
use crate::models::FiscalYear;

/// Update the engaged amount of one budget line. Unlike bulk import, this
/// path refuses to let engaged exceed the line's AE.
pub fn set_engaged(conn: &Connection, line_id: i64, engaged: f64) -> Result<()> {
    if engaged < 0.0 {
        return Err(BudgetError::NegativeAmount(engaged));
    }
    let ae: f64 = conn
        .query_row("SELECT ae FROM budget_lines WHERE id = ?1", [line_id], |r| r.get(0))
        .optional()?
        .ok_or(BudgetError::UnknownBudgetLine(line_id))?;
    if engaged > ae {
        return Err(BudgetError::EngagedExceedsAe { engaged, ae });
    }
    conn.execute(
        "UPDATE budget_lines SET engaged = ?1, updated_at = datetime('now') WHERE id = ?2",
        rusqlite::params![engaged, line_id],
    )?;
    Ok(())
}

pub fn list_fiscal_years(conn: &Connection) -> Result<Vec<FiscalYear>> {
    let mut stmt =
        conn.prepare("SELECT id, year, name, is_active FROM fiscal_years ORDER BY year")?;
    let years = stmt
        .query_map([], |row| {
            Ok(FiscalYear {
                id: row.get(0)?,
                year: row.get(1)?,
                name: row.get(2)?,
                is_active: row.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(years)
}

/// Make `year` the only active fiscal year.
pub fn activate_fiscal_year(conn: &Connection, year: i32) -> Result<()> {
    let exists = conn
        .prepare("SELECT 1 FROM fiscal_years WHERE year = ?1")?
        .exists([year])?;
    if !exists {
        return Err(BudgetError::UnknownFiscalYear(year));
    }
    conn.execute(
        "UPDATE fiscal_years SET is_active = CASE WHEN year = ?1 THEN 1 ELSE 0 END",
        [year],
    )?;
    Ok(())
}
