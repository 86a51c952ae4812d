use comfy_table::{Cell, Table};

use crate::budget::{activate_fiscal_year, list_fiscal_years};
use crate::error::Result;
use super::open_db;

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let years = list_fiscal_years(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Year", "Name", "Active"]);
    for fy in years {
        table.add_row(vec![
            Cell::new(fy.id),
            Cell::new(fy.year),
            Cell::new(fy.name),
            Cell::new(if fy.is_active { "yes" } else { "" }),
        ]);
    }
    println!("Fiscal years\n{table}");
    Ok(())
}

pub fn activate(year: i32) -> Result<()> {
    let conn = open_db()?;
    activate_fiscal_year(&conn, year)?;
    println!("Fiscal year {year} is now active");
    Ok(())
}
