use crate::db::{count_rows, get_connection};
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{db_path, get_data_dir};
use crate::store::BudgetStore;

pub fn run() -> Result<()> {
    let data_dir = get_data_dir();
    let db_file = db_path(&data_dir);

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_file.display());

    if !db_file.exists() {
        println!();
        println!("Database not found. Run `budgetdesk init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_file)?.len();
    println!("DB size:    {}", format_bytes(size));

    let conn = get_connection(&db_file)?;
    let active = conn.find_active_fiscal_year()?;
    println!(
        "Active FY:  {}",
        active.map_or("(none)".to_string(), |fy| fy.name)
    );

    println!();
    for (label, table) in [
        ("Programs", "programs"),
        ("Actions", "actions"),
        ("Activities", "activities"),
        ("Tasks", "tasks"),
        ("Admin units", "admin_units"),
        ("Budget lines", "budget_lines"),
        ("Imports", "imports"),
    ] {
        println!("{:<14} {}", format!("{label}:"), count_rows(&conn, table)?);
    }
    Ok(())
}
