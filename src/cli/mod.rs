pub mod import;
pub mod init;
pub mod lines;
pub mod status;
pub mod years;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "budgetdesk", about = "Import budget spreadsheets into a normalized program/action/activity ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for budgetdesk data (default: ~/Documents/budgetdesk)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import an XLSX/XLS budget workbook.
    Import {
        /// Path to the workbook to import
        file: String,
        /// Fiscal year (default: inferred from the file name, else the current year)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show current database and row counts.
    Status,
    /// Manage fiscal years.
    Years {
        #[command(subcommand)]
        command: YearsCommands,
    },
    /// Update budget lines.
    Lines {
        #[command(subcommand)]
        command: LinesCommands,
    },
}

#[derive(Subcommand)]
pub enum YearsCommands {
    /// List fiscal years.
    List,
    /// Make a fiscal year the active one.
    Activate {
        /// Year, e.g. 2024
        year: i32,
    },
}

#[derive(Subcommand)]
pub enum LinesCommands {
    /// Set the engaged amount of a budget line (must not exceed its AE).
    Engage {
        /// Budget line ID
        id: i64,
        /// New engaged amount
        amount: f64,
    },
}

/// Open the configured database, creating the schema when missing.
pub fn open_db() -> crate::error::Result<rusqlite::Connection> {
    let conn = crate::db::get_connection(&crate::settings::db_path(&crate::settings::get_data_dir()))?;
    crate::db::init_db(&conn)?;
    Ok(conn)
}
