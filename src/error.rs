use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Unknown budget line: {0}")]
    UnknownBudgetLine(i64),

    #[error("Unknown fiscal year: {0}")]
    UnknownFiscalYear(i32),

    #[error("Engaged amount {engaged:.2} exceeds the authorized envelope (AE) of {ae:.2}")]
    EngagedExceedsAe { engaged: f64, ae: f64 },

    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(f64),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, BudgetError>;
