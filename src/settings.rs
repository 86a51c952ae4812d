use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BudgetError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// How many rows from the top of a sheet are searched for the header row.
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,
    /// Lines with engaged > ae * ratio are reported as anomalies.
    #[serde(default = "default_anomaly_ratio")]
    pub anomaly_ratio: f64,
    #[serde(default = "default_task_name")]
    pub default_task_name: String,
}

fn default_header_scan_rows() -> usize {
    50
}

fn default_anomaly_ratio() -> f64 {
    1.5
}

fn default_task_name() -> String {
    "Tâche par défaut".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            header_scan_rows: default_header_scan_rows(),
            anomaly_ratio: default_anomaly_ratio(),
            default_task_name: default_task_name(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("budgetdesk")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("budgetdesk")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| BudgetError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn db_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("budgetdesk.db")
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
