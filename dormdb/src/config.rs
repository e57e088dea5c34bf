//! Process configuration.
//!
//! Loaded once from a YAML file and passed explicitly into the
//! operations that need it; nothing here is ambient process state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::export::ExportFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite database file.
    pub database: PathBuf,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory snapshot files are written into.
    pub dir: PathBuf,
    pub format: ExportFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: PathBuf::from("dorm.db"),
            export: ExportConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            dir: PathBuf::from("export"),
            format: ExportFormat::Csv,
        }
    }
}

impl Config {
    /// Read configuration from a YAML file. A missing file yields the
    /// defaults; a present but malformed file is an error.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}
