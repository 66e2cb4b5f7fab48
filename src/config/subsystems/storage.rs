// src/config/subsystems/storage.rs

use serde::{Serialize, Deserialize};
use std::str::FromStr;
use std::path::PathBuf;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::config::{FromIni, parse_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageBackendKind {
    /// Embedded SQLite database file.
    Sqlite,
    /// Sharded line files under a directory tree.
    FlatFile,
}

impl StorageBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackendKind::Sqlite => "sqlite",
            StorageBackendKind::FlatFile => "flatfile",
        }
    }
}

impl FromStr for StorageBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "flatfile" | "flat_file" | "disk" => Ok(Self::FlatFile),
            _ => Err(Error::config(format!("Invalid backend (must be 'sqlite' or 'flatfile'): {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// Database file (sqlite) or root directory (flatfile).
    pub db_path: PathBuf,
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    /// Wipe the tables before the first stage.
    pub from_scratch: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Sqlite,
            db_path: PathBuf::from("data/db"),
            retry_attempts: 5,
            retry_base_delay_ms: 10,
            from_scratch: true,
        }
    }
}

impl FromIni for StorageConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        let result = match key {
            "backend" => value.parse::<StorageBackendKind>().map(|v| self.backend = v),
            "db_path" => {
                self.db_path = PathBuf::from(value.trim_matches('"'));
                Ok(())
            }
            "retry_attempts" => parse_value(key, value).map(|v| self.retry_attempts = v),
            "retry_base_delay_ms" => parse_value(key, value).map(|v| self.retry_base_delay_ms = v),
            "from_scratch" => parse_value(key, value).map(|v| self.from_scratch = v),
            _ => return None,
        };
        Some(result)
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(Error::config("retry_attempts must be > 0"));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::config("db_path must not be empty"));
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
