// src/config/subsystems/processor.rs

use serde::{Serialize, Deserialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::config::{FromIni, parse_value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Worker threads per stage; 0 means one per CPU.
    pub workers: usize,
    /// Rows buffered by the store writer before a flush.
    pub write_frequency: usize,

    // Multi-host rendezvous
    pub host_id: usize,
    pub host_count: usize,
    pub barrier_dir: Option<PathBuf>,
    /// Namespaces barrier markers under `barrier_dir/<run_id>`; unique per run.
    pub run_id: Option<String>,
    pub barrier_timeout_secs: u64,
    pub barrier_poll_ms: u64,

    pub show_progress: bool,
    pub log_level: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            write_frequency: 10_000,
            host_id: 0,
            host_count: 1,
            barrier_dir: None,
            run_id: None,
            barrier_timeout_secs: 3600,
            barrier_poll_ms: 500,
            show_progress: true,
            log_level: "info".to_string(),
        }
    }
}

impl FromIni for ProcessorConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        let result = match key {
            "workers" => parse_value(key, value).map(|v| self.workers = v),
            "write_frequency" => parse_value(key, value).map(|v| self.write_frequency = v),
            "host_id" => parse_value(key, value).map(|v| self.host_id = v),
            "host_count" => parse_value(key, value).map(|v| self.host_count = v),
            "barrier_dir" => {
                let dir = value.trim_matches('"');
                self.barrier_dir = if dir.is_empty() { None } else { Some(PathBuf::from(dir)) };
                Ok(())
            }
            "run_id" => {
                let id = value.trim_matches('"');
                self.run_id = if id.is_empty() { None } else { Some(id.to_string()) };
                Ok(())
            }
            "barrier_timeout_secs" => parse_value(key, value).map(|v| self.barrier_timeout_secs = v),
            "barrier_poll_ms" => parse_value(key, value).map(|v| self.barrier_poll_ms = v),
            "show_progress" => parse_value(key, value).map(|v| self.show_progress = v),
            "log_level" => {
                self.log_level = value.trim_matches('"').to_lowercase();
                Ok(())
            }
            _ => return None,
        };
        Some(result)
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.write_frequency == 0 {
            return Err(Error::config("write_frequency must be > 0"));
        }
        if self.host_count == 0 {
            return Err(Error::config("host_count must be > 0"));
        }
        if self.host_id >= self.host_count {
            return Err(Error::config(format!(
                "host_id {} must be less than host_count {}",
                self.host_id, self.host_count
            )));
        }
        if self.host_count > 1 && self.barrier_dir.is_none() {
            return Err(Error::config("barrier_dir is required when host_count > 1"));
        }
        if let Some(id) = &self.run_id {
            if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.') || id.starts_with('.') {
                return Err(Error::config(format!("Invalid run_id: {}", id)));
            }
        }
        if self.barrier_poll_ms == 0 {
            return Err(Error::config("barrier_poll_ms must be > 0"));
        }
        if !matches!(
            self.log_level.as_str(),
            "off" | "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(Error::config(format!("Invalid log_level: {}", self.log_level)));
        }
        Ok(())
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_secs(self.barrier_timeout_secs)
    }

    pub fn barrier_poll(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_ms)
    }

    pub fn is_multi_host(&self) -> bool {
        self.host_count > 1
    }

    /// Whether this host owns the `index`-th work unit of a stage.
    pub fn owns_unit(&self, index: usize) -> bool {
        index % self.host_count == self.host_id
    }
}
