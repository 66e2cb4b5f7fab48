pub mod file;
pub mod subsystems;

use serde::{Serialize, Deserialize};
use std::path::Path;
use std::fs;
use crate::error::Result;
use log::{warn, trace};

pub trait FromIni {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>>;
}

/// The full run configuration. Built once, validated, then passed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NazirConfig {
    // File paths
    pub files: file::FileConfig,

    // Subsystem configs
    pub window: subsystems::WindowConfig,
    pub index: subsystems::IndexConfig,
    pub matcher: subsystems::MatcherConfig,
    pub storage: subsystems::StorageConfig,
    pub processor: subsystems::ProcessorConfig,
}

impl NazirConfig {
    pub fn validate(&self) -> Result<()> {
        self.files.validate()?;
        self.window.validate()?;
        self.index.validate(&self.window)?;
        self.matcher.validate()?;
        self.storage.validate()?;
        self.processor.validate()?;
        Ok(())
    }

    pub fn from_ini<P: AsRef<Path>>(path: P) -> Result<Self> {
        trace!("Loading configuration from: {:?}", path.as_ref());

        let content = fs::read_to_string(&path)?;
        let config = Self::from_ini_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses INI text on top of the defaults without validating.
    pub fn from_ini_str(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                trace!("  Line {}: Found section: [{}]", line_num + 1, current_section);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring malformed config line {}: {}", line_num + 1, line);
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            let handled = match current_section.as_str() {
                "file" => config.files.from_ini_section(&current_section, key, value),
                "window" => config.window.from_ini_section(&current_section, key, value),
                "index" => config.index.from_ini_section(&current_section, key, value),
                "matcher" => config.matcher.from_ini_section(&current_section, key, value),
                "storage" => config.storage.from_ini_section(&current_section, key, value),
                "processor" => config.processor.from_ini_section(&current_section, key, value),
                _ => None,
            };

            match handled {
                // A bad value is fatal: the run must not start on a half-applied config.
                Some(result) => result?,
                None => warn!(
                    "Unrecognized config key: {}={} in section [{}]",
                    key, value, current_section
                ),
            }
        }

        Ok(config)
    }
}

/// Parses a value with `FromStr`, mapping failures to a config error naming the key.
pub(crate) fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim_matches('"')
        .parse::<T>()
        .map_err(|_| crate::error::Error::config(format!("Invalid {}: {}", key, value)))
}
