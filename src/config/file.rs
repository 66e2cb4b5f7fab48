// src/config/file.rs

use serde::{Serialize, Deserialize};
use std::path::PathBuf;
use crate::error::{Error, Result};
use super::FromIni;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub input_dir: PathBuf,
    pub extension: String,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub banish_list: Option<PathBuf>,
    pub exclude_list: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/texts"),
            extension: "txt".to_string(),
            output_dir: PathBuf::from("data/output"),
            cache_dir: PathBuf::from("data/cache"),
            metadata_path: None,
            banish_list: None,
            exclude_list: None,
        }
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    let value = value.trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

impl FromIni for FileConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        match key {
            "input_dir" => self.input_dir = PathBuf::from(value.trim_matches('"')),
            "extension" => {
                self.extension = value.trim_matches('"').trim_start_matches('.').to_string()
            }
            "output_dir" => self.output_dir = PathBuf::from(value.trim_matches('"')),
            "cache_dir" => self.cache_dir = PathBuf::from(value.trim_matches('"')),
            "metadata_path" => self.metadata_path = optional_path(value),
            "banish_list" => self.banish_list = optional_path(value),
            "exclude_list" => self.exclude_list = optional_path(value),
            _ => return None,
        }
        Some(Ok(()))
    }
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() {
            return Err(Error::config("extension must not be empty"));
        }
        for (name, path) in [
            ("metadata_path", &self.metadata_path),
            ("banish_list", &self.banish_list),
            ("exclude_list", &self.exclude_list),
        ] {
            if let Some(path) = path {
                if !path.exists() {
                    return Err(Error::config(format!("{} does not exist: {:?}", name, path)));
                }
            }
        }
        Ok(())
    }

    /// Creates the directories the pipeline writes to.
    pub fn prepare_dirs(&self) -> Result<()> {
        if !self.input_dir.is_dir() {
            return Err(Error::config(format!(
                "Input directory does not exist: {:?}",
                self.input_dir
            )));
        }
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}
