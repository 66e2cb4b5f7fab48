// src/config/subsystems/window.rs

use serde::{Serialize, Deserialize};
use std::str::FromStr;
use crate::error::{Error, Result};
use crate::config::{FromIni, parse_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Latin1 => "latin1",
        }
    }
}

impl FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_matches('"').to_lowercase().replace('-', "").as_str() {
            "utf8" => Ok(Self::Utf8),
            "latin1" | "iso88591" => Ok(Self::Latin1),
            _ => Err(Error::config(format!("Unsupported encoding: {}", s))),
        }
    }
}

/// Windowing and fingerprint parameters. Changing any field except
/// `token_cache_size` invalidates the fingerprint cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Tokens per window.
    pub window_length: usize,
    /// Tokens between the starts of consecutive windows.
    pub slide_length: usize,
    /// Characters per shingle.
    pub chargram_length: usize,
    /// Number of MinHash permutations, i.e. fingerprint length.
    pub permutations: usize,
    pub encoding: TextEncoding,
    /// When set, only the text inside this element is read.
    pub xml_tag: Option<String>,
    /// Documents whose token streams stay in the in-memory LRU.
    pub token_cache_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_length: 14,
            slide_length: 4,
            chargram_length: 3,
            permutations: 256,
            encoding: TextEncoding::Utf8,
            xml_tag: None,
            token_cache_size: 128,
        }
    }
}

impl FromIni for WindowConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        let result = match key {
            "window_length" => parse_value(key, value).map(|v| self.window_length = v),
            "slide_length" => parse_value(key, value).map(|v| self.slide_length = v),
            "chargram_length" => parse_value(key, value).map(|v| self.chargram_length = v),
            "permutations" => parse_value(key, value).map(|v| self.permutations = v),
            "token_cache_size" => parse_value(key, value).map(|v| self.token_cache_size = v),
            "encoding" => value.parse::<TextEncoding>().map(|v| self.encoding = v),
            "xml_tag" => {
                let tag = value.trim_matches('"');
                self.xml_tag = if tag.is_empty() { None } else { Some(tag.to_string()) };
                Ok(())
            }
            _ => return None,
        };
        Some(result)
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_length == 0 {
            return Err(Error::config("window_length must be > 0"));
        }
        if self.slide_length == 0 {
            return Err(Error::config("slide_length must be > 0"));
        }
        if self.chargram_length == 0 {
            return Err(Error::config("chargram_length must be > 0"));
        }
        if self.permutations == 0 {
            return Err(Error::config("permutations must be > 0"));
        }
        if self.token_cache_size == 0 {
            return Err(Error::config("token_cache_size must be > 0"));
        }
        if let Some(tag) = &self.xml_tag {
            if !tag.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':') {
                return Err(Error::config(format!("Invalid xml_tag: {}", tag)));
            }
        }
        Ok(())
    }
}
