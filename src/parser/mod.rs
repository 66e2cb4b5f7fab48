//! Turning input files into token streams.

use lazy_static::lazy_static;
use log::trace;
use regex::Regex;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::subsystems::window::{TextEncoding, WindowConfig};

lazy_static! {
    static ref XML_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Invalid text: {0}")]
    InvalidText(String),

    #[error("Element <{0}> not found")]
    MissingElement(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

/// Reads documents with the configured encoding and optional element extraction,
/// and splits them into whitespace tokens.
#[derive(Debug, Clone)]
pub struct DocumentReader {
    encoding: TextEncoding,
    xml_tag: Option<(String, Regex)>,
}

impl DocumentReader {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let xml_tag = match &config.xml_tag {
            Some(tag) => {
                let tag_pattern = regex::escape(tag);
                let element = Regex::new(&format!(
                    r"(?s)<{tag}(?:\s[^>]*)?>(.*?)</{tag}\s*>",
                    tag = tag_pattern
                ))?;
                Some((tag.clone(), element))
            }
            None => None,
        };
        Ok(Self { encoding: config.encoding, xml_tag })
    }

    /// Reads a file and returns its tokens in original case.
    pub fn read_tokens(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = fs::read(path)?;
        let text = self.decode(&bytes)?;
        let content = self.text_content(&text)?;
        let tokens = tokenize(&content);
        trace!("Read {} tokens from {:?}", tokens.len(), path);
        Ok(tokens)
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self.encoding {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| ParserError::InvalidText(format!("not valid UTF-8: {}", e))),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Restricts the text to the configured element, with markup removed.
    pub fn text_content(&self, text: &str) -> Result<String> {
        let Some((tag, element)) = &self.xml_tag else {
            return Ok(text.to_string());
        };
        let inner = element
            .captures(text)
            .and_then(|c| c.get(1))
            .ok_or_else(|| ParserError::MissingElement(tag.clone()))?;
        let stripped = XML_TAG.replace_all(inner.as_str(), " ");
        Ok(decode_entities(&stripped))
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
