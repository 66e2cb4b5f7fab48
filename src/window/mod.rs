//! Splitting token streams into overlapping fixed-length windows.
//!
//! Window `i` covers tokens `[i * slide_length, i * slide_length + window_length)`.
//! Window text is never persisted; it is re-derived from the token stream,
//! which is kept in a bounded LRU keyed by document path.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use lru::LruCache;
use parking_lot::Mutex;

use crate::config::subsystems::WindowConfig;
use crate::error::Result;
use crate::parser::DocumentReader;
use crate::types::WindowIndex;

pub type Tokens = Arc<Vec<String>>;

pub struct Windower {
    window_length: usize,
    slide_length: usize,
    reader: DocumentReader,
    cache: Mutex<LruCache<PathBuf, Tokens>>,
}

impl std::fmt::Debug for Windower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Windower")
            .field("window_length", &self.window_length)
            .field("slide_length", &self.slide_length)
            .field("cached_documents", &self.cache.lock().len())
            .finish()
    }
}

impl Windower {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.token_cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            window_length: config.window_length,
            slide_length: config.slide_length,
            reader: DocumentReader::new(config)?,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Token stream of a document. An unreadable document yields no tokens.
    pub fn tokens(&self, path: &Path) -> Tokens {
        if let Some(tokens) = self.cache.lock().get(path) {
            return Arc::clone(tokens);
        }

        let tokens = match self.reader.read_tokens(path) {
            Ok(tokens) => Arc::new(tokens),
            Err(e) => {
                warn!("Could not read {:?}, treating it as empty: {}", path, e);
                Arc::new(Vec::new())
            }
        };

        // Another worker may have loaded the same path meanwhile; either copy is identical.
        self.cache.lock().put(path.to_path_buf(), Arc::clone(&tokens));
        debug!("Loaded {} tokens for {:?}", tokens.len(), path);
        tokens
    }

    pub fn window_count(&self, token_count: usize) -> usize {
        if token_count < self.window_length {
            0
        } else {
            (token_count - self.window_length) / self.slide_length + 1
        }
    }

    /// Token range covered by windows `first..=last`, clipped to the stream.
    pub fn token_span(&self, first: WindowIndex, last: WindowIndex, token_count: usize) -> Range<usize> {
        let start = (first as usize * self.slide_length).min(token_count);
        let end = (last as usize * self.slide_length + self.window_length).min(token_count);
        start..end.max(start)
    }

    /// Lower-cased text of one window, or `None` when the index is out of bounds.
    pub fn window_text(&self, tokens: &[String], index: WindowIndex) -> Option<String> {
        if (index as usize) >= self.window_count(tokens.len()) {
            return None;
        }
        let start = index as usize * self.slide_length;
        Some(tokens[start..start + self.window_length].join(" ").to_lowercase())
    }

    /// Lower-cased text of every window in order.
    pub fn windows<'a>(&'a self, tokens: &'a [String]) -> impl Iterator<Item = String> + 'a {
        (0..self.window_count(tokens.len()))
            .map(move |i| {
                let start = i * self.slide_length;
                tokens[start..start + self.window_length].join(" ").to_lowercase()
            })
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }
}
