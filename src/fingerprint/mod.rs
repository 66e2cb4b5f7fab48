// fingerprint/mod.rs

pub mod cache;
pub mod minhash;

pub use cache::{CachedFingerprints, FingerprintCache, FingerprintParams};
pub use minhash::{estimated_jaccard, Fingerprint, MinHasher};

use std::path::Path;
use log::{debug, warn};

use crate::config::subsystems::WindowConfig;
use crate::error::Result;
use crate::window::Windower;

/// Fingerprints of every window of one document, in window order.
#[derive(Debug, Clone)]
pub struct DocumentFingerprints {
    pub token_count: usize,
    pub fingerprints: Vec<Fingerprint>,
    pub from_cache: bool,
}

#[derive(Debug)]
pub struct FingerprintEngine {
    hasher: MinHasher,
    cache: Option<FingerprintCache>,
}

impl FingerprintEngine {
    pub fn new(config: &WindowConfig, cache_dir: Option<&Path>) -> Result<Self> {
        let cache = match cache_dir {
            Some(dir) => Some(FingerprintCache::new(dir, config)?),
            None => None,
        };
        Ok(Self { hasher: MinHasher::new(config), cache })
    }

    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    /// Fingerprints a document, reusing the on-disk cache when its entry matches.
    ///
    /// A failed cache write is logged and otherwise ignored.
    /// An entry is stale when the document's current token stream yields a
    /// different token or window count than the one cached.
    pub fn fingerprint_document(&self, windower: &Windower, path: &Path) -> DocumentFingerprints {
        let tokens = windower.tokens(path);
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.load(path)) {
            if cached.token_count == tokens.len()
                && cached.fingerprints.len() == windower.window_count(tokens.len())
            {
                return DocumentFingerprints {
                    token_count: cached.token_count,
                    fingerprints: cached.fingerprints,
                    from_cache: true,
                };
            }
            warn!("Cached fingerprints for {:?} are stale, recomputing", path);
        }

        let fingerprints: Vec<Fingerprint> = windower
            .windows(&tokens)
            .map(|text| self.hasher.fingerprint(&text))
            .collect();
        debug!("Computed {} fingerprints for {:?}", fingerprints.len(), path);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(path, tokens.len(), &fingerprints) {
                warn!("Could not cache fingerprints for {:?}: {}", path, e);
            }
        }

        DocumentFingerprints {
            token_count: tokens.len(),
            fingerprints,
            from_cache: false,
        }
    }
}
