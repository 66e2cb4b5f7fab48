// Per-document fingerprint cache on disk.

use serde::{Serialize, Deserialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::subsystems::WindowConfig;
use crate::error::Result;
use super::minhash::Fingerprint;

/// The parameters a cached fingerprint file was computed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintParams {
    pub window_length: usize,
    pub slide_length: usize,
    pub chargram_length: usize,
    pub permutations: usize,
    pub encoding: String,
    pub xml_tag: Option<String>,
}

impl From<&WindowConfig> for FingerprintParams {
    fn from(config: &WindowConfig) -> Self {
        Self {
            window_length: config.window_length,
            slide_length: config.slide_length,
            chargram_length: config.chargram_length,
            permutations: config.permutations,
            encoding: config.encoding.as_str().to_string(),
            xml_tag: config.xml_tag.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFingerprints {
    pub params: FingerprintParams,
    pub source_path: PathBuf,
    pub token_count: usize,
    pub fingerprints: Vec<Fingerprint>,
}

#[derive(Debug, Clone)]
pub struct FingerprintCache {
    dir: PathBuf,
    params: FingerprintParams,
    params_key: String,
}

impl FingerprintCache {
    pub fn new<P: AsRef<Path>>(cache_dir: P, config: &WindowConfig) -> Result<Self> {
        let dir = cache_dir.as_ref().join("fingerprints");
        fs::create_dir_all(&dir)?;
        let params = FingerprintParams::from(config);
        let params_key = hex::encode(xxh3_64(&bincode::serialize(&params)?).to_be_bytes());
        Ok(Self { dir, params, params_key })
    }

    pub fn entry_path(&self, document: &Path) -> PathBuf {
        let path_key = hex::encode(xxh3_64(document.to_string_lossy().as_bytes()).to_be_bytes());
        self.dir.join(format!("{}-{}.bin", path_key, self.params_key))
    }

    /// Cached fingerprints for `document`, or `None` on a miss, a parameter
    /// mismatch or an unreadable entry.
    pub fn load(&self, document: &Path) -> Option<CachedFingerprints> {
        let entry = self.entry_path(document);
        let bytes = fs::read(&entry).ok()?;
        match bincode::deserialize::<CachedFingerprints>(&bytes) {
            Ok(cached) if cached.params == self.params && cached.source_path == document => {
                debug!("Fingerprint cache hit for {:?}", document);
                Some(cached)
            }
            Ok(_) => {
                debug!("Fingerprint cache entry {:?} does not match, ignoring", entry);
                None
            }
            Err(e) => {
                warn!("Corrupt fingerprint cache entry {:?}: {}", entry, e);
                None
            }
        }
    }

    /// Writes an entry through a temp file so readers never see a partial file.
    pub fn store(&self, document: &Path, token_count: usize, fingerprints: &[Fingerprint]) -> Result<()> {
        let cached = CachedFingerprints {
            params: self.params.clone(),
            source_path: document.to_path_buf(),
            token_count,
            fingerprints: fingerprints.to_vec(),
        };
        let entry = self.entry_path(document);
        let temp = entry.with_extension(format!("tmp{}", std::process::id()));
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&bincode::serialize(&cached)?)?;
            file.flush()?;
        }
        fs::rename(temp, entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_param_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = WindowConfig::default();
        let cache = FingerprintCache::new(dir.path(), &config).unwrap();
        let doc = Path::new("/corpus/a.txt");
        assert!(cache.load(doc).is_none());

        cache.store(doc, 30, &[vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        let cached = cache.load(doc).unwrap();
        assert_eq!(cached.token_count, 30);
        assert_eq!(cached.fingerprints.len(), 2);

        let other = FingerprintCache::new(
            dir.path(),
            &WindowConfig { permutations: 64, ..WindowConfig::default() },
        )
        .unwrap();
        assert!(other.load(doc).is_none());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path(), &WindowConfig::default()).unwrap();
        let doc = Path::new("/corpus/b.txt");
        fs::write(cache.entry_path(doc), b"not bincode").unwrap();
        assert!(cache.load(doc).is_none());
    }
}
