// The ordered input set of a run and what is known about each document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use log::{info, warn};

use crate::config::file::FileConfig;
use crate::error::{Error, Result};
use crate::types::{DocId, DocMetadata, Document};

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub documents: Vec<Document>,
    metadata: BTreeMap<String, DocMetadata>,
    pub banished: AHashSet<DocId>,
    pub excluded: AHashSet<DocId>,
}

impl Corpus {
    /// Documents in the given order; `doc_id` is the position in `paths`.
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        let documents = paths
            .into_iter()
            .enumerate()
            .map(|(id, path)| Document { id: id as DocId, path, token_count: 0 })
            .collect();
        Self { documents, ..Self::default() }
    }

    /// Lists `input_dir` recursively for files with the configured extension,
    /// sorted by path, and loads the optional metadata, banish and exclude files.
    pub fn discover(files: &FileConfig) -> Result<Self> {
        let mut paths = Vec::new();
        collect_files(&files.input_dir, &files.extension, &mut paths)?;
        paths.sort();
        if paths.is_empty() {
            return Err(Error::config(format!(
                "no .{} files found under {:?}",
                files.extension, files.input_dir
            )));
        }

        let mut corpus = Self::from_paths(paths);
        if let Some(path) = &files.metadata_path {
            corpus.metadata = load_metadata(path)?;
        }
        if let Some(path) = &files.banish_list {
            corpus.banished = corpus.resolve_list(path)?;
        }
        if let Some(path) = &files.exclude_list {
            corpus.excluded = corpus.resolve_list(path)?;
        }
        info!(
            "Corpus: {} documents, {} with metadata, {} banished, {} excluded",
            corpus.documents.len(),
            corpus.documents.iter().filter(|d| corpus.metadata.contains_key(&d.basename())).count(),
            corpus.banished.len(),
            corpus.excluded.len()
        );
        Ok(corpus)
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, DocMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.documents.get(id as usize)
    }

    /// Metadata for a document, empty when none was supplied.
    pub fn metadata(&self, id: DocId) -> DocMetadata {
        self.document(id)
            .and_then(|doc| self.metadata.get(&doc.basename()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_token_count(&mut self, id: DocId, token_count: usize) {
        if let Some(doc) = self.documents.get_mut(id as usize) {
            doc.token_count = token_count;
        }
    }

    /// Document ids named in a list file, one basename or path per line.
    pub fn resolve_list(&self, list: &Path) -> Result<AHashSet<DocId>> {
        let content = fs::read_to_string(list)?;
        let mut ids = AHashSet::new();
        for entry in content.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let found: Vec<DocId> = self
                .documents
                .iter()
                .filter(|d| d.basename() == entry || d.path == Path::new(entry))
                .map(|d| d.id)
                .collect();
            if found.is_empty() {
                warn!("{:?} lists {:?}, which is not in the corpus", list, entry);
            }
            ids.extend(found);
        }
        Ok(ids)
    }
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
    Ok(())
}

fn load_metadata(path: &Path) -> Result<BTreeMap<String, DocMetadata>> {
    let content = fs::read_to_string(path)?;
    let metadata: BTreeMap<String, DocMetadata> = serde_json::from_str(&content)?;
    info!("Loaded metadata for {} files from {:?}", metadata.len(), path);
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_orders_files_and_resolves_lists() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("texts");
        fs::create_dir_all(input.join("nested")).unwrap();
        fs::write(input.join("b.txt"), "b").unwrap();
        fs::write(input.join("a.txt"), "a").unwrap();
        fs::write(input.join("nested").join("c.txt"), "c").unwrap();
        fs::write(input.join("skip.md"), "x").unwrap();

        let meta = dir.path().join("meta.json");
        fs::write(&meta, r#"{"b.txt": {"author": "Ibn X", "year": "1200"}}"#).unwrap();
        let banish = dir.path().join("banish.txt");
        fs::write(&banish, "c.txt\nmissing.txt\n").unwrap();

        let files = FileConfig {
            input_dir: input.clone(),
            metadata_path: Some(meta),
            banish_list: Some(banish),
            ..FileConfig::default()
        };
        let corpus = Corpus::discover(&files).unwrap();
        let names: Vec<String> = corpus.documents.iter().map(|d| d.basename()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(corpus.metadata(1).author, "Ibn X");
        assert_eq!(corpus.metadata(0), DocMetadata::default());
        assert!(corpus.banished.contains(&2));
        assert_eq!(corpus.banished.len(), 1);
    }

    #[test]
    fn numeric_years_in_metadata_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("texts");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.txt"), "a").unwrap();
        let meta = dir.path().join("meta.json");
        fs::write(&meta, r#"{"a.txt": {"title": "Kitab", "year": 1850}}"#).unwrap();

        let files = FileConfig { input_dir: input, metadata_path: Some(meta), ..FileConfig::default() };
        let corpus = Corpus::discover(&files).unwrap();
        assert_eq!(corpus.metadata(0).year, "1850");
        assert_eq!(corpus.metadata(0).title, "Kitab");
    }

    #[test]
    fn empty_input_dir_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileConfig { input_dir: dir.path().to_path_buf(), ..FileConfig::default() };
        assert!(Corpus::discover(&files).is_err());
    }
}
