//! Resolving clusters into source/target match records and writing the
//! per-document, index, statistics and manifest JSON files.

pub mod stats;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use crate::config::NazirConfig;
use crate::corpus::Corpus;
use crate::error::Result;
use crate::types::{compare_years, Cluster, DocId, MatchRecord, WindowIndex};
use crate::window::Windower;

pub use stats::CorpusStats;

/// Text around and inside a run of windows, in original case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchStrings {
    pub prematch: String,
    pub matched: String,
    pub postmatch: String,
}

pub struct MatchFormatter<'a> {
    corpus: &'a Corpus,
    windower: &'a Windower,
    same_author_matches: bool,
}

impl<'a> MatchFormatter<'a> {
    pub fn new(corpus: &'a Corpus, windower: &'a Windower, same_author_matches: bool) -> Self {
        Self { corpus, windower, same_author_matches }
    }

    /// Whether `x` is the source of a match between `x` and `y`: the earlier
    /// year wins, then the lexicographically smaller path.
    pub fn is_source(&self, x: DocId, y: DocId) -> bool {
        let (year_x, year_y) = (self.corpus.metadata(x).year, self.corpus.metadata(y).year);
        if !year_x.is_empty() && !year_y.is_empty() && year_x != year_y {
            return compare_years(&year_x, &year_y) == Ordering::Less;
        }
        let path = |id| self.corpus.document(id).map(|d| d.path.clone()).unwrap_or_default();
        path(x) <= path(y)
    }

    pub fn match_strings(&self, tokens: &[String], windows: &[WindowIndex]) -> MatchStrings {
        let (Some(&first), Some(&last)) = (windows.first(), windows.last()) else {
            return MatchStrings::default();
        };
        let span = self.windower.token_span(first, last, tokens.len());
        let context = self.windower.window_length();
        let pre_start = span.start.saturating_sub(context);
        let post_end = (span.end + context).min(tokens.len());
        MatchStrings {
            prematch: tokens[pre_start..span.start].join(" "),
            matched: tokens[span.clone()].join(" "),
            postmatch: tokens[span.end..post_end].join(" "),
        }
    }

    /// Records for one document pair's clusters. Empty when both documents
    /// share an author and same-author matches are disabled.
    pub fn format(&self, clusters: &[Cluster]) -> Vec<MatchRecord> {
        let Some(first) = clusters.first() else {
            return Vec::new();
        };
        let a_is_source = self.is_source(first.doc_a, first.doc_b);
        let (source, target) = if a_is_source { (first.doc_a, first.doc_b) } else { (first.doc_b, first.doc_a) };
        let (Some(source_doc), Some(target_doc)) = (self.corpus.document(source), self.corpus.document(target))
        else {
            return Vec::new();
        };
        let source_meta = self.corpus.metadata(source);
        let target_meta = self.corpus.metadata(target);
        if !self.same_author_matches && !source_meta.author.is_empty() && source_meta.author == target_meta.author {
            debug!("Skipping same-author pair {} / {}", source, target);
            return Vec::new();
        }

        let source_tokens = self.windower.tokens(&source_doc.path);
        let target_tokens = self.windower.tokens(&target_doc.path);

        clusters
            .iter()
            .map(|c| {
                let (source_ids, target_ids) = if a_is_source {
                    (c.windows_a.clone(), c.windows_b.clone())
                } else {
                    (c.windows_b.clone(), c.windows_a.clone())
                };
                let s = self.match_strings(&source_tokens, &source_ids);
                let t = self.match_strings(&target_tokens, &target_ids);
                MatchRecord {
                    similarity: c.mean_similarity,
                    source_file_id: source,
                    target_file_id: target,
                    source_segment_ids: source_ids,
                    target_segment_ids: target_ids,
                    source_filename: source_doc.basename(),
                    target_filename: target_doc.basename(),
                    source_file_path: source_doc.path.to_string_lossy().into_owned(),
                    target_file_path: target_doc.path.to_string_lossy().into_owned(),
                    source_prematch: s.prematch,
                    target_prematch: t.prematch,
                    source_match: s.matched,
                    target_match: t.matched,
                    source_postmatch: s.postmatch,
                    target_postmatch: t.postmatch,
                    source_year: source_meta.year.clone(),
                    target_year: target_meta.year.clone(),
                    source_author: source_meta.author.clone(),
                    target_author: target_meta.author.clone(),
                    source_title: source_meta.title.clone(),
                    target_title: target_meta.title.clone(),
                    source_url: source_meta.url.clone(),
                    target_url: target_meta.url.clone(),
                }
            })
            .collect()
    }
}

/// Puts records in a stable order; record ids in the index files are positions in it.
pub fn sort_records(records: &mut [MatchRecord]) {
    records.sort_by(|x, y| {
        (x.source_file_id, x.target_file_id, &x.source_segment_ids, &x.target_segment_ids).cmp(&(
            y.source_file_id,
            y.target_file_id,
            &y.source_segment_ids,
            &y.target_segment_ids,
        ))
    });
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    file_id: DocId,
    filename: String,
    path: String,
    token_count: usize,
    author: String,
    title: String,
    year: String,
    url: String,
    excluded: bool,
}

pub struct OutputWriter<'a> {
    output_dir: &'a Path,
}

impl<'a> OutputWriter<'a> {
    pub fn new(output_dir: &'a Path) -> Self {
        Self { output_dir }
    }

    /// Writes every output file. `records` must already be sorted with [`sort_records`].
    pub fn write_all(&self, corpus: &Corpus, records: &[MatchRecord], config: &NazirConfig) -> Result<()> {
        self.write_match_files(corpus, records)?;
        self.write_indices(records)?;
        self.write_json("stats.json", &CorpusStats::from_records(corpus, records))?;
        self.write_manifest(corpus)?;
        self.write_json("config.json", config)?;
        info!("Wrote {} match records to {:?}", records.len(), self.output_dir);
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&self, relative: &str, value: &T) -> Result<()> {
        let path = self.output_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    }

    fn write_match_files(&self, corpus: &Corpus, records: &[MatchRecord]) -> Result<()> {
        let mut by_doc: BTreeMap<DocId, Vec<&MatchRecord>> = BTreeMap::new();
        for record in records {
            by_doc.entry(record.source_file_id).or_default().push(record);
            by_doc.entry(record.target_file_id).or_default().push(record);
        }
        for doc in &corpus.documents {
            if corpus.excluded.contains(&doc.id) {
                continue;
            }
            let matches = by_doc.remove(&doc.id).unwrap_or_default();
            self.write_json(&format!("matches/{}.json", doc.id), &matches)?;
        }
        Ok(())
    }

    fn write_indices(&self, records: &[MatchRecord]) -> Result<()> {
        let ids: Vec<usize> = (0..records.len()).collect();

        let mut by_similarity = ids.clone();
        by_similarity.sort_by(|&x, &y| {
            records[y]
                .similarity
                .partial_cmp(&records[x].similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.cmp(&y))
        });
        self.write_json("indices/match_ids_by_similarity.json", &by_similarity)?;

        let sorted_by = |key: fn(&MatchRecord) -> &str, cmp: fn(&str, &str) -> Ordering| {
            let mut sorted = ids.clone();
            sorted.sort_by(|&x, &y| cmp(key(&records[x]), key(&records[y])).then(x.cmp(&y)));
            sorted
        };
        let by_text: fn(&str, &str) -> Ordering = |a, b| a.cmp(b);
        self.write_json("indices/match_ids_by_author.json", &sorted_by(|r| r.source_author.as_str(), by_text))?;
        self.write_json("indices/match_ids_by_title.json", &sorted_by(|r| r.source_title.as_str(), by_text))?;
        self.write_json("indices/match_ids_by_year.json", &sorted_by(|r| r.source_year.as_str(), compare_years))?;
        Ok(())
    }

    fn write_manifest(&self, corpus: &Corpus) -> Result<()> {
        let entries: Vec<ManifestEntry> = corpus
            .documents
            .iter()
            .map(|doc| {
                let meta = corpus.metadata(doc.id);
                ManifestEntry {
                    file_id: doc.id,
                    filename: doc.basename(),
                    path: doc.path.to_string_lossy().into_owned(),
                    token_count: doc.token_count,
                    author: meta.author,
                    title: meta.title,
                    year: meta.year,
                    url: meta.url,
                    excluded: corpus.excluded.contains(&doc.id),
                }
            })
            .collect();
        self.write_json("manifest.json", &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::subsystems::WindowConfig;
    use crate::types::DocMetadata;
    use std::path::PathBuf;

    fn setup(dir: &Path) -> (Corpus, Windower) {
        let a = dir.join("a.txt");
        let b = dir.join("b.txt");
        let words = |prefix: &str| (0..30).map(|i| format!("{}{}", prefix, i)).collect::<Vec<_>>().join(" ");
        fs::write(&a, words("A")).unwrap();
        fs::write(&b, words("B")).unwrap();
        let mut meta = BTreeMap::new();
        meta.insert("a.txt".to_string(), DocMetadata { year: "1900".into(), author: "X".into(), ..Default::default() });
        meta.insert("b.txt".to_string(), DocMetadata { year: "1800".into(), author: "X".into(), ..Default::default() });
        let corpus = Corpus::from_paths(vec![a, b]).with_metadata(meta);
        let windower =
            Windower::new(&WindowConfig { window_length: 4, slide_length: 2, ..WindowConfig::default() }).unwrap();
        (corpus, windower)
    }

    fn cluster() -> Cluster {
        Cluster { doc_a: 0, doc_b: 1, windows_a: vec![2, 3], windows_b: vec![5], mean_similarity: 88.0 }
    }

    #[test]
    fn earlier_year_is_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let (corpus, windower) = setup(dir.path());
        let records = MatchFormatter::new(&corpus, &windower, true).format(&[cluster()]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!((r.source_file_id, r.target_file_id), (1, 0));
        assert_eq!(r.source_segment_ids, vec![5]);
        assert_eq!(r.target_segment_ids, vec![2, 3]);
        assert_eq!(r.source_year, "1800");
    }

    #[test]
    fn years_are_ordered_as_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let (corpus, windower) = setup(dir.path());
        let mut meta = BTreeMap::new();
        meta.insert("a.txt".to_string(), DocMetadata { year: "1200".into(), ..Default::default() });
        meta.insert("b.txt".to_string(), DocMetadata { year: "850".into(), ..Default::default() });
        let corpus = corpus.with_metadata(meta);

        let f = MatchFormatter::new(&corpus, &windower, true);
        assert!(f.is_source(1, 0));
        assert!(!f.is_source(0, 1));

        let mut records = f.format(&[cluster()]);
        assert_eq!(records[0].source_year, "850");
        let mut later = records[0].clone();
        later.source_year = "1200".to_string();
        later.similarity = 99.0;
        records.insert(0, later);
        let out = dir.path().join("out");
        OutputWriter::new(&out).write_all(&corpus, &records, &NazirConfig::default()).unwrap();
        let by_year: Vec<usize> =
            serde_json::from_str(&fs::read_to_string(out.join("indices/match_ids_by_year.json")).unwrap()).unwrap();
        assert_eq!(by_year, vec![1, 0]);
    }

    #[test]
    fn match_strings_cover_window_run_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let (corpus, windower) = setup(dir.path());
        let records = MatchFormatter::new(&corpus, &windower, true).format(&[cluster()]);
        let r = &records[0];
        // windows 2..=3 with w=4, s=2 span tokens 4..10
        assert_eq!(r.target_match, "A4 A5 A6 A7 A8 A9");
        assert_eq!(r.target_prematch, "A0 A1 A2 A3");
        assert_eq!(r.target_postmatch, "A10 A11 A12 A13");
    }

    #[test]
    fn same_author_pairs_can_be_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let (corpus, windower) = setup(dir.path());
        assert!(MatchFormatter::new(&corpus, &windower, false).format(&[cluster()]).is_empty());
    }

    #[test]
    fn missing_years_fall_back_to_path_order() {
        let corpus = Corpus::from_paths(vec![PathBuf::from("/z.txt"), PathBuf::from("/a.txt")]);
        let windower = Windower::new(&WindowConfig::default()).unwrap();
        let f = MatchFormatter::new(&corpus, &windower, true);
        assert!(f.is_source(1, 0));
        assert!(!f.is_source(0, 1));
    }

    #[test]
    fn writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let (corpus, windower) = setup(dir.path());
        let mut records = MatchFormatter::new(&corpus, &windower, true).format(&[cluster()]);
        sort_records(&mut records);
        let out = dir.path().join("out");
        OutputWriter::new(&out).write_all(&corpus, &records, &NazirConfig::default()).unwrap();

        for file in ["matches/0.json", "matches/1.json", "indices/match_ids_by_similarity.json", "stats.json", "manifest.json", "config.json"] {
            assert!(out.join(file).exists(), "{}", file);
        }
        let doc0: Vec<MatchRecord> =
            serde_json::from_str(&fs::read_to_string(out.join("matches/0.json")).unwrap()).unwrap();
        assert_eq!(doc0.len(), 1);
    }
}
