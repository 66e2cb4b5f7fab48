// Aggregate match statistics per document and per author.

use std::collections::BTreeMap;
use serde::Serialize;

use crate::corpus::Corpus;
use crate::types::MatchRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleStats {
    pub count: usize,
    pub total_similarity: f64,
    pub mean_similarity: f64,
}

impl RoleStats {
    fn add(&mut self, similarity: f64) {
        self.count += 1;
        self.total_similarity += similarity;
        self.mean_similarity = self.total_similarity / self.count as f64;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityStats {
    pub as_source: RoleStats,
    pub as_target: RoleStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub documents: BTreeMap<String, EntityStats>,
    pub authors: BTreeMap<String, EntityStats>,
    pub total_matches: usize,
}

impl CorpusStats {
    /// Documents are keyed by file id; authorless documents are left out of `authors`.
    pub fn from_records(corpus: &Corpus, records: &[MatchRecord]) -> Self {
        let mut stats = Self { total_matches: records.len(), ..Self::default() };
        for doc in &corpus.documents {
            stats.documents.entry(doc.id.to_string()).or_default();
        }
        for r in records {
            stats.documents.entry(r.source_file_id.to_string()).or_default().as_source.add(r.similarity);
            stats.documents.entry(r.target_file_id.to_string()).or_default().as_target.add(r.similarity);
            if !r.source_author.is_empty() {
                stats.authors.entry(r.source_author.clone()).or_default().as_source.add(r.similarity);
            }
            if !r.target_author.is_empty() {
                stats.authors.entry(r.target_author.clone()).or_default().as_target.add(r.similarity);
            }
        }
        stats
    }
}
