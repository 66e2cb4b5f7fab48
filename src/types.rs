use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

pub type DocId = u32;
pub type WindowIndex = u32;

/// One input file. `id` is its position in the ordered corpus list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub path: PathBuf,
    pub token_count: usize,
}

impl Document {
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Optional bibliographic data, keyed by basename in the metadata file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "year_from_string_or_number")]
    pub year: String,
    #[serde(default)]
    pub url: String,
}

/// Years appear in metadata files both as `"1850"` and as `1850`.
fn year_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawYear {
        Text(String),
        Integer(i64),
        Float(f64),
        Null(()),
    }

    Ok(match RawYear::deserialize(deserializer)? {
        RawYear::Text(s) => s.trim().to_string(),
        RawYear::Integer(n) => n.to_string(),
        RawYear::Float(n) if n.fract() == 0.0 => format!("{}", n as i64),
        RawYear::Float(n) => n.to_string(),
        RawYear::Null(()) => String::new(),
    })
}

/// Orders two year strings numerically when both are integers, else as text.
/// Empty years sort first.
pub fn compare_years(x: &str, y: &str) -> Ordering {
    match (x.trim().parse::<i64>(), y.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => x.cmp(y),
    }
}

/// A `(doc, window)` node, rendered as `doc.window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId {
    pub doc_id: DocId,
    pub window: WindowIndex,
}

impl WindowId {
    pub fn new(doc_id: DocId, window: WindowIndex) -> Self {
        Self { doc_id, window }
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.doc_id, self.window)
    }
}

/// One occurrence of a hashband key in a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashbandRow {
    pub band: String,
    pub doc_id: DocId,
    pub window: WindowIndex,
}

/// Two windows from different documents sharing a hashband.
///
/// Always stored with `doc_a < doc_b`; build through [`CandidatePair::canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatePair {
    pub doc_a: DocId,
    pub doc_b: DocId,
    pub window_a: WindowIndex,
    pub window_b: WindowIndex,
}

impl CandidatePair {
    /// Orders the two sides by document id. Returns `None` for same-document pairs.
    pub fn canonical(x: WindowId, y: WindowId) -> Option<Self> {
        if x.doc_id == y.doc_id {
            return None;
        }
        let (a, b) = if x.doc_id < y.doc_id { (x, y) } else { (y, x) };
        Some(Self {
            doc_a: a.doc_id,
            doc_b: b.doc_id,
            window_a: a.window,
            window_b: b.window,
        })
    }

    pub fn doc_pair(&self) -> DocPair {
        DocPair { doc_a: self.doc_a, doc_b: self.doc_b }
    }

    pub fn side_a(&self) -> WindowId {
        WindowId::new(self.doc_a, self.window_a)
    }

    pub fn side_b(&self) -> WindowId {
        WindowId::new(self.doc_b, self.window_b)
    }
}

/// A canonical document pair, `doc_a < doc_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPair {
    pub doc_a: DocId,
    pub doc_b: DocId,
}

/// A candidate pair confirmed by exact scoring. `similarity` is in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatedMatch {
    pub pair: CandidatePair,
    pub similarity: u8,
}

/// A passage-level match: contiguous windows on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub doc_a: DocId,
    pub doc_b: DocId,
    pub windows_a: Vec<WindowIndex>,
    pub windows_b: Vec<WindowIndex>,
    pub mean_similarity: f64,
}

/// A cluster oriented source → target with text and metadata, ready for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub similarity: f64,
    pub source_file_id: DocId,
    pub target_file_id: DocId,
    pub source_segment_ids: Vec<WindowIndex>,
    pub target_segment_ids: Vec<WindowIndex>,
    pub source_filename: String,
    pub target_filename: String,
    pub source_file_path: String,
    pub target_file_path: String,
    pub source_prematch: String,
    pub target_prematch: String,
    pub source_match: String,
    pub target_match: String,
    pub source_postmatch: String,
    pub target_postmatch: String,
    pub source_year: String,
    pub target_year: String,
    pub source_author: String,
    pub target_author: String,
    pub source_title: String,
    pub target_title: String,
    pub source_url: String,
    pub target_url: String,
}
