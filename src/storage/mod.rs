// storage/mod.rs

pub mod flatfile;
pub mod metrics;
pub mod retry;
pub mod sqlite;

use std::sync::Arc;
use log::info;

use crate::config::subsystems::storage::{StorageBackendKind, StorageConfig};
use crate::error::Result;
use crate::types::{CandidatePair, DocPair, HashbandRow, ValidatedMatch};

pub use flatfile::FlatFileStore;
pub use metrics::{StorageMetrics, StorageMetricsStats};
pub use retry::RetryPolicy;
pub use sqlite::SqliteStore;

/// Callback receiving streamed rows one at a time. Returning an error stops the stream.
pub type Visitor<'a, T> = dyn FnMut(T) -> Result<()> + 'a;

/// Predicate selecting matches to delete.
pub type MatchPredicate<'a> = dyn Fn(&ValidatedMatch) -> bool + Sync + 'a;

/// The three append-only tables of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Hashbands,
    Candidates,
    Matches,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Hashbands, Table::Candidates, Table::Matches];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Hashbands => "hashbands",
            Table::Candidates => "candidates",
            Table::Matches => "matches",
        }
    }
}

/// Persistence for the Hashband, Candidate and Match tables.
///
/// Appends are de-duplicating: a row already present is silently ignored,
/// either on insert or when a stage's fragments are combined. Streams deliver
/// rows in key order and never repeat a row. Implementations are shared by
/// all workers of a stage, so every method takes `&self`.
pub trait MatchStore: Send + Sync {
    fn backend(&self) -> StorageBackendKind;

    /// Drops every row of every table.
    fn clear(&self) -> Result<()>;

    fn append_hashbands(&self, rows: &[HashbandRow]) -> Result<()>;

    fn append_candidates(&self, rows: &[CandidatePair]) -> Result<()>;

    fn append_matches(&self, rows: &[ValidatedMatch]) -> Result<()>;

    /// Band-key prefixes that partition the Hashband table into disjoint work units.
    fn hashband_partitions(&self) -> Result<Vec<String>>;

    /// Streams one partition of the Hashband table sorted by band key, then doc, then window.
    ///
    /// Backends may omit bands seen in only one document.
    fn stream_hashbands_sorted(&self, partition: &str, visit: &mut Visitor<'_, HashbandRow>) -> Result<()>;

    /// Distinct document pairs with at least one row in `table` (Candidates or Matches).
    fn doc_pairs(&self, table: Table) -> Result<Vec<DocPair>>;

    /// Streams the candidates of one document pair, sorted by window.
    fn stream_candidates(&self, pair: DocPair, visit: &mut Visitor<'_, CandidatePair>) -> Result<()>;

    /// Streams the validated matches of one document pair, sorted by window.
    fn stream_matches(&self, pair: DocPair, visit: &mut Visitor<'_, ValidatedMatch>) -> Result<()>;

    /// Streams every validated match.
    fn stream_all_matches(&self, visit: &mut Visitor<'_, ValidatedMatch>) -> Result<()>;

    /// Deletes the matches selected by `predicate`; returns how many were removed.
    fn delete_matches(&self, predicate: &MatchPredicate<'_>) -> Result<usize>;

    /// Called once a stage has written all of `table` (after any host barrier).
    ///
    /// The flat-file backend merges per-writer fragments here.
    fn finish_stage(&self, table: Table) -> Result<()>;

    fn count(&self, table: Table) -> Result<u64>;

    fn metrics(&self) -> &StorageMetrics;
}

/// Opens the configured backend under `db_path`. `writer_id` disambiguates
/// fragments written by different hosts sharing one flat-file tree.
pub fn create_store(config: &StorageConfig, writer_id: usize) -> Result<Arc<dyn MatchStore>> {
    let store: Arc<dyn MatchStore> = match config.backend {
        StorageBackendKind::Sqlite => Arc::new(SqliteStore::open(&config.db_path, config)?),
        StorageBackendKind::FlatFile => {
            Arc::new(FlatFileStore::open(&config.db_path, config, writer_id)?)
        }
    };
    info!("Opened {} store at {:?}", config.backend.as_str(), config.db_path);
    Ok(store)
}

/// Collects a pair's candidates into memory.
pub fn collect_candidates(store: &dyn MatchStore, pair: DocPair) -> Result<Vec<CandidatePair>> {
    let mut rows = Vec::new();
    store.stream_candidates(pair, &mut |row| {
        rows.push(row);
        Ok(())
    })?;
    Ok(rows)
}

/// Collects a pair's validated matches into memory.
pub fn collect_matches(store: &dyn MatchStore, pair: DocPair) -> Result<Vec<ValidatedMatch>> {
    let mut rows = Vec::new();
    store.stream_matches(pair, &mut |row| {
        rows.push(row);
        Ok(())
    })?;
    Ok(rows)
}
