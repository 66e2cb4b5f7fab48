//! Flat-file backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! hashbands/<k0k1>/<k2k3>/<k0k1k2k3>#<writer>   band \t doc \t window
//! candidates/<doc_a>/<doc_b>#<writer>            window_a \t window_b
//! matches/<doc_a>/<doc_b>#<writer>               window_a \t window_b \t similarity
//! ```
//!
//! Each writer appends whole lines to its own fragment files, so two writers
//! never share a file. `finish_stage` merges fragments into the un-suffixed
//! file, sorting and de-duplicating; readers merge any fragments still present.

pub mod shard;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::subsystems::storage::{StorageBackendKind, StorageConfig};
use crate::error::{Error, Result};
use crate::index::hashband::PARTITION_PREFIX_LEN;
use crate::types::{CandidatePair, DocId, DocPair, HashbandRow, ValidatedMatch};
use super::{MatchPredicate, MatchStore, RetryPolicy, StorageMetrics, Table, Visitor};
use shard::{CandidateLine, MatchLine, ShardRecord};

const SHARD_KEY_LEN: usize = 4;

pub struct FlatFileStore {
    root: PathBuf,
    writer_id: usize,
    retry: RetryPolicy,
    metrics: StorageMetrics,
}

impl FlatFileStore {
    pub fn open(root: impl AsRef<Path>, config: &StorageConfig, writer_id: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for table in Table::ALL {
            fs::create_dir_all(root.join(table.name()))?;
        }
        info!("FlatFileStore initialized at {} (writer {})", root.display(), writer_id);
        Ok(Self {
            root,
            writer_id,
            retry: RetryPolicy::from_config(config),
            metrics: StorageMetrics::new(),
        })
    }

    fn table_dir(&self, table: Table) -> PathBuf {
        self.root.join(table.name())
    }

    fn hashband_dir(&self, band: &str) -> Result<PathBuf> {
        if band.len() < SHARD_KEY_LEN || !band.is_ascii() {
            return Err(Error::storage(format!("hashband key too short to shard: {:?}", band)));
        }
        Ok(self
            .table_dir(Table::Hashbands)
            .join(&band[..PARTITION_PREFIX_LEN])
            .join(&band[PARTITION_PREFIX_LEN..SHARD_KEY_LEN]))
    }

    fn pair_dir(&self, table: Table, doc_a: DocId) -> PathBuf {
        self.table_dir(table).join(doc_a.to_string())
    }

    /// Writes grouped lines to this writer's fragments, retrying transient I/O failures.
    fn append_grouped(&self, table: Table, grouped: BTreeMap<PathBuf, Vec<String>>, rows: usize) -> Result<()> {
        for (path, lines) in grouped {
            self.retry.run(&format!("append {}", table.name()), &self.metrics, || {
                shard::append_lines(&path, &lines)
            })?;
        }
        self.metrics.record_append(rows);
        Ok(())
    }

    fn pair_files(&self, table: Table, pair: DocPair) -> Result<Vec<PathBuf>> {
        let stem = pair.doc_b.to_string();
        Ok(shard::group_by_stem(&self.pair_dir(table, pair.doc_a))?
            .remove(&stem)
            .unwrap_or_default())
    }

    /// Leaf directories holding shard files of `table`.
    fn leaf_dirs(&self, table: Table) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for first in shard::list_dir(&self.table_dir(table))? {
            if !first.is_dir() {
                continue;
            }
            if table == Table::Hashbands {
                dirs.extend(shard::list_dir(&first)?.into_iter().filter(|p| p.is_dir()));
            } else {
                dirs.push(first);
            }
        }
        Ok(dirs)
    }

    fn read_matches(&self, pair: DocPair) -> Result<Vec<MatchLine>> {
        let files = self.pair_files(Table::Matches, pair)?;
        shard::read_records(&files)
    }
}

fn to_match(pair: DocPair, line: &MatchLine) -> ValidatedMatch {
    ValidatedMatch {
        pair: CandidatePair {
            doc_a: pair.doc_a,
            doc_b: pair.doc_b,
            window_a: line.window_a,
            window_b: line.window_b,
        },
        similarity: line.similarity,
    }
}

impl MatchStore for FlatFileStore {
    fn backend(&self) -> StorageBackendKind {
        StorageBackendKind::FlatFile
    }

    fn clear(&self) -> Result<()> {
        for table in Table::ALL {
            let dir = self.table_dir(table);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }
        debug!("Cleared shard tree at {}", self.root.display());
        Ok(())
    }

    fn append_hashbands(&self, rows: &[HashbandRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut grouped: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for row in rows {
            let dir = self.hashband_dir(&row.band)?;
            let file = shard::fragment_name(&row.band[..SHARD_KEY_LEN], self.writer_id);
            grouped
                .entry(dir.join(file))
                .or_default()
                .push(row.to_line());
        }
        self.append_grouped(Table::Hashbands, grouped, rows.len())
    }

    fn append_candidates(&self, rows: &[CandidatePair]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut grouped: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for row in rows {
            let file = shard::fragment_name(&row.doc_b.to_string(), self.writer_id);
            let line = CandidateLine { window_a: row.window_a, window_b: row.window_b };
            grouped
                .entry(self.pair_dir(Table::Candidates, row.doc_a).join(file))
                .or_default()
                .push(line.to_line());
        }
        self.append_grouped(Table::Candidates, grouped, rows.len())
    }

    fn append_matches(&self, rows: &[ValidatedMatch]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut grouped: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for row in rows {
            let p = &row.pair;
            let file = shard::fragment_name(&p.doc_b.to_string(), self.writer_id);
            let line = MatchLine { window_a: p.window_a, window_b: p.window_b, similarity: row.similarity };
            grouped
                .entry(self.pair_dir(Table::Matches, p.doc_a).join(file))
                .or_default()
                .push(line.to_line());
        }
        self.append_grouped(Table::Matches, grouped, rows.len())
    }

    fn hashband_partitions(&self) -> Result<Vec<String>> {
        Ok(shard::list_dir(&self.table_dir(Table::Hashbands))?
            .into_iter()
            .filter(|p| p.is_dir())
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect())
    }

    fn stream_hashbands_sorted(&self, partition: &str, visit: &mut Visitor<'_, HashbandRow>) -> Result<()> {
        let partition_dir = self.table_dir(Table::Hashbands).join(partition);
        let mut streamed = 0;
        for sub in shard::list_dir(&partition_dir)? {
            if !sub.is_dir() {
                continue;
            }
            // Stems are 4-character key prefixes, so per-stem order is global order.
            for (_, files) in shard::group_by_stem(&sub)? {
                for row in shard::read_records::<HashbandRow>(&files)? {
                    visit(row)?;
                    streamed += 1;
                }
            }
        }
        self.metrics.record_streamed(streamed);
        Ok(())
    }

    fn doc_pairs(&self, table: Table) -> Result<Vec<DocPair>> {
        if table == Table::Hashbands {
            return Err(Error::storage("hashbands are not keyed by document pair"));
        }
        let mut pairs = Vec::new();
        for dir in shard::list_dir(&self.table_dir(table))? {
            let Some(doc_a) = dir.file_name().and_then(|n| n.to_str()).and_then(|n| n.parse::<DocId>().ok())
            else {
                continue;
            };
            for stem in shard::group_by_stem(&dir)?.keys() {
                if let Ok(doc_b) = stem.parse::<DocId>() {
                    pairs.push(DocPair { doc_a, doc_b });
                }
            }
        }
        pairs.sort();
        Ok(pairs)
    }

    fn stream_candidates(&self, pair: DocPair, visit: &mut Visitor<'_, CandidatePair>) -> Result<()> {
        let files = self.pair_files(Table::Candidates, pair)?;
        let lines = shard::read_records::<CandidateLine>(&files)?;
        self.metrics.record_streamed(lines.len());
        for line in lines {
            visit(CandidatePair {
                doc_a: pair.doc_a,
                doc_b: pair.doc_b,
                window_a: line.window_a,
                window_b: line.window_b,
            })?;
        }
        Ok(())
    }

    fn stream_matches(&self, pair: DocPair, visit: &mut Visitor<'_, ValidatedMatch>) -> Result<()> {
        let lines = self.read_matches(pair)?;
        self.metrics.record_streamed(lines.len());
        for line in &lines {
            visit(to_match(pair, line))?;
        }
        Ok(())
    }

    fn stream_all_matches(&self, visit: &mut Visitor<'_, ValidatedMatch>) -> Result<()> {
        for pair in self.doc_pairs(Table::Matches)? {
            self.stream_matches(pair, visit)?;
        }
        Ok(())
    }

    fn delete_matches(&self, predicate: &MatchPredicate<'_>) -> Result<usize> {
        let mut removed = 0;
        for pair in self.doc_pairs(Table::Matches)? {
            let files = self.pair_files(Table::Matches, pair)?;
            let lines = shard::read_records::<MatchLine>(&files)?;
            let (doomed, kept): (Vec<MatchLine>, Vec<MatchLine>) =
                lines.into_iter().partition(|line| predicate(&to_match(pair, line)));
            if doomed.is_empty() {
                continue;
            }
            let target = self.pair_dir(Table::Matches, pair.doc_a).join(pair.doc_b.to_string());
            shard::write_records(&target, &kept)?;
            for file in files.iter().filter(|f| **f != target) {
                fs::remove_file(file)?;
            }
            removed += doomed.len();
        }
        self.metrics.record_deleted(removed);
        Ok(removed)
    }

    fn finish_stage(&self, table: Table) -> Result<()> {
        let mut combined = 0;
        for dir in self.leaf_dirs(table)? {
            combined += match table {
                Table::Hashbands => shard::combine_dir::<HashbandRow>(&dir)?,
                Table::Candidates => shard::combine_dir::<CandidateLine>(&dir)?,
                Table::Matches => shard::combine_dir::<MatchLine>(&dir)?,
            };
        }
        info!("Combined {} {} shard groups", combined, table.name());
        Ok(())
    }

    fn count(&self, table: Table) -> Result<u64> {
        let mut total = 0u64;
        for dir in self.leaf_dirs(table)? {
            for (_, files) in shard::group_by_stem(&dir)? {
                total += match table {
                    Table::Hashbands => shard::read_records::<HashbandRow>(&files)?.len(),
                    Table::Candidates => shard::read_records::<CandidateLine>(&files)?.len(),
                    Table::Matches => shard::read_records::<MatchLine>(&files)?.len(),
                } as u64;
            }
        }
        Ok(total)
    }

    fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path, writer_id: usize) -> FlatFileStore {
        FlatFileStore::open(root, &StorageConfig::default(), writer_id).unwrap()
    }

    fn band(prefix: &str) -> String {
        format!("{:0<32}", prefix)
    }

    #[test]
    fn writers_use_disjoint_fragments_that_combine() {
        let dir = tempfile::tempdir().unwrap();
        let w0 = store(dir.path(), 0);
        let w1 = store(dir.path(), 1);
        let pair = CandidatePair { doc_a: 0, doc_b: 3, window_a: 1, window_b: 2 };
        w0.append_candidates(&[pair]).unwrap();
        w1.append_candidates(&[pair, CandidatePair { window_a: 5, ..pair }]).unwrap();

        let pair_dir = dir.path().join("candidates").join("0");
        assert!(pair_dir.join("3#0").exists());
        assert!(pair_dir.join("3#1").exists());
        assert_eq!(w0.count(Table::Candidates).unwrap(), 2);

        w0.finish_stage(Table::Candidates).unwrap();
        assert!(pair_dir.join("3").exists());
        assert!(!pair_dir.join("3#1").exists());
        assert_eq!(w0.doc_pairs(Table::Candidates).unwrap(), vec![DocPair { doc_a: 0, doc_b: 3 }]);
    }

    #[test]
    fn hashbands_stream_in_key_order_across_shards() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), 0);
        let row = |band: String, doc_id, window| HashbandRow { band, doc_id, window };
        s.append_hashbands(&[
            row(band("ab9"), 1, 0),
            row(band("ab1"), 2, 0),
            row(band("ab1"), 0, 7),
            row(band("f0"), 0, 1),
        ])
        .unwrap();
        assert_eq!(s.hashband_partitions().unwrap(), vec!["ab", "f0"]);

        let mut seen = Vec::new();
        s.stream_hashbands_sorted("ab", &mut |r| {
            seen.push((r.band, r.doc_id));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(band("ab1"), 0), (band("ab1"), 2), (band("ab9"), 1)]);
    }

    #[test]
    fn delete_rewrites_pair_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path(), 0);
        let m = |window_a, similarity| ValidatedMatch {
            pair: CandidatePair { doc_a: 1, doc_b: 2, window_a, window_b: window_a },
            similarity,
        };
        s.append_matches(&[m(0, 90), m(1, 60), m(2, 95)]).unwrap();
        assert_eq!(s.delete_matches(&|v| v.similarity < 80).unwrap(), 1);
        assert_eq!(s.count(Table::Matches).unwrap(), 2);
        assert_eq!(s.delete_matches(&|v| v.similarity < 80).unwrap(), 0);

        s.clear().unwrap();
        assert_eq!(s.count(Table::Matches).unwrap(), 0);
    }
}
