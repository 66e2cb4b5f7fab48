//! Relational backend on an embedded SQLite database.
//!
//! All writes go through one connection behind a mutex, inside a transaction
//! per batch, with `INSERT OR IGNORE` against the tables' primary keys for
//! de-duplication. Streams open their own read-only connection so a long scan
//! never holds the writer lock; WAL mode lets them run beside the writer.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};

use crate::config::subsystems::storage::{StorageBackendKind, StorageConfig};
use crate::error::{Error, Result};
use crate::index::hashband::PARTITION_PREFIX_LEN;
use crate::types::{CandidatePair, DocPair, HashbandRow, ValidatedMatch};
use super::{MatchPredicate, MatchStore, RetryPolicy, StorageMetrics, Table, Visitor};

const DB_FILE: &str = "nazir.db";
const BUSY_TIMEOUT_MS: u64 = 250;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS hashbands (
    band TEXT NOT NULL,
    doc_id INTEGER NOT NULL,
    window_id INTEGER NOT NULL,
    PRIMARY KEY (band, doc_id, window_id)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS candidates (
    doc_a INTEGER NOT NULL,
    doc_b INTEGER NOT NULL,
    window_a INTEGER NOT NULL,
    window_b INTEGER NOT NULL,
    PRIMARY KEY (doc_a, doc_b, window_a, window_b)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS matches (
    doc_a INTEGER NOT NULL,
    doc_b INTEGER NOT NULL,
    window_a INTEGER NOT NULL,
    window_b INTEGER NOT NULL,
    similarity INTEGER NOT NULL,
    PRIMARY KEY (doc_a, doc_b, window_a, window_b)
) WITHOUT ROWID;
";

// Bands shared by at least two documents, restricted to one key prefix range.
const SHARED_BANDS_SQL: &str = "
SELECT band, doc_id, window_id FROM hashbands
WHERE band >= ?1 AND band < ?2
  AND band IN (
      SELECT band FROM hashbands
      WHERE band >= ?1 AND band < ?2
      GROUP BY band
      HAVING COUNT(DISTINCT doc_id) > 1
  )
ORDER BY band, doc_id, window_id
";

pub struct SqliteStore {
    writer: Mutex<Connection>,
    db_file: PathBuf,
    retry: RetryPolicy,
    metrics: StorageMetrics,
}

impl SqliteStore {
    /// Opens or creates `db_dir/nazir.db`.
    pub fn open(db_dir: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        fs::create_dir_all(db_dir)?;
        let db_file = db_dir.join(DB_FILE);

        let conn = Self::create_connection(&db_file)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::storage(format!("Schema init failed: {}", e)))?;

        info!("SqliteStore initialized at {}", db_file.display());
        Ok(Self {
            writer: Mutex::new(conn),
            db_file,
            retry: RetryPolicy::from_config(config),
            metrics: StorageMetrics::new(),
        })
    }

    fn create_connection(db_file: &Path) -> Result<Connection> {
        let conn = Connection::open(db_file)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -65536;",
        )?;
        Ok(conn)
    }

    fn reader(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_file,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        Ok(conn)
    }

    fn stream_match_query(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
        visit: &mut Visitor<'_, ValidatedMatch>,
    ) -> Result<()> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut streamed = 0;
        while let Some(row) = rows.next()? {
            let pair = CandidatePair {
                doc_a: row.get(0)?,
                doc_b: row.get(1)?,
                window_a: row.get(2)?,
                window_b: row.get(3)?,
            };
            visit(ValidatedMatch { pair, similarity: row.get(4)? })?;
            streamed += 1;
        }
        self.metrics.record_streamed(streamed);
        Ok(())
    }
}

impl MatchStore for SqliteStore {
    fn backend(&self) -> StorageBackendKind {
        StorageBackendKind::Sqlite
    }

    fn clear(&self) -> Result<()> {
        self.retry.run("clear", &self.metrics, || {
            let mut conn = self.writer.lock();
            let tx = conn.transaction()?;
            for table in Table::ALL {
                tx.execute(&format!("DELETE FROM {}", table.name()), [])?;
            }
            tx.commit()?;
            Ok(())
        })?;
        debug!("Cleared all tables in {}", self.db_file.display());
        Ok(())
    }

    fn append_hashbands(&self, rows: &[HashbandRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.retry.run("append hashbands", &self.metrics, || {
            let mut conn = self.writer.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO hashbands (band, doc_id, window_id) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.band, row.doc_id, row.window])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        self.metrics.record_append(rows.len());
        Ok(())
    }

    fn append_candidates(&self, rows: &[CandidatePair]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.retry.run("append candidates", &self.metrics, || {
            let mut conn = self.writer.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO candidates (doc_a, doc_b, window_a, window_b)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for row in rows {
                    stmt.execute(params![row.doc_a, row.doc_b, row.window_a, row.window_b])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        self.metrics.record_append(rows.len());
        Ok(())
    }

    fn append_matches(&self, rows: &[ValidatedMatch]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.retry.run("append matches", &self.metrics, || {
            let mut conn = self.writer.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO matches (doc_a, doc_b, window_a, window_b, similarity)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in rows {
                    let p = &row.pair;
                    stmt.execute(params![p.doc_a, p.doc_b, p.window_a, p.window_b, row.similarity])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        self.metrics.record_append(rows.len());
        Ok(())
    }

    fn hashband_partitions(&self) -> Result<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT substr(band, 1, {}) FROM hashbands ORDER BY 1",
            PARTITION_PREFIX_LEN
        ))?;
        let partitions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(partitions)
    }

    fn stream_hashbands_sorted(&self, partition: &str, visit: &mut Visitor<'_, HashbandRow>) -> Result<()> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(SHARED_BANDS_SQL)?;
        let upper = format!("{}~", partition);
        let mut rows = stmt.query(params![partition, upper])?;
        let mut streamed = 0;
        while let Some(row) = rows.next()? {
            visit(HashbandRow {
                band: row.get(0)?,
                doc_id: row.get(1)?,
                window: row.get(2)?,
            })?;
            streamed += 1;
        }
        self.metrics.record_streamed(streamed);
        Ok(())
    }

    fn doc_pairs(&self, table: Table) -> Result<Vec<DocPair>> {
        if table == Table::Hashbands {
            return Err(Error::storage("hashbands are not keyed by document pair"));
        }
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT doc_a, doc_b FROM {} ORDER BY doc_a, doc_b",
            table.name()
        ))?;
        let pairs = stmt
            .query_map([], |row| Ok(DocPair { doc_a: row.get(0)?, doc_b: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    fn stream_candidates(&self, pair: DocPair, visit: &mut Visitor<'_, CandidatePair>) -> Result<()> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT window_a, window_b FROM candidates
             WHERE doc_a = ?1 AND doc_b = ?2
             ORDER BY window_a, window_b",
        )?;
        let mut rows = stmt.query(params![pair.doc_a, pair.doc_b])?;
        let mut streamed = 0;
        while let Some(row) = rows.next()? {
            visit(CandidatePair {
                doc_a: pair.doc_a,
                doc_b: pair.doc_b,
                window_a: row.get(0)?,
                window_b: row.get(1)?,
            })?;
            streamed += 1;
        }
        self.metrics.record_streamed(streamed);
        Ok(())
    }

    fn stream_matches(&self, pair: DocPair, visit: &mut Visitor<'_, ValidatedMatch>) -> Result<()> {
        self.stream_match_query(
            "SELECT doc_a, doc_b, window_a, window_b, similarity FROM matches
             WHERE doc_a = ?1 AND doc_b = ?2
             ORDER BY window_a, window_b",
            &[&pair.doc_a, &pair.doc_b],
            visit,
        )
    }

    fn stream_all_matches(&self, visit: &mut Visitor<'_, ValidatedMatch>) -> Result<()> {
        self.stream_match_query(
            "SELECT doc_a, doc_b, window_a, window_b, similarity FROM matches
             ORDER BY doc_a, doc_b, window_a, window_b",
            &[],
            visit,
        )
    }

    fn delete_matches(&self, predicate: &MatchPredicate<'_>) -> Result<usize> {
        let mut doomed = Vec::new();
        self.stream_all_matches(&mut |m| {
            if predicate(&m) {
                doomed.push(m.pair);
            }
            Ok(())
        })?;
        if doomed.is_empty() {
            return Ok(0);
        }

        self.retry.run("delete matches", &self.metrics, || {
            let mut conn = self.writer.lock();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "DELETE FROM matches WHERE doc_a = ?1 AND doc_b = ?2 AND window_a = ?3 AND window_b = ?4",
                )?;
                for p in &doomed {
                    stmt.execute(params![p.doc_a, p.doc_b, p.window_a, p.window_b])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        self.metrics.record_deleted(doomed.len());
        Ok(doomed.len())
    }

    fn finish_stage(&self, table: Table) -> Result<()> {
        let conn = self.writer.lock();
        conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
        debug!("Checkpointed {} after stage", table.name());
        Ok(())
    }

    fn count(&self, table: Table) -> Result<u64> {
        let conn = self.reader()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }
}
