// utils/processing.rs
//
// Stage execution: a rayon pool for work units and a single store-writer
// thread fed through a bounded channel, flushing every `write_frequency` rows.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;

use crate::config::subsystems::ProcessorConfig;
use crate::error::{Error, Result};
use crate::storage::MatchStore;
use crate::types::{CandidatePair, HashbandRow, ValidatedMatch};

/// Rows produced by one work unit, bound for one table.
#[derive(Debug)]
pub enum WriteBatch {
    Hashbands(Vec<HashbandRow>),
    Candidates(Vec<CandidatePair>),
    Matches(Vec<ValidatedMatch>),
}

pub fn progress_bar(stage: &str, len: u64, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {prefix:>12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    ) {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(stage.to_string());
    pb
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
    show_progress: bool,
}

impl WorkerPool {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("nazir-worker-{}", i))
            .build()?;
        info!("Worker pool ready with {} threads", workers);
        Ok(Self { pool, workers, show_progress: config.show_progress })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `f` over every unit; the first error aborts the stage.
    pub fn map<U, T, F>(&self, stage: &str, units: Vec<U>, f: F) -> Result<Vec<T>>
    where
        U: Send,
        T: Send,
        F: Fn(U) -> Result<T> + Send + Sync,
    {
        let total = units.len();
        let pb = progress_bar(stage, total as u64, self.show_progress);
        let start = Instant::now();
        let results = self.pool.install(|| {
            units
                .into_par_iter()
                .map(|unit| {
                    let result = f(unit);
                    pb.inc(1);
                    result
                })
                .collect::<Result<Vec<T>>>()
        });
        pb.finish_and_clear();
        debug!("[{}] {} units in {:?}", stage, total, start.elapsed());
        results
    }
}

/// Cloneable handle workers use to hand rows to the store writer.
#[derive(Clone)]
pub struct BatchSender {
    sender: Sender<WriteBatch>,
}

impl BatchSender {
    pub fn send(&self, batch: WriteBatch) -> Result<()> {
        self.sender
            .send(batch)
            .map_err(|_| Error::storage("store writer has stopped"))
    }
}

#[derive(Default)]
struct Buffers {
    hashbands: Vec<HashbandRow>,
    candidates: Vec<CandidatePair>,
    matches: Vec<ValidatedMatch>,
}

impl Buffers {
    fn flush(&mut self, store: &dyn MatchStore, threshold: usize) -> Result<u64> {
        let mut written = 0;
        if !self.hashbands.is_empty() && self.hashbands.len() >= threshold {
            store.append_hashbands(&self.hashbands)?;
            written += self.hashbands.len() as u64;
            self.hashbands.clear();
        }
        if !self.candidates.is_empty() && self.candidates.len() >= threshold {
            store.append_candidates(&self.candidates)?;
            written += self.candidates.len() as u64;
            self.candidates.clear();
        }
        if !self.matches.is_empty() && self.matches.len() >= threshold {
            store.append_matches(&self.matches)?;
            written += self.matches.len() as u64;
            self.matches.clear();
        }
        Ok(written)
    }
}

/// The single thread that appends to the store during a stage.
pub struct BatchWriter {
    sender: Option<Sender<WriteBatch>>,
    handle: Option<JoinHandle<Result<u64>>>,
}

impl BatchWriter {
    pub fn spawn(store: Arc<dyn MatchStore>, write_frequency: usize, queue_depth: usize) -> Result<Self> {
        let (sender, receiver) = bounded(queue_depth.max(1));
        let handle = thread::Builder::new()
            .name("nazir-store-writer".to_string())
            .spawn(move || Self::drain(store, receiver, write_frequency.max(1)))?;
        Ok(Self { sender: Some(sender), handle: Some(handle) })
    }

    fn drain(store: Arc<dyn MatchStore>, receiver: Receiver<WriteBatch>, write_frequency: usize) -> Result<u64> {
        let mut buffers = Buffers::default();
        let mut written = 0;
        for batch in receiver {
            match batch {
                WriteBatch::Hashbands(rows) => buffers.hashbands.extend(rows),
                WriteBatch::Candidates(rows) => buffers.candidates.extend(rows),
                WriteBatch::Matches(rows) => buffers.matches.extend(rows),
            }
            written += buffers.flush(store.as_ref(), write_frequency)?;
        }
        written += buffers.flush(store.as_ref(), 1)?;
        Ok(written)
    }

    pub fn sender(&self) -> Result<BatchSender> {
        self.sender
            .clone()
            .map(|sender| BatchSender { sender })
            .ok_or_else(|| Error::storage("store writer already finished"))
    }

    /// Closes the channel, waits for the final flush and returns rows written.
    pub fn finish(mut self) -> Result<u64> {
        self.sender.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::ThreadPool("store writer panicked".to_string()))?,
            None => Ok(0),
        }
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::subsystems::StorageConfig;
    use crate::storage::{SqliteStore, Table};

    #[test]
    fn writer_flushes_everything_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn MatchStore> =
            Arc::new(SqliteStore::open(dir.path(), &StorageConfig::default()).unwrap());
        let writer = BatchWriter::spawn(Arc::clone(&store), 3, 4).unwrap();
        let sender = writer.sender().unwrap();
        for window_a in 0..5 {
            sender
                .send(WriteBatch::Candidates(vec![CandidatePair { doc_a: 0, doc_b: 1, window_a, window_b: 0 }]))
                .unwrap();
        }
        drop(sender);
        assert_eq!(writer.finish().unwrap(), 5);
        assert_eq!(store.count(Table::Candidates).unwrap(), 5);
        assert_eq!(store.metrics().get_stats().append_batches, 2);
    }

    #[test]
    fn pool_collects_results_and_stops_on_error() {
        let pool = WorkerPool::new(&ProcessorConfig { workers: 2, show_progress: false, ..ProcessorConfig::default() })
            .unwrap();
        let doubled = pool.map("test", vec![1, 2, 3], |x| Ok(x * 2)).unwrap();
        assert_eq!(doubled, vec![2, 4, 6]);

        let failed = pool.map("test", vec![1, 2, 3], |x| {
            if x == 2 { Err(Error::storage("boom")) } else { Ok(x) }
        });
        assert!(failed.is_err());
    }
}
