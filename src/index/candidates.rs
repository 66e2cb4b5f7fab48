// Candidate generation from the sorted Hashband table.

use log::{debug, trace};

use crate::error::Result;
use crate::storage::MatchStore;
use crate::types::{CandidatePair, HashbandRow, WindowId};

/// Canonical candidate pairs for all windows that share one band.
///
/// Occurrences from a single document produce nothing; same-document pairs
/// are dropped.
pub fn pairs_for_band(occurrences: &[WindowId]) -> Vec<CandidatePair> {
    let mut windows = occurrences.to_vec();
    windows.sort_unstable();
    windows.dedup();

    let first_doc = match windows.first() {
        Some(w) => w.doc_id,
        None => return Vec::new(),
    };
    if windows.iter().all(|w| w.doc_id == first_doc) {
        return Vec::new();
    }

    let mut pairs = Vec::new();
    for (i, x) in windows.iter().enumerate() {
        for y in &windows[i + 1..] {
            if let Some(pair) = CandidatePair::canonical(*x, *y) {
                pairs.push(pair);
            }
        }
    }
    pairs
}

/// Groups one partition's band rows and emits candidates in bounded batches.
#[derive(Debug, Clone, Copy)]
pub struct CandidateGenerator {
    batch_size: usize,
}

impl CandidateGenerator {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    /// Streams `partition` and hands each full batch to `flush`. Returns the
    /// number of pairs emitted (before store de-duplication).
    pub fn generate_partition(
        &self,
        store: &dyn MatchStore,
        partition: &str,
        flush: &mut dyn FnMut(Vec<CandidatePair>) -> Result<()>,
    ) -> Result<usize> {
        let mut batch: Vec<CandidatePair> = Vec::with_capacity(self.batch_size);
        let mut current_band: Option<String> = None;
        let mut occurrences: Vec<WindowId> = Vec::new();
        let mut emitted = 0;

        let mut close_band = |occurrences: &mut Vec<WindowId>, batch: &mut Vec<CandidatePair>| -> Result<()> {
            let pairs = pairs_for_band(occurrences);
            occurrences.clear();
            emitted += pairs.len();
            for pair in pairs {
                batch.push(pair);
                if batch.len() >= self.batch_size {
                    flush(dedup(std::mem::take(batch)))?;
                }
            }
            Ok(())
        };

        store.stream_hashbands_sorted(partition, &mut |row: HashbandRow| {
            if current_band.as_deref() != Some(row.band.as_str()) {
                close_band(&mut occurrences, &mut batch)?;
                current_band = Some(row.band);
            }
            occurrences.push(WindowId::new(row.doc_id, row.window));
            Ok(())
        })?;
        close_band(&mut occurrences, &mut batch)?;

        if !batch.is_empty() {
            flush(dedup(batch))?;
        }
        trace!("Partition {} emitted {} candidate pairs", partition, emitted);
        if emitted > 0 {
            debug!("Partition {}: {} candidate pairs", partition, emitted);
        }
        Ok(emitted)
    }
}

fn dedup(mut batch: Vec<CandidatePair>) -> Vec<CandidatePair> {
    batch.sort_unstable();
    batch.dedup();
    batch
}
