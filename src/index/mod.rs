pub mod candidates;
pub mod hashband;

pub use candidates::{pairs_for_band, CandidateGenerator};
pub use hashband::{partition_of, Bander};

use crate::fingerprint::Fingerprint;
use crate::types::{DocId, HashbandRow, WindowIndex};

/// Hashband rows for every window of a document.
pub fn index_document(bander: &Bander, doc_id: DocId, fingerprints: &[Fingerprint]) -> Vec<HashbandRow> {
    fingerprints
        .iter()
        .enumerate()
        .flat_map(|(window, fp)| bander.rows(doc_id, window as WindowIndex, fp))
        .collect()
}
