//! nazir finds reused passages across a corpus of plain-text documents.
//! Windows of each document are sketched with MinHash, indexed by hashbands,
//! paired into candidates, validated by exact alignment scoring, and grouped
//! into passage-level clusters written out as JSON match records.

// Module declarations
pub mod config;
pub mod corpus;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod matcher;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod types;
pub mod utils;
pub mod window;

// Re-exports
pub use config::NazirConfig;
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use storage::{create_store, MatchStore};
pub use types::{CandidatePair, Cluster, DocPair, MatchRecord, ValidatedMatch, WindowId};
