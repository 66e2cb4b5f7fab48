#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use nazir::config::subsystems::StorageBackendKind;
use nazir::types::MatchRecord;
use nazir::NazirConfig;

pub const PASSAGE: &str =
    "the caliph ordered that the great library be opened to every scholar who came";
pub const OTHER_PASSAGE: &str =
    "merchants from basra carried paper and ink along the river to the northern markets";

/// Deterministic filler words that share little with each other across seeds.
pub fn filler(seed: u64, count: usize) -> Vec<String> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    (0..count)
        .map(|_| {
            let len = 4 + next() % 5;
            (0..len).map(|_| (b'a' + (next() % 26) as u8) as char).collect()
        })
        .collect()
}

/// 40 filler tokens, the passage (starting at window 10 with slide 4), 40 more filler tokens.
pub fn document_with(seed: u64, passage: &str) -> String {
    let mut tokens = filler(seed, 40);
    tokens.extend(passage.split_whitespace().map(str::to_string));
    tokens.extend(filler(seed + 1000, 40));
    tokens.join(" ")
}

pub fn write_corpus(root: &Path, documents: &[(&str, String)]) -> PathBuf {
    let input = root.join("texts");
    fs::create_dir_all(&input).unwrap();
    for (name, text) in documents {
        fs::write(input.join(name), text).unwrap();
    }
    input
}

pub fn config(root: &Path, backend: StorageBackendKind) -> NazirConfig {
    let mut config = NazirConfig::default();
    config.files.input_dir = root.join("texts");
    config.files.output_dir = root.join("out");
    config.files.cache_dir = root.join("cache");
    config.storage.backend = backend;
    config.storage.db_path = root.join("db");
    config.window.permutations = 64;
    config.matcher.min_similarity = 95;
    config.processor.workers = 2;
    config.processor.write_frequency = 16;
    config.processor.show_progress = false;
    config
}

pub fn read_records(output_dir: &Path, doc_id: u32) -> Vec<MatchRecord> {
    let path = output_dir.join("matches").join(format!("{}.json", doc_id));
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

pub fn involves(record: &MatchRecord, x: u32, y: u32) -> bool {
    (record.source_file_id == x && record.target_file_id == y)
        || (record.source_file_id == y && record.target_file_id == x)
}
