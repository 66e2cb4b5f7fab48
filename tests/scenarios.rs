mod common;

use std::fs;
use std::sync::Arc;

use nazir::config::subsystems::{FileSimilarityPolicy, StorageBackendKind};
use nazir::matcher::{Banisher, Clusterer, Validator};
use nazir::storage::{collect_matches, MatchStore, SqliteStore, Table};
use nazir::types::{CandidatePair, ValidatedMatch};
use nazir::window::Windower;
use nazir::{Corpus, Pipeline};

use common::*;

const VARIANT: &str =
    "the emir demanded that the small library be opened to every scholar who came";

#[test]
fn shared_passage_is_reported_at_full_similarity() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[("a.txt", document_with(1, PASSAGE)), ("b.txt", document_with(2, PASSAGE))],
    );
    let config = config(dir.path(), StorageBackendKind::Sqlite);
    let corpus = Corpus::discover(&config.files).unwrap();
    let mut pipeline = Pipeline::new(config.clone(), corpus).unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.documents, 2);
    assert_eq!(summary.windows, 42);
    assert!(summary.candidate_pairs >= 1);

    let records = read_records(&config.files.output_dir, 0);
    let full = records
        .iter()
        .find(|r| r.similarity == 100.0)
        .expect("a record at similarity 100");
    assert_eq!(full.source_file_id, 0);
    assert_eq!(full.target_file_id, 1);
    assert_eq!(full.source_segment_ids, vec![10]);
    assert_eq!(full.source_match, PASSAGE);
    assert_eq!(full.target_match, PASSAGE);
    assert_eq!(full.source_prematch.split_whitespace().count(), 14);

    let out = &config.files.output_dir;
    for file in ["stats.json", "manifest.json", "config.json", "indices/match_ids_by_similarity.json"] {
        assert!(out.join(file).exists(), "{} missing", file);
    }
    assert_eq!(read_records(out, 1), records);
}

fn run_with_injected_candidate(min_similarity: u8) -> (tempfile::TempDir, Arc<dyn MatchStore>, usize) {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("a.txt", PASSAGE.to_string()), ("b.txt", VARIANT.to_string())]);
    let mut config = config(dir.path(), StorageBackendKind::Sqlite);
    config.matcher.min_similarity = min_similarity;
    config.storage.from_scratch = false;

    let store: Arc<dyn MatchStore> =
        Arc::new(SqliteStore::open(&config.storage.db_path, &config.storage).unwrap());
    store
        .append_candidates(&[CandidatePair { doc_a: 0, doc_b: 1, window_a: 0, window_b: 0 }])
        .unwrap();

    let corpus = Corpus::discover(&config.files).unwrap();
    let mut pipeline = Pipeline::with_store(config, corpus, Arc::clone(&store)).unwrap();
    let summary = pipeline.run().unwrap();
    (dir, store, summary.validated_matches)
}

#[test]
fn candidate_below_threshold_never_reaches_matches() {
    let windower = Windower::new(&Default::default()).unwrap();
    let validator = Validator::new(
        &windower,
        &nazir::config::subsystems::MatcherConfig { min_similarity: 90, ..Default::default() },
    );
    assert_eq!(validator.score(PASSAGE, VARIANT), Err(nazir::matcher::Rejection::BelowThreshold(85)));

    let (_dir, store, validated) = run_with_injected_candidate(90);
    assert_eq!(validated, 0);
    assert_eq!(store.count(Table::Matches).unwrap(), 0);

    let (_dir, store, validated) = run_with_injected_candidate(80);
    assert_eq!(validated, 1);
    let matches = collect_matches(store.as_ref(), nazir::DocPair { doc_a: 0, doc_b: 1 }).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].similarity, 85);
}

#[test]
fn gap_in_matches_splits_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path(), &Default::default()).unwrap();
    let matched = |window_a, window_b| ValidatedMatch {
        pair: CandidatePair { doc_a: 0, doc_b: 1, window_a, window_b },
        similarity: 100,
    };
    store.append_matches(&[matched(5, 5), matched(6, 6), matched(8, 8)]).unwrap();

    let pair = nazir::DocPair { doc_a: 0, doc_b: 1 };
    let clusters = Clusterer::new(95).cluster_pair(pair, &collect_matches(&store, pair).unwrap());
    assert_eq!(clusters[0].windows_a, vec![5, 6]);
    assert_eq!(clusters[0].windows_b, vec![5, 6]);
    for cluster in &clusters {
        assert!(!cluster.windows_a.contains(&7), "{:?}", cluster);
        assert!(!cluster.windows_b.contains(&7), "{:?}", cluster);
    }
}

#[test]
fn invalid_config_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("a.txt", PASSAGE.to_string()), ("b.txt", VARIANT.to_string())]);
    let mut config = config(dir.path(), StorageBackendKind::Sqlite);
    let corpus = Corpus::discover(&config.files).unwrap();
    let store: Arc<dyn MatchStore> =
        Arc::new(SqliteStore::open(&config.storage.db_path, &config.storage).unwrap());

    config.window.slide_length = 0;
    let err = Pipeline::with_store(config.clone(), corpus.clone(), Arc::clone(&store)).err().unwrap();
    assert!(matches!(err, nazir::Error::Config(_)), "{}", err);

    config.window.slide_length = 4;
    config.index.hashband_step = 0;
    let err = Pipeline::with_store(config, corpus, store).err().unwrap();
    assert!(matches!(err, nazir::Error::Config(_)), "{}", err);
}

fn run_file_similarity(policy: FileSimilarityPolicy, limit: Option<f64>) -> Vec<nazir::MatchRecord> {
    let dir = tempfile::tempdir().unwrap();
    let twin = document_with(1, PASSAGE);
    write_corpus(
        dir.path(),
        &[("a.txt", twin.clone()), ("b.txt", twin), ("c.txt", document_with(3, PASSAGE))],
    );
    let mut config = config(dir.path(), StorageBackendKind::Sqlite);
    config.matcher.max_file_similarity = limit;
    config.matcher.file_similarity_policy = policy;
    let corpus = Corpus::discover(&config.files).unwrap();
    Pipeline::new(config.clone(), corpus).unwrap().run().unwrap();
    read_records(&config.files.output_dir, 0)
}

#[test]
fn near_duplicate_documents_are_dropped_whole() {
    let unlimited = run_file_similarity(FileSimilarityPolicy::AfterClustering, None);
    assert!(unlimited.iter().any(|r| involves(r, 0, 1)));

    for policy in [FileSimilarityPolicy::AfterClustering, FileSimilarityPolicy::BeforeClustering] {
        let records = run_file_similarity(policy, Some(0.5));
        assert!(!records.iter().any(|r| involves(r, 0, 1)), "{:?} kept the twin pair", policy);
        assert!(records.iter().any(|r| involves(r, 0, 2)), "{:?} lost the passage pair", policy);
    }
}

fn four_documents(root: &std::path::Path) {
    write_corpus(
        root,
        &[
            ("a.txt", document_with(1, PASSAGE)),
            ("b.txt", document_with(2, PASSAGE)),
            ("c.txt", document_with(3, OTHER_PASSAGE)),
            ("d.txt", document_with(4, OTHER_PASSAGE)),
        ],
    );
}

#[test]
fn banishing_only_shrinks_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    four_documents(dir.path());
    let config = config(dir.path(), StorageBackendKind::Sqlite);
    let corpus = Corpus::discover(&config.files).unwrap();
    let mut pipeline = Pipeline::new(config, corpus).unwrap();
    pipeline.run().unwrap();
    let store = Arc::clone(pipeline.store());

    let before = store.count(Table::Matches).unwrap();
    let banished: ahash::AHashSet<u32> = [0].into_iter().collect();
    let banisher = Banisher::new(4);
    let removed = banisher.apply(store.as_ref(), &banished).unwrap();
    let after = store.count(Table::Matches).unwrap();
    assert!(removed >= 1);
    assert_eq!(after, before - removed as u64);

    let pairs = store.doc_pairs(Table::Matches).unwrap();
    assert!(pairs.iter().all(|p| p.doc_a != 0 && p.doc_b != 0));
    assert!(pairs.contains(&nazir::DocPair { doc_a: 2, doc_b: 3 }));

    assert_eq!(banisher.apply(store.as_ref(), &banished).unwrap(), 0);
    assert_eq!(store.count(Table::Matches).unwrap(), after);
}

#[test]
fn banish_list_removes_matches_from_output() {
    let dir = tempfile::tempdir().unwrap();
    four_documents(dir.path());
    let banish = dir.path().join("banish.txt");
    fs::write(&banish, "a.txt\n").unwrap();
    let mut config = config(dir.path(), StorageBackendKind::Sqlite);
    config.files.banish_list = Some(banish);

    let corpus = Corpus::discover(&config.files).unwrap();
    let summary = Pipeline::new(config.clone(), corpus).unwrap().run().unwrap();
    assert!(summary.banished_matches >= 1);
    assert!(read_records(&config.files.output_dir, 0).is_empty());
    assert!(read_records(&config.files.output_dir, 1).is_empty());
    assert!(read_records(&config.files.output_dir, 2).iter().any(|r| involves(r, 2, 3)));
}

#[test]
fn excluded_documents_are_left_out_of_output_only() {
    let dir = tempfile::tempdir().unwrap();
    four_documents(dir.path());
    let exclude = dir.path().join("exclude.txt");
    fs::write(&exclude, "b.txt\n").unwrap();
    let mut config = config(dir.path(), StorageBackendKind::Sqlite);
    config.files.exclude_list = Some(exclude);

    let corpus = Corpus::discover(&config.files).unwrap();
    let mut pipeline = Pipeline::new(config.clone(), corpus).unwrap();
    pipeline.run().unwrap();

    assert!(pipeline.store().count(Table::Matches).unwrap() >= 2);
    assert!(!config.files.output_dir.join("matches").join("1.json").exists());
    assert!(read_records(&config.files.output_dir, 0).is_empty());
}

#[test]
fn rerun_reuses_fingerprints_and_reproduces_output() {
    let dir = tempfile::tempdir().unwrap();
    four_documents(dir.path());
    let config = config(dir.path(), StorageBackendKind::Sqlite);

    let corpus = Corpus::discover(&config.files).unwrap();
    let mut first = Pipeline::new(config.clone(), corpus.clone()).unwrap();
    let first_summary = first.run().unwrap();
    assert_eq!(first_summary.cached_documents, 0);
    let first_output = fs::read_to_string(config.files.output_dir.join("matches").join("2.json")).unwrap();

    // Clustering the stored matches again gives the same clusters.
    let clusterer = Clusterer::new(config.matcher.min_similarity);
    for pair in first.store().doc_pairs(Table::Matches).unwrap() {
        let matches = collect_matches(first.store().as_ref(), pair).unwrap();
        assert_eq!(clusterer.cluster_pair(pair, &matches), clusterer.cluster_pair(pair, &matches));
    }
    drop(first);

    let mut second = Pipeline::new(config.clone(), corpus).unwrap();
    let second_summary = second.run().unwrap();
    assert_eq!(second_summary.cached_documents, 4);
    assert_eq!(second_summary.records, first_summary.records);
    let second_output = fs::read_to_string(config.files.output_dir.join("matches").join("2.json")).unwrap();
    assert_eq!(first_output, second_output);
}
