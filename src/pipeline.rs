//! Stage orchestration.
//!
//! Stages run strictly in sequence: fingerprint and index, candidates,
//! validate, banish, cluster and output. Each stage fans its work units out
//! over the worker pool and funnels rows through one store writer; the next
//! stage starts only after the writer has flushed and every host has reached
//! the stage barrier.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::config::subsystems::FileSimilarityPolicy;
use crate::config::NazirConfig;
use crate::corpus::Corpus;
use crate::error::Result;
use crate::fingerprint::FingerprintEngine;
use crate::index::{index_document, Bander, CandidateGenerator};
use crate::matcher::{
    cluster_coverage, exceeds_file_similarity, match_coverage, Banisher, Clusterer, Validator,
};
use crate::output::{sort_records, MatchFormatter, OutputWriter};
use crate::storage::{collect_candidates, collect_matches, create_store, MatchStore, Table};
use crate::types::{Cluster, DocId, DocPair, MatchRecord};
use crate::utils::barrier::HostBarrier;
use crate::utils::processing::{BatchSender, BatchWriter, WorkerPool, WriteBatch};
use crate::window::Windower;

/// Counts gathered over one run on this host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub documents: usize,
    pub windows: usize,
    pub cached_documents: usize,
    pub hashband_rows: usize,
    pub candidate_pairs: usize,
    pub validated_matches: usize,
    pub banished_matches: usize,
    pub clusters: usize,
    pub records: usize,
}

pub struct Pipeline {
    config: NazirConfig,
    corpus: Corpus,
    store: Arc<dyn MatchStore>,
    windower: Windower,
    pool: WorkerPool,
    barrier: HostBarrier,
}

impl Pipeline {
    /// Opens the configured store and builds the shared components.
    pub fn new(config: NazirConfig, corpus: Corpus) -> Result<Self> {
        config.validate()?;
        let store = create_store(&config.storage, config.processor.host_id)?;
        Self::with_store(config, corpus, store)
    }

    /// Like [`Pipeline::new`] with an already opened store.
    pub fn with_store(config: NazirConfig, corpus: Corpus, store: Arc<dyn MatchStore>) -> Result<Self> {
        config.validate()?;
        let windower = Windower::new(&config.window)?;
        let pool = WorkerPool::new(&config.processor)?;
        let barrier = HostBarrier::new(&config.processor)?;
        Ok(Self { config, corpus, store, windower, pool, barrier })
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary { documents: self.corpus.len(), ..RunSummary::default() };
        info!(
            "Starting run on host {}/{} with {} documents, {} workers, {} backend",
            self.barrier.host_id(),
            self.config.processor.host_count,
            self.corpus.len(),
            self.pool.workers(),
            self.store.backend().as_str()
        );

        self.prepare()?;
        self.fingerprint_stage(&mut summary)?;
        self.candidate_stage(&mut summary)?;
        self.validate_stage(&mut summary)?;

        if !self.barrier.is_leader() {
            info!("Host {} finished its share in {:?}", self.barrier.host_id(), start.elapsed());
            return Ok(summary);
        }

        summary.banished_matches = self.banish_stage()?;
        let records = self.cluster_stage(&mut summary)?;
        summary.records = records.len();
        OutputWriter::new(&self.config.files.output_dir).write_all(&self.corpus, &records, &self.config)?;

        info!("Run complete in {:?}: {:?}", start.elapsed(), summary);
        Ok(summary)
    }

    fn prepare(&self) -> Result<()> {
        self.config.files.prepare_dirs()?;
        if self.config.storage.from_scratch && self.barrier.is_leader() {
            info!("Clearing store before the first stage");
            self.store.clear()?;
        }
        self.barrier.wait("start")
    }

    /// Runs `work` over `units` with a store writer attached. A writer error
    /// wins over the worker error it caused.
    fn run_writing<U, T, F>(&self, stage: &str, units: Vec<U>, work: F) -> Result<(Vec<T>, u64)>
    where
        U: Send,
        T: Send,
        F: Fn(U, &BatchSender) -> Result<T> + Send + Sync,
    {
        let writer = BatchWriter::spawn(
            Arc::clone(&self.store),
            self.config.processor.write_frequency,
            self.pool.workers() * 4,
        )?;
        let sender = writer.sender()?;
        let results = self.pool.map(stage, units, |unit| work(unit, &sender));
        drop(sender);
        let written = writer.finish()?;
        Ok((results?, written))
    }

    /// Barrier, single-writer finish of `table`, then a second barrier so no
    /// host reads the table before it is combined.
    fn close_stage(&self, stage: &str, table: Table) -> Result<()> {
        self.barrier.wait(stage)?;
        if self.barrier.is_leader() {
            self.store.finish_stage(table)?;
        }
        self.barrier.wait(&format!("{}-combined", stage))?;
        self.store.metrics().log_summary(stage);
        Ok(())
    }

    fn fingerprint_stage(&mut self, summary: &mut RunSummary) -> Result<()> {
        let start = Instant::now();
        let engine = FingerprintEngine::new(&self.config.window, Some(self.config.files.cache_dir.as_path()))?;
        let bander = Bander::new(&self.config.index);
        let units: Vec<(DocId, std::path::PathBuf)> = self
            .corpus
            .documents
            .iter()
            .filter(|doc| self.config.processor.owns_unit(doc.id as usize))
            .map(|doc| (doc.id, doc.path.clone()))
            .collect();
        info!("Fingerprinting {} documents", units.len());

        let windower = &self.windower;
        let (results, written) = self.run_writing("fingerprint", units, |(doc_id, path), sender| {
            let doc = engine.fingerprint_document(windower, &path);
            let rows = index_document(&bander, doc_id, &doc.fingerprints);
            let row_count = rows.len();
            if !rows.is_empty() {
                sender.send(WriteBatch::Hashbands(rows))?;
            }
            Ok((doc_id, doc.token_count, doc.fingerprints.len(), row_count, doc.from_cache))
        })?;

        for (doc_id, token_count, windows, rows, from_cache) in results {
            self.corpus.set_token_count(doc_id, token_count);
            summary.windows += windows;
            summary.hashband_rows += rows;
            if from_cache {
                summary.cached_documents += 1;
            }
        }
        info!(
            "Fingerprinted {} windows ({} documents from cache), wrote {} hashband rows in {:?}",
            summary.windows,
            summary.cached_documents,
            written,
            start.elapsed()
        );
        self.close_stage("hashbands", Table::Hashbands)
    }

    fn candidate_stage(&self, summary: &mut RunSummary) -> Result<()> {
        let start = Instant::now();
        let generator = CandidateGenerator::new(self.config.index.candidate_batch_size);
        let mut partitions = self.store.hashband_partitions()?;
        partitions.sort();
        let units: Vec<String> = partitions
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.config.processor.owns_unit(*i))
            .map(|(_, p)| p)
            .collect();
        info!("Generating candidates from {} hashband partitions", units.len());

        let store = self.store.as_ref();
        let (emitted, written) = self.run_writing("candidates", units, |partition, sender| {
            generator.generate_partition(store, &partition, &mut |batch| {
                sender.send(WriteBatch::Candidates(batch))
            })
        })?;

        summary.candidate_pairs = emitted.iter().sum();
        info!(
            "Emitted {} candidate pairs, wrote {} in {:?}",
            summary.candidate_pairs,
            written,
            start.elapsed()
        );
        self.close_stage("candidates", Table::Candidates)
    }

    fn validate_stage(&self, summary: &mut RunSummary) -> Result<()> {
        let start = Instant::now();
        let validator = Validator::new(&self.windower, &self.config.matcher);
        let max_file_similarity = match self.config.matcher.file_similarity_policy {
            FileSimilarityPolicy::BeforeClustering => self.config.matcher.max_file_similarity,
            FileSimilarityPolicy::AfterClustering => None,
        };
        let units = self.owned_pairs(Table::Candidates)?;
        info!("Validating candidates of {} document pairs", units.len());

        let store = self.store.as_ref();
        let (kept, written) = self.run_writing("validate", units, |pair, sender| {
            let candidates = collect_candidates(store, pair)?;
            let (Some(doc_a), Some(doc_b)) = (self.corpus.document(pair.doc_a), self.corpus.document(pair.doc_b))
            else {
                return Ok(0);
            };
            let tokens_a = self.windower.tokens(&doc_a.path);
            let tokens_b = self.windower.tokens(&doc_b.path);
            let matches = validator.validate_pair(&tokens_a, &tokens_b, &candidates);

            if let Some(max) = max_file_similarity {
                let window_counts = (
                    self.windower.window_count(tokens_a.len()),
                    self.windower.window_count(tokens_b.len()),
                );
                if exceeds_file_similarity(match_coverage(&matches), window_counts, max) {
                    debug!("Dropping pair {}/{}: too similar overall", pair.doc_a, pair.doc_b);
                    return Ok(0);
                }
            }
            let count = matches.len();
            if count > 0 {
                sender.send(WriteBatch::Matches(matches))?;
            }
            Ok(count)
        })?;

        summary.validated_matches = kept.iter().sum();
        info!(
            "Validated {} matches, wrote {} in {:?}",
            summary.validated_matches,
            written,
            start.elapsed()
        );
        self.close_stage("matches", Table::Matches)
    }

    fn banish_stage(&self) -> Result<usize> {
        if self.corpus.banished.is_empty() {
            return Ok(0);
        }
        let start = Instant::now();
        info!("Banishing matches near {} documents", self.corpus.banished.len());
        let removed = Banisher::new(self.config.matcher.banish_distance)
            .apply(self.store.as_ref(), &self.corpus.banished)?;
        self.store.finish_stage(Table::Matches)?;
        info!("Banish stage removed {} matches in {:?}", removed, start.elapsed());
        Ok(removed)
    }

    /// Clusters every stored pair and formats the surviving clusters.
    fn cluster_stage(&mut self, summary: &mut RunSummary) -> Result<Vec<MatchRecord>> {
        let start = Instant::now();
        // Token counts of documents fingerprinted on other hosts.
        for i in 0..self.corpus.len() {
            let doc = &self.corpus.documents[i];
            if doc.token_count == 0 {
                let count = self.windower.tokens(&doc.path).len();
                let id = doc.id;
                self.corpus.set_token_count(id, count);
            }
        }

        let clusterer = Clusterer::new(self.config.matcher.min_similarity);
        let after_limit = match self.config.matcher.file_similarity_policy {
            FileSimilarityPolicy::AfterClustering => self.config.matcher.max_file_similarity,
            FileSimilarityPolicy::BeforeClustering => None,
        };
        let pairs: Vec<DocPair> = self
            .store
            .doc_pairs(Table::Matches)?
            .into_iter()
            .filter(|p| !self.corpus.excluded.contains(&p.doc_a) && !self.corpus.excluded.contains(&p.doc_b))
            .collect();
        info!("Clustering matches of {} document pairs", pairs.len());

        let store = self.store.as_ref();
        let corpus = &self.corpus;
        let windower = &self.windower;
        let formatter = MatchFormatter::new(corpus, windower, self.config.matcher.same_author_matches);
        let per_pair: Vec<(usize, Vec<MatchRecord>)> = self.pool.map("cluster", pairs, |pair| {
            let matches = collect_matches(store, pair)?;
            let clusters: Vec<Cluster> = clusterer.cluster_pair(pair, &matches);
            if let Some(max) = after_limit {
                let window_counts = |id: DocId| {
                    corpus.document(id).map(|d| windower.window_count(d.token_count)).unwrap_or(0)
                };
                let counts = (window_counts(pair.doc_a), window_counts(pair.doc_b));
                if exceeds_file_similarity(cluster_coverage(&clusters), counts, max) {
                    debug!("Dropping pair {}/{}: too similar overall", pair.doc_a, pair.doc_b);
                    return Ok((0, Vec::new()));
                }
            }
            Ok((clusters.len(), formatter.format(&clusters)))
        })?;

        let mut records = Vec::new();
        for (clusters, pair_records) in per_pair {
            summary.clusters += clusters;
            records.extend(pair_records);
        }
        sort_records(&mut records);
        info!(
            "Formed {} clusters, {} match records in {:?}",
            summary.clusters,
            records.len(),
            start.elapsed()
        );
        Ok(records)
    }

    fn owned_pairs(&self, table: Table) -> Result<Vec<DocPair>> {
        let mut pairs = self.store.doc_pairs(table)?;
        pairs.sort();
        Ok(pairs
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.config.processor.owns_unit(*i))
            .map(|(_, p)| p)
            .collect())
    }
}
