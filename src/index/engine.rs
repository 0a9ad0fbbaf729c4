use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::marker::PhantomData;
use std::path::Path;

use indexmap::IndexMap;
use tracing::info;

use crate::config::RetrieverConfig;
use crate::error::{Result, RetrieverError};
use crate::index::alloc::FactIdAllocator;
use crate::index::builder::IndexBuilder;
use crate::index::matrix::CountMatrix;
use crate::index::merge::MergeCoordinator;
use crate::index::tfidf::{DefaultTfIdfEngine, TfIdfEngine, WeightedMatrix};
use crate::index::vocab::Vocabulary;
use crate::store::{FactStore, SqliteFactStore};
use crate::tokenizer::Tokenizer;

/// Default result budget of a `retrieve` call.
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Master-side retrieval engine.
///
/// Owns the global vocabulary and triple accumulation (through its own
/// builder, which ingests directly into global id space), the merge
/// coordinator for worker streams, and the cached derived matrices. The
/// caches are invalidated by a generation counter that every ingest, merge
/// and load bumps; a stale weighted matrix is never reused.
pub struct FactRetriever<S, T, E = DefaultTfIdfEngine>
where
    S: FactStore,
    T: Tokenizer,
    E: TfIdfEngine,
{
    builder: IndexBuilder<S, T>,
    merge: MergeCoordinator,
    counts: Option<CountMatrix>,
    weighted: Option<WeightedMatrix>,
    generation: u64,
    built_generation: u64,
    _engine: PhantomData<E>,
}

impl<S, T, E> FactRetriever<S, T, E>
where
    S: FactStore,
    T: Tokenizer,
    E: TfIdfEngine,
{
    /// Create an empty index over the given fact store and tokenizer.
    pub fn new(store: S, tokenizer: T) -> Self {
        FactRetriever {
            builder: IndexBuilder::master(store, tokenizer, FactIdAllocator::new()),
            merge: MergeCoordinator::new(),
            counts: None,
            weighted: None,
            generation: 0,
            built_generation: 0,
            _engine: PhantomData,
        }
    }

    /// Persist one fact and index it. Returns the fact's global id.
    pub fn ingest(&mut self, fact_text: &str) -> Result<u64> {
        let fact_id = self.builder.ingest(fact_text)?;
        self.generation += 1;
        Ok(fact_id)
    }

    /// Spawn-ready worker builder sharing this index's allocator and fact
    /// store, with its own merge channel registered.
    pub fn share(&mut self) -> Result<IndexBuilder<S, T>>
    where
        T: Clone,
    {
        let worker_id = self.merge.worker_count();
        let sender = self.merge.register();
        let store = self.builder.store.share()?;
        info!(worker = worker_id, "registered index worker");
        Ok(IndexBuilder::worker(
            store,
            self.builder.tokenizer.clone(),
            self.builder.allocator.clone(),
            worker_id,
            sender,
        ))
    }

    /// Drain every registered worker channel into the global vocabulary and
    /// triple list. Call after the workers have `shutdown`; protocol
    /// violations abort the merge cycle.
    pub fn merge(&mut self) -> Result<()> {
        if self.merge.worker_count() == 0 {
            return Ok(());
        }
        let result = self
            .merge
            .drain(&mut self.builder.vocab, &mut self.builder.triples);
        // the vocabulary may have grown even when the cycle failed
        self.generation += 1;
        result
    }

    /// Total facts allocated across all workers.
    pub fn fact_count(&self) -> u64 {
        self.builder.allocator.current()
    }

    /// Size of the global vocabulary.
    pub fn token_count(&self) -> usize {
        self.builder.vocab.len()
    }

    /// Score all facts against `query` and return up to `max_results`
    /// `(fact_id, score)` pairs, descending by score.
    ///
    /// Query tokens not present in the vocabulary contribute nothing; a
    /// query with no recognized tokens short-circuits to an empty result.
    /// Facts with no token overlap are never scored at all. When more facts
    /// score than fit the budget, a partial selection picks the winners
    /// before sorting just that subset; ties break toward the smaller fact
    /// id in both paths.
    pub fn rank(&mut self, query: &str, max_results: usize) -> Result<Vec<(u64, f64)>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        let tokens = self.builder.tokenizer.tokenize(query);
        let mut query_counts: IndexMap<u32, u32> = IndexMap::new();
        for token in &tokens {
            if let Some(id) = self.builder.vocab.get(token) {
                *query_counts.entry(id).or_insert(0) += 1;
            }
        }
        if query_counts.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_weighted()?;
        let Some(weighted) = &self.weighted else {
            return Ok(Vec::new());
        };

        let mut scores: HashMap<u64, f64> = HashMap::new();
        for (token_id, count) in query_counts {
            let query_weight = E::tf(count) * weighted.idf(token_id);
            if query_weight == 0.0 {
                continue;
            }
            let (fact_ids, weights) = weighted.row(token_id);
            for (&fact_id, &weight) in fact_ids.iter().zip(weights) {
                *scores.entry(fact_id).or_insert(0.0) += query_weight * weight;
            }
        }

        let mut hits: Vec<(u64, f64)> = scores.into_iter().collect();
        let by_rank =
            |a: &(u64, f64), b: &(u64, f64)| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0));
        if hits.len() > max_results {
            hits.select_nth_unstable_by(max_results - 1, by_rank);
            hits.truncate(max_results);
        }
        hits.sort_unstable_by(by_rank);
        Ok(hits)
    }

    /// Rank facts against `query` and lazily resolve each winner's text
    /// through the fact store, preserving descending score order.
    pub fn retrieve<'a>(
        &'a mut self,
        query: &str,
        max_results: usize,
    ) -> Result<RetrievedFacts<'a, S>> {
        let ranked = self.rank(query, max_results)?;
        Ok(RetrievedFacts {
            store: &self.builder.store,
            ranked: ranked.into_iter(),
        })
    }

    /// Persist the vocabulary and count matrix.
    pub fn save(&mut self, vocab_path: &Path, index_path: &Path) -> Result<()> {
        self.ensure_counts()?;
        if let Some(counts) = &self.counts {
            serde_cbor::to_writer(BufWriter::new(File::create(index_path)?), counts)?;
            serde_cbor::to_writer(
                BufWriter::new(File::create(vocab_path)?),
                &self.builder.vocab,
            )?;
            info!(
                tokens = self.builder.vocab.len(),
                facts = self.builder.allocator.current(),
                "saved index artifacts"
            );
        }
        Ok(())
    }

    /// Load a previously saved vocabulary and count matrix.
    ///
    /// Missing artifacts are not an error: the index simply starts empty.
    /// On success the matrix is expanded back into triples so later
    /// ingestion accumulates into the loaded data, and the allocator resumes
    /// from the persisted fact-id high-water mark. Call before `share`:
    /// worker handles cloned earlier keep the old allocator.
    pub fn load(&mut self, vocab_path: &Path, index_path: &Path) -> Result<()> {
        if !vocab_path.exists() || !index_path.exists() {
            info!("no persisted index found, starting empty");
            return Ok(());
        }
        let vocab: Vocabulary = serde_cbor::from_reader(BufReader::new(File::open(vocab_path)?))?;
        let counts: CountMatrix = serde_cbor::from_reader(BufReader::new(File::open(index_path)?))?;
        let (num_tokens, num_facts) = counts.shape();
        if vocab.len() != num_tokens {
            return Err(RetrieverError::CorruptArtifact(format!(
                "vocabulary has {} tokens but the matrix has {} rows",
                vocab.len(),
                num_tokens
            )));
        }
        self.builder.vocab = vocab;
        self.builder.triples = counts.to_triples();
        self.builder.allocator = FactIdAllocator::resume_from(num_facts);
        self.generation += 1;
        self.built_generation = self.generation;
        self.counts = Some(counts);
        self.weighted = None;
        info!(tokens = num_tokens, facts = num_facts, "loaded persisted index");
        Ok(())
    }

    fn invalidate_if_stale(&mut self) {
        if self.built_generation != self.generation {
            self.counts = None;
            self.weighted = None;
            self.built_generation = self.generation;
        }
    }

    fn ensure_counts(&mut self) -> Result<()> {
        self.invalidate_if_stale();
        if self.counts.is_none() {
            self.counts = Some(CountMatrix::from_triples(
                &self.builder.triples,
                self.builder.vocab.len(),
                self.builder.allocator.current(),
            )?);
        }
        Ok(())
    }

    fn ensure_weighted(&mut self) -> Result<()> {
        self.ensure_counts()?;
        if self.weighted.is_none() {
            if let Some(counts) = &self.counts {
                self.weighted = Some(WeightedMatrix::from_counts::<E>(counts));
            }
        }
        Ok(())
    }
}

impl<T, E> FactRetriever<SqliteFactStore, T, E>
where
    T: Tokenizer,
    E: TfIdfEngine,
{
    /// Open a retriever over the configured sqlite fact database, loading
    /// any persisted vocabulary/matrix artifacts next to it.
    pub fn open(config: &RetrieverConfig, tokenizer: T) -> Result<Self> {
        let store = SqliteFactStore::open(&config.database_path)?;
        let mut retriever = Self::new(store, tokenizer);
        retriever.load(&config.vocab_path, &config.index_path)?;
        Ok(retriever)
    }
}

/// Lazily yields retrieved fact texts in descending score order; each step
/// performs one fact-store lookup.
pub struct RetrievedFacts<'a, S>
where
    S: FactStore,
{
    store: &'a S,
    ranked: std::vec::IntoIter<(u64, f64)>,
}

impl<S> Iterator for RetrievedFacts<'_, S>
where
    S: FactStore,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let (fact_id, _score) = self.ranked.next()?;
        Some(match self.store.lookup(fact_id) {
            Ok(Some(fact)) => Ok(fact),
            Ok(None) => Err(RetrieverError::MissingFact(fact_id)),
            Err(e) => Err(e),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ranked.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFactStore;
    use crate::tokenizer::SimpleTokenizer;

    fn retriever() -> FactRetriever<MemoryFactStore, SimpleTokenizer> {
        FactRetriever::new(MemoryFactStore::new(), SimpleTokenizer)
    }

    fn collect_texts(facts: RetrievedFacts<'_, MemoryFactStore>) -> Vec<String> {
        facts.map(|f| f.unwrap()).collect()
    }

    #[test]
    fn exact_token_match_ranks_first() {
        let mut r = retriever();
        r.ingest("the cat sat").unwrap();
        r.ingest("the dog ran").unwrap();
        r.ingest("cats and dogs").unwrap();

        let texts = collect_texts(r.retrieve("cat", DEFAULT_MAX_RESULTS).unwrap());
        assert!(!texts.is_empty());
        assert!(texts.len() <= DEFAULT_MAX_RESULTS);
        assert_eq!(texts[0], "the cat sat");
        // "cats" is a different token, so no other fact matches "cat"
        assert_eq!(texts.len(), 1);
    }

    #[test]
    fn out_of_vocabulary_query_returns_empty_not_error() {
        let mut r = retriever();
        r.ingest("the cat sat").unwrap();
        let texts = collect_texts(r.retrieve("zzzqqq", DEFAULT_MAX_RESULTS).unwrap());
        assert!(texts.is_empty());
    }

    #[test]
    fn query_against_an_empty_index_is_empty() {
        let mut r = retriever();
        assert!(r.rank("anything", DEFAULT_MAX_RESULTS).unwrap().is_empty());
    }

    #[test]
    fn results_contain_only_ingested_ids_without_duplicates() {
        let mut r = retriever();
        let mut ids = Vec::new();
        for text in ["red fox", "red panda", "blue whale", "red squirrel"] {
            ids.push(r.ingest(text).unwrap());
        }
        let hits = r.rank("red animal fox", DEFAULT_MAX_RESULTS).unwrap();
        let mut seen = std::collections::HashSet::new();
        for (fact_id, _) in &hits {
            assert!(ids.contains(fact_id));
            assert!(seen.insert(*fact_id), "duplicate fact id in one call");
        }
    }

    #[test]
    fn retrieve_is_idempotent_without_intervening_ingestion() {
        let mut r = retriever();
        for text in ["alpha beta", "beta gamma", "gamma delta", "alpha delta", "epsilon zeta"] {
            r.ingest(text).unwrap();
        }
        let first = r.rank("alpha gamma", 3).unwrap();
        let second = r.rank("alpha gamma", 3).unwrap();
        assert_eq!(first, second);
    }

    // ten facts, four of which mention "zebra" with decreasing emphasis:
    // zebra's df stays below half the corpus so its idf is positive
    fn zebra_corpus(r: &mut FactRetriever<MemoryFactStore, SimpleTokenizer>) {
        r.ingest("zebra zebra zebra zebra herd").unwrap(); // 0
        r.ingest("zebra zebra zebra plains").unwrap(); // 1
        r.ingest("zebra zebra stripe").unwrap(); // 2
        r.ingest("zebra savanna").unwrap(); // 3
        for filler in ["lion", "hyena", "gnu", "stork", "acacia", "river"] {
            r.ingest(filler).unwrap();
        }
    }

    #[test]
    fn exactly_max_results_scoring_facts_are_all_returned_in_order() {
        let mut r = retriever();
        zebra_corpus(&mut r);
        let hits = r.rank("zebra", 4).unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(
            hits.iter().map(|&(id, _)| id).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn partial_selection_keeps_only_the_best_scores() {
        let mut r = retriever();
        zebra_corpus(&mut r);
        // four facts score; cap at 3
        let hits = r.rank("zebra", 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(
            hits.iter().map(|&(id, _)| id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // nothing excluded scores above anything included
        let all = r.rank("zebra", 10).unwrap();
        let worst_kept = hits.last().unwrap().1;
        for (fact_id, score) in all.iter().skip(3) {
            assert!(*score <= worst_kept, "fact {fact_id} outscores a kept hit");
        }
    }

    #[test]
    fn equal_scores_break_toward_the_smaller_fact_id() {
        let mut r = retriever();
        // three identical facts, plus fillers to keep idf positive
        for _ in 0..3 {
            r.ingest("osprey nest").unwrap();
        }
        for filler in ["pike", "reed", "shore", "gull"] {
            r.ingest(filler).unwrap();
        }
        let hits = r.rank("osprey", 2).unwrap();
        assert_eq!(hits.iter().map(|&(id, _)| id).collect::<Vec<_>>(), vec![0, 1]);
        let all = r.rank("osprey", 10).unwrap();
        assert_eq!(all.iter().map(|&(id, _)| id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn a_token_in_every_fact_scores_nothing() {
        let mut r = retriever();
        r.ingest("common cat").unwrap();
        r.ingest("common dog").unwrap();
        r.ingest("common bird").unwrap();
        // df == num_facts, idf clamps to zero, so the query contributes nothing
        assert!(r.rank("common", DEFAULT_MAX_RESULTS).unwrap().is_empty());
        // a discriminating token still works
        assert_eq!(r.rank("cat", DEFAULT_MAX_RESULTS).unwrap().len(), 1);
    }

    #[test]
    fn ingestion_invalidates_the_cached_weighted_matrix() {
        let mut r = retriever();
        r.ingest("comet dust").unwrap();
        for filler in ["asteroid belt", "kuiper object", "oort cloud"] {
            r.ingest(filler).unwrap();
        }
        assert_eq!(r.rank("comet", 10).unwrap().len(), 1);
        // new fact must be visible to the next query, not served stale
        let id = r.ingest("comet tail").unwrap();
        let hits = r.rank("comet", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|&(fact_id, _)| fact_id == id));
    }

    #[test]
    fn worker_streams_merge_into_one_queryable_index() {
        let mut r = retriever();
        r.ingest("master fact about lighthouses").unwrap();
        r.ingest("harbor chart").unwrap();
        r.ingest("tide table").unwrap();

        let mut workers = Vec::new();
        for _ in 0..2 {
            workers.push(r.share().unwrap());
        }
        let handles: Vec<_> = workers
            .into_iter()
            .enumerate()
            .map(|(w, mut worker)| {
                std::thread::spawn(move || {
                    worker
                        .ingest(&format!("worker {w} fact about lighthouses"))
                        .unwrap();
                    worker.ingest(&format!("worker {w} fact about buoys")).unwrap();
                    worker.ingest(&format!("worker {w} keeps a logbook")).unwrap();
                    worker.shutdown().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        r.merge().unwrap();

        assert_eq!(r.fact_count(), 9);
        let hits = r.rank("lighthouses", DEFAULT_MAX_RESULTS).unwrap();
        assert_eq!(hits.len(), 3);
        let ids: std::collections::HashSet<u64> = hits.iter().map(|&(id, _)| id).collect();
        assert_eq!(ids.len(), 3, "fact ids must be pairwise distinct across workers");
        for text in collect_texts(r.retrieve("buoys", DEFAULT_MAX_RESULTS).unwrap()) {
            assert!(text.contains("buoys"));
        }
    }

    #[test]
    fn failed_merge_serves_none_of_the_cycles_triples() {
        let mut r = retriever();
        for filler in ["granary door", "mill pond", "field gate"] {
            r.ingest(filler).unwrap();
        }
        let mut finisher = r.share().unwrap();
        let deserter = r.share().unwrap();
        finisher.ingest("lantern in the window").unwrap();
        finisher.shutdown().unwrap();
        // dropped without its end-of-stream marker
        drop(deserter);

        assert!(r.merge().is_err());
        // the aborted cycle's triples are discarded, not partially applied
        assert!(r.rank("lantern", 10).unwrap().is_empty());
        // the master's own facts still rank
        assert_eq!(r.rank("pond", 10).unwrap().len(), 1);
    }

    #[test]
    fn save_and_load_reproduce_identical_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let vocab_path = dir.path().join("index.tokens");
        let index_path = dir.path().join("index.cbor");

        let store = MemoryFactStore::new();
        let mut original = FactRetriever::<_, _>::new(store.share().unwrap(), SimpleTokenizer);
        for text in ["harbor seal", "harbor master", "open sea", "seal colony", "kelp forest"] {
            original.ingest(text).unwrap();
        }
        let expected = original.rank("harbor seal", 3).unwrap();
        assert!(!expected.is_empty());
        original.save(&vocab_path, &index_path).unwrap();

        let mut reloaded = FactRetriever::<_, _>::new(store, SimpleTokenizer);
        reloaded.load(&vocab_path, &index_path).unwrap();
        assert_eq!(reloaded.fact_count(), 5);
        assert_eq!(reloaded.rank("harbor seal", 3).unwrap(), expected);
    }

    #[test]
    fn ingestion_after_load_accumulates_into_the_loaded_index() {
        let dir = tempfile::tempdir().unwrap();
        let vocab_path = dir.path().join("index.tokens");
        let index_path = dir.path().join("index.cbor");

        let store = MemoryFactStore::new();
        let mut original = FactRetriever::<_, _>::new(store.share().unwrap(), SimpleTokenizer);
        for text in ["granite cliff", "limestone cave", "basalt column", "chalk down"] {
            original.ingest(text).unwrap();
        }
        original.save(&vocab_path, &index_path).unwrap();

        let mut reloaded = FactRetriever::<_, _>::new(store, SimpleTokenizer);
        reloaded.load(&vocab_path, &index_path).unwrap();
        // allocator resumes past the persisted facts
        let id = reloaded.ingest("granite quarry").unwrap();
        assert_eq!(id, 4);
        let hits = reloaded.rank("granite", 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn load_with_missing_artifacts_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = retriever();
        r.load(&dir.path().join("absent.tokens"), &dir.path().join("absent.cbor"))
            .unwrap();
        assert_eq!(r.fact_count(), 0);
        r.ingest("fresh start").unwrap();
        for filler in ["stale bread", "old news"] {
            r.ingest(filler).unwrap();
        }
        assert_eq!(r.fact_count(), 3);
        assert_eq!(r.rank("fresh", 10).unwrap().len(), 1);
    }

    #[test]
    fn sqlite_backed_retriever_round_trips_through_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = RetrieverConfig::from_index_path(dir.path().join("main.idx"));

        let mut first =
            FactRetriever::<_, _>::open(&config, SimpleTokenizer).unwrap();
        first.ingest("voyager probe").unwrap();
        first.ingest("pioneer probe").unwrap();
        first.ingest("hubble telescope").unwrap();
        let expected = first.rank("voyager probe", 10).unwrap();
        first.save(&config.vocab_path, &config.index_path).unwrap();
        drop(first);

        let mut second =
            FactRetriever::<_, _>::open(&config, SimpleTokenizer).unwrap();
        assert_eq!(second.fact_count(), 3);
        assert_eq!(second.rank("voyager probe", 10).unwrap(), expected);
        let texts: Vec<String> = second
            .retrieve("telescope", 10)
            .unwrap()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(texts, vec!["hubble telescope".to_string()]);
    }
}
