/// This crate is a term-match fact retriever: a persistent fact store, a
/// parallel TF-IDF index build pipeline, and a sparse scoring engine.
pub mod config;
pub mod error;
pub mod index;
pub mod store;
pub mod tokenizer;

/// Fact Retriever
/// The top-level struct of this crate: ingest free-text facts, index them,
/// and retrieve the best-matching facts for a query by TF-IDF score.
///
/// Internally, it holds:
/// - The global token vocabulary
/// - The accumulated `(token, fact, count)` frequency triples
/// - The merge coordinator for worker ingestion streams
/// - Generation-tracked caches of the count and weighted matrices
///
/// `FactRetriever<S, T, E>` has the following generic parameters:
/// - `S`: Fact store backend (e.g., `SqliteFactStore`, `MemoryFactStore`)
/// - `T`: Tokenizer (e.g., `SimpleTokenizer`)
/// - `E`: TF-IDF weighting engine (defaults to `DefaultTfIdfEngine`)
///
/// For parallel index builds, call `share` once per worker thread and move
/// each returned `IndexBuilder` into its thread; after the workers
/// `shutdown`, one `merge` call folds their streams into the global index.
///
/// # Persistence
/// `save`/`load` persist the vocabulary and count matrix as CBOR artifacts;
/// ingestion after a `load` accumulates into the restored index.
pub use index::engine::{FactRetriever, RetrievedFacts, DEFAULT_MAX_RESULTS};

/// Index Builder
/// Per-thread ingestion frontend. Each builder owns a local vocabulary and
/// triple buffer; `shutdown` streams both to the merge coordinator.
pub use index::builder::IndexBuilder;

/// Merge Coordinator and its wire messages
/// Master-side reconciliation of worker ingestion streams: interns each
/// worker's announced tokens into the global vocabulary and translates its
/// triples through the resulting local-to-global table.
pub use index::merge::{MergeCoordinator, MergeMessage};

/// Token Vocabulary
/// Bidirectional token/id mapping with dense first-seen ids.
pub use index::vocab::Vocabulary;

/// Global Fact-Id Allocator
/// Cloneable handle onto one shared counter; ids are dense and unique
/// across every thread that ingests.
pub use index::alloc::FactIdAllocator;

/// Frequency Triple
/// One `(token_id, fact_id, count)` observation, the unit of data flowing
/// from ingestion into the count matrix.
pub use index::FrequencyTriple;

/// Count and Weighted matrices
/// `CountMatrix` is the CSR token-by-fact term-frequency matrix and the
/// persisted index artifact; `WeightedMatrix` is its TF-IDF weighted
/// derivative used for scoring.
pub use index::matrix::CountMatrix;
pub use index::tfidf::WeightedMatrix;

/// TF-IDF Engine Trait
/// Implement to plug a different weighting scheme into `FactRetriever<E>`.
/// The provided `DefaultTfIdfEngine` uses smoothed idf with negative
/// weights clamped to zero and log-dampened term frequency.
pub use index::tfidf::{DefaultTfIdfEngine, TfIdfEngine};

/// Fact Store backends
/// `FactStore` is the persistence seam: `SqliteFactStore` keeps facts in a
/// WAL-mode sqlite database shared across worker handles, `MemoryFactStore`
/// backs tests and ephemeral indices.
pub use store::{FactStore, MemoryFactStore, SqliteFactStore};

/// Tokenizers
/// `SimpleTokenizer` lowercases and splits on non-alphanumeric runs;
/// implement `Tokenizer` for smarter analysis.
pub use tokenizer::{SimpleTokenizer, Tokenizer};

/// Configuration
/// Artifact paths plus the ingestion cap; `from_index_path` derives the
/// database and vocabulary paths as siblings of the index file.
pub use config::{RetrieverConfig, DEFAULT_MAX_FACTS};

/// Error taxonomy of the crate.
pub use error::{Result, RetrieverError};
