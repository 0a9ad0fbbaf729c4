pub mod alloc;
pub mod builder;
pub mod engine;
pub mod matrix;
pub mod merge;
pub mod tfidf;
pub mod vocab;

use serde::{Deserialize, Serialize};

/// One observation of a token's term frequency within a fact.
///
/// `token_id` is local to the vocabulary of whichever builder produced the
/// triple; the merge coordinator translates it into the global vocabulary
/// before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyTriple {
    pub token_id: u32,
    pub fact_id: u64,
    pub count: u32,
}
