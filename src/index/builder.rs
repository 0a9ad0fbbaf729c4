use crossbeam::channel::Sender;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{Result, RetrieverError};
use crate::index::alloc::FactIdAllocator;
use crate::index::merge::MergeMessage;
use crate::index::vocab::Vocabulary;
use crate::index::FrequencyTriple;
use crate::store::FactStore;
use crate::tokenizer::Tokenizer;

/// Bulk-ingestion progress is logged once per this many facts.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Consumes facts and records `(token_id, fact_id, count)` triples against
/// its own local vocabulary.
///
/// The vocabulary and triple buffer are exclusively owned by this builder:
/// nothing is visible to the rest of the system until `shutdown` transmits
/// them over the merge channel. Only the fact-id allocator and the fact
/// store's write lock are shared.
pub struct IndexBuilder<S, T>
where
    S: FactStore,
    T: Tokenizer,
{
    pub(crate) store: S,
    pub(crate) tokenizer: T,
    pub(crate) allocator: FactIdAllocator,
    pub(crate) vocab: Vocabulary,
    pub(crate) triples: Vec<FrequencyTriple>,
    /// Worker id and outgoing merge channel; `None` for the master's own
    /// builder, whose vocabulary is already the global one.
    channel: Option<(usize, Sender<MergeMessage>)>,
    ingested: u64,
}

impl<S, T> IndexBuilder<S, T>
where
    S: FactStore,
    T: Tokenizer,
{
    pub(crate) fn master(store: S, tokenizer: T, allocator: FactIdAllocator) -> Self {
        IndexBuilder {
            store,
            tokenizer,
            allocator,
            vocab: Vocabulary::new(),
            triples: Vec::new(),
            channel: None,
            ingested: 0,
        }
    }

    pub(crate) fn worker(
        store: S,
        tokenizer: T,
        allocator: FactIdAllocator,
        worker_id: usize,
        sender: Sender<MergeMessage>,
    ) -> Self {
        IndexBuilder {
            store,
            tokenizer,
            allocator,
            vocab: Vocabulary::new(),
            triples: Vec::new(),
            channel: Some((worker_id, sender)),
            ingested: 0,
        }
    }

    /// Persist one fact and index its tokens.
    ///
    /// The fact id comes from the shared allocator; the store insert runs
    /// under the store's process-wide write lock. If the insert fails the
    /// call returns the error with no triple recorded, so non-persisted
    /// facts never leave partial index state behind.
    pub fn ingest(&mut self, fact_text: &str) -> Result<u64> {
        let fact_id = self.allocator.allocate();
        self.store.insert(fact_id, fact_text)?;

        let tokens = self.tokenizer.tokenize(fact_text);
        let mut counts: IndexMap<String, u32> = IndexMap::new();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }
        for (token, count) in counts {
            let token_id = self.vocab.intern(&token);
            self.triples.push(FrequencyTriple {
                token_id,
                fact_id,
                count,
            });
        }

        self.ingested += 1;
        if self.ingested % PROGRESS_INTERVAL == 0 {
            info!(facts = self.ingested, "ingestion progress");
        }
        Ok(fact_id)
    }

    /// Number of facts this builder has ingested.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    /// Flush this worker's vocabulary and triples to the coordinator and
    /// signal end-of-stream.
    ///
    /// Wire order is the protocol contract: every vocabulary announcement
    /// precedes every triple, and the sentinel comes last, so the
    /// coordinator's translation table for this worker is complete before
    /// any lookup against it.
    pub fn shutdown(self) -> Result<()> {
        let Some((worker_id, sender)) = self.channel else {
            // master-side builder: its buffers are drained in place
            return Ok(());
        };
        let send = |msg: MergeMessage| {
            sender
                .send(msg)
                .map_err(|_| RetrieverError::ChannelClosed(worker_id))
        };

        debug!(worker = worker_id, tokens = self.vocab.len(), "sending vocabulary");
        for (local_id, token) in self.vocab.iter() {
            send(MergeMessage::Vocab(token.into(), local_id))?;
        }
        debug!(worker = worker_id, triples = self.triples.len(), "sending triples");
        for triple in self.triples {
            send(MergeMessage::Triple(triple))?;
        }
        send(MergeMessage::EndOfStream)?;
        debug!(worker = worker_id, "all data sent");
        Ok(())
    }
}
