use std::collections::HashMap;

use crossbeam::channel::{unbounded, Receiver, Select, Sender};
use tracing::{debug, error, info};

use crate::error::{Result, RetrieverError};
use crate::index::vocab::Vocabulary;
use crate::index::FrequencyTriple;

/// Message shapes on a worker→coordinator merge channel.
///
/// A conforming worker sends zero or more `Vocab` announcements, then zero
/// or more `Triple`s, then exactly one `EndOfStream`. The coordinator relies
/// on that order: a triple's local token id is only meaningful against the
/// vocabulary announced earlier on the same channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeMessage {
    /// `(token_string, local_token_id)` vocabulary announcement.
    Vocab(Box<str>, u32),
    /// Frequency triple in the sending worker's local vocabulary space.
    Triple(FrequencyTriple),
    /// Last message on the channel.
    EndOfStream,
}

/// Master-side reconciliation of N worker vocabularies and triple streams
/// into one global vocabulary and triple list.
///
/// Runs single-threaded and multiplexes cooperatively: the drain loop wakes
/// on whichever channel has data, so a slow worker never stalls the others'
/// already-buffered streams.
#[derive(Debug, Default)]
pub struct MergeCoordinator {
    channels: Vec<Receiver<MergeMessage>>,
}

impl MergeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one worker and hand back its sending end.
    pub fn register(&mut self) -> Sender<MergeMessage> {
        let (sender, receiver) = unbounded();
        self.channels.push(receiver);
        sender
    }

    pub fn worker_count(&self) -> usize {
        self.channels.len()
    }

    /// Drain every registered channel until all have signalled end-of-stream.
    ///
    /// Each worker's token strings are interned into `vocab` to build that
    /// worker's local→global translation table; its triples are translated
    /// into a staging buffer that reaches `out` only when every stream has
    /// drained cleanly. A triple whose local id has no translation entry, or
    /// a channel that disconnects before its sentinel, is a fatal protocol
    /// error: the whole cycle's triples are discarded and the error
    /// surfaces. Tokens announced before the failure may remain interned;
    /// they carry no triples and never score.
    pub fn drain(&mut self, vocab: &mut Vocabulary, out: &mut Vec<FrequencyTriple>) -> Result<()> {
        let workers = self.channels.len();
        if workers == 0 {
            return Ok(());
        }
        let mut staged: Vec<FrequencyTriple> = Vec::new();
        let result = self.drain_channels(vocab, &mut staged);
        // a cycle's channels are never re-read, clean or failed
        self.channels.clear();
        result?;
        out.extend(staged);
        info!(workers, triples = out.len(), "merge complete");
        Ok(())
    }

    fn drain_channels(
        &self,
        vocab: &mut Vocabulary,
        staged: &mut Vec<FrequencyTriple>,
    ) -> Result<()> {
        let workers = self.channels.len();
        let mut tables: Vec<HashMap<u32, u32>> = vec![HashMap::new(); workers];
        let mut finished = 0usize;

        let mut select = Select::new();
        for receiver in &self.channels {
            select.recv(receiver);
        }

        while finished < workers {
            let oper = select.select();
            let worker = oper.index();
            match oper.recv(&self.channels[worker]) {
                Ok(MergeMessage::Vocab(token, local_id)) => {
                    let global_id = vocab.intern(&token);
                    tables[worker].insert(local_id, global_id);
                }
                Ok(MergeMessage::Triple(triple)) => {
                    let global_id = *tables[worker].get(&triple.token_id).ok_or(
                        RetrieverError::UntranslatedToken {
                            worker,
                            token_id: triple.token_id,
                        },
                    )?;
                    staged.push(FrequencyTriple {
                        token_id: global_id,
                        ..triple
                    });
                }
                Ok(MergeMessage::EndOfStream) => {
                    // nothing further may be read from this worker
                    select.remove(worker);
                    finished += 1;
                    debug!(worker, translated = tables[worker].len(), "worker stream drained");
                }
                Err(_) => {
                    error!(worker, "worker disconnected before end-of-stream");
                    return Err(RetrieverError::WorkerDisconnected(worker));
                }
            }
        }
        Ok(())
    }
}
