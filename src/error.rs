use thiserror::Error;

/// Error taxonomy of the retrieval engine.
///
/// Storage errors are local to one `ingest`/`retrieve` call and never tear
/// down the index. Protocol errors indicate a broken worker stream and abort
/// the merge cycle that observed them.
#[derive(Debug, Error)]
pub enum RetrieverError {
    /// The fact store failed to persist or read a fact.
    #[error("fact store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The fact store backend is unavailable or rejected the operation.
    #[error("fact store unavailable: {0}")]
    StoreUnavailable(String),

    /// A ranked fact id had no record in the fact store.
    #[error("fact {0} is indexed but missing from the fact store")]
    MissingFact(u64),

    /// A worker emitted a triple whose local token id was never announced.
    /// The per-worker translation table is complete before any triple
    /// arrives, so this means the worker violated the wire protocol.
    #[error("worker {worker} sent a triple for local token {token_id} with no vocabulary announcement")]
    UntranslatedToken { worker: usize, token_id: u32 },

    /// A worker channel disconnected before its end-of-stream marker.
    #[error("worker {0} disconnected before signalling end-of-stream")]
    WorkerDisconnected(usize),

    /// The coordinator side of a worker channel is gone.
    #[error("merge channel for worker {0} is closed")]
    ChannelClosed(usize),

    /// A persisted vocabulary/matrix pair disagrees with itself.
    #[error("corrupt persisted index: {0}")]
    CorruptArtifact(String),

    /// Encoding or decoding a persisted artifact failed.
    #[error("persisted artifact codec error: {0}")]
    Persist(#[from] serde_cbor::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrieverError>;
