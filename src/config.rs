use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default cap on the number of facts an index build consumes.
pub const DEFAULT_MAX_FACTS: usize = 100_000;

/// Paths of the persisted artifacts plus the ingestion cap.
///
/// The core treats every field as opaque pass-through: paths are only handed
/// to save/load and the fact store, and `max_facts` is only consulted by the
/// host loop that feeds facts in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Serialized count matrix.
    pub index_path: PathBuf,
    /// Serialized token-to-id vocabulary.
    pub vocab_path: PathBuf,
    /// Sqlite fact database.
    pub database_path: PathBuf,
    /// Maximum number of facts to ingest during a build.
    pub max_facts: usize,
}

impl RetrieverConfig {
    /// Derive a full config from the index path alone.
    ///
    /// The database and vocabulary land next to the index as
    /// `_<name>.db` / `_<name>.tokens`.
    pub fn from_index_path<P: AsRef<Path>>(index_path: P) -> Self {
        let index_path = index_path.as_ref().to_path_buf();
        let name = index_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("index");
        let sibling = |suffix: &str| index_path.with_file_name(format!("_{name}{suffix}"));
        RetrieverConfig {
            database_path: sibling(".db"),
            vocab_path: sibling(".tokens"),
            index_path,
            max_facts: DEFAULT_MAX_FACTS,
        }
    }

    pub fn with_max_facts(mut self, max_facts: usize) -> Self {
        self.max_facts = max_facts;
        self
    }
}
