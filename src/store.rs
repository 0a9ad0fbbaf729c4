use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, RetrieverError};

/// Durable keyed store of `(fact_id, fact_text)` records.
///
/// Inserts must be serialized process-wide: the underlying backend is a
/// single write stream, and uncoordinated concurrent writers would corrupt
/// it. Lookups need no serialization. `share` hands a worker its own handle
/// to the same store, with the write lock shared across all handles.
pub trait FactStore {
    fn insert(&self, fact_id: u64, fact: &str) -> Result<()>;
    fn lookup(&self, fact_id: u64) -> Result<Option<String>>;
    fn share(&self) -> Result<Self>
    where
        Self: Sized;
}

/// Sqlite-backed fact store.
///
/// Schema: `facts (fact_id INTEGER PRIMARY KEY, fact TEXT NOT NULL)`.
/// Opened in WAL mode with a 60s busy timeout. Every handle on the same
/// database shares one process-wide write lock; the lock is scoped to the
/// single insert statement and released on every exit path.
pub struct SqliteFactStore {
    conn: Connection,
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteFactStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_lock(path.as_ref().to_path_buf(), Arc::new(Mutex::new(())))
    }

    fn open_with_lock(path: PathBuf, write_lock: Arc<Mutex<()>>) -> Result<Self> {
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(60))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS facts (fact_id INTEGER PRIMARY KEY, fact TEXT NOT NULL)",
        )?;
        Ok(SqliteFactStore {
            conn,
            path,
            write_lock,
        })
    }
}

impl FactStore for SqliteFactStore {
    fn insert(&self, fact_id: u64, fact: &str) -> Result<()> {
        let _write = self.write_lock.lock();
        self.conn.execute(
            "INSERT INTO facts (fact_id, fact) VALUES (?1, ?2)",
            params![fact_id as i64, fact],
        )?;
        Ok(())
    }

    fn lookup(&self, fact_id: u64) -> Result<Option<String>> {
        let fact = self
            .conn
            .query_row(
                "SELECT fact FROM facts WHERE fact_id = ?1",
                params![fact_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fact)
    }

    fn share(&self) -> Result<Self> {
        Self::open_with_lock(self.path.clone(), Arc::clone(&self.write_lock))
    }
}

/// In-memory fact store for tests and ephemeral indices.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactStore {
    facts: Arc<RwLock<HashMap<u64, String>>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.read().is_empty()
    }
}

impl FactStore for MemoryFactStore {
    fn insert(&self, fact_id: u64, fact: &str) -> Result<()> {
        let mut facts = self.facts.write();
        if facts.insert(fact_id, fact.to_string()).is_some() {
            return Err(RetrieverError::StoreUnavailable(format!(
                "duplicate fact id {fact_id}"
            )));
        }
        Ok(())
    }

    fn lookup(&self, fact_id: u64) -> Result<Option<String>> {
        Ok(self.facts.read().get(&fact_id).cloned())
    }

    fn share(&self) -> Result<Self> {
        Ok(self.clone())
    }
}
