use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Bidirectional token-string / integer-id mapping.
///
/// Ids are dense, start at 0 and follow first-seen order; a token keeps its
/// id for the lifetime of the vocabulary. There is no removal. The insertion
/// index of the backing set *is* the id, so the whole mapping serializes as
/// one ordered blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    tokens: IndexSet<Box<str>>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `token`, assigning `len()` as a fresh id if the
    /// token has not been seen before.
    #[inline]
    pub fn intern(&mut self, token: &str) -> u32 {
        if let Some(id) = self.tokens.get_index_of(token) {
            return id as u32;
        }
        let (id, _) = self.tokens.insert_full(token.into());
        id as u32
    }

    /// Id of an already-interned token.
    #[inline]
    pub fn get(&self, token: &str) -> Option<u32> {
        self.tokens.get_index_of(token).map(|id| id as u32)
    }

    /// Token string for an id.
    #[inline]
    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.tokens.get_index(id as usize).map(|t| t.as_ref())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate `(id, token)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(id, t)| (id as u32, t.as_ref()))
    }
}
