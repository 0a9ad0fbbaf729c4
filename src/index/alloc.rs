use std::sync::Arc;

use parking_lot::Mutex;

/// Globally unique fact-id allocator.
///
/// One counter shared by every index builder through cloned handles; the
/// only shared mutable state in the system besides the merge channels and
/// the fact store's write lock. The critical section is read-increment-return
/// and nothing else.
#[derive(Debug, Clone, Default)]
pub struct FactIdAllocator {
    next: Arc<Mutex<u64>>,
}

impl FactIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume allocation after loading a persisted index: `next` is the
    /// number of facts already allocated.
    pub fn resume_from(next: u64) -> Self {
        FactIdAllocator {
            next: Arc::new(Mutex::new(next)),
        }
    }

    /// Hand out the next id. No two callers ever observe the same value,
    /// and ids are dense in allocation order.
    pub fn allocate(&self) -> u64 {
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn current(&self) -> u64 {
        *self.next.lock()
    }
}
