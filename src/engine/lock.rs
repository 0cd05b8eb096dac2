//! Write locks of in-memory directories.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

/// Named locks, each acquisition identified by a fresh token.
///
/// A handle stays valid only while the manager still maps its name to the
/// handle's token, so a forced release invalidates the previous holder.
#[derive(Debug, Default)]
pub(crate) struct MemoryLockManager {
    locks: Arc<Mutex<AHashMap<String, u64>>>,
    next_token: AtomicU64,
}

impl MemoryLockManager {
    /// Take the lock, or `None` when someone else holds it.
    pub(crate) fn try_acquire(&self, name: &str) -> Option<MemoryLock> {
        let mut locks = self.locks.lock();
        if locks.contains_key(name) {
            return None;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        locks.insert(name.to_string(), token);

        Some(MemoryLock {
            name: name.to_string(),
            token,
            locks: Arc::clone(&self.locks),
            released: false,
        })
    }

    pub(crate) fn is_held(&self, name: &str) -> bool {
        self.locks.lock().contains_key(name)
    }

    /// Remove a lock regardless of who holds it.
    pub(crate) fn force_release(&self, name: &str) {
        self.locks.lock().remove(name);
    }
}

/// A held lock, released on drop.
#[derive(Debug)]
pub(crate) struct MemoryLock {
    name: String,
    token: u64,
    locks: Arc<Mutex<AHashMap<String, u64>>>,
    released: bool,
}

impl MemoryLock {
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        let mut locks = self.locks.lock();
        if locks.get(&self.name) == Some(&self.token) {
            locks.remove(&self.name);
        }
        self.released = true;
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.released && self.locks.lock().get(&self.name) == Some(&self.token)
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        self.release();
    }
}
