//! Per-page-range readers/writer locks with non-blocking acquisition.
//! Every table operation takes exactly one range lock and releases it
//! before returning; callers spin on failure. There is no fairness, no
//! upgrade, and no deadlock detection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

/// Lock manager shared by every table in the process.
pub static LOCK_MANAGER: Lazy<LockManager> = Lazy::new(LockManager::new);

/// A page range of one table: the table path composed with the range index,
/// so ranges of different tables never contend.
pub type RangeKey = (String, usize);

/// One readers/writer lock. Acquisition never blocks; it reports failure
/// and lets the caller decide to spin.
#[derive(Default)]
pub struct RangeLock {
    state: Mutex<RwState>,
}

#[derive(Default)]
struct RwState {
    num_readers: usize,
    is_writer: bool,
}

impl RangeLock {
    pub fn try_acquire_read(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.is_writer {
            return false;
        }
        state.num_readers += 1;
        true
    }

    pub fn try_acquire_write(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.is_writer || state.num_readers > 0 {
            return false;
        }
        state.is_writer = true;
        true
    }

    pub fn release_read(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.num_readers > 0, "release_read without a reader");
        state.num_readers -= 1;
    }

    pub fn release_write(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.is_writer, "release_write without a writer");
        state.is_writer = false;
    }
}

pub struct LockManager {
    locks: Mutex<HashMap<RangeKey, Arc<RangeLock>>>,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock for a range, created on first touch.
    fn lock_for(&self, table_path: &str, page_range_index: usize) -> Arc<RangeLock> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry((table_path.to_string(), page_range_index))
            .or_default()
            .clone()
    }

    pub fn acquire_read(&self, table_path: &str, page_range_index: usize) -> bool {
        self.lock_for(table_path, page_range_index).try_acquire_read()
    }

    pub fn acquire_write(&self, table_path: &str, page_range_index: usize) -> bool {
        self.lock_for(table_path, page_range_index).try_acquire_write()
    }

    pub fn release_read(&self, table_path: &str, page_range_index: usize) {
        self.lock_for(table_path, page_range_index).release_read()
    }

    pub fn release_write(&self, table_path: &str, page_range_index: usize) {
        self.lock_for(table_path, page_range_index).release_write()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share_writers_exclude() {
        let lock = RangeLock::default();

        assert!(lock.try_acquire_read());
        assert!(lock.try_acquire_read());
        assert!(!lock.try_acquire_write());

        lock.release_read();
        assert!(!lock.try_acquire_write());
        lock.release_read();
        assert!(lock.try_acquire_write());

        assert!(!lock.try_acquire_read());
        assert!(!lock.try_acquire_write());
        lock.release_write();
        assert!(lock.try_acquire_read());
    }

    #[test]
    fn manager_keys_by_table_and_range() {
        let manager = LockManager::new();

        assert!(manager.acquire_write("a", 0));
        // Same range of another table is independent.
        assert!(manager.acquire_write("b", 0));
        // Another range of the same table is independent.
        assert!(manager.acquire_write("a", 1));
        // The held range is not.
        assert!(!manager.acquire_write("a", 0));
        assert!(!manager.acquire_read("a", 0));

        manager.release_write("a", 0);
        assert!(manager.acquire_read("a", 0));
    }
}
