//! Version manager: the monotonic timestamp counter and the exclusive
//! write slot.
//!
//! Readers acquire-load the published timestamp at begin and never take
//! a lock. Writers serialize on the slot mutex; the guard lives inside
//! the transaction handle, so dropping the handle releases the slot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::types::Timestamp;

/// Guard over the exclusive write slot, stored in update and compaction
/// transaction handles.
pub type WriteGuard = ArcMutexGuard<RawMutex, ()>;

pub struct VersionManager {
    committed: AtomicU32,
    write_slot: Arc<Mutex<()>>,
}

impl VersionManager {
    pub fn new(committed: Timestamp) -> Self {
        Self {
            committed: AtomicU32::new(committed.0),
            write_slot: Arc::new(Mutex::new(())),
        }
    }

    /// Latest published commit timestamp.
    pub fn committed(&self) -> Timestamp {
        Timestamp(self.committed.load(Ordering::Acquire))
    }

    /// Snapshot timestamp for a read transaction.
    pub fn begin_read(&self) -> Timestamp {
        self.committed()
    }

    /// Blocks until the write slot is free, then assigns the next
    /// timestamp. At most one writer (update or compaction) holds the
    /// slot at a time.
    pub fn acquire_write(&self) -> (WriteGuard, Timestamp) {
        let guard = self.write_slot.lock_arc();
        let ts = Timestamp(self.committed.load(Ordering::Acquire) + 1);
        (guard, ts)
    }

    /// Publishes `ts` as committed with release ordering; the final step
    /// of the commit protocol.
    pub fn publish(&self, ts: Timestamp) {
        self.committed.store(ts.0, Ordering::Release);
    }
}
