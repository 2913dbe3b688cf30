//! Compaction transactions: rewrite the live stores into a fresh
//! snapshot directory and switch `VERSION` atomically.
//!
//! Compaction shares the exclusive write slot with update transactions,
//! so at most one of either is in flight. Readers keep running against
//! the working stores throughout; only the final `VERSION` rename is the
//! visibility point for restarts.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::graph::GraphInner;
use crate::snapshot;
use crate::txn::version::WriteGuard;
use crate::types::Timestamp;

pub struct CompactionTransaction {
    inner: Arc<GraphInner>,
    _slot: Option<WriteGuard>,
    ts: Timestamp,
}

impl CompactionTransaction {
    pub(crate) fn begin(inner: Arc<GraphInner>) -> Result<Self> {
        let (slot, ts) = inner.vm.acquire_write();
        Ok(Self {
            inner,
            _slot: Some(slot),
            ts,
        })
    }

    /// The version the new snapshot will carry.
    pub fn version(&self) -> u32 {
        self.ts.0
    }

    /// Writes the snapshot (sorting triplets flagged for it), switches
    /// `VERSION`, and publishes the timestamp. WAL records at or below
    /// the new version are dead after this.
    pub fn commit(self) -> Result<u32> {
        let version = self.ts.0;
        let dst = snapshot::snapshot_dir(&self.inner.root, version);
        self.inner.store.flush_all()?;
        self.inner.store.dump_all(&dst, true)?;
        snapshot::write_version(&self.inner.root, version)?;
        self.inner.vm.publish(self.ts);
        info!(version, "compaction snapshot committed");
        Ok(version)
    }

    /// Releases the slot without writing anything. A partially written
    /// snapshot directory is ignored by restarts until `VERSION` names
    /// it.
    pub fn abort(self) {}
}
