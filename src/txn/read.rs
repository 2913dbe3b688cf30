//! Read transactions: a snapshot timestamp plus captured per-label
//! vertex counts, acquired without blocking any writer.

use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::graph::{EdgeEntry, GraphInner};
use crate::types::{Dir, LabelId, Timestamp, Vid};
use crate::value::{Any, AnyOwned};

/// A lock-free reader observing the latest committed snapshot.
///
/// Vertices committed after `begin` sit beyond the captured counts and
/// edges committed after it carry later timestamps; both are filtered,
/// so the view stays consistent while the writer keeps appending.
/// Dropping the handle is the whole cancellation story.
pub struct ReadTransaction {
    inner: Arc<GraphInner>,
    ts: Timestamp,
    vnums: Vec<u32>,
}

impl ReadTransaction {
    pub(crate) fn begin(inner: Arc<GraphInner>) -> Self {
        // Counts first, timestamp second: the writer bumps counts before
        // publishing, so a reader that sees timestamp T sees at least
        // T's counts and the bound filters anything newer.
        let vnums = inner.store.vnum_snapshot();
        let ts = inner.vm.begin_read();
        Self { inner, ts, vnums }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }

    /// Population of `label` at the snapshot.
    pub fn vertex_count(&self, label: LabelId) -> Result<u32> {
        self.vnums
            .get(label.0 as usize)
            .copied()
            .ok_or(GraphError::OutOfRange("vertex label id"))
    }

    /// Primary-key lookup bounded by the snapshot population.
    pub fn lookup(&self, label: LabelId, oid: &Any<'_>) -> Result<Option<Vid>> {
        let bound = self.vertex_count(label)?;
        Ok(self
            .inner
            .store
            .lookup(label, oid)?
            .filter(|vid| vid.0 < bound))
    }

    /// Reverse lookup of a vertex's external identifier.
    pub fn vertex_oid(&self, label: LabelId, vid: Vid) -> Result<AnyOwned> {
        self.check_vid(label, vid)?;
        self.inner.store.reverse(label, vid)
    }

    /// Reads one property column of a vertex.
    pub fn vertex_field(&self, label: LabelId, vid: Vid, col: usize) -> Result<AnyOwned> {
        self.check_vid(label, vid)?;
        self.inner.store.vertex_field(label, vid, col)
    }

    /// Outgoing edges of `vid` for one triplet.
    pub fn out_edges(
        &self,
        src_label: LabelId,
        dst_label: LabelId,
        edge_label: LabelId,
        vid: Vid,
    ) -> Result<Vec<EdgeEntry>> {
        self.check_vid(src_label, vid)?;
        self.inner
            .store
            .edges(Dir::Out, src_label, dst_label, edge_label, vid, self.ts)
    }

    /// Incoming edges of `vid` for one triplet.
    pub fn in_edges(
        &self,
        src_label: LabelId,
        dst_label: LabelId,
        edge_label: LabelId,
        vid: Vid,
    ) -> Result<Vec<EdgeEntry>> {
        self.check_vid(dst_label, vid)?;
        self.inner
            .store
            .edges(Dir::In, src_label, dst_label, edge_label, vid, self.ts)
    }

    fn check_vid(&self, label: LabelId, vid: Vid) -> Result<()> {
        if vid.0 < self.vertex_count(label)? {
            Ok(())
        } else {
            Err(GraphError::OutOfRange("vid beyond snapshot population"))
        }
    }
}
