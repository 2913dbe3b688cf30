//! The single-writer update transaction.
//!
//! Ops are staged into private buffers: a per-label overlay table under
//! `runtime/update_txn_<ts>/` for vertex rows, a staged-vertex key map
//! assigning deterministic vids past the committed population, and op
//! lists for edges. Staged rows shadow committed rows for the
//! transaction's lifetime. Commit appends one WAL record carrying the
//! accumulated op stream, applies it to the shared stores, publishes the
//! timestamp, and releases the write slot. Abort discards the buffers.
//! A handle dropped without commit aborts.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::graph::{EdgeEntry, GraphInner, TS_UNBOUNDED};
use crate::indexer::key_bytes;
use crate::schema::{EdgePayloadKind, EdgeStrategy, EdgeTripletSchema, VertexLabelSchema};
use crate::snapshot;
use crate::table::VertexTable;
use crate::txn::version::WriteGuard;
use crate::types::{Dir, LabelId, Timestamp, Vid};
use crate::value::{compatible, Any, AnyOwned, Decoder, Encoder};

struct LabelStage {
    base: u32,
    added_index: FxHashMap<Vec<u8>, u32>,
    added_oids: Vec<AnyOwned>,
    overlay: VertexTable,
    row_of: FxHashMap<u32, u32>,
}

struct StagedEdge {
    src_label: LabelId,
    src: Vid,
    dst_label: LabelId,
    dst: Vid,
    edge_label: LabelId,
    value: Vec<u8>,
}

struct StagedEdgeData {
    dir: Dir,
    label: LabelId,
    vid: Vid,
    nbr_label: LabelId,
    nbr: Vid,
    edge_label: LabelId,
    value: Vec<u8>,
}

/// Buffered single-writer transaction. Holds the write slot for its
/// whole lifetime.
pub struct UpdateTransaction {
    inner: Arc<GraphInner>,
    _slot: Option<WriteGuard>,
    ts: Timestamp,
    op_buf: Encoder,
    op_count: usize,
    stages: Vec<LabelStage>,
    staged_edges: Vec<StagedEdge>,
    staged_edge_data: Vec<StagedEdgeData>,
    txn_dir: PathBuf,
    finished: bool,
}

impl UpdateTransaction {
    pub(crate) fn begin(inner: Arc<GraphInner>) -> Result<Self> {
        let (slot, ts) = inner.vm.acquire_write();
        let txn_dir = snapshot::update_txn_dir(&inner.root, ts.0);
        if txn_dir.exists() {
            fs::remove_dir_all(&txn_dir)?;
        }
        fs::create_dir_all(&txn_dir)?;

        let mut stages = Vec::with_capacity(inner.store.schema.vertex_label_num());
        for (l, label) in inner.store.schema.vertex_labels.iter().enumerate() {
            stages.push(LabelStage {
                base: inner.store.vertex_count(LabelId(l as u8)),
                added_index: FxHashMap::default(),
                added_oids: Vec::new(),
                overlay: VertexTable::create(
                    &txn_dir,
                    &snapshot::vertex_table_prefix(&label.name),
                    &label.props,
                    &label.strategies,
                    0,
                )?,
                row_of: FxHashMap::default(),
            });
        }
        debug!(ts = ts.0, "update transaction began");
        Ok(Self {
            inner,
            _slot: Some(slot),
            ts,
            op_buf: Encoder::new(),
            op_count: 0,
            stages,
            staged_edges: Vec::new(),
            staged_edge_data: Vec::new(),
            txn_dir,
            finished: false,
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }

    pub fn op_count(&self) -> usize {
        self.op_count
    }

    fn label_schema(&self, label: LabelId) -> Result<&VertexLabelSchema> {
        self.inner.store.schema.vertex_label(label)
    }

    /// Committed-plus-staged population of a label.
    pub fn vertex_count(&self, label: LabelId) -> Result<u32> {
        let stage = self
            .stages
            .get(label.0 as usize)
            .ok_or(GraphError::OutOfRange("vertex label id"))?;
        Ok(stage.base + stage.added_oids.len() as u32)
    }

    fn oid_to_vid(&self, label: LabelId, oid: &Any<'_>) -> Result<Option<Vid>> {
        if let Some(vid) = self.inner.store.lookup(label, oid)? {
            return Ok(Some(vid));
        }
        let stage = &self.stages[label.0 as usize];
        let kb = key_bytes(oid, self.label_schema(label)?.primary_key.ty)?;
        Ok(stage
            .added_index
            .get(kb.as_slice())
            .map(|local| Vid(stage.base + local)))
    }

    fn vid_to_oid(&self, label: LabelId, vid: Vid) -> Result<AnyOwned> {
        let stage = &self.stages[label.0 as usize];
        if vid.0 < stage.base {
            self.inner.store.reverse(label, vid)
        } else {
            stage
                .added_oids
                .get((vid.0 - stage.base) as usize)
                .cloned()
                .ok_or(GraphError::OutOfRange("vid beyond staged population"))
        }
    }

    /// Inserts or merges a vertex. A fresh primary key is assigned the
    /// next vid past the committed population, deterministically in
    /// staging order; properties land in the overlay until commit.
    pub fn add_vertex(
        &mut self,
        label: LabelId,
        oid: &Any<'_>,
        props: &[Any<'_>],
    ) -> Result<()> {
        let schema = self.label_schema(label)?.clone();
        if props.len() != schema.props.len() {
            return Err(GraphError::TypeMismatch("property tuple arity"));
        }
        for (value, def) in props.iter().zip(schema.props.iter()) {
            if !compatible(value.type_of(), def.ty) {
                return Err(GraphError::TypeMismatch("vertex property type"));
            }
        }
        let kb = key_bytes(oid, schema.primary_key.ty)?;

        let vid = match self.oid_to_vid(label, oid)? {
            Some(vid) => vid,
            None => {
                let stage = &mut self.stages[label.0 as usize];
                let local = stage.added_oids.len() as u32;
                stage.added_index.insert(kb.to_vec(), local);
                stage.added_oids.push(oid.to_owned()?);
                Vid(stage.base + local)
            }
        };

        let stage = &mut self.stages[label.0 as usize];
        let row = match stage.row_of.get(&vid.0) {
            Some(&row) => row,
            None => {
                let row = stage.row_of.len() as u32;
                stage.row_of.insert(vid.0, row);
                stage.overlay.resize(row + 1)?;
                row
            }
        };
        stage.overlay.insert_row(Vid(row), props)?;

        self.op_buf.put_u8(0x00);
        self.op_buf.put_u8(label.0);
        self.op_buf.put_any(oid)?;
        for value in props {
            self.op_buf.put_any(value)?;
        }
        self.op_count += 1;
        Ok(())
    }

    /// Buffers one edge insert. Endpoints resolve through the committed
    /// indexers and this transaction's staged vertices.
    pub fn add_edge(
        &mut self,
        src_label: LabelId,
        src_oid: &Any<'_>,
        dst_label: LabelId,
        dst_oid: &Any<'_>,
        edge_label: LabelId,
        value: &Any<'_>,
    ) -> Result<()> {
        let triplet = self
            .inner
            .store
            .schema
            .triplet(src_label, dst_label, edge_label)
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        if triplet.out_strategy == EdgeStrategy::None
            && triplet.in_strategy == EdgeStrategy::None
        {
            return Err(GraphError::Disallowed("triplet stores no edges"));
        }
        check_edge_value(triplet, value)?;

        let src = self
            .oid_to_vid(src_label, src_oid)?
            .ok_or(GraphError::NotFound("source vertex"))?;
        let dst = self
            .oid_to_vid(dst_label, dst_oid)?
            .ok_or(GraphError::NotFound("destination vertex"))?;

        // Immutable `Single` slots refuse a second edge up front.
        if !triplet.mutable {
            let out_taken = triplet.out_strategy == EdgeStrategy::Single
                && ((src.0 < self.stages[src_label.0 as usize].base
                    && !self
                        .inner
                        .store
                        .edges(Dir::Out, src_label, dst_label, edge_label, src, TS_UNBOUNDED)?
                        .is_empty())
                    || self.staged_edges.iter().any(|e| {
                        e.src_label == src_label
                            && e.dst_label == dst_label
                            && e.edge_label == edge_label
                            && e.src == src
                    }));
            let in_taken = triplet.in_strategy == EdgeStrategy::Single
                && ((dst.0 < self.stages[dst_label.0 as usize].base
                    && !self
                        .inner
                        .store
                        .edges(Dir::In, src_label, dst_label, edge_label, dst, TS_UNBOUNDED)?
                        .is_empty())
                    || self.staged_edges.iter().any(|e| {
                        e.src_label == src_label
                            && e.dst_label == dst_label
                            && e.edge_label == edge_label
                            && e.dst == dst
                    }));
            if out_taken || in_taken {
                return Err(GraphError::Conflict);
            }
        }

        let mut enc = Encoder::new();
        enc.put_any(value)?;
        self.staged_edges.push(StagedEdge {
            src_label,
            src,
            dst_label,
            dst,
            edge_label,
            value: enc.into_bytes(),
        });

        self.op_buf.put_u8(0x01);
        self.op_buf.put_u8(src_label.0);
        self.op_buf.put_any(src_oid)?;
        self.op_buf.put_u8(dst_label.0);
        self.op_buf.put_any(dst_oid)?;
        self.op_buf.put_u8(edge_label.0);
        self.op_buf.put_any(value)?;
        self.op_count += 1;
        Ok(())
    }

    /// Stages a column-level update, copy-on-write into the overlay.
    pub fn set_vertex_field(
        &mut self,
        label: LabelId,
        vid: Vid,
        col: usize,
        value: &Any<'_>,
    ) -> Result<()> {
        let schema = self.label_schema(label)?;
        if col >= schema.props.len() {
            return Err(GraphError::OutOfRange("column id"));
        }
        if !compatible(value.type_of(), schema.props[col].ty) {
            return Err(GraphError::TypeMismatch("column value type"));
        }
        if vid.0 >= self.vertex_count(label)? {
            return Err(GraphError::OutOfRange("vid beyond population"));
        }

        let base = self.stages[label.0 as usize].base;
        let needs_copy =
            vid.0 < base && !self.stages[label.0 as usize].row_of.contains_key(&vid.0);
        let committed_row = if needs_copy {
            let cols = self.label_schema(label)?.props.len();
            let mut values = Vec::with_capacity(cols);
            for c in 0..cols {
                values.push(self.inner.store.vertex_field(label, vid, c)?);
            }
            Some(values)
        } else {
            None
        };

        let oid = self.vid_to_oid(label, vid)?;
        let stage = &mut self.stages[label.0 as usize];
        let row = match stage.row_of.get(&vid.0) {
            Some(&row) => row,
            None => {
                let row = stage.row_of.len() as u32;
                stage.row_of.insert(vid.0, row);
                stage.overlay.resize(row + 1)?;
                if let Some(values) = &committed_row {
                    let borrowed: Vec<Any<'_>> = values.iter().map(AnyOwned::as_any).collect();
                    stage.overlay.insert_row(Vid(row), &borrowed)?;
                }
                row
            }
        };
        stage.overlay.set(Vid(row), col, value)?;

        self.op_buf.put_u8(0x02);
        self.op_buf.put_u8(label.0);
        self.op_buf.put_any(&oid.as_any())?;
        self.op_buf.put_i32(col as i32);
        self.op_buf.put_any(value)?;
        self.op_count += 1;
        Ok(())
    }

    /// Vids visible to this transaction: the committed population plus
    /// staged vertices, in vid order.
    pub fn vertex_ids(&self, label: LabelId) -> Result<impl Iterator<Item = Vid>> {
        Ok((0..self.vertex_count(label)?).map(Vid))
    }

    /// Reads one column, staged rows shadowing committed ones.
    pub fn get_vertex_field(&self, label: LabelId, vid: Vid, col: usize) -> Result<AnyOwned> {
        if vid.0 >= self.vertex_count(label)? {
            return Err(GraphError::OutOfRange("vid beyond population"));
        }
        let stage = &self.stages[label.0 as usize];
        match stage.row_of.get(&vid.0) {
            Some(&row) => stage.overlay.get(Vid(row), col)?.to_owned(),
            None => self.inner.store.vertex_field(label, vid, col),
        }
    }

    /// Stages an edge-data update. With `Multiple` strategy the first
    /// match in insertion order is updated.
    pub fn set_edge_data(
        &mut self,
        dir: Dir,
        label: LabelId,
        vid: Vid,
        nbr_label: LabelId,
        nbr: Vid,
        edge_label: LabelId,
        value: &Any<'_>,
    ) -> Result<()> {
        let (src_label, dst_label, src, dst) = match dir {
            Dir::Out => (label, nbr_label, vid, nbr),
            Dir::In => (nbr_label, label, nbr, vid),
        };
        let triplet = self
            .inner
            .store
            .schema
            .triplet(src_label, dst_label, edge_label)
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        if !triplet.mutable {
            return Err(GraphError::Disallowed("edge data is immutable"));
        }
        if triplet.payload_kind() == EdgePayloadKind::None {
            return Err(GraphError::Disallowed("triplet carries no edge data"));
        }
        check_edge_value(triplet, value)?;

        let committed = src.0 < self.stages[src_label.0 as usize].base
            && dst.0 < self.stages[dst_label.0 as usize].base
            && (self
                .inner
                .store
                .edge_exists(Dir::Out, src_label, dst_label, edge_label, src, dst)?
                || self
                    .inner
                    .store
                    .edge_exists(Dir::In, src_label, dst_label, edge_label, dst, src)?);
        let staged = self.staged_edges.iter().any(|e| {
            e.src_label == src_label
                && e.dst_label == dst_label
                && e.edge_label == edge_label
                && e.src == src
                && e.dst == dst
        });
        if !committed && !staged {
            return Err(GraphError::NotFound("edge"));
        }

        let v_oid = self.vid_to_oid(label, vid)?;
        let nbr_oid = self.vid_to_oid(nbr_label, nbr)?;
        let mut enc = Encoder::new();
        enc.put_any(value)?;
        self.staged_edge_data.push(StagedEdgeData {
            dir,
            label,
            vid,
            nbr_label,
            nbr,
            edge_label,
            value: enc.into_bytes(),
        });

        self.op_buf.put_u8(0x03);
        self.op_buf.put_u8(dir.as_u8());
        self.op_buf.put_u8(label.0);
        self.op_buf.put_any(&v_oid.as_any())?;
        self.op_buf.put_u8(nbr_label.0);
        self.op_buf.put_any(&nbr_oid.as_any())?;
        self.op_buf.put_u8(edge_label.0);
        self.op_buf.put_any(value)?;
        self.op_count += 1;
        Ok(())
    }

    /// Outgoing edges as this transaction sees them: committed records
    /// plus staged inserts, with staged data updates shadowing.
    pub fn out_edges(
        &self,
        src_label: LabelId,
        dst_label: LabelId,
        edge_label: LabelId,
        vid: Vid,
    ) -> Result<Vec<EdgeEntry>> {
        let base = self
            .stages
            .get(src_label.0 as usize)
            .ok_or(GraphError::OutOfRange("vertex label id"))?
            .base;
        let mut edges = if vid.0 < base {
            self.inner
                .store
                .edges(Dir::Out, src_label, dst_label, edge_label, vid, TS_UNBOUNDED)?
        } else {
            Vec::new()
        };
        for staged in &self.staged_edges {
            if staged.src_label == src_label
                && staged.dst_label == dst_label
                && staged.edge_label == edge_label
                && staged.src == vid
            {
                edges.push(EdgeEntry {
                    nbr: staged.dst,
                    ts: self.ts,
                    data: Decoder::new(&staged.value).get_any()?.to_owned()?,
                });
            }
        }
        for upd in &self.staged_edge_data {
            let matches_out = upd.dir == Dir::Out
                && upd.label == src_label
                && upd.nbr_label == dst_label
                && upd.edge_label == edge_label
                && upd.vid == vid;
            let matches_in = upd.dir == Dir::In
                && upd.nbr_label == src_label
                && upd.label == dst_label
                && upd.edge_label == edge_label
                && upd.nbr == vid;
            if matches_out || matches_in {
                let target = if matches_out { upd.nbr } else { upd.vid };
                if let Some(entry) = edges.iter_mut().find(|e| e.nbr == target) {
                    entry.data = Decoder::new(&upd.value).get_any()?.to_owned()?;
                    entry.ts = self.ts;
                }
            }
        }
        Ok(edges)
    }

    /// Incoming edges as this transaction sees them.
    pub fn in_edges(
        &self,
        src_label: LabelId,
        dst_label: LabelId,
        edge_label: LabelId,
        vid: Vid,
    ) -> Result<Vec<EdgeEntry>> {
        let base = self
            .stages
            .get(dst_label.0 as usize)
            .ok_or(GraphError::OutOfRange("vertex label id"))?
            .base;
        let mut edges = if vid.0 < base {
            self.inner
                .store
                .edges(Dir::In, src_label, dst_label, edge_label, vid, TS_UNBOUNDED)?
        } else {
            Vec::new()
        };
        for staged in &self.staged_edges {
            if staged.src_label == src_label
                && staged.dst_label == dst_label
                && staged.edge_label == edge_label
                && staged.dst == vid
            {
                edges.push(EdgeEntry {
                    nbr: staged.src,
                    ts: self.ts,
                    data: Decoder::new(&staged.value).get_any()?.to_owned()?,
                });
            }
        }
        for upd in &self.staged_edge_data {
            let matches_in = upd.dir == Dir::In
                && upd.label == dst_label
                && upd.nbr_label == src_label
                && upd.edge_label == edge_label
                && upd.vid == vid;
            let matches_out = upd.dir == Dir::Out
                && upd.label == src_label
                && upd.nbr_label == dst_label
                && upd.edge_label == edge_label
                && upd.nbr == vid;
            if matches_in || matches_out {
                let target = if matches_in { upd.nbr } else { upd.vid };
                if let Some(entry) = edges.iter_mut().find(|e| e.nbr == target) {
                    entry.data = Decoder::new(&upd.value).get_any()?.to_owned()?;
                    entry.ts = self.ts;
                }
            }
        }
        Ok(edges)
    }

    /// Encodes the accumulated op stream and runs the commit protocol.
    /// Returns the published timestamp (or the current committed one for
    /// an empty transaction, which writes nothing).
    pub fn commit(mut self) -> Result<Timestamp> {
        self.finished = true;
        if self.op_count == 0 {
            let committed = self.inner.vm.committed();
            self.cleanup();
            debug!(ts = self.ts.0, "empty update transaction released");
            return Ok(committed);
        }

        let payload = std::mem::take(&mut self.op_buf).into_bytes();
        let append_result = self.inner.wal.lock().append(self.ts, &payload);
        if let Err(err) = append_result {
            warn!(ts = self.ts.0, %err, "wal append failed, aborting transaction");
            self.cleanup();
            return Err(err);
        }

        if let Err(err) = self.apply() {
            self.cleanup();
            return Err(GraphError::Corrupt(format!(
                "commit apply failed after wal write: {err}"
            )));
        }

        self.inner.vm.publish(self.ts);
        self.cleanup();
        debug!(ts = self.ts.0, ops = self.op_count, "update transaction committed");
        Ok(self.ts)
    }

    /// Discards all staged state without writing anything.
    pub fn abort(mut self) {
        self.finished = true;
        self.cleanup();
        debug!(ts = self.ts.0, "update transaction aborted");
    }

    fn apply(&mut self) -> Result<()> {
        let store = &self.inner.store;
        // Vertices first, in first-staged order per label, so vid
        // assignment matches the staging-time assignment exactly.
        for (l, stage) in self.stages.iter().enumerate() {
            let label = LabelId(l as u8);
            for (local, oid) in stage.added_oids.iter().enumerate() {
                let expected = Vid(stage.base + local as u32);
                let vid = store.add_vertex(label, &oid.as_any())?;
                if vid != expected {
                    return Err(GraphError::Corrupt(
                        "staged vid assignment diverged at apply".into(),
                    ));
                }
            }
            let mut rows: Vec<(u32, u32)> =
                stage.row_of.iter().map(|(vid, row)| (*vid, *row)).collect();
            rows.sort_unstable_by_key(|(vid, _)| *vid);
            for (vid, row) in rows {
                let values = stage.overlay.row_values(Vid(row))?;
                store.insert_vertex_row_owned(label, Vid(vid), &values)?;
            }
        }

        // Added edges grouped by triplet and source.
        let schema = &store.schema;
        self.staged_edges.sort_by_key(|e| {
            (
                schema.csr_index(e.src_label, e.dst_label, e.edge_label),
                e.src.0,
            )
        });
        for edge in &self.staged_edges {
            let value = Decoder::new(&edge.value).get_any()?;
            store.ingest_edge(
                edge.src_label,
                edge.src,
                edge.dst_label,
                edge.dst,
                edge.edge_label,
                &value,
                self.ts,
            )?;
        }

        // Edge-data updates last, in op order.
        for upd in &self.staged_edge_data {
            let value = Decoder::new(&upd.value).get_any()?;
            store.set_edge_data(
                upd.dir,
                upd.label,
                upd.vid,
                upd.nbr_label,
                upd.nbr,
                upd.edge_label,
                &value,
                self.ts,
            )?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stages.clear();
        self.staged_edges.clear();
        self.staged_edge_data.clear();
        if self.txn_dir.exists() {
            if let Err(err) = fs::remove_dir_all(&self.txn_dir) {
                warn!(dir = %self.txn_dir.display(), %err, "failed to remove overlay dir");
            }
        }
    }
}

impl Drop for UpdateTransaction {
    fn drop(&mut self) {
        // An abandoned handle is an abort: discard buffers, release the
        // slot, never advance the timestamp.
        if !self.finished {
            debug!(ts = self.ts.0, "update transaction dropped without commit");
            self.cleanup();
        }
    }
}

fn check_edge_value(triplet: &EdgeTripletSchema, value: &Any<'_>) -> Result<()> {
    match triplet.payload_kind() {
        EdgePayloadKind::None => {
            if matches!(value, Any::Empty) {
                Ok(())
            } else {
                Err(GraphError::TypeMismatch("triplet carries no edge data"))
            }
        }
        EdgePayloadKind::Inline(ty) => {
            if compatible(value.type_of(), ty) {
                Ok(())
            } else {
                Err(GraphError::TypeMismatch("edge data type"))
            }
        }
        EdgePayloadKind::Table => {
            if triplet.props.len() != 1 {
                return Err(GraphError::Unsupported(
                    "transactional writes to multi-property edge tables",
                ));
            }
            if compatible(value.type_of(), triplet.props[0].ty) {
                Ok(())
            } else {
                Err(GraphError::TypeMismatch("edge data type"))
            }
        }
    }
}
