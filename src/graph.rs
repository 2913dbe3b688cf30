//! The graph database facade and the shared store behind it.
//!
//! [`GraphDb`] owns the opened data root: schema image, the working
//! stores (indexers, vertex tables, CSR pairs, edge-side tables), the
//! version manager, and the WAL writer. Opening an empty root bootstraps
//! an empty snapshot 0; opening a populated root loads the `VERSION`
//! snapshot into working copies and replays WAL records committed after
//! it.
//!
//! The store keeps each structure behind its own `RwLock`. The single
//! writer (an update or compaction transaction holding the write slot)
//! takes short write locks during the apply phase; readers take short
//! read locks and materialize what they return, so no lock is ever held
//! across a call boundary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::csr::{CsrStore, MultipleCsr, NbrRecord, SingleCsr};
use crate::error::{GraphError, Result};
use crate::indexer::HashIndexer;
use crate::loader::{self, LoadingConfig};
use crate::mem::ArenaAllocator;
use crate::schema::{ColumnStrategy, EdgePayloadKind, EdgeStrategy, EdgeTripletSchema, Schema};
use crate::snapshot;
use crate::table::VertexTable;
use crate::txn::version::VersionManager;
use crate::txn::{CompactionTransaction, ReadTransaction, UpdateTransaction};
use crate::types::{Dir, LabelId, Timestamp, Vid};
use crate::value::{from_inline_bits, to_inline_bits, Any, AnyOwned, Decoder, PropType};
use crate::wal::{self, WalWriter};

/// Engine configuration. Constructed programmatically; there is no
/// config-file surface in the storage core.
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Worker threads for bulk load.
    pub worker_count: usize,
    /// WAL segment rollover threshold in bytes.
    pub wal_segment_bytes: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            wal_segment_bytes: wal::DEFAULT_SEGMENT_BYTES,
        }
    }
}

/// One edge surfaced to a reader: neighbor, commit timestamp, and the
/// resolved edge data.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeEntry {
    pub nbr: Vid,
    pub ts: Timestamp,
    pub data: AnyOwned,
}

/// Upper bound that admits every committed record (writer-side reads).
pub(crate) const TS_UNBOUNDED: Timestamp = Timestamp(u32::MAX);

pub(crate) struct GraphStore {
    pub(crate) schema: Schema,
    tails: PathBuf,
    indexers: Vec<RwLock<HashIndexer>>,
    tables: Vec<RwLock<VertexTable>>,
    oe: Vec<Option<RwLock<CsrStore>>>,
    ie: Vec<Option<RwLock<CsrStore>>>,
    edge_tables: Vec<Option<RwLock<VertexTable>>>,
    vnums: Vec<AtomicU32>,
}

impl GraphStore {
    /// Builds empty working stores under `runtime/tails`.
    fn create_empty(root: &Path, schema: &Schema) -> Result<Self> {
        let tails = snapshot::tails_dir(root);
        fs::create_dir_all(&tails)?;
        let mut indexers = Vec::new();
        let mut tables = Vec::new();
        let mut vnums = Vec::new();
        for label in &schema.vertex_labels {
            let map_prefix = snapshot::vertex_map_prefix(&label.name);
            indexers.push(RwLock::new(HashIndexer::create(
                &tails,
                &map_prefix,
                label.primary_key.ty,
                label.max_vertex_num.max(16),
            )?));
            let table_prefix = snapshot::vertex_table_prefix(&label.name);
            tables.push(RwLock::new(VertexTable::create(
                &tails,
                &table_prefix,
                &label.props,
                &label.strategies,
                0,
            )?));
            vnums.push(AtomicU32::new(0));
        }
        let mut store = Self {
            schema: schema.clone(),
            tails,
            indexers,
            tables,
            oe: none_slots(schema.csr_slots()),
            ie: none_slots(schema.csr_slots()),
            edge_tables: none_slots(schema.csr_slots()),
            vnums,
        };
        for t in &schema.triplets {
            let idx = schema.csr_index(t.src_label(), t.dst_label(), t.edge_label());
            let (oe_name, ie_name, edata_name) = store.triplet_prefixes(t)?;
            store.oe[idx] = Some(RwLock::new(create_csr(
                t.out_strategy,
                &store.tails.join(format!("{oe_name}.nbr")),
            )?));
            store.ie[idx] = Some(RwLock::new(create_csr(
                t.in_strategy,
                &store.tails.join(format!("{ie_name}.nbr")),
            )?));
            if t.payload_kind() == EdgePayloadKind::Table {
                store.edge_tables[idx] = Some(RwLock::new(VertexTable::create(
                    &store.tails,
                    &edata_name,
                    &t.props,
                    &vec![ColumnStrategy::Dense; t.props.len()],
                    0,
                )?));
            }
        }
        Ok(store)
    }

    /// Copies the `version` snapshot into working files and maps it.
    fn open(root: &Path, schema: &Schema, version: u32) -> Result<Self> {
        let snap = snapshot::snapshot_dir(root, version);
        let tails = snapshot::tails_dir(root);
        fs::create_dir_all(&tails)?;

        let mut indexers = Vec::new();
        let mut tables = Vec::new();
        let mut vnums = Vec::new();
        for label in &schema.vertex_labels {
            let map_prefix = snapshot::vertex_map_prefix(&label.name);
            for suffix in [".keys", ".keys.data", ".indices", ".meta"] {
                snapshot::copy_into(&snap.join(format!("{map_prefix}{suffix}")), &tails, &format!("{map_prefix}{suffix}"))?;
            }
            let indexer = HashIndexer::open(&tails, &map_prefix)?;
            let vnum = indexer.size();

            let table_prefix = snapshot::vertex_table_prefix(&label.name);
            for (i, (def, strategy)) in
                label.props.iter().zip(label.strategies.iter()).enumerate()
            {
                for name in column_file_names(&table_prefix, i, def.ty, *strategy) {
                    snapshot::copy_into(&snap.join(&name), &tails, &name)?;
                }
            }
            tables.push(RwLock::new(VertexTable::open(
                &tails,
                &table_prefix,
                &label.props,
                &label.strategies,
                vnum,
            )?));
            indexers.push(RwLock::new(indexer));
            vnums.push(AtomicU32::new(vnum));
        }

        let mut store = Self {
            schema: schema.clone(),
            tails: tails.clone(),
            indexers,
            tables,
            oe: none_slots(schema.csr_slots()),
            ie: none_slots(schema.csr_slots()),
            edge_tables: none_slots(schema.csr_slots()),
            vnums,
        };

        for t in &schema.triplets {
            let idx = schema.csr_index(t.src_label(), t.dst_label(), t.edge_label());
            let src_n = store.vertex_count(t.src_label());
            let dst_n = store.vertex_count(t.dst_label());
            let (oe_name, ie_name, edata_name) = store.triplet_prefixes(t)?;

            store.oe[idx] = Some(RwLock::new(open_csr(
                t.out_strategy,
                &snap,
                &tails,
                &oe_name,
                src_n,
            )?));
            store.ie[idx] = Some(RwLock::new(open_csr(
                t.in_strategy,
                &snap,
                &tails,
                &ie_name,
                dst_n,
            )?));

            if t.payload_kind() == EdgePayloadKind::Table {
                let rows = edge_table_rows(&snap, &edata_name, t)?;
                for (i, def) in t.props.iter().enumerate() {
                    for name in column_file_names(&edata_name, i, def.ty, ColumnStrategy::Dense) {
                        snapshot::copy_into(&snap.join(&name), &tails, &name)?;
                    }
                }
                store.edge_tables[idx] = Some(RwLock::new(VertexTable::open(
                    &tails,
                    &edata_name,
                    &t.props,
                    &vec![ColumnStrategy::Dense; t.props.len()],
                    rows,
                )?));
            }
        }
        Ok(store)
    }

    fn triplet_prefixes(&self, t: &EdgeTripletSchema) -> Result<(String, String, String)> {
        let src = &self.schema.vertex_label(t.src_label())?.name;
        let dst = &self.schema.vertex_label(t.dst_label())?.name;
        let edge = self.schema.edge_label_name(t.edge_label())?;
        Ok((
            snapshot::oe_prefix(src, edge, dst),
            snapshot::ie_prefix(src, edge, dst),
            snapshot::edata_prefix(src, edge, dst),
        ))
    }

    pub(crate) fn vertex_count(&self, label: LabelId) -> u32 {
        self.vnums
            .get(label.0 as usize)
            .map_or(0, |n| n.load(Ordering::Acquire))
    }

    pub(crate) fn vnum_snapshot(&self) -> Vec<u32> {
        self.vnums.iter().map(|n| n.load(Ordering::Acquire)).collect()
    }

    fn label_index(&self, label: LabelId) -> Result<usize> {
        if (label.0 as usize) < self.indexers.len() {
            Ok(label.0 as usize)
        } else {
            Err(GraphError::OutOfRange("vertex label id"))
        }
    }

    pub(crate) fn lookup(&self, label: LabelId, oid: &Any<'_>) -> Result<Option<Vid>> {
        let l = self.label_index(label)?;
        Ok(self.indexers[l].read().lookup(oid))
    }

    pub(crate) fn reverse(&self, label: LabelId, vid: Vid) -> Result<AnyOwned> {
        let l = self.label_index(label)?;
        self.indexers[l].read().reverse(vid)?.to_owned()
    }

    pub(crate) fn vertex_field(&self, label: LabelId, vid: Vid, col: usize) -> Result<AnyOwned> {
        let l = self.label_index(label)?;
        self.tables[l].read().get(vid, col)?.to_owned()
    }

    /// Inserts (or finds) a vertex by primary key, extending the table
    /// to cover the assigned vid.
    pub(crate) fn add_vertex(&self, label: LabelId, oid: &Any<'_>) -> Result<Vid> {
        let l = self.label_index(label)?;
        let (vid, is_new) = self.indexers[l].write().insert(oid)?;
        if is_new {
            let appended = self.tables[l].write().append_default_row()?;
            if appended != vid {
                return Err(GraphError::Corrupt(
                    "indexer and table disagree on vid assignment".into(),
                ));
            }
            self.vnums[l].store(vid.0 + 1, Ordering::Release);
        }
        Ok(vid)
    }

    pub(crate) fn set_vertex_field(
        &self,
        label: LabelId,
        vid: Vid,
        col: usize,
        value: &Any<'_>,
    ) -> Result<()> {
        let l = self.label_index(label)?;
        self.tables[l].write().set(vid, col, value)
    }

    pub(crate) fn insert_vertex_row_owned(
        &self,
        label: LabelId,
        vid: Vid,
        values: &[AnyOwned],
    ) -> Result<()> {
        let l = self.label_index(label)?;
        let borrowed: Vec<Any<'_>> = values.iter().map(AnyOwned::as_any).collect();
        self.tables[l].write().insert_row(vid, &borrowed)
    }

    pub(crate) fn ingest_vertex_row(
        &self,
        label: LabelId,
        vid: Vid,
        dec: &mut Decoder<'_>,
    ) -> Result<()> {
        let l = self.label_index(label)?;
        self.tables[l].write().ingest_row(vid, dec)
    }

    fn triplet(
        &self,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
    ) -> Result<(&EdgeTripletSchema, usize)> {
        let t = self
            .schema
            .triplet(src, dst, edge)
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        Ok((t, self.schema.csr_index(src, dst, edge)))
    }

    /// Edges of `vid` in one direction of a triplet, bounded by the
    /// reader's snapshot timestamp, with edge data resolved.
    pub(crate) fn edges(
        &self,
        dir: Dir,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
        vid: Vid,
        bound: Timestamp,
    ) -> Result<Vec<EdgeEntry>> {
        let (t, idx) = self.triplet(src, dst, edge)?;
        let side = match dir {
            Dir::Out => &self.oe[idx],
            Dir::In => &self.ie[idx],
        };
        let lock = side
            .as_ref()
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        let cursor = lock.read().iter(vid, bound);
        let kind = t.payload_kind();
        let mut out = Vec::with_capacity(cursor.len());
        for rec in cursor {
            out.push(EdgeEntry {
                nbr: rec.nbr,
                ts: rec.ts,
                data: self.resolve_payload(idx, t, kind, rec.payload)?,
            });
        }
        Ok(out)
    }

    fn resolve_payload(
        &self,
        idx: usize,
        t: &EdgeTripletSchema,
        kind: EdgePayloadKind,
        payload: u64,
    ) -> Result<AnyOwned> {
        match kind {
            EdgePayloadKind::None => Ok(AnyOwned::Empty),
            EdgePayloadKind::Inline(ty) => from_inline_bits(payload, ty).to_owned(),
            EdgePayloadKind::Table => {
                let table = self.edge_tables[idx]
                    .as_ref()
                    .ok_or_else(|| GraphError::Corrupt("missing edge-side table".into()))?
                    .read();
                let row = Vid(payload as u32);
                if t.props.len() == 1 {
                    table.get(row, 0)?.to_owned()
                } else {
                    Ok(AnyOwned::Record(table.row_values(row)?))
                }
            }
        }
    }

    /// True when a committed edge `vid → nbr` (per `dir`) exists.
    pub(crate) fn edge_exists(
        &self,
        dir: Dir,
        src: LabelId,
        dst: LabelId,
        edge: LabelId,
        vid: Vid,
        nbr: Vid,
    ) -> Result<bool> {
        let (_, idx) = self.triplet(src, dst, edge)?;
        let side = match dir {
            Dir::Out => &self.oe[idx],
            Dir::In => &self.ie[idx],
        };
        let lock = side
            .as_ref()
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        Ok(lock.read().iter(vid, TS_UNBOUNDED).any(|r| r.nbr == nbr))
    }

    /// Inserts one edge into both CSRs (and the edge-side table when the
    /// payload indirects). If either direction is a `Single` slot already
    /// holding this exact edge, the insert degrades to a data update, so
    /// live apply and WAL replay agree.
    pub(crate) fn ingest_edge(
        &self,
        src_label: LabelId,
        src: Vid,
        dst_label: LabelId,
        dst: Vid,
        edge_label: LabelId,
        value: &Any<'_>,
        ts: Timestamp,
    ) -> Result<()> {
        let (t, idx) = self.triplet(src_label, dst_label, edge_label)?;
        if t.out_strategy == EdgeStrategy::None && t.in_strategy == EdgeStrategy::None {
            return Err(GraphError::Disallowed("triplet stores no edges"));
        }
        if src.0 >= self.vertex_count(src_label) || dst.0 >= self.vertex_count(dst_label) {
            return Err(GraphError::OutOfRange("edge endpoint vid"));
        }
        let payload = self.encode_payload(idx, t, value)?;

        let oe = self.oe[idx]
            .as_ref()
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        let ie = self.ie[idx]
            .as_ref()
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;

        let out_held = oe.read().single_neighbor(src) == Some(dst);
        let in_held = ie.read().single_neighbor(dst) == Some(src);
        if out_held || in_held {
            if !t.mutable {
                return Err(GraphError::Conflict);
            }
            oe.write().set_data(src, dst, payload, ts)?;
            ie.write().set_data(dst, src, payload, ts)?;
            return Ok(());
        }

        oe.write().append(
            src,
            NbrRecord {
                nbr: dst,
                ts,
                payload,
            },
            t.mutable,
        )?;
        ie.write().append(
            dst,
            NbrRecord {
                nbr: src,
                ts,
                payload,
            },
            t.mutable,
        )?;
        Ok(())
    }

    fn encode_payload(
        &self,
        idx: usize,
        t: &EdgeTripletSchema,
        value: &Any<'_>,
    ) -> Result<u64> {
        match t.payload_kind() {
            EdgePayloadKind::None => {
                if matches!(value, Any::Empty) {
                    Ok(0)
                } else {
                    Err(GraphError::TypeMismatch("triplet carries no edge data"))
                }
            }
            EdgePayloadKind::Inline(ty) => to_inline_bits(value, ty),
            EdgePayloadKind::Table => {
                if t.props.len() != 1 {
                    return Err(GraphError::Unsupported(
                        "transactional writes to multi-property edge tables",
                    ));
                }
                let table = self.edge_tables[idx]
                    .as_ref()
                    .ok_or_else(|| GraphError::Corrupt("missing edge-side table".into()))?;
                let row = table.write().append_row(&[*value])?;
                Ok(u64::from(row))
            }
        }
    }

    /// Updates the data (and timestamp) of an existing edge in both
    /// directions. `Multiple` strategies update the first match in
    /// insertion order.
    pub(crate) fn set_edge_data(
        &self,
        dir: Dir,
        label: LabelId,
        vid: Vid,
        nbr_label: LabelId,
        nbr: Vid,
        edge_label: LabelId,
        value: &Any<'_>,
        ts: Timestamp,
    ) -> Result<()> {
        let (src_label, dst_label, src, dst) = match dir {
            Dir::Out => (label, nbr_label, vid, nbr),
            Dir::In => (nbr_label, label, nbr, vid),
        };
        let (t, idx) = self.triplet(src_label, dst_label, edge_label)?;
        if !t.mutable {
            return Err(GraphError::Disallowed("edge data is immutable"));
        }
        let oe = self.oe[idx]
            .as_ref()
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;
        let ie = self.ie[idx]
            .as_ref()
            .ok_or(GraphError::Disallowed("undeclared edge triplet"))?;

        let existing = oe
            .read()
            .iter(src, TS_UNBOUNDED)
            .find(|r| r.nbr == dst)
            .or_else(|| ie.read().iter(dst, TS_UNBOUNDED).find(|r| r.nbr == src))
            .ok_or(GraphError::NotFound("edge"))?;

        let payload = match t.payload_kind() {
            EdgePayloadKind::None => {
                return Err(GraphError::Disallowed("triplet carries no edge data"))
            }
            EdgePayloadKind::Inline(ty) => to_inline_bits(value, ty)?,
            EdgePayloadKind::Table => {
                if t.props.len() != 1 {
                    return Err(GraphError::Unsupported(
                        "transactional writes to multi-property edge tables",
                    ));
                }
                let table = self.edge_tables[idx]
                    .as_ref()
                    .ok_or_else(|| GraphError::Corrupt("missing edge-side table".into()))?;
                table
                    .write()
                    .set(Vid(existing.payload as u32), 0, value)?;
                existing.payload
            }
        };
        oe.write().set_data(src, dst, payload, ts)?;
        ie.write().set_data(dst, src, payload, ts)?;
        Ok(())
    }

    /// Applies one WAL payload (the op stream of a committed update
    /// transaction) at timestamp `ts`. Recoverable op errors are
    /// corruption here: the log recorded something the store will not
    /// take.
    pub(crate) fn ingest_wal_payload(&self, ts: Timestamp, payload: &[u8]) -> Result<()> {
        let mut dec = Decoder::new(payload);
        while !dec.is_empty() {
            let op = dec.get_u8().map_err(replay_err)?;
            match op {
                0x00 => {
                    let label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let oid = dec.get_any().map_err(replay_err)?;
                    let vid = match self.lookup(label, &oid).map_err(replay_err)? {
                        Some(vid) => vid,
                        None => self.add_vertex(label, &oid).map_err(replay_err)?,
                    };
                    self.ingest_vertex_row(label, vid, &mut dec)
                        .map_err(replay_err)?;
                }
                0x01 => {
                    let src_label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let src_oid = dec.get_any().map_err(replay_err)?;
                    let dst_label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let dst_oid = dec.get_any().map_err(replay_err)?;
                    let edge_label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let value = dec.get_any().map_err(replay_err)?;
                    let src = self
                        .lookup(src_label, &src_oid)
                        .map_err(replay_err)?
                        .ok_or_else(|| {
                            GraphError::Corrupt("wal edge references unknown source".into())
                        })?;
                    let dst = self
                        .lookup(dst_label, &dst_oid)
                        .map_err(replay_err)?
                        .ok_or_else(|| {
                            GraphError::Corrupt("wal edge references unknown destination".into())
                        })?;
                    self.ingest_edge(src_label, src, dst_label, dst, edge_label, &value, ts)
                        .map_err(replay_err)?;
                }
                0x02 => {
                    let label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let oid = dec.get_any().map_err(replay_err)?;
                    let col = dec.get_i32().map_err(replay_err)?;
                    let value = dec.get_any().map_err(replay_err)?;
                    let vid = self
                        .lookup(label, &oid)
                        .map_err(replay_err)?
                        .ok_or_else(|| {
                            GraphError::Corrupt("wal field update references unknown vertex".into())
                        })?;
                    self.set_vertex_field(label, vid, col as usize, &value)
                        .map_err(replay_err)?;
                }
                0x03 => {
                    let dir = Dir::from_u8(dec.get_u8().map_err(replay_err)?)
                        .ok_or_else(|| GraphError::Corrupt("wal edge-data direction".into()))?;
                    let label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let v_oid = dec.get_any().map_err(replay_err)?;
                    let nbr_label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let nbr_oid = dec.get_any().map_err(replay_err)?;
                    let edge_label = LabelId(dec.get_u8().map_err(replay_err)?);
                    let value = dec.get_any().map_err(replay_err)?;
                    let vid = self
                        .lookup(label, &v_oid)
                        .map_err(replay_err)?
                        .ok_or_else(|| {
                            GraphError::Corrupt("wal edge-data references unknown vertex".into())
                        })?;
                    let nbr = self
                        .lookup(nbr_label, &nbr_oid)
                        .map_err(replay_err)?
                        .ok_or_else(|| {
                            GraphError::Corrupt("wal edge-data references unknown neighbor".into())
                        })?;
                    self.set_edge_data(dir, label, vid, nbr_label, nbr, edge_label, &value, ts)
                        .map_err(replay_err)?;
                }
                other => {
                    return Err(GraphError::Corrupt(format!(
                        "unexpected op tag {other} in wal payload"
                    )))
                }
            }
        }
        Ok(())
    }

    pub(crate) fn flush_all(&self) -> Result<()> {
        for indexer in &self.indexers {
            indexer.read().flush()?;
        }
        for table in &self.tables {
            table.write().flush()?;
        }
        for side in [&self.oe, &self.ie] {
            for csr in side.iter().flatten() {
                csr.read().flush()?;
            }
        }
        for table in self.edge_tables.iter().flatten() {
            table.write().flush()?;
        }
        Ok(())
    }

    /// Writes a complete snapshot into `dst_dir`. With
    /// `sort_for_compaction`, triplets flagged `sort_on_compaction` get
    /// their neighbor runs sorted by edge data first.
    pub(crate) fn dump_all(&self, dst_dir: &Path, sort_for_compaction: bool) -> Result<()> {
        fs::create_dir_all(dst_dir)?;
        for (l, label) in self.schema.vertex_labels.iter().enumerate() {
            self.indexers[l]
                .read()
                .dump(dst_dir, &snapshot::vertex_map_prefix(&label.name))?;
            self.tables[l].read().dump(dst_dir)?;
        }
        for t in &self.schema.triplets {
            let idx = self
                .schema
                .csr_index(t.src_label(), t.dst_label(), t.edge_label());
            let (oe_name, ie_name, _) = self.triplet_prefixes(t)?;
            let src_n = self.vertex_count(t.src_label());
            let dst_n = self.vertex_count(t.dst_label());
            if sort_for_compaction && t.sort_on_compaction {
                if let EdgePayloadKind::Inline(ty) = t.payload_kind() {
                    if let Some(lock) = &self.oe[idx] {
                        lock.write().sort_by_payload(ty)?;
                    }
                    if let Some(lock) = &self.ie[idx] {
                        lock.write().sort_by_payload(ty)?;
                    }
                }
            }
            if let Some(lock) = &self.oe[idx] {
                lock.read().dump(
                    src_n,
                    &dst_dir.join(format!("{oe_name}.deg")),
                    &dst_dir.join(format!("{oe_name}.nbr")),
                )?;
            }
            if let Some(lock) = &self.ie[idx] {
                lock.read().dump(
                    dst_n,
                    &dst_dir.join(format!("{ie_name}.deg")),
                    &dst_dir.join(format!("{ie_name}.nbr")),
                )?;
            }
            if let Some(lock) = &self.edge_tables[idx] {
                lock.read().dump(dst_dir)?;
            }
        }
        Ok(())
    }
}

fn replay_err(err: GraphError) -> GraphError {
    match err {
        GraphError::Io(e) => GraphError::Io(e),
        GraphError::Corrupt(m) => GraphError::Corrupt(m),
        other => GraphError::Corrupt(format!("wal replay: {other}")),
    }
}

fn none_slots<T>(n: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(n).collect()
}

fn create_csr(strategy: EdgeStrategy, nbr_path: &Path) -> Result<CsrStore> {
    Ok(match strategy {
        EdgeStrategy::None => CsrStore::None,
        EdgeStrategy::Single => CsrStore::Single(SingleCsr::create(nbr_path)?),
        EdgeStrategy::Multiple => CsrStore::Multiple(MultipleCsr::create(nbr_path)?),
    })
}

fn open_csr(
    strategy: EdgeStrategy,
    snap: &Path,
    tails: &Path,
    prefix: &str,
    vnum: u32,
) -> Result<CsrStore> {
    let nbr_name = format!("{prefix}.nbr");
    let working = snapshot::copy_into(&snap.join(&nbr_name), tails, &nbr_name)?;
    Ok(match strategy {
        EdgeStrategy::None => CsrStore::None,
        EdgeStrategy::Single => CsrStore::Single(SingleCsr::open(&working, vnum)?),
        EdgeStrategy::Multiple => {
            let deg = fs::read(snap.join(format!("{prefix}.deg")))
                .map_err(|_| GraphError::Corrupt(format!("missing {prefix}.deg")))?;
            CsrStore::Multiple(MultipleCsr::open(&deg, &working)?)
        }
    })
}

fn column_file_names(
    prefix: &str,
    col: usize,
    ty: PropType,
    strategy: ColumnStrategy,
) -> Vec<String> {
    match (strategy, ty) {
        (ColumnStrategy::Dense, PropType::String | PropType::StringMap) => vec![
            format!("{prefix}.col_{col}.items"),
            format!("{prefix}.col_{col}.data"),
        ],
        _ => vec![format!("{prefix}.col_{col}")],
    }
}

fn edge_table_rows(snap: &Path, prefix: &str, t: &EdgeTripletSchema) -> Result<u32> {
    let first = &t.props[0];
    let (name, width) = match first.ty.fixed_width() {
        Some(w) if w > 0 => (format!("{prefix}.col_0"), w as u64),
        _ => (format!("{prefix}.col_0.items"), 12),
    };
    let len = fs::metadata(snap.join(&name)).map(|m| m.len()).unwrap_or(0);
    Ok((len / width) as u32)
}

pub(crate) struct GraphInner {
    pub(crate) root: PathBuf,
    pub(crate) config: GraphConfig,
    pub(crate) store: GraphStore,
    pub(crate) vm: VersionManager,
    pub(crate) wal: Mutex<WalWriter>,
}

/// An opened graph database.
pub struct GraphDb {
    inner: Arc<GraphInner>,
}

impl std::fmt::Debug for GraphDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDb").finish_non_exhaustive()
    }
}

impl GraphDb {
    /// Opens `root`, bootstrapping an empty snapshot 0 when the root has
    /// never held a graph. The schema must match the recorded image.
    pub fn open(root: &Path, schema: Schema) -> Result<Self> {
        Self::open_with_config(root, schema, GraphConfig::default())
    }

    pub fn open_with_config(root: &Path, schema: Schema, config: GraphConfig) -> Result<Self> {
        schema.validate()?;
        snapshot::create_layout(root)?;
        snapshot::clear_tmp(root)?;
        snapshot::clear_stale_update_txn_dirs(root)?;
        ArenaAllocator::gc(&snapshot::allocator_dir(root))?;

        let schema_file = snapshot::schema_path(root);
        if schema_file.exists() {
            let recorded = Schema::load(&schema_file)?;
            if recorded != schema {
                return Err(GraphError::Corrupt(
                    "schema does not match the recorded image".into(),
                ));
            }
        } else {
            schema.save(&schema_file)?;
        }

        if !snapshot::version_path(root).exists() {
            info!(root = %root.display(), "bootstrapping empty snapshot 0");
            let empty = GraphStore::create_empty(root, &schema)?;
            empty.dump_all(&snapshot::snapshot_dir(root, 0), false)?;
            snapshot::write_version(root, 0)?;
        }

        let version = snapshot::read_version(root)?;
        let store = GraphStore::open(root, &schema, version)?;

        let mut max_ts = version;
        let mut replayed = 0usize;
        for record in wal::scan(&snapshot::wal_dir(root))? {
            if record.ts.0 > version {
                store.ingest_wal_payload(record.ts, &record.payload)?;
                max_ts = max_ts.max(record.ts.0);
                replayed += 1;
            }
        }
        if replayed > 0 {
            info!(version, replayed, latest = max_ts, "recovered from wal");
        } else {
            debug!(version, "opened at snapshot, no wal records to replay");
        }

        let wal_writer = WalWriter::open(&snapshot::wal_dir(root), config.wal_segment_bytes)?;
        Ok(Self {
            inner: Arc::new(GraphInner {
                root: root.to_path_buf(),
                config,
                store,
                vm: VersionManager::new(Timestamp(max_ts)),
                wal: Mutex::new(wal_writer),
            }),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.store.schema
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// Lock-free snapshot reader at the latest committed timestamp.
    pub fn begin_read(&self) -> ReadTransaction {
        ReadTransaction::begin(Arc::clone(&self.inner))
    }

    /// Takes the exclusive write slot; blocks while another update or
    /// compaction transaction is in flight.
    pub fn begin_update(&self) -> Result<UpdateTransaction> {
        UpdateTransaction::begin(Arc::clone(&self.inner))
    }

    /// Prepares a new snapshot under the exclusive write slot.
    pub fn begin_compaction(&self) -> Result<CompactionTransaction> {
        CompactionTransaction::begin(Arc::clone(&self.inner))
    }

    /// Builds a snapshot from tabular sources into an empty data root.
    /// Invoked prior to the first `open`.
    pub fn bulk_load(
        root: &Path,
        schema: &Schema,
        loading: LoadingConfig,
        worker_count: usize,
    ) -> Result<()> {
        loader::bulk_load(root, schema, loading, worker_count)
    }

    /// Flushes all working stores and closes the handle.
    pub fn close(self) -> Result<()> {
        self.inner.store.flush_all()?;
        Ok(())
    }
}

impl Drop for GraphInner {
    fn drop(&mut self) {
        if let Err(err) = self.store.flush_all() {
            warn!(%err, "flush on close failed");
        }
    }
}
