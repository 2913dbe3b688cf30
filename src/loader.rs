//! Bulk loader: builds a complete snapshot directly from tabular record
//! batches, in parallel, prior to the first open of a data root.
//!
//! The loader consumes the abstract [`RecordBatchSupplier`] interface;
//! concrete adapters (CSV, Parquet, remote tables) live outside the
//! storage core. Per vertex label, workers drain batches from a shared
//! supplier, insert primary keys into a stripe-locked builder that
//! assigns dense vids, and stage property rows in file-backed arena
//! chunks; the frozen indexer and the vertex table are then written into
//! `snapshots/0/`. Per edge triplet, workers resolve endpoints through
//! the frozen indexers while accumulating degrees in atomics; the CSRs
//! are allocated from the final degree vectors and filled from the
//! staged runs.
//!
//! Progress transitions (`Loading → Loaded → Committed`) are appended to
//! `runtime/tmp/bulk_load_progress.log`; a restarted load skips entities
//! already committed. On failure everything in progress is left in place
//! for inspection and `VERSION` is never written.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

use crate::csr::{CsrStore, MultipleCsr, NbrRecord, SingleCsr};
use crate::error::{GraphError, Result};
use crate::indexer::{key_bytes, PerfectIndexer};
use crate::mem::{ArenaAllocator, ArenaChunk};
use crate::schema::{
    ColumnStrategy, EdgePayloadKind, EdgeStrategy, EdgeTripletSchema, Schema, VertexLabelSchema,
};
use crate::snapshot;
use crate::table::VertexTable;
use crate::types::{Timestamp, Vid};
use crate::value::{to_inline_bits, Any, Decoder, Encoder, PropType};

const STRIPES: usize = 64;
const STRIPE_SEED: u64 = 0x6c6f_6164_6572_3031;
const CHUNK_HINT: usize = 1 << 16;

/// One typed column of a record batch.
pub enum ColumnData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Date(Vec<i64>),
    Day(Vec<i32>),
    Str(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Day(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn prop_type(&self) -> PropType {
        match self {
            ColumnData::Bool(_) => PropType::Bool,
            ColumnData::Int32(_) => PropType::Int32,
            ColumnData::UInt32(_) => PropType::UInt32,
            ColumnData::Int64(_) => PropType::Int64,
            ColumnData::UInt64(_) => PropType::UInt64,
            ColumnData::Float(_) => PropType::Float,
            ColumnData::Double(_) => PropType::Double,
            ColumnData::Date(_) => PropType::Date,
            ColumnData::Day(_) => PropType::Day,
            ColumnData::Str(_) => PropType::String,
        }
    }

    pub fn value_at(&self, row: usize) -> Any<'_> {
        match self {
            ColumnData::Bool(v) => Any::Bool(v[row]),
            ColumnData::Int32(v) => Any::Int32(v[row]),
            ColumnData::UInt32(v) => Any::UInt32(v[row]),
            ColumnData::Int64(v) => Any::Int64(v[row]),
            ColumnData::UInt64(v) => Any::UInt64(v[row]),
            ColumnData::Float(v) => Any::Float(v[row]),
            ColumnData::Double(v) => Any::Double(v[row]),
            ColumnData::Date(v) => Any::Date(v[row]),
            ColumnData::Day(v) => Any::Day(v[row]),
            ColumnData::Str(v) => Any::Str(&v[row]),
        }
    }
}

/// A rectangular typed batch of rows.
pub struct RecordBatch {
    pub columns: Vec<ColumnData>,
}

impl RecordBatch {
    /// Row count; all columns must agree.
    pub fn rows(&self) -> Result<usize> {
        let rows = self.columns.first().map_or(0, ColumnData::len);
        if self.columns.iter().any(|c| c.len() != rows) {
            return Err(GraphError::BadInput("ragged record batch".into()));
        }
        Ok(rows)
    }
}

/// Abstract tabular source consumed by the loader.
pub trait RecordBatchSupplier: Send {
    fn column_names(&self) -> Vec<String>;
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;
}

/// One vertex-label input: the primary-key column followed by one column
/// per schema property, in schema order.
pub struct VertexSource {
    pub label: String,
    pub supplier: Box<dyn RecordBatchSupplier>,
}

/// One edge-triplet input: source key, destination key, then one column
/// per edge property, in schema order.
pub struct EdgeSource {
    pub src: String,
    pub dst: String,
    pub edge: String,
    pub supplier: Box<dyn RecordBatchSupplier>,
}

/// Everything the loader ingests.
pub struct LoadingConfig {
    pub vertices: Vec<VertexSource>,
    pub edges: Vec<EdgeSource>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum LoadingStatus {
    Loading,
    Loaded,
    Committed,
}

impl LoadingStatus {
    fn as_str(self) -> &'static str {
        match self {
            LoadingStatus::Loading => "Loading",
            LoadingStatus::Loaded => "Loaded",
            LoadingStatus::Committed => "Committed",
        }
    }
}

struct ProgressLog {
    file: fs::File,
    committed: HashSet<String>,
}

impl ProgressLog {
    fn open(root: &Path) -> Result<Self> {
        let path = snapshot::bulk_load_progress_path(root);
        let mut committed = HashSet::new();
        if path.exists() {
            for line in fs::read_to_string(&path)?.lines() {
                if let Some(entity) = line.strip_suffix(" Committed") {
                    committed.insert(entity.to_string());
                }
            }
        }
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self { file, committed })
    }

    fn transition(&mut self, entity: &str, status: LoadingStatus) -> Result<()> {
        writeln!(self.file, "{entity} {}", status.as_str())?;
        self.file.sync_data()?;
        if status == LoadingStatus::Committed {
            self.committed.insert(entity.to_string());
        }
        debug!(entity, status = status.as_str(), "bulk load transition");
        Ok(())
    }

    fn is_committed(&self, entity: &str) -> bool {
        self.committed.contains(entity)
    }
}

/// Builds `snapshots/0` from `loading` and promotes it via `VERSION`.
pub fn bulk_load(
    root: &Path,
    schema: &Schema,
    mut loading: LoadingConfig,
    worker_count: usize,
) -> Result<()> {
    schema.validate()?;
    snapshot::create_layout(root)?;
    if snapshot::version_path(root).exists() {
        return Err(GraphError::Disallowed("bulk load requires an empty data root"));
    }
    schema.save(&snapshot::schema_path(root))?;

    let snap = snapshot::snapshot_dir(root, 0);
    fs::create_dir_all(&snap)?;
    let tmp = snapshot::tmp_dir(root);
    let workers = worker_count.max(1);
    let alloc = ArenaAllocator::new(&snapshot::allocator_dir(root))?;
    let mut progress = ProgressLog::open(root)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| GraphError::BadInput(format!("worker pool: {e}")))?;

    info!(root = %root.display(), workers, "bulk load started");

    for label in &schema.vertex_labels {
        let entity = format!("VERTEX {}", label.name);
        if progress.is_committed(&entity) {
            info!(label = %label.name, "already committed, skipping");
            continue;
        }
        let source = loading
            .vertices
            .iter()
            .position(|s| s.label == label.name)
            .map(|i| loading.vertices.swap_remove(i));
        progress.transition(&entity, LoadingStatus::Loading)?;
        load_vertex_label(
            &pool, &snap, &tmp, &alloc, label, source, workers, &mut progress, &entity,
        )?;
    }

    for triplet in &schema.triplets {
        let src_name = &schema.vertex_label(triplet.src_label())?.name;
        let dst_name = &schema.vertex_label(triplet.dst_label())?.name;
        let edge_name = schema.edge_label_name(triplet.edge_label())?;
        let entity = format!("EDGE {src_name} {edge_name} {dst_name}");
        if progress.is_committed(&entity) {
            info!(entity, "already committed, skipping");
            continue;
        }
        let source = loading
            .edges
            .iter()
            .position(|s| s.src == *src_name && s.dst == *dst_name && s.edge == edge_name)
            .map(|i| loading.edges.swap_remove(i));
        progress.transition(&entity, LoadingStatus::Loading)?;
        load_edge_triplet(
            &pool, &snap, &tmp, &alloc, triplet, src_name, edge_name, dst_name, source,
            workers, &mut progress, &entity,
        )?;
    }

    snapshot::write_version(root, 0)?;
    snapshot::clear_tmp(root)?;
    ArenaAllocator::gc(&snapshot::allocator_dir(root))?;
    info!(root = %root.display(), "bulk load committed snapshot 0");
    Ok(())
}

struct FirstError(Mutex<Option<GraphError>>, AtomicBool);

impl FirstError {
    fn new() -> Self {
        Self(Mutex::new(None), AtomicBool::new(false))
    }

    fn record(&self, err: GraphError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.1.store(true, Ordering::Release);
    }

    fn tripped(&self) -> bool {
        self.1.load(Ordering::Acquire)
    }

    fn take(self) -> Option<GraphError> {
        self.0.into_inner()
    }
}

#[allow(clippy::too_many_arguments)]
fn load_vertex_label(
    pool: &rayon::ThreadPool,
    snap: &Path,
    tmp: &Path,
    alloc: &ArenaAllocator,
    label: &VertexLabelSchema,
    source: Option<VertexSource>,
    workers: usize,
    progress: &mut ProgressLog,
    entity: &str,
) -> Result<()> {
    let map_prefix = snapshot::vertex_map_prefix(&label.name);
    let table_prefix = snapshot::vertex_table_prefix(&label.name);

    let (keys, chunks) = match source {
        None => {
            debug!(label = %label.name, "no vertex source, committing empty label");
            (Vec::new(), Vec::new())
        }
        Some(source) => {
            let names = source.supplier.column_names();
            let mut expected = vec![label.primary_key.name.clone()];
            expected.extend(label.props.iter().map(|p| p.name.clone()));
            if names != expected {
                return Err(GraphError::BadInput(format!(
                    "vertex source for {}: columns {names:?}, schema wants {expected:?}",
                    label.name
                )));
            }

            let supplier = Mutex::new(source.supplier);
            let stripes: Vec<Mutex<FxHashMap<Vec<u8>, u32>>> =
                (0..STRIPES).map(|_| Mutex::new(FxHashMap::default())).collect();
            let next_vid = AtomicU32::new(0);
            let chunks: Mutex<Vec<ArenaChunk>> = Mutex::new(Vec::new());
            let failure = FirstError::new();
            let pk_ty = label.primary_key.ty;

            pool.scope(|s| {
                for w in 0..workers {
                    let supplier = &supplier;
                    let stripes = &stripes;
                    let next_vid = &next_vid;
                    let chunks = &chunks;
                    let failure = &failure;
                    let props = &label.props;
                    s.spawn(move |_| {
                        let mut chunk = match alloc.chunk(w, CHUNK_HINT) {
                            Ok(chunk) => chunk,
                            Err(err) => {
                                failure.record(err);
                                return;
                            }
                        };
                        while !failure.tripped() {
                            let batch = match supplier.lock().next_batch() {
                                Ok(Some(batch)) => batch,
                                Ok(None) => break,
                                Err(err) => {
                                    failure.record(err);
                                    return;
                                }
                            };
                            if let Err(err) = ingest_vertex_batch(
                                &batch, pk_ty, props, stripes, next_vid, &mut chunk,
                            ) {
                                failure.record(err);
                                return;
                            }
                        }
                        chunks.lock().push(chunk);
                    });
                }
            });
            if let Some(err) = failure.take() {
                return Err(err);
            }

            let n = next_vid.load(Ordering::Acquire) as usize;
            let mut keys: Vec<Vec<u8>> = vec![Vec::new(); n];
            for stripe in &stripes {
                for (key, vid) in stripe.lock().iter() {
                    keys[*vid as usize] = key.clone();
                }
            }
            (keys, chunks.into_inner())
        }
    };

    let n = keys.len() as u32;
    PerfectIndexer::build(snap, &map_prefix, label.primary_key.ty, keys)?;
    progress.transition(entity, LoadingStatus::Loaded)?;

    let mut table = VertexTable::create(tmp, &table_prefix, &label.props, &label.strategies, n)?;
    for chunk in &chunks {
        let bytes = chunk.bytes();
        let mut pos = 0usize;
        while pos + 8 <= bytes.len() {
            let vid = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            let len = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
            let row = &bytes[pos + 8..pos + 8 + len];
            table.ingest_row(Vid(vid), &mut Decoder::new(row))?;
            pos += 8 + len;
        }
    }
    table.flush()?;
    table.dump(snap)?;
    progress.transition(entity, LoadingStatus::Committed)?;
    info!(label = %label.name, vertices = n, "vertex label committed");
    Ok(())
}

fn ingest_vertex_batch(
    batch: &RecordBatch,
    pk_ty: PropType,
    props: &[crate::schema::PropDef],
    stripes: &[Mutex<FxHashMap<Vec<u8>, u32>>],
    next_vid: &AtomicU32,
    chunk: &mut ArenaChunk,
) -> Result<()> {
    let rows = batch.rows()?;
    if batch.columns.len() != 1 + props.len() {
        return Err(GraphError::BadInput("vertex batch column count".into()));
    }
    if batch.columns[0].prop_type() != pk_ty {
        return Err(GraphError::BadInput("vertex batch key column type".into()));
    }
    for (col, def) in batch.columns[1..].iter().zip(props.iter()) {
        if col.prop_type() != def.ty && !(col.prop_type() == PropType::String && def.ty == PropType::StringMap) {
            return Err(GraphError::BadInput(format!(
                "vertex batch column type for {}",
                def.name
            )));
        }
    }
    for row in 0..rows {
        let key = batch.columns[0].value_at(row);
        let kb = key_bytes(&key, pk_ty)?;
        let stripe = (xxh64(&kb, STRIPE_SEED) as usize) % STRIPES;
        let vid = {
            let mut map = stripes[stripe].lock();
            if map.contains_key(kb.as_slice()) {
                return Err(GraphError::Duplicate);
            }
            let vid = next_vid.fetch_add(1, Ordering::AcqRel);
            map.insert(kb.to_vec(), vid);
            vid
        };
        let mut enc = Encoder::new();
        for col in &batch.columns[1..] {
            enc.put_any(&col.value_at(row))?;
        }
        let row_bytes = enc.into_bytes();
        let mut rec = Vec::with_capacity(8 + row_bytes.len());
        rec.extend_from_slice(&vid.to_le_bytes());
        rec.extend_from_slice(&(row_bytes.len() as u32).to_le_bytes());
        rec.extend_from_slice(&row_bytes);
        chunk.push(&rec)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn load_edge_triplet(
    pool: &rayon::ThreadPool,
    snap: &Path,
    tmp: &Path,
    alloc: &ArenaAllocator,
    triplet: &EdgeTripletSchema,
    src_name: &str,
    edge_name: &str,
    dst_name: &str,
    source: Option<EdgeSource>,
    workers: usize,
    progress: &mut ProgressLog,
    entity: &str,
) -> Result<()> {
    let src_indexer = PerfectIndexer::open(snap, &snapshot::vertex_map_prefix(src_name))?;
    let dst_indexer = PerfectIndexer::open(snap, &snapshot::vertex_map_prefix(dst_name))?;
    let src_n = src_indexer.size();
    let dst_n = dst_indexer.size();
    let oe_prefix = snapshot::oe_prefix(src_name, edge_name, dst_name);
    let ie_prefix = snapshot::ie_prefix(src_name, edge_name, dst_name);
    let edata_prefix = snapshot::edata_prefix(src_name, edge_name, dst_name);
    let kind = triplet.payload_kind();

    let (odeg, ideg, chunks) = match source {
        None => {
            debug!(entity, "no edge source, committing empty triplet");
            (vec![0u32; src_n as usize], vec![0u32; dst_n as usize], Vec::new())
        }
        Some(source) => {
            let names = source.supplier.column_names();
            if names.len() != 2 + triplet.props.len()
                || names[2..]
                    .iter()
                    .zip(triplet.props.iter())
                    .any(|(n, p)| *n != p.name)
            {
                return Err(GraphError::BadInput(format!(
                    "edge source for {entity}: columns {names:?} do not match schema"
                )));
            }

            let supplier = Mutex::new(source.supplier);
            let odeg: Vec<AtomicU32> = (0..src_n).map(|_| AtomicU32::new(0)).collect();
            let ideg: Vec<AtomicU32> = (0..dst_n).map(|_| AtomicU32::new(0)).collect();
            let chunks: Mutex<Vec<ArenaChunk>> = Mutex::new(Vec::new());
            let failure = FirstError::new();

            pool.scope(|s| {
                for w in 0..workers {
                    let supplier = &supplier;
                    let odeg = &odeg;
                    let ideg = &ideg;
                    let chunks = &chunks;
                    let failure = &failure;
                    let src_indexer = &src_indexer;
                    let dst_indexer = &dst_indexer;
                    s.spawn(move |_| {
                        let mut chunk = match alloc.chunk(w, CHUNK_HINT) {
                            Ok(chunk) => chunk,
                            Err(err) => {
                                failure.record(err);
                                return;
                            }
                        };
                        while !failure.tripped() {
                            let batch = match supplier.lock().next_batch() {
                                Ok(Some(batch)) => batch,
                                Ok(None) => break,
                                Err(err) => {
                                    failure.record(err);
                                    return;
                                }
                            };
                            if let Err(err) = stage_edge_batch(
                                &batch,
                                triplet,
                                src_indexer,
                                dst_indexer,
                                odeg,
                                ideg,
                                &mut chunk,
                            ) {
                                failure.record(err);
                                return;
                            }
                        }
                        chunks.lock().push(chunk);
                    });
                }
            });
            if let Some(err) = failure.take() {
                return Err(err);
            }
            (
                odeg.iter().map(|d| d.load(Ordering::Acquire)).collect(),
                ideg.iter().map(|d| d.load(Ordering::Acquire)).collect(),
                chunks.into_inner(),
            )
        }
    };

    // Degree vectors are final: allocate the CSRs and copy the staged
    // runs in.
    let mut oe = match triplet.out_strategy {
        EdgeStrategy::None => CsrStore::None,
        EdgeStrategy::Single => CsrStore::Single(SingleCsr::create(&tmp.join(format!("{oe_prefix}.nbr")))?),
        EdgeStrategy::Multiple => CsrStore::Multiple(MultipleCsr::batch_init(
            &tmp.join(format!("{oe_prefix}.nbr")),
            &odeg,
        )?),
    };
    let mut ie = match triplet.in_strategy {
        EdgeStrategy::None => CsrStore::None,
        EdgeStrategy::Single => CsrStore::Single(SingleCsr::create(&tmp.join(format!("{ie_prefix}.nbr")))?),
        EdgeStrategy::Multiple => CsrStore::Multiple(MultipleCsr::batch_init(
            &tmp.join(format!("{ie_prefix}.nbr")),
            &ideg,
        )?),
    };
    let mut edge_table = if kind == EdgePayloadKind::Table {
        Some(VertexTable::create(
            tmp,
            &edata_prefix,
            &triplet.props,
            &vec![ColumnStrategy::Dense; triplet.props.len()],
            0,
        )?)
    } else {
        None
    };

    let ts = Timestamp(0);
    let mut edges = 0u64;
    for chunk in &chunks {
        let bytes = chunk.bytes();
        let mut pos = 0usize;
        while pos + 12 <= bytes.len() {
            let src = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            let dst = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap());
            let len = u32::from_le_bytes(bytes[pos + 8..pos + 12].try_into().unwrap()) as usize;
            let values = &bytes[pos + 12..pos + 12 + len];
            pos += 12 + len;

            let payload = match kind {
                EdgePayloadKind::None => 0,
                EdgePayloadKind::Inline(ty) => {
                    let value = Decoder::new(values).get_any()?;
                    to_inline_bits(&value, ty)?
                }
                EdgePayloadKind::Table => {
                    let table = edge_table.as_mut().ok_or_else(|| {
                        GraphError::Corrupt("missing edge-side table during fill".into())
                    })?;
                    let mut dec = Decoder::new(values);
                    let mut row = Vec::with_capacity(triplet.props.len());
                    for _ in 0..triplet.props.len() {
                        row.push(dec.get_any()?.to_owned()?);
                    }
                    let borrowed: Vec<Any<'_>> =
                        row.iter().map(crate::value::AnyOwned::as_any).collect();
                    u64::from(table.append_row(&borrowed)?)
                }
            };
            oe.append(Vid(src), NbrRecord { nbr: Vid(dst), ts, payload }, true)?;
            ie.append(Vid(dst), NbrRecord { nbr: Vid(src), ts, payload }, true)?;
            edges += 1;
        }
    }

    if triplet.sort_on_compaction {
        if let EdgePayloadKind::Inline(ty) = kind {
            oe.sort_by_payload(ty)?;
            ie.sort_by_payload(ty)?;
        }
    }

    oe.dump(
        src_n,
        &snap.join(format!("{oe_prefix}.deg")),
        &snap.join(format!("{oe_prefix}.nbr")),
    )?;
    ie.dump(
        dst_n,
        &snap.join(format!("{ie_prefix}.deg")),
        &snap.join(format!("{ie_prefix}.nbr")),
    )?;
    if let Some(table) = &mut edge_table {
        table.flush()?;
        table.dump(snap)?;
    }
    progress.transition(entity, LoadingStatus::Loaded)?;
    progress.transition(entity, LoadingStatus::Committed)?;
    info!(entity, edges, "edge triplet committed");
    Ok(())
}

fn stage_edge_batch(
    batch: &RecordBatch,
    triplet: &EdgeTripletSchema,
    src_indexer: &PerfectIndexer,
    dst_indexer: &PerfectIndexer,
    odeg: &[AtomicU32],
    ideg: &[AtomicU32],
    chunk: &mut ArenaChunk,
) -> Result<()> {
    let rows = batch.rows()?;
    if batch.columns.len() != 2 + triplet.props.len() {
        return Err(GraphError::BadInput("edge batch column count".into()));
    }
    if batch.columns[0].prop_type() != src_indexer.key_type()
        || batch.columns[1].prop_type() != dst_indexer.key_type()
    {
        return Err(GraphError::BadInput("edge batch key column type".into()));
    }
    for (col, def) in batch.columns[2..].iter().zip(triplet.props.iter()) {
        if col.prop_type() != def.ty
            && !(col.prop_type() == PropType::String && def.ty == PropType::StringMap)
        {
            return Err(GraphError::BadInput(format!(
                "edge batch column type for {}",
                def.name
            )));
        }
    }
    for row in 0..rows {
        let src = src_indexer
            .lookup(&batch.columns[0].value_at(row))
            .ok_or_else(|| GraphError::BadInput("edge references unknown source key".into()))?;
        let dst = dst_indexer
            .lookup(&batch.columns[1].value_at(row))
            .ok_or_else(|| {
                GraphError::BadInput("edge references unknown destination key".into())
            })?;
        odeg[src.index()].fetch_add(1, Ordering::AcqRel);
        ideg[dst.index()].fetch_add(1, Ordering::AcqRel);

        let mut enc = Encoder::new();
        for col in &batch.columns[2..] {
            enc.put_any(&col.value_at(row))?;
        }
        let values = enc.into_bytes();
        let mut rec = Vec::with_capacity(12 + values.len());
        rec.extend_from_slice(&src.0.to_le_bytes());
        rec.extend_from_slice(&dst.0.to_le_bytes());
        rec.extend_from_slice(&(values.len() as u32).to_le_bytes());
        rec.extend_from_slice(&values);
        chunk.push(&rec)?;
    }
    Ok(())
}

/// In-memory supplier over pre-built batches. Handy for tests and for
/// embedding applications that already hold their rows.
pub struct VecSupplier {
    names: Vec<String>,
    batches: Vec<RecordBatch>,
}

impl VecSupplier {
    pub fn new(names: &[&str], mut batches: Vec<RecordBatch>) -> Self {
        batches.reverse();
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            batches,
        }
    }
}

impl RecordBatchSupplier for VecSupplier {
    fn column_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        Ok(self.batches.pop())
    }
}
