//! Compressed-sparse-row adjacency, one store per (src-label, dst-label,
//! edge-label) triplet and direction.
//!
//! The storage strategy is chosen per triplet by the schema and
//! dispatched as an enum: [`MultipleCsr`] keeps an append-ordered
//! neighbor run per vertex inside a record arena, [`SingleCsr`] keeps at
//! most one slot per vertex, and the `None` strategy stores nothing.
//!
//! Every neighbor record is 16 bytes: `{u32 neighbor vid, u32 commit
//! timestamp, u64 payload}`. The payload is the inlined fixed-width edge
//! property, a row index into the triplet's edge-side table, or unused,
//! as the schema's payload kind dictates. Iterators capture a vertex's
//! run length at creation and skip records stamped after the reader's
//! snapshot timestamp, which is what keeps lock-free readers consistent
//! against in-place appends.

use std::cmp::Ordering;
use std::path::Path;

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::mem::{write_trimmed, MmapFile};
use crate::types::{Timestamp, Vid, INVALID_VID};
use crate::value::{from_inline_bits, PropType};

/// On-disk and in-arena neighbor record width.
pub const NBR_RECORD_LEN: usize = 16;

/// One adjacency entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NbrRecord {
    pub nbr: Vid,
    pub ts: Timestamp,
    pub payload: u64,
}

fn read_rec(bytes: &[u8], idx: u64) -> NbrRecord {
    let base = idx as usize * NBR_RECORD_LEN;
    let nbr = u32::from_le_bytes(bytes[base..base + 4].try_into().unwrap());
    let ts = u32::from_le_bytes(bytes[base + 4..base + 8].try_into().unwrap());
    let payload = u64::from_le_bytes(bytes[base + 8..base + 16].try_into().unwrap());
    NbrRecord {
        nbr: Vid(nbr),
        ts: Timestamp(ts),
        payload,
    }
}

fn write_rec(bytes: &mut [u8], idx: u64, rec: NbrRecord) {
    let base = idx as usize * NBR_RECORD_LEN;
    bytes[base..base + 4].copy_from_slice(&rec.nbr.0.to_le_bytes());
    bytes[base + 4..base + 8].copy_from_slice(&rec.ts.0.to_le_bytes());
    bytes[base + 8..base + 16].copy_from_slice(&rec.payload.to_le_bytes());
}

/// Value iterator over one vertex's neighbors, materialized at creation.
pub struct EdgeCursor {
    recs: SmallVec<[NbrRecord; 8]>,
    idx: usize,
}

impl EdgeCursor {
    fn new(recs: SmallVec<[NbrRecord; 8]>) -> Self {
        Self { recs, idx: 0 }
    }

    pub fn empty() -> Self {
        Self::new(SmallVec::new())
    }

    pub fn len(&self) -> usize {
        self.recs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recs.is_empty()
    }
}

impl Iterator for EdgeCursor {
    type Item = NbrRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.recs.get(self.idx).copied();
        self.idx += 1;
        item
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct AdjSlot {
    start: u64,
    cap: u32,
    len: u32,
}

/// Append-ordered neighbor lists inside a record arena.
///
/// Each vertex owns a reserved run `[start, start + cap)`. An append past
/// the reservation migrates the run to a fresh doubling allocation at the
/// arena tail and republishes the slot; the abandoned run is reclaimed
/// when compaction rewrites the store.
pub struct MultipleCsr {
    slots: Vec<AdjSlot>,
    arena: MmapFile,
    used: u64,
}

impl MultipleCsr {
    /// Creates an empty store with its record arena at `arena_path`.
    pub fn create(arena_path: &Path) -> Result<Self> {
        Ok(Self {
            slots: Vec::new(),
            arena: MmapFile::open(arena_path, 0)?,
            used: 0,
        })
    }

    /// Allocates slots and the arena for `degrees[vid]` records per
    /// vertex (the bulk-load path; reservations equal final degrees).
    pub fn batch_init(arena_path: &Path, degrees: &[u32]) -> Result<Self> {
        let mut slots = Vec::with_capacity(degrees.len());
        let mut start = 0u64;
        for &deg in degrees {
            slots.push(AdjSlot {
                start,
                cap: deg,
                len: 0,
            });
            start += u64::from(deg);
        }
        let mut arena = MmapFile::open(arena_path, 0)?;
        arena.ensure(start as usize * NBR_RECORD_LEN)?;
        Ok(Self {
            slots,
            arena,
            used: start,
        })
    }

    /// Maps a dumped store: degree file contents plus the working copy of
    /// the record arena.
    pub fn open(deg_bytes: &[u8], arena_path: &Path) -> Result<Self> {
        if deg_bytes.len() % 4 != 0 {
            return Err(GraphError::Corrupt("degree file length".into()));
        }
        let vnum = deg_bytes.len() / 4;
        let mut slots = Vec::with_capacity(vnum);
        let mut start = 0u64;
        for i in 0..vnum {
            let deg = u32::from_le_bytes(deg_bytes[i * 4..i * 4 + 4].try_into().unwrap());
            slots.push(AdjSlot {
                start,
                cap: deg,
                len: deg,
            });
            start += u64::from(deg);
        }
        let file_len = std::fs::metadata(arena_path).map(|m| m.len()).unwrap_or(0);
        if file_len < start * NBR_RECORD_LEN as u64 {
            return Err(GraphError::Corrupt("neighbor arena shorter than degrees".into()));
        }
        let arena = MmapFile::open(arena_path, 0)?;
        Ok(Self {
            slots,
            arena,
            used: start,
        })
    }

    fn ensure_vertex(&mut self, vid: Vid) {
        if vid.index() >= self.slots.len() {
            self.slots.resize(vid.index() + 1, AdjSlot::default());
        }
    }

    pub fn degree(&self, vid: Vid) -> u32 {
        self.slots.get(vid.index()).map_or(0, |s| s.len)
    }

    /// Appends under the writer slot. Relocates the run into a doubled
    /// allocation when the reservation is full.
    pub fn append(&mut self, src: Vid, rec: NbrRecord) -> Result<()> {
        self.ensure_vertex(src);
        let slot = self.slots[src.index()];
        if slot.len < slot.cap {
            self.arena
                .ensure((slot.start + u64::from(slot.len) + 1) as usize * NBR_RECORD_LEN)?;
            write_rec(self.arena.bytes_mut(), slot.start + u64::from(slot.len), rec);
            self.slots[src.index()].len = slot.len + 1;
            return Ok(());
        }
        let new_cap = slot.cap.max(1).checked_mul(2).ok_or(GraphError::OutOfRange(
            "neighbor run capacity overflow",
        ))?;
        let new_start = self.used;
        self.arena
            .ensure((new_start + u64::from(new_cap)) as usize * NBR_RECORD_LEN)?;
        let bytes = self.arena.bytes_mut();
        let src_off = slot.start as usize * NBR_RECORD_LEN;
        let dst_off = new_start as usize * NBR_RECORD_LEN;
        let run_len = slot.len as usize * NBR_RECORD_LEN;
        bytes.copy_within(src_off..src_off + run_len, dst_off);
        write_rec(bytes, new_start + u64::from(slot.len), rec);
        self.used = new_start + u64::from(new_cap);
        self.slots[src.index()] = AdjSlot {
            start: new_start,
            cap: new_cap,
            len: slot.len + 1,
        };
        Ok(())
    }

    /// Iterates `vid`'s neighbors whose records were committed at or
    /// before `bound`.
    pub fn iter(&self, vid: Vid, bound: Timestamp) -> EdgeCursor {
        let Some(slot) = self.slots.get(vid.index()).copied() else {
            return EdgeCursor::empty();
        };
        let mut recs = SmallVec::new();
        let bytes = self.arena.bytes();
        for i in 0..u64::from(slot.len) {
            let rec = read_rec(bytes, slot.start + i);
            if rec.ts <= bound {
                recs.push(rec);
            }
        }
        EdgeCursor::new(recs)
    }

    /// Updates the first record matching `dst` (insertion order).
    pub fn set_data(&mut self, src: Vid, dst: Vid, payload: u64, ts: Timestamp) -> Result<()> {
        let slot = self
            .slots
            .get(src.index())
            .copied()
            .ok_or(GraphError::NotFound("edge"))?;
        for i in 0..u64::from(slot.len) {
            let rec = read_rec(self.arena.bytes(), slot.start + i);
            if rec.nbr == dst {
                write_rec(
                    self.arena.bytes_mut(),
                    slot.start + i,
                    NbrRecord { nbr: dst, ts, payload },
                );
                return Ok(());
            }
        }
        Err(GraphError::NotFound("edge"))
    }

    /// Sorts every neighbor run by its inlined payload, used by
    /// compaction when the schema asks for sorted runs.
    pub fn sort_by_payload(&mut self, ty: PropType) -> Result<()> {
        for slot in self.slots.clone() {
            if slot.len < 2 {
                continue;
            }
            let mut run: Vec<NbrRecord> = (0..u64::from(slot.len))
                .map(|i| read_rec(self.arena.bytes(), slot.start + i))
                .collect();
            run.sort_by(|a, b| cmp_inline(a.payload, b.payload, ty));
            for (i, rec) in run.into_iter().enumerate() {
                write_rec(self.arena.bytes_mut(), slot.start + i as u64, rec);
            }
        }
        Ok(())
    }

    /// Writes the compacted `{deg, nbr}` pair for `vnum` vertices.
    pub fn dump(&self, vnum: u32, deg_path: &Path, nbr_path: &Path) -> Result<()> {
        let mut deg = Vec::with_capacity(vnum as usize * 4);
        let mut nbr = Vec::new();
        for vid in 0..vnum as usize {
            let slot = self.slots.get(vid).copied().unwrap_or_default();
            deg.extend_from_slice(&slot.len.to_le_bytes());
            let base = slot.start as usize * NBR_RECORD_LEN;
            let len = slot.len as usize * NBR_RECORD_LEN;
            nbr.extend_from_slice(&self.arena.bytes()[base..base + len]);
        }
        write_trimmed(deg_path, &deg)?;
        write_trimmed(nbr_path, &nbr)?;
        debug!(vnum, records = nbr.len() / NBR_RECORD_LEN, "dumped csr");
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.arena.flush()
    }
}

/// At most one neighbor per vertex; a slot whose neighbor field is the
/// invalid sentinel is empty.
pub struct SingleCsr {
    mm: MmapFile,
    init_records: u64,
}

impl SingleCsr {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            mm: MmapFile::open(path, 0)?,
            init_records: 0,
        })
    }

    /// Maps a dumped store holding `vnum` slots. Dumped records are
    /// preserved; slots past the dump are initialized empty.
    pub fn open(path: &Path, vnum: u32) -> Result<Self> {
        let existing = std::fs::metadata(path)
            .map(|m| m.len() / NBR_RECORD_LEN as u64)
            .unwrap_or(0);
        let mut csr = Self::create(path)?;
        csr.init_records = existing.min(u64::from(vnum));
        csr.ensure_records(u64::from(vnum))?;
        Ok(csr)
    }

    fn ensure_records(&mut self, n: u64) -> Result<()> {
        if n <= self.init_records {
            return Ok(());
        }
        self.mm.ensure(n as usize * NBR_RECORD_LEN)?;
        for b in
            self.mm.bytes_mut()[self.init_records as usize * NBR_RECORD_LEN..n as usize * NBR_RECORD_LEN]
                .iter_mut()
        {
            *b = 0xFF;
        }
        self.init_records = n;
        Ok(())
    }

    fn slot(&self, vid: Vid) -> Option<NbrRecord> {
        if u64::from(vid.0) >= self.init_records {
            return None;
        }
        let rec = read_rec(self.mm.bytes(), u64::from(vid.0));
        (rec.nbr != INVALID_VID).then_some(rec)
    }

    /// Stores the slot. An occupied slot is overwritten (the replacing
    /// strategy) unless `allow_overwrite` is false, which is `Conflict`.
    pub fn put(&mut self, src: Vid, rec: NbrRecord, allow_overwrite: bool) -> Result<()> {
        self.ensure_records(u64::from(src.0) + 1)?;
        if self.slot(src).is_some() && !allow_overwrite {
            return Err(GraphError::Conflict);
        }
        write_rec(self.mm.bytes_mut(), u64::from(src.0), rec);
        Ok(())
    }

    pub fn get(&self, vid: Vid, bound: Timestamp) -> Option<NbrRecord> {
        self.slot(vid).filter(|rec| rec.ts <= bound)
    }

    pub fn neighbor(&self, vid: Vid) -> Option<Vid> {
        self.slot(vid).map(|rec| rec.nbr)
    }

    pub fn degree(&self, vid: Vid) -> u32 {
        u32::from(self.slot(vid).is_some())
    }

    pub fn iter(&self, vid: Vid, bound: Timestamp) -> EdgeCursor {
        match self.get(vid, bound) {
            Some(rec) => {
                let mut recs = SmallVec::new();
                recs.push(rec);
                EdgeCursor::new(recs)
            }
            None => EdgeCursor::empty(),
        }
    }

    pub fn set_data(&mut self, src: Vid, dst: Vid, payload: u64, ts: Timestamp) -> Result<()> {
        match self.slot(src) {
            Some(rec) if rec.nbr == dst => {
                write_rec(
                    self.mm.bytes_mut(),
                    u64::from(src.0),
                    NbrRecord { nbr: dst, ts, payload },
                );
                Ok(())
            }
            _ => Err(GraphError::NotFound("edge")),
        }
    }

    pub fn dump(&self, vnum: u32, deg_path: &Path, nbr_path: &Path) -> Result<()> {
        let mut deg = Vec::with_capacity(vnum as usize * 4);
        let mut nbr = vec![0xFFu8; vnum as usize * NBR_RECORD_LEN];
        for vid in 0..vnum {
            match self.slot(Vid(vid)) {
                Some(rec) => {
                    deg.extend_from_slice(&1u32.to_le_bytes());
                    write_rec(&mut nbr, u64::from(vid), rec);
                }
                None => deg.extend_from_slice(&0u32.to_le_bytes()),
            }
        }
        write_trimmed(deg_path, &deg)?;
        write_trimmed(nbr_path, &nbr)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.mm.flush()
    }
}

/// Per-triplet store behind the strategy chosen by the schema.
pub enum CsrStore {
    None,
    Single(SingleCsr),
    Multiple(MultipleCsr),
}

impl CsrStore {
    pub fn iter(&self, vid: Vid, bound: Timestamp) -> EdgeCursor {
        match self {
            CsrStore::None => EdgeCursor::empty(),
            CsrStore::Single(csr) => csr.iter(vid, bound),
            CsrStore::Multiple(csr) => csr.iter(vid, bound),
        }
    }

    pub fn degree(&self, vid: Vid) -> u32 {
        match self {
            CsrStore::None => 0,
            CsrStore::Single(csr) => csr.degree(vid),
            CsrStore::Multiple(csr) => csr.degree(vid),
        }
    }

    /// For `Single` stores, the occupant of `vid`'s slot.
    pub fn single_neighbor(&self, vid: Vid) -> Option<Vid> {
        match self {
            CsrStore::Single(csr) => csr.neighbor(vid),
            _ => None,
        }
    }

    /// Appends (or for `Single`, stores) one edge record. A `None`
    /// store keeps nothing in this direction; the op is a no-op here and
    /// the triplet-level check rejects triplets that store nothing at
    /// all.
    pub fn append(&mut self, src: Vid, rec: NbrRecord, allow_overwrite: bool) -> Result<()> {
        match self {
            CsrStore::None => Ok(()),
            CsrStore::Single(csr) => csr.put(src, rec, allow_overwrite),
            CsrStore::Multiple(csr) => csr.append(src, rec),
        }
    }

    pub fn set_data(&mut self, src: Vid, dst: Vid, payload: u64, ts: Timestamp) -> Result<()> {
        match self {
            CsrStore::None => Ok(()),
            CsrStore::Single(csr) => csr.set_data(src, dst, payload, ts),
            CsrStore::Multiple(csr) => csr.set_data(src, dst, payload, ts),
        }
    }

    pub fn sort_by_payload(&mut self, ty: PropType) -> Result<()> {
        match self {
            CsrStore::Multiple(csr) => csr.sort_by_payload(ty),
            _ => Ok(()),
        }
    }

    pub fn dump(&self, vnum: u32, deg_path: &Path, nbr_path: &Path) -> Result<()> {
        match self {
            CsrStore::None => {
                write_trimmed(deg_path, &vec![0u8; vnum as usize * 4])?;
                write_trimmed(nbr_path, &[])
            }
            CsrStore::Single(csr) => csr.dump(vnum, deg_path, nbr_path),
            CsrStore::Multiple(csr) => csr.dump(vnum, deg_path, nbr_path),
        }
    }

    pub fn flush(&self) -> Result<()> {
        match self {
            CsrStore::None => Ok(()),
            CsrStore::Single(csr) => csr.flush(),
            CsrStore::Multiple(csr) => csr.flush(),
        }
    }
}

fn cmp_inline(a: u64, b: u64, ty: PropType) -> Ordering {
    use crate::value::Any;
    match (from_inline_bits(a, ty), from_inline_bits(b, ty)) {
        (Any::Bool(x), Any::Bool(y)) => x.cmp(&y),
        (Any::Int32(x), Any::Int32(y)) => x.cmp(&y),
        (Any::UInt32(x), Any::UInt32(y)) => x.cmp(&y),
        (Any::Int64(x), Any::Int64(y)) => x.cmp(&y),
        (Any::UInt64(x), Any::UInt64(y)) => x.cmp(&y),
        (Any::Float(x), Any::Float(y)) => x.total_cmp(&y),
        (Any::Double(x), Any::Double(y)) => x.total_cmp(&y),
        (Any::Date(x), Any::Date(y)) => x.cmp(&y),
        (Any::Day(x), Any::Day(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    }
}
