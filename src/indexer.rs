//! Primary-key indexer: external identifier (oid) to dense internal
//! identifier (vid) and back, one instance per vertex label.
//!
//! Two builds share one on-disk form (`<prefix>.keys[.data]`,
//! `<prefix>.indices`, `<prefix>.meta`):
//!
//! - [`HashIndexer`] — open-addressing table for the mutable path.
//!   `insert` is idempotent; `lookup` is average constant time.
//! - [`PerfectIndexer`] — hash-and-displace table built once by the bulk
//!   loader, then frozen. Duplicate keys fail the build.
//!
//! The reverse map is O(1): the `.keys` file is the oid list indexed by
//! vid.

use std::path::Path;

use smallvec::SmallVec;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

use crate::error::{GraphError, Result};
use crate::mem::{write_trimmed, MmapFile};
use crate::types::Vid;
use crate::value::{Any, PropType};

const SLOT_EMPTY: u32 = u32::MAX;
const DEFAULT_SEED: u64 = 0x7465_7373_6572_6131;
const META_LEN: usize = 32;
const META_MAGIC: [u8; 4] = *b"TIDX";
const META_VERSION: u16 = 1;
const FORM_HASH: u8 = 0;
const FORM_PERFECT: u8 = 1;
/// Displacement search bound per bucket before reseeding the build.
const MAX_DISPLACEMENT: u32 = 1 << 20;

/// Canonical hashable bytes of a key value. Fails with `TypeMismatch`
/// when the value does not match the label's declared key type.
pub fn key_bytes(key: &Any<'_>, kind: PropType) -> Result<SmallVec<[u8; 24]>> {
    let mut out = SmallVec::new();
    match (key, kind) {
        (Any::Int32(v), PropType::Int32) => out.extend_from_slice(&v.to_le_bytes()),
        (Any::UInt32(v), PropType::UInt32) => out.extend_from_slice(&v.to_le_bytes()),
        (Any::Int64(v), PropType::Int64) => out.extend_from_slice(&v.to_le_bytes()),
        (Any::UInt64(v), PropType::UInt64) => out.extend_from_slice(&v.to_le_bytes()),
        (Any::Str(v), PropType::String) => out.extend_from_slice(v.as_bytes()),
        _ => return Err(GraphError::TypeMismatch("primary key type")),
    }
    Ok(out)
}

fn key_width(kind: PropType) -> Option<usize> {
    match kind {
        PropType::Int32 | PropType::UInt32 => Some(4),
        PropType::Int64 | PropType::UInt64 => Some(8),
        PropType::String => None,
        _ => None,
    }
}

fn bucket_hash(bytes: &[u8], seed: u64) -> u64 {
    xxh64(bytes, seed)
}

fn slot_hash(bytes: &[u8], seed: u64, displacement: u32) -> u64 {
    let mix = seed ^ 0x9e37_79b9_7f4a_7c15u64.wrapping_mul(u64::from(displacement) + 1);
    xxh64(bytes, mix)
}

/// The oid list indexed by vid.
enum KeyColumn {
    Fixed {
        mm: MmapFile,
        width: usize,
        len: u32,
    },
    Str {
        items: MmapFile,
        data: MmapFile,
        len: u32,
        data_used: u64,
    },
}

const STR_ITEM_LEN: usize = 12; // u64 offset + u32 length

impl KeyColumn {
    fn create(dir: &Path, prefix: &str, kind: PropType) -> Result<Self> {
        let keys_path = dir.join(format!("{prefix}.keys"));
        match key_width(kind) {
            Some(width) => Ok(KeyColumn::Fixed {
                mm: MmapFile::open(&keys_path, 0)?,
                width,
                len: 0,
            }),
            None => Ok(KeyColumn::Str {
                items: MmapFile::open(&keys_path, 0)?,
                data: MmapFile::open(&dir.join(format!("{prefix}.keys.data")), 0)?,
                len: 0,
                data_used: 0,
            }),
        }
    }

    fn open(dir: &Path, prefix: &str, kind: PropType, count: u32) -> Result<Self> {
        let mut col = Self::create(dir, prefix, kind)?;
        match &mut col {
            KeyColumn::Fixed { mm, width, len } => {
                mm.ensure(count as usize * *width)?;
                *len = count;
            }
            KeyColumn::Str {
                items,
                len,
                data_used,
                ..
            } => {
                items.ensure(count as usize * STR_ITEM_LEN)?;
                *len = count;
                let mut max_end = 0u64;
                for vid in 0..count {
                    let base = vid as usize * STR_ITEM_LEN;
                    let bytes = items.bytes();
                    let off = u64::from_le_bytes(bytes[base..base + 8].try_into().unwrap());
                    let n = u32::from_le_bytes(bytes[base + 8..base + 12].try_into().unwrap());
                    max_end = max_end.max(off + u64::from(n));
                }
                *data_used = max_end;
            }
        }
        Ok(col)
    }

    fn len(&self) -> u32 {
        match self {
            KeyColumn::Fixed { len, .. } => *len,
            KeyColumn::Str { len, .. } => *len,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            KeyColumn::Fixed { mm, width, len } => {
                debug_assert_eq!(bytes.len(), *width);
                let off = *len as usize * *width;
                mm.ensure(off + *width)?;
                mm.bytes_mut()[off..off + *width].copy_from_slice(bytes);
                *len += 1;
            }
            KeyColumn::Str {
                items,
                data,
                len,
                data_used,
            } => {
                let off = *data_used;
                data.ensure(off as usize + bytes.len())?;
                data.bytes_mut()[off as usize..off as usize + bytes.len()]
                    .copy_from_slice(bytes);
                *data_used += bytes.len() as u64;
                let item_off = *len as usize * STR_ITEM_LEN;
                items.ensure(item_off + STR_ITEM_LEN)?;
                let slot = &mut items.bytes_mut()[item_off..item_off + STR_ITEM_LEN];
                slot[0..8].copy_from_slice(&off.to_le_bytes());
                slot[8..12].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
                *len += 1;
            }
        }
        Ok(())
    }

    fn get(&self, vid: u32) -> Result<&[u8]> {
        if vid >= self.len() {
            return Err(GraphError::OutOfRange("vid beyond key column"));
        }
        match self {
            KeyColumn::Fixed { mm, width, .. } => {
                let off = vid as usize * *width;
                Ok(&mm.bytes()[off..off + *width])
            }
            KeyColumn::Str { items, data, .. } => {
                let base = vid as usize * STR_ITEM_LEN;
                let item = &items.bytes()[base..base + STR_ITEM_LEN];
                let off = u64::from_le_bytes(item[0..8].try_into().unwrap()) as usize;
                let n = u32::from_le_bytes(item[8..12].try_into().unwrap()) as usize;
                Ok(&data.bytes()[off..off + n])
            }
        }
    }

    fn key_any(&self, vid: u32, kind: PropType) -> Result<Any<'_>> {
        let bytes = self.get(vid)?;
        Ok(match kind {
            PropType::Int32 => Any::Int32(i32::from_le_bytes(bytes.try_into().unwrap())),
            PropType::UInt32 => Any::UInt32(u32::from_le_bytes(bytes.try_into().unwrap())),
            PropType::Int64 => Any::Int64(i64::from_le_bytes(bytes.try_into().unwrap())),
            PropType::UInt64 => Any::UInt64(u64::from_le_bytes(bytes.try_into().unwrap())),
            PropType::String => Any::Str(
                std::str::from_utf8(bytes)
                    .map_err(|_| GraphError::Corrupt("non-utf8 string key".into()))?,
            ),
            _ => return Err(GraphError::Corrupt("invalid key kind".into())),
        })
    }

    fn flush(&self) -> Result<()> {
        match self {
            KeyColumn::Fixed { mm, .. } => mm.flush(),
            KeyColumn::Str { items, data, .. } => {
                items.flush()?;
                data.flush()
            }
        }
    }

    fn dump(&self, dst_dir: &Path, prefix: &str) -> Result<()> {
        match self {
            KeyColumn::Fixed { mm, width, len } => {
                write_trimmed(
                    &dst_dir.join(format!("{prefix}.keys")),
                    &mm.bytes()[..*len as usize * *width],
                )?;
            }
            KeyColumn::Str {
                items,
                data,
                len,
                data_used,
            } => {
                write_trimmed(
                    &dst_dir.join(format!("{prefix}.keys")),
                    &items.bytes()[..*len as usize * STR_ITEM_LEN],
                )?;
                write_trimmed(
                    &dst_dir.join(format!("{prefix}.keys.data")),
                    &data.bytes()[..*data_used as usize],
                )?;
            }
        }
        Ok(())
    }
}

struct Meta {
    form: u8,
    kind: PropType,
    count: u32,
    aux: u64,
    seed: u64,
}

impl Meta {
    fn encode(&self) -> [u8; META_LEN] {
        let mut buf = [0u8; META_LEN];
        buf[0..4].copy_from_slice(&META_MAGIC);
        buf[4..6].copy_from_slice(&META_VERSION.to_le_bytes());
        buf[6] = self.form;
        buf[7] = self.kind.tag();
        buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        buf[12..20].copy_from_slice(&self.aux.to_le_bytes());
        buf[20..28].copy_from_slice(&self.seed.to_le_bytes());
        let crc = crc32fast::hash(&buf[..28]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < META_LEN {
            return Err(GraphError::Corrupt("indexer meta truncated".into()));
        }
        if src[0..4] != META_MAGIC {
            return Err(GraphError::Corrupt("indexer meta magic mismatch".into()));
        }
        let version = u16::from_le_bytes(src[4..6].try_into().unwrap());
        if version != META_VERSION {
            return Err(GraphError::Corrupt("indexer meta version mismatch".into()));
        }
        let stored_crc = u32::from_le_bytes(src[28..32].try_into().unwrap());
        if crc32fast::hash(&src[..28]) != stored_crc {
            return Err(GraphError::Corrupt("indexer meta crc mismatch".into()));
        }
        Ok(Self {
            form: src[6],
            kind: PropType::from_tag(src[7])
                .map_err(|_| GraphError::Corrupt("indexer meta key kind".into()))?,
            count: u32::from_le_bytes(src[8..12].try_into().unwrap()),
            aux: u64::from_le_bytes(src[12..20].try_into().unwrap()),
            seed: u64::from_le_bytes(src[20..28].try_into().unwrap()),
        })
    }

    fn write(&self, path: &Path) -> Result<()> {
        write_trimmed(path, &self.encode())
    }

    fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }
}

/// Mutable open-addressing indexer.
pub struct HashIndexer {
    kind: PropType,
    keys: KeyColumn,
    slots: MmapFile,
    cap: usize,
    size: u32,
    seed: u64,
}

impl HashIndexer {
    /// Creates an empty indexer with working files under `dir`.
    pub fn create(dir: &Path, prefix: &str, kind: PropType, capacity_hint: u32) -> Result<Self> {
        let cap = (capacity_hint.max(16) as usize).next_power_of_two() * 2;
        let mut slots = MmapFile::open(&dir.join(format!("{prefix}.indices")), cap * 4)?;
        fill_empty(&mut slots, cap);
        Ok(Self {
            kind,
            keys: KeyColumn::create(dir, prefix, kind)?,
            slots,
            cap,
            size: 0,
            seed: DEFAULT_SEED,
        })
    }

    /// Opens the on-disk form from `dir`. A perfect-form image is
    /// rebuilt into a mutable table from its key list.
    pub fn open(dir: &Path, prefix: &str) -> Result<Self> {
        let meta = Meta::read(&dir.join(format!("{prefix}.meta")))?;
        let keys = KeyColumn::open(dir, prefix, meta.kind, meta.count)?;
        if meta.form == FORM_HASH {
            let cap = meta.aux as usize;
            if !cap.is_power_of_two() || (meta.count as usize) * 4 > cap * 3 {
                return Err(GraphError::Corrupt("indexer slot capacity".into()));
            }
            let slots = MmapFile::open(&dir.join(format!("{prefix}.indices")), cap * 4)?;
            Ok(Self {
                kind: meta.kind,
                keys,
                slots,
                cap,
                size: meta.count,
                seed: meta.seed,
            })
        } else {
            info!(prefix, count = meta.count, "rebuilding mutable indexer from frozen image");
            let mut rebuilt = Self::create(dir, prefix, meta.kind, meta.count.max(16))?;
            // The key column already holds every key; reuse it and
            // repopulate the slot table in vid order.
            rebuilt.keys = keys;
            for vid in 0..meta.count {
                rebuilt.insert_known(vid)?;
            }
            rebuilt.size = meta.count;
            Ok(rebuilt)
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn key_type(&self) -> PropType {
        self.kind
    }

    /// Looks up the vid for `key`. Pure; average constant time.
    pub fn lookup(&self, key: &Any<'_>) -> Option<Vid> {
        let kb = key_bytes(key, self.kind).ok()?;
        self.lookup_bytes(&kb).map(Vid)
    }

    fn lookup_bytes(&self, kb: &[u8]) -> Option<u32> {
        if self.size == 0 {
            return None;
        }
        let mask = self.cap - 1;
        let mut pos = (bucket_hash(kb, self.seed) as usize) & mask;
        loop {
            let vid = read_slot(&self.slots, pos);
            if vid == SLOT_EMPTY {
                return None;
            }
            if self.keys.get(vid).ok()? == kb {
                return Some(vid);
            }
            pos = (pos + 1) & mask;
        }
    }

    /// Inserts `key`, returning its vid and whether it was new.
    /// Re-inserting an existing key is a no-op (idempotent).
    pub fn insert(&mut self, key: &Any<'_>) -> Result<(Vid, bool)> {
        let kb = key_bytes(key, self.kind)?;
        if let Some(vid) = self.lookup_bytes(&kb) {
            return Ok((Vid(vid), false));
        }
        if (self.size as usize + 1) * 4 > self.cap * 3 {
            self.grow()?;
        }
        let vid = self.size;
        self.keys.push(&kb)?;
        self.size += 1;
        self.place(&kb, vid);
        Ok((Vid(vid), true))
    }

    /// Reverse lookup: O(1) indexing into the key column.
    pub fn reverse(&self, vid: Vid) -> Result<Any<'_>> {
        self.keys.key_any(vid.0, self.kind)
    }

    fn place(&mut self, kb: &[u8], vid: u32) {
        let mask = self.cap - 1;
        let mut pos = (bucket_hash(kb, self.seed) as usize) & mask;
        while read_slot(&self.slots, pos) != SLOT_EMPTY {
            pos = (pos + 1) & mask;
        }
        write_slot(&mut self.slots, pos, vid);
    }

    fn insert_known(&mut self, vid: u32) -> Result<()> {
        if (vid as usize + 1) * 4 > self.cap * 3 {
            self.grow()?;
        }
        let kb: SmallVec<[u8; 24]> = SmallVec::from_slice(self.keys.get(vid)?);
        self.place(&kb, vid);
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let new_cap = self.cap * 2;
        self.slots.ensure(new_cap * 4)?;
        fill_empty(&mut self.slots, new_cap);
        self.cap = new_cap;
        for vid in 0..self.size {
            let kb: SmallVec<[u8; 24]> = SmallVec::from_slice(self.keys.get(vid)?);
            self.place(&kb, vid);
        }
        debug!(cap = new_cap, size = self.size, "indexer table grown");
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.keys.flush()?;
        self.slots.flush()
    }

    /// Writes the hash form into `dst_dir` (snapshot artifact).
    pub fn dump(&self, dst_dir: &Path, prefix: &str) -> Result<()> {
        self.keys.dump(dst_dir, prefix)?;
        write_trimmed(
            &dst_dir.join(format!("{prefix}.indices")),
            &self.slots.bytes()[..self.cap * 4],
        )?;
        Meta {
            form: FORM_HASH,
            kind: self.kind,
            count: self.size,
            aux: self.cap as u64,
            seed: self.seed,
        }
        .write(&dst_dir.join(format!("{prefix}.meta")))
    }
}

fn fill_empty(slots: &mut MmapFile, cap: usize) {
    for b in slots.bytes_mut()[..cap * 4].iter_mut() {
        *b = 0xFF;
    }
}

fn read_slot(slots: &MmapFile, pos: usize) -> u32 {
    let base = pos * 4;
    u32::from_le_bytes(slots.bytes()[base..base + 4].try_into().unwrap())
}

fn write_slot(slots: &mut MmapFile, pos: usize, vid: u32) {
    let base = pos * 4;
    slots.bytes_mut()[base..base + 4].copy_from_slice(&vid.to_le_bytes());
}

/// Frozen hash-and-displace indexer produced by the bulk loader.
///
/// `.indices` holds the per-bucket displacement array followed by the
/// slot array; lookups verify against the key column, so foreign keys
/// resolve to `None` rather than a false positive.
pub struct PerfectIndexer {
    kind: PropType,
    keys: KeyColumn,
    table: MmapFile,
    n: u32,
    m: usize,
    seed: u64,
}

impl std::fmt::Debug for PerfectIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerfectIndexer")
            .field("n", &self.n)
            .field("m", &self.m)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl PerfectIndexer {
    /// Builds the frozen form from `keys` (in vid order) directly into
    /// `dir`. Duplicate keys fail with `Duplicate`.
    pub fn build(
        dir: &Path,
        prefix: &str,
        kind: PropType,
        keys: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<Self> {
        let key_list: Vec<Vec<u8>> = keys.into_iter().collect();
        let n = key_list.len();
        let m = n.max(1);

        let mut seed = DEFAULT_SEED;
        let (disp, slots) = 'attempt: loop {
            let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); m];
            for (vid, kb) in key_list.iter().enumerate() {
                let b = (bucket_hash(kb, seed) % m as u64) as usize;
                for &other in &buckets[b] {
                    if key_list[other as usize] == *kb {
                        return Err(GraphError::Duplicate);
                    }
                }
                buckets[b].push(vid as u32);
            }
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by_key(|&b| std::cmp::Reverse(buckets[b].len()));

            let mut disp = vec![0u32; m];
            let mut slots = vec![SLOT_EMPTY; n];
            let mut occupied = vec![false; n];
            for &b in &order {
                if buckets[b].is_empty() {
                    continue;
                }
                let mut d = 0u32;
                'search: loop {
                    if d >= MAX_DISPLACEMENT {
                        seed = seed.wrapping_mul(0x2545_f491_4f6c_dd1d).wrapping_add(1);
                        debug!(prefix, "perfect hash build reseeded");
                        continue 'attempt;
                    }
                    let mut taken: SmallVec<[usize; 8]> = SmallVec::new();
                    for &vid in &buckets[b] {
                        let pos =
                            (slot_hash(&key_list[vid as usize], seed, d) % n as u64) as usize;
                        if occupied[pos] || taken.contains(&pos) {
                            d += 1;
                            continue 'search;
                        }
                        taken.push(pos);
                    }
                    for (&vid, &pos) in buckets[b].iter().zip(taken.iter()) {
                        occupied[pos] = true;
                        slots[pos] = vid;
                    }
                    disp[b] = d;
                    break;
                }
            }
            break (disp, slots);
        };

        let mut key_col = KeyColumn::create(dir, prefix, kind)?;
        for kb in &key_list {
            key_col.push(kb)?;
        }
        key_col.flush()?;

        let table_len = (m + n) * 4;
        let mut table = MmapFile::open(&dir.join(format!("{prefix}.indices")), table_len.max(4))?;
        {
            let bytes = table.bytes_mut();
            for (i, d) in disp.iter().enumerate() {
                bytes[i * 4..i * 4 + 4].copy_from_slice(&d.to_le_bytes());
            }
            for (i, vid) in slots.iter().enumerate() {
                let base = (m + i) * 4;
                bytes[base..base + 4].copy_from_slice(&vid.to_le_bytes());
            }
        }
        table.flush()?;

        Meta {
            form: FORM_PERFECT,
            kind,
            count: n as u32,
            aux: m as u64,
            seed,
        }
        .write(&dir.join(format!("{prefix}.meta")))?;
        info!(prefix, count = n, "froze perfect indexer");

        Ok(Self {
            kind,
            keys: key_col,
            table,
            n: n as u32,
            m,
            seed,
        })
    }

    /// Memory-maps a frozen image from `dir`.
    pub fn open(dir: &Path, prefix: &str) -> Result<Self> {
        let meta = Meta::read(&dir.join(format!("{prefix}.meta")))?;
        if meta.form != FORM_PERFECT {
            return Err(GraphError::Corrupt("expected frozen indexer image".into()));
        }
        let keys = KeyColumn::open(dir, prefix, meta.kind, meta.count)?;
        let m = meta.aux as usize;
        let table = MmapFile::open(
            &dir.join(format!("{prefix}.indices")),
            (m + meta.count as usize) * 4,
        )?;
        Ok(Self {
            kind: meta.kind,
            keys,
            table,
            n: meta.count,
            m,
            seed: meta.seed,
        })
    }

    pub fn size(&self) -> u32 {
        self.n
    }

    pub fn key_type(&self) -> PropType {
        self.kind
    }

    pub fn lookup(&self, key: &Any<'_>) -> Option<Vid> {
        if self.n == 0 {
            return None;
        }
        let kb = key_bytes(key, self.kind).ok()?;
        let b = (bucket_hash(&kb, self.seed) % self.m as u64) as usize;
        let bytes = self.table.bytes();
        let d = u32::from_le_bytes(bytes[b * 4..b * 4 + 4].try_into().unwrap());
        let pos = (slot_hash(&kb, self.seed, d) % u64::from(self.n)) as usize;
        let base = (self.m + pos) * 4;
        let vid = u32::from_le_bytes(bytes[base..base + 4].try_into().unwrap());
        if vid == SLOT_EMPTY || vid >= self.n {
            return None;
        }
        if self.keys.get(vid).ok()? == kb.as_slice() {
            Some(Vid(vid))
        } else {
            None
        }
    }

    pub fn reverse(&self, vid: Vid) -> Result<Any<'_>> {
        self.keys.key_any(vid.0, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn insert_is_idempotent_and_dense() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndexer::create(dir.path(), "vertex_map_V", PropType::Int64, 4).unwrap();
        let (a, new_a) = idx.insert(&Any::Int64(100)).unwrap();
        let (b, new_b) = idx.insert(&Any::Int64(200)).unwrap();
        let (a2, again) = idx.insert(&Any::Int64(100)).unwrap();
        assert_eq!((a, new_a), (Vid(0), true));
        assert_eq!((b, new_b), (Vid(1), true));
        assert_eq!((a2, again), (Vid(0), false));
        assert_eq!(idx.size(), 2);
        assert_eq!(idx.lookup(&Any::Int64(200)), Some(Vid(1)));
        assert_eq!(idx.lookup(&Any::Int64(300)), None);
        assert_eq!(idx.reverse(Vid(0)).unwrap(), Any::Int64(100));
    }

    #[test]
    fn lookup_rejects_wrong_key_type() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndexer::create(dir.path(), "vertex_map_V", PropType::Int64, 4).unwrap();
        idx.insert(&Any::Int64(1)).unwrap();
        assert_eq!(idx.lookup(&Any::Int32(1)), None);
        assert!(idx.insert(&Any::Str("1")).is_err());
    }

    #[test]
    fn growth_keeps_every_mapping() {
        let dir = tempdir().unwrap();
        let mut idx = HashIndexer::create(dir.path(), "vertex_map_V", PropType::UInt32, 4).unwrap();
        for i in 0..2000u32 {
            let (vid, is_new) = idx.insert(&Any::UInt32(i * 7 + 3)).unwrap();
            assert!(is_new);
            assert_eq!(vid, Vid(i));
        }
        for i in 0..2000u32 {
            assert_eq!(idx.lookup(&Any::UInt32(i * 7 + 3)), Some(Vid(i)));
            assert_eq!(idx.reverse(Vid(i)).unwrap(), Any::UInt32(i * 7 + 3));
        }
    }

    #[test]
    fn dump_and_reopen_hash_form() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let mut idx = HashIndexer::create(src.path(), "vertex_map_V", PropType::String, 4).unwrap();
        for name in ["alice", "bob", "carol"] {
            idx.insert(&Any::Str(name)).unwrap();
        }
        idx.dump(dst.path(), "vertex_map_V").unwrap();
        let reopened = HashIndexer::open(dst.path(), "vertex_map_V").unwrap();
        assert_eq!(reopened.size(), 3);
        assert_eq!(reopened.lookup(&Any::Str("bob")), Some(Vid(1)));
        assert_eq!(reopened.reverse(Vid(2)).unwrap(), Any::Str("carol"));
    }

    #[test]
    fn perfect_build_lookup_and_reopen() {
        let dir = tempdir().unwrap();
        let keys: Vec<Vec<u8>> = (0..500i64).map(|i| (i * 13).to_le_bytes().to_vec()).collect();
        let idx =
            PerfectIndexer::build(dir.path(), "vertex_map_V", PropType::Int64, keys).unwrap();
        for i in 0..500i64 {
            assert_eq!(idx.lookup(&Any::Int64(i * 13)), Some(Vid(i as u32)));
        }
        assert_eq!(idx.lookup(&Any::Int64(7)), None);

        let reopened = PerfectIndexer::open(dir.path(), "vertex_map_V").unwrap();
        assert_eq!(reopened.size(), 500);
        assert_eq!(reopened.lookup(&Any::Int64(13)), Some(Vid(1)));
        assert_eq!(reopened.reverse(Vid(3)).unwrap(), Any::Int64(39));
    }

    #[test]
    fn perfect_build_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let keys = vec![5i64.to_le_bytes().to_vec(), 5i64.to_le_bytes().to_vec()];
        let err = PerfectIndexer::build(dir.path(), "vertex_map_V", PropType::Int64, keys)
            .unwrap_err();
        assert!(matches!(err, GraphError::Duplicate));
    }

    #[test]
    fn frozen_image_rebuilds_into_mutable_indexer() {
        let dir = tempdir().unwrap();
        let keys: Vec<Vec<u8>> = ["x", "y", "z"].iter().map(|s| s.as_bytes().to_vec()).collect();
        PerfectIndexer::build(dir.path(), "vertex_map_V", PropType::String, keys).unwrap();

        let mut mutable = HashIndexer::open(dir.path(), "vertex_map_V").unwrap();
        assert_eq!(mutable.size(), 3);
        assert_eq!(mutable.lookup(&Any::Str("y")), Some(Vid(1)));
        let (vid, is_new) = mutable.insert(&Any::Str("w")).unwrap();
        assert_eq!((vid, is_new), (Vid(3), true));
        assert_eq!(mutable.reverse(Vid(3)).unwrap(), Any::Str("w"));
    }
}
