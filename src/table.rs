//! Columnar property table: a fixed-width row per vid, one store per
//! column.
//!
//! Three column kinds, fixed at init and recorded in the schema:
//! dense fixed-width (flat mapped array), dense string view (a mapped
//! `(offset, length)` array over a growable string arena), and sparse
//! (an in-memory map with a file-backed journal replayed on open).
//!
//! `resize` is the only operation that can move mapped regions, so
//! readers re-derive slices on every access and never hold one across
//! the writer's critical section.
//!
//! The same type backs the edge-side tables that hold multi-property or
//! variable-width edge data.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::mem::{write_trimmed, MmapFile};
use crate::schema::{ColumnStrategy, PropDef};
use crate::types::Vid;
use crate::value::{compatible, Any, Decoder, Encoder, PropType, RecordSource};

const STR_ITEM_LEN: usize = 12; // u64 offset + u32 length

enum ColumnStore {
    Fixed {
        mm: MmapFile,
        width: usize,
    },
    Str {
        items: MmapFile,
        data: MmapFile,
        data_used: u64,
    },
    Sparse {
        cells: FxHashMap<u32, Vec<u8>>,
        journal: File,
        journal_path: PathBuf,
    },
}

struct Column {
    def: PropDef,
    store: ColumnStore,
}

/// Struct-of-arrays property table keyed by vid.
pub struct VertexTable {
    prefix: String,
    columns: Vec<Column>,
    row_cap: u32,
    row_num: u32,
}

fn col_path(dir: &Path, prefix: &str, i: usize) -> PathBuf {
    dir.join(format!("{prefix}.col_{i}"))
}

fn fixed_width_of(ty: PropType) -> Result<usize> {
    // Bool widens to one byte; everything else keeps its wire width.
    ty.fixed_width()
        .filter(|w| *w > 0)
        .ok_or(GraphError::Unsupported("column type has no fixed width"))
}

fn default_any(ty: PropType) -> Any<'static> {
    match ty {
        PropType::Empty => Any::Empty,
        PropType::Bool => Any::Bool(false),
        PropType::Int32 => Any::Int32(0),
        PropType::UInt32 => Any::UInt32(0),
        PropType::Int64 => Any::Int64(0),
        PropType::UInt64 => Any::UInt64(0),
        PropType::Float => Any::Float(0.0),
        PropType::Double => Any::Double(0.0),
        PropType::Date => Any::Date(0),
        PropType::Day => Any::Day(0),
        PropType::String | PropType::StringMap => Any::Str(""),
        PropType::Record => Any::Empty,
    }
}

impl VertexTable {
    /// Creates an empty table with working files under `dir`.
    pub fn create(
        dir: &Path,
        prefix: &str,
        props: &[PropDef],
        strategies: &[ColumnStrategy],
        initial_rows: u32,
    ) -> Result<Self> {
        let mut table = Self::init(dir, prefix, props, strategies, 0)?;
        table.resize(initial_rows)?;
        Ok(table)
    }

    /// Maps existing working files under `dir` holding `row_num` rows.
    pub fn open(
        dir: &Path,
        prefix: &str,
        props: &[PropDef],
        strategies: &[ColumnStrategy],
        row_num: u32,
    ) -> Result<Self> {
        let mut table = Self::init(dir, prefix, props, strategies, row_num)?;
        table.resize(row_num)?;
        table.row_num = row_num;
        Ok(table)
    }

    fn init(
        dir: &Path,
        prefix: &str,
        props: &[PropDef],
        strategies: &[ColumnStrategy],
        existing_rows: u32,
    ) -> Result<Self> {
        if props.len() != strategies.len() {
            return Err(GraphError::BadInput(
                "one storage strategy per column required".into(),
            ));
        }
        let mut columns = Vec::with_capacity(props.len());
        for (i, (def, strategy)) in props.iter().zip(strategies.iter()).enumerate() {
            let store = match (strategy, def.ty) {
                (ColumnStrategy::Sparse, _) => {
                    let journal_path = col_path(dir, prefix, i);
                    let mut cells = FxHashMap::default();
                    if journal_path.exists() {
                        replay_journal(&journal_path, &mut cells)?;
                    }
                    let journal = OpenOptions::new()
                        .append(true)
                        .create(true)
                        .open(&journal_path)?;
                    ColumnStore::Sparse {
                        cells,
                        journal,
                        journal_path,
                    }
                }
                (ColumnStrategy::Dense, PropType::String | PropType::StringMap) => {
                    let items = MmapFile::open(&dir.join(format!("{prefix}.col_{i}.items")), 0)?;
                    let data =
                        MmapFile::open(&dir.join(format!("{prefix}.col_{i}.data")), 0)?;
                    let data_used = scan_string_arena_used(&items, existing_rows);
                    ColumnStore::Str {
                        items,
                        data,
                        data_used,
                    }
                }
                (ColumnStrategy::Dense, ty) => ColumnStore::Fixed {
                    mm: MmapFile::open(&col_path(dir, prefix, i), 0)?,
                    width: fixed_width_of(ty)?,
                },
            };
            columns.push(Column {
                def: def.clone(),
                store,
            });
        }
        Ok(Self {
            prefix: prefix.to_string(),
            columns,
            row_cap: 0,
            row_num: 0,
        })
    }

    pub fn row_num(&self) -> u32 {
        self.row_num
    }

    pub fn col_num(&self) -> usize {
        self.columns.len()
    }

    pub fn column_type(&self, col: usize) -> Result<PropType> {
        self.columns
            .get(col)
            .map(|c| c.def.ty)
            .ok_or(GraphError::OutOfRange("column id"))
    }

    /// Grows the underlying mapped regions to hold at least `n` rows.
    /// Never shrinks; stored values at `[0, row_num)` are preserved.
    pub fn resize(&mut self, n: u32) -> Result<()> {
        if n > self.row_cap {
            for column in &mut self.columns {
                match &mut column.store {
                    ColumnStore::Fixed { mm, width } => {
                        mm.ensure(n as usize * *width)?;
                    }
                    ColumnStore::Str { items, .. } => {
                        items.ensure(n as usize * STR_ITEM_LEN)?;
                    }
                    ColumnStore::Sparse { .. } => {}
                }
            }
            self.row_cap = n;
        }
        if n > self.row_num {
            self.row_num = n;
        }
        Ok(())
    }

    /// Appends one default-initialized row and returns its vid.
    pub fn append_default_row(&mut self) -> Result<Vid> {
        let vid = self.row_num;
        if vid == self.row_cap {
            let grown = (self.row_cap.max(64)).saturating_mul(2);
            self.resize(grown)?;
            self.row_num = vid;
        }
        self.row_num = vid + 1;
        Ok(Vid(vid))
    }

    pub fn get(&self, vid: Vid, col: usize) -> Result<Any<'_>> {
        if vid.0 >= self.row_num {
            return Err(GraphError::OutOfRange("vid beyond table population"));
        }
        let column = self
            .columns
            .get(col)
            .ok_or(GraphError::OutOfRange("column id"))?;
        match &column.store {
            ColumnStore::Fixed { mm, width } => {
                let off = vid.index() * *width;
                Ok(decode_fixed(&mm.bytes()[off..off + *width], column.def.ty))
            }
            ColumnStore::Str { items, data, .. } => {
                let base = vid.index() * STR_ITEM_LEN;
                let item = &items.bytes()[base..base + STR_ITEM_LEN];
                let off = u64::from_le_bytes(item[0..8].try_into().unwrap()) as usize;
                let len = u32::from_le_bytes(item[8..12].try_into().unwrap()) as usize;
                let bytes = &data.bytes()[off..off + len];
                Ok(Any::Str(std::str::from_utf8(bytes).map_err(|_| {
                    GraphError::Corrupt("non-utf8 string cell".into())
                })?))
            }
            ColumnStore::Sparse { cells, .. } => match cells.get(&vid.0) {
                Some(bytes) => Decoder::new(bytes).get_any(),
                None => Ok(default_any(column.def.ty)),
            },
        }
    }

    pub fn set(&mut self, vid: Vid, col: usize, value: &Any<'_>) -> Result<()> {
        if vid.0 >= self.row_num {
            return Err(GraphError::OutOfRange("vid beyond table population"));
        }
        let column = self
            .columns
            .get_mut(col)
            .ok_or(GraphError::OutOfRange("column id"))?;
        if !compatible(value.type_of(), column.def.ty) {
            return Err(GraphError::TypeMismatch("column value type"));
        }
        match &mut column.store {
            ColumnStore::Fixed { mm, width } => {
                let off = vid.index() * *width;
                encode_fixed(value, &mut mm.bytes_mut()[off..off + *width]);
            }
            ColumnStore::Str {
                items,
                data,
                data_used,
            } => {
                let s = value.as_str()?;
                let off = *data_used;
                data.ensure(off as usize + s.len())?;
                data.bytes_mut()[off as usize..off as usize + s.len()]
                    .copy_from_slice(s.as_bytes());
                *data_used += s.len() as u64;
                let base = vid.index() * STR_ITEM_LEN;
                let item = &mut items.bytes_mut()[base..base + STR_ITEM_LEN];
                item[0..8].copy_from_slice(&off.to_le_bytes());
                item[8..12].copy_from_slice(&(s.len() as u32).to_le_bytes());
            }
            ColumnStore::Sparse {
                cells, journal, ..
            } => {
                let mut enc = Encoder::new();
                enc.put_any(value)?;
                let bytes = enc.into_bytes();
                let mut rec = Vec::with_capacity(8 + bytes.len());
                rec.extend_from_slice(&vid.0.to_le_bytes());
                rec.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                rec.extend_from_slice(&bytes);
                journal.write_all(&rec)?;
                cells.insert(vid.0, bytes);
            }
        }
        Ok(())
    }

    /// Writes a whole row from an encoded value stream (one tagged value
    /// per column), used by WAL replay and overlay apply.
    pub fn ingest_row(&mut self, vid: Vid, dec: &mut Decoder<'_>) -> Result<()> {
        for col in 0..self.columns.len() {
            let value = dec.get_any()?;
            self.set(vid, col, &value)?;
        }
        Ok(())
    }

    /// Writes a whole row from in-memory values.
    pub fn insert_row(&mut self, vid: Vid, values: &[Any<'_>]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(GraphError::TypeMismatch("row arity"));
        }
        for (col, value) in values.iter().enumerate() {
            self.set(vid, col, value)?;
        }
        Ok(())
    }

    /// Appends a row at the end of the table (edge-side table path).
    pub fn append_row(&mut self, values: &[Any<'_>]) -> Result<u32> {
        let vid = self.append_default_row()?;
        self.insert_row(vid, values)?;
        Ok(vid.0)
    }

    /// Materializes one row; used when copying into overlays and by
    /// compaction rewrites.
    pub fn row_values(&self, vid: Vid) -> Result<Vec<crate::value::AnyOwned>> {
        let mut out = Vec::with_capacity(self.columns.len());
        for col in 0..self.columns.len() {
            out.push(self.get(vid, col)?.to_owned()?);
        }
        Ok(out)
    }

    pub fn flush(&mut self) -> Result<()> {
        for column in &mut self.columns {
            match &mut column.store {
                ColumnStore::Fixed { mm, .. } => mm.flush()?,
                ColumnStore::Str { items, data, .. } => {
                    items.flush()?;
                    data.flush()?;
                }
                ColumnStore::Sparse { journal, .. } => journal.sync_data()?,
            }
        }
        Ok(())
    }

    /// Seals exact-size snapshot artifacts under `dst_dir`.
    pub fn dump(&self, dst_dir: &Path) -> Result<()> {
        for (i, column) in self.columns.iter().enumerate() {
            match &column.store {
                ColumnStore::Fixed { mm, width } => {
                    write_trimmed(
                        &col_path(dst_dir, &self.prefix, i),
                        &mm.bytes()[..self.row_num as usize * *width],
                    )?;
                }
                ColumnStore::Str {
                    items,
                    data,
                    data_used,
                } => {
                    write_trimmed(
                        &dst_dir.join(format!("{}.col_{i}.items", self.prefix)),
                        &items.bytes()[..self.row_num as usize * STR_ITEM_LEN],
                    )?;
                    write_trimmed(
                        &dst_dir.join(format!("{}.col_{i}.data", self.prefix)),
                        &data.bytes()[..*data_used as usize],
                    )?;
                }
                ColumnStore::Sparse { cells, .. } => {
                    let mut entries: Vec<(&u32, &Vec<u8>)> = cells.iter().collect();
                    entries.sort_by_key(|(vid, _)| **vid);
                    let mut compacted = Vec::new();
                    for (vid, bytes) in entries {
                        compacted.extend_from_slice(&vid.to_le_bytes());
                        compacted.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                        compacted.extend_from_slice(bytes);
                    }
                    write_trimmed(&col_path(dst_dir, &self.prefix, i), &compacted)?;
                }
            }
        }
        debug!(prefix = %self.prefix, rows = self.row_num, "dumped table");
        Ok(())
    }
}

impl RecordSource for VertexTable {
    fn field_count(&self) -> usize {
        self.col_num()
    }

    fn field(&self, row: u32, col: usize) -> Result<Any<'_>> {
        self.get(Vid(row), col)
    }
}

fn scan_string_arena_used(items: &MmapFile, rows: u32) -> u64 {
    let mut max_end = 0u64;
    let bytes = items.bytes();
    for vid in 0..rows as usize {
        let base = vid * STR_ITEM_LEN;
        if base + STR_ITEM_LEN > bytes.len() {
            break;
        }
        let off = u64::from_le_bytes(bytes[base..base + 8].try_into().unwrap());
        let len = u32::from_le_bytes(bytes[base + 8..base + 12].try_into().unwrap());
        max_end = max_end.max(off + u64::from(len));
    }
    max_end
}

fn replay_journal(path: &Path, cells: &mut FxHashMap<u32, Vec<u8>>) -> Result<()> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let vid = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        let len = u32::from_le_bytes(buf[pos + 4..pos + 8].try_into().unwrap()) as usize;
        if pos + 8 + len > buf.len() {
            warn!(path = %path.display(), "sparse journal has a truncated tail");
            break;
        }
        cells.insert(vid, buf[pos + 8..pos + 8 + len].to_vec());
        pos += 8 + len;
    }
    Ok(())
}

fn decode_fixed(bytes: &[u8], ty: PropType) -> Any<'static> {
    match ty {
        PropType::Bool => Any::Bool(bytes[0] != 0),
        PropType::Int32 => Any::Int32(i32::from_le_bytes(bytes.try_into().unwrap())),
        PropType::UInt32 => Any::UInt32(u32::from_le_bytes(bytes.try_into().unwrap())),
        PropType::Int64 => Any::Int64(i64::from_le_bytes(bytes.try_into().unwrap())),
        PropType::UInt64 => Any::UInt64(u64::from_le_bytes(bytes.try_into().unwrap())),
        PropType::Float => Any::Float(f32::from_le_bytes(bytes.try_into().unwrap())),
        PropType::Double => Any::Double(f64::from_le_bytes(bytes.try_into().unwrap())),
        PropType::Date => Any::Date(i64::from_le_bytes(bytes.try_into().unwrap())),
        PropType::Day => Any::Day(i32::from_le_bytes(bytes.try_into().unwrap())),
        _ => Any::Empty,
    }
}

fn encode_fixed(value: &Any<'_>, out: &mut [u8]) {
    match value {
        Any::Bool(v) => out[0] = u8::from(*v),
        Any::Int32(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::UInt32(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::Int64(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::UInt64(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::Float(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::Double(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::Date(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::Day(v) => out.copy_from_slice(&v.to_le_bytes()),
        Any::Empty | Any::Str(_) | Any::Record(_) => {}
    }
}
