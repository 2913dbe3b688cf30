//! Memory-mapped file primitives and the process-wide arena allocator.
//!
//! All persistent structures (key columns, vertex columns, neighbor
//! arenas) sit on top of [`MmapFile`], which owns the grow/remap
//! discipline: growing reallocates the mapping, so no raw pointer into a
//! mapped region may be held across a call that can grow it. Structures
//! re-derive their slices on every access.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use tracing::{debug, warn};

use crate::error::Result;

/// Minimum mapped capacity; also the growth granularity floor.
pub const PAGE_SIZE: usize = 4096;

/// A growable read-write memory-mapped file.
pub struct MmapFile {
    path: PathBuf,
    file: File,
    map: MmapMut,
    cap: usize,
}

impl MmapFile {
    /// Opens (creating if absent) and maps the file with at least
    /// `min_cap` bytes of capacity. Existing content is preserved.
    pub fn open(path: &Path, min_cap: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let existing = file.metadata()?.len() as usize;
        let cap = round_capacity(existing.max(min_cap));
        if existing < cap {
            file.set_len(cap as u64)?;
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            cap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Grows capacity to hold at least `needed` bytes, remapping the
    /// file. Existing bytes are preserved; new bytes are zero.
    pub fn ensure(&mut self, needed: usize) -> Result<()> {
        if needed <= self.cap {
            return Ok(());
        }
        let new_cap = round_capacity(needed);
        self.file.set_len(new_cap as u64)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        debug!(path = %self.path.display(), cap = new_cap, "grew mapped file");
        self.cap = new_cap;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Flushes, unmaps, and truncates the file to its exact payload
    /// length. Used when sealing a snapshot artifact.
    pub fn finalize(self, exact_len: u64) -> Result<()> {
        self.map.flush()?;
        let file = self.file.try_clone()?;
        drop(self.map);
        drop(self.file);
        file.set_len(exact_len)?;
        file.sync_all()?;
        Ok(())
    }
}

fn round_capacity(n: usize) -> usize {
    n.max(PAGE_SIZE).next_power_of_two()
}

/// Writes `bytes` as the exact content of `path` (snapshot artifacts are
/// sealed at their payload length, not their mapped capacity).
pub fn write_trimmed(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut mm = MmapFile::open(path, bytes.len().max(1))?;
    mm.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
    mm.finalize(bytes.len() as u64)
}

/// Process-wide allocator of file-backed scratch arenas.
///
/// Workers obtain private bump-allocated chunks named
/// `allocator_<worker>_<seq>` under `runtime/allocator/`. Chunk contents
/// live only for the duration of the build that wrote them; anything
/// found at startup is stale and collected by [`ArenaAllocator::gc`].
pub struct ArenaAllocator {
    dir: PathBuf,
    seq: AtomicU32,
}

impl ArenaAllocator {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            seq: AtomicU32::new(0),
        })
    }

    /// Removes stale arena files left behind by a previous process.
    pub fn gc(dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("allocator_") {
                if let Err(err) = fs::remove_file(entry.path()) {
                    warn!(file = %entry.path().display(), %err, "failed to collect stale arena");
                } else {
                    debug!(file = %entry.path().display(), "collected stale arena");
                }
            }
        }
        Ok(())
    }

    /// Allocates a fresh chunk owned by `worker`.
    pub fn chunk(&self, worker: usize, min_cap: usize) -> Result<ArenaChunk> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("allocator_{worker}_{seq}"));
        let mm = MmapFile::open(&path, min_cap)?;
        Ok(ArenaChunk { mm, used: 0 })
    }
}

/// A private bump-allocated byte arena backed by one mapped file.
pub struct ArenaChunk {
    mm: MmapFile,
    used: usize,
}

impl ArenaChunk {
    /// Appends `bytes` and returns their offset within the chunk.
    pub fn push(&mut self, bytes: &[u8]) -> Result<u64> {
        let off = self.used;
        self.mm.ensure(off + bytes.len())?;
        self.mm.bytes_mut()[off..off + bytes.len()].copy_from_slice(bytes);
        self.used += bytes.len();
        Ok(off as u64)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mm.bytes()[..self.used]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn grow_preserves_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col");
        let mut mm = MmapFile::open(&path, 16).unwrap();
        mm.bytes_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        let old_cap = mm.capacity();
        mm.ensure(old_cap * 8).unwrap();
        assert!(mm.capacity() >= old_cap * 8);
        assert_eq!(&mm.bytes()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn reopen_sees_written_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col");
        {
            let mut mm = MmapFile::open(&path, 16).unwrap();
            mm.bytes_mut()[..3].copy_from_slice(b"abc");
            mm.flush().unwrap();
        }
        let mm = MmapFile::open(&path, 16).unwrap();
        assert_eq!(&mm.bytes()[..3], b"abc");
    }

    #[test]
    fn finalize_truncates_to_exact_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col");
        let mut mm = MmapFile::open(&path, 16).unwrap();
        mm.bytes_mut()[..5].copy_from_slice(b"hello");
        mm.finalize(5).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 5);
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn arena_chunks_are_private_and_collectable() {
        let dir = tempdir().unwrap();
        let alloc = ArenaAllocator::new(dir.path()).unwrap();
        let mut a = alloc.chunk(0, 64).unwrap();
        let mut b = alloc.chunk(1, 64).unwrap();
        assert_eq!(a.push(b"xy").unwrap(), 0);
        assert_eq!(a.push(b"z").unwrap(), 2);
        b.push(b"qq").unwrap();
        assert_eq!(a.bytes(), b"xyz");
        assert_eq!(b.bytes(), b"qq");
        drop(a);
        drop(b);
        ArenaAllocator::gc(dir.path()).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
