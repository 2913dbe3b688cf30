//! On-disk directory contract and the snapshot version switch.
//!
//! Layout relative to the data root:
//!
//! ```text
//! schema                              serialized schema image
//! snapshots/
//!   VERSION                           4-byte u32: the active version
//!   <version>/                        one directory per snapshot
//!     vertex_map_<L>.{keys,indices,meta}
//!     vertex_table_<L>.col_<i>[.data|.items]
//!     {ie,oe}_<S>_<E>_<D>.{deg,nbr}
//!     e_<S>_<E>_<D>_data.*
//! wal/
//!   log_<n>
//! runtime/
//!   allocator/                        worker-local scratch arenas
//!   tails/                            working copies of mutable stores
//!   tmp/                              in-progress artifacts; safe to wipe
//!   update_txn_<ts>/                  per-transaction overlay tables
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{GraphError, Result};

pub fn schema_path(root: &Path) -> PathBuf {
    root.join("schema")
}

pub fn snapshots_dir(root: &Path) -> PathBuf {
    root.join("snapshots")
}

pub fn version_path(root: &Path) -> PathBuf {
    snapshots_dir(root).join("VERSION")
}

pub fn snapshot_dir(root: &Path, version: u32) -> PathBuf {
    snapshots_dir(root).join(version.to_string())
}

pub fn wal_dir(root: &Path) -> PathBuf {
    root.join("wal")
}

pub fn runtime_dir(root: &Path) -> PathBuf {
    root.join("runtime")
}

pub fn allocator_dir(root: &Path) -> PathBuf {
    runtime_dir(root).join("allocator")
}

pub fn tails_dir(root: &Path) -> PathBuf {
    runtime_dir(root).join("tails")
}

pub fn tmp_dir(root: &Path) -> PathBuf {
    runtime_dir(root).join("tmp")
}

pub fn update_txn_dir(root: &Path, ts: u32) -> PathBuf {
    runtime_dir(root).join(format!("update_txn_{ts}"))
}

pub fn bulk_load_progress_path(root: &Path) -> PathBuf {
    tmp_dir(root).join("bulk_load_progress.log")
}

pub fn vertex_map_prefix(label_name: &str) -> String {
    format!("vertex_map_{label_name}")
}

pub fn vertex_table_prefix(label_name: &str) -> String {
    format!("vertex_table_{label_name}")
}

pub fn ie_prefix(src: &str, edge: &str, dst: &str) -> String {
    format!("ie_{src}_{edge}_{dst}")
}

pub fn oe_prefix(src: &str, edge: &str, dst: &str) -> String {
    format!("oe_{src}_{edge}_{dst}")
}

pub fn edata_prefix(src: &str, edge: &str, dst: &str) -> String {
    format!("e_{src}_{edge}_{dst}_data")
}

/// Reads the active snapshot version.
pub fn read_version(root: &Path) -> Result<u32> {
    let mut buf = [0u8; 4];
    let mut file = File::open(version_path(root))?;
    file.read_exact(&mut buf)
        .map_err(|_| GraphError::Corrupt("truncated VERSION file".into()))?;
    Ok(u32::from_le_bytes(buf))
}

/// Atomically switches the active version: write `VERSION.tmp`, fsync,
/// rename over `VERSION`, fsync the directory.
pub fn write_version(root: &Path, version: u32) -> Result<()> {
    let dir = snapshots_dir(root);
    fs::create_dir_all(&dir)?;
    let tmp = dir.join("VERSION.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&version.to_le_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, version_path(root))?;
    if let Ok(d) = File::open(&dir) {
        let _ = d.sync_all();
    }
    info!(version, "snapshot version switched");
    Ok(())
}

/// Creates the full directory skeleton for a fresh data root.
pub fn create_layout(root: &Path) -> Result<()> {
    fs::create_dir_all(snapshots_dir(root))?;
    fs::create_dir_all(wal_dir(root))?;
    fs::create_dir_all(allocator_dir(root))?;
    fs::create_dir_all(tails_dir(root))?;
    fs::create_dir_all(tmp_dir(root))?;
    Ok(())
}

/// Wipes `runtime/tmp`. Everything under it is an in-progress artifact.
pub fn clear_tmp(root: &Path) -> Result<()> {
    let dir = tmp_dir(root);
    if dir.exists() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            debug!(path = %path.display(), "cleared tmp artifact");
        }
    } else {
        fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Removes overlay directories abandoned by a previous process.
pub fn clear_stale_update_txn_dirs(root: &Path) -> Result<()> {
    let dir = runtime_dir(root);
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("update_txn_") {
            fs::remove_dir_all(entry.path())?;
            debug!(dir = %entry.path().display(), "removed stale overlay dir");
        }
    }
    Ok(())
}

/// Copies one snapshot artifact into a working directory, returning the
/// destination path. Missing sources map to a fresh (empty) working file.
pub fn copy_into(src: &Path, dst_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dst_dir)?;
    let dst = dst_dir.join(name);
    if src.exists() {
        fs::copy(src, &dst)?;
    } else if dst.exists() {
        fs::remove_file(&dst)?;
    }
    Ok(dst)
}
