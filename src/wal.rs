//! Write-ahead log: segmented append-only files `wal/log_<n>`.
//!
//! Each record is a fixed little-endian header `{u32 length, u8 type,
//! u32 timestamp}` followed by `length` payload bytes (the op stream of
//! one committed update transaction). The record boundary is
//! self-delimiting via `length`. A record becomes observable by replay
//! only after header and payload are durably on disk; the writer syncs
//! before returning from `append`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::types::Timestamp;

/// Header bytes: u32 length + u8 type + u32 timestamp.
pub const WAL_HEADER_LEN: usize = 9;

/// Record type carrying an update-transaction op stream.
pub const WAL_RECORD_UPDATE: u8 = 1;

/// Default segment rollover threshold.
pub const DEFAULT_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

fn segment_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("log_{index}"))
}

fn segment_index(name: &str) -> Option<u32> {
    name.strip_prefix("log_")?.parse().ok()
}

/// One decoded WAL record.
#[derive(Clone, Debug)]
pub struct WalRecord {
    pub ts: Timestamp,
    pub kind: u8,
    pub payload: Vec<u8>,
}

/// Appender owned by the single writer.
pub struct WalWriter {
    dir: PathBuf,
    file: File,
    seg_index: u32,
    seg_bytes: u64,
    seg_limit: u64,
}

impl WalWriter {
    /// Opens the log for appending, continuing the highest existing
    /// segment (or starting `log_0`).
    pub fn open(dir: &Path, seg_limit: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let seg_index = latest_segment(dir)?.unwrap_or(0);
        let path = segment_path(dir, seg_index);
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let seg_bytes = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            seg_index,
            seg_bytes,
            seg_limit: seg_limit.max(1),
        })
    }

    /// Appends one record and syncs it to disk before returning.
    pub fn append(&mut self, ts: Timestamp, payload: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(WAL_HEADER_LEN + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.push(WAL_RECORD_UPDATE);
        record.extend_from_slice(&ts.0.to_le_bytes());
        record.extend_from_slice(payload);
        self.file.write_all(&record)?;
        self.file.sync_data()?;
        self.seg_bytes += record.len() as u64;
        debug!(ts = ts.0, bytes = record.len(), segment = self.seg_index, "wal append");
        if self.seg_bytes >= self.seg_limit {
            self.roll()?;
        }
        Ok(())
    }

    fn roll(&mut self) -> Result<()> {
        self.seg_index += 1;
        let path = segment_path(&self.dir, self.seg_index);
        self.file = OpenOptions::new().append(true).create(true).open(&path)?;
        self.seg_bytes = 0;
        info!(segment = self.seg_index, "rolled wal segment");
        Ok(())
    }

    pub fn segment_index(&self) -> u32 {
        self.seg_index
    }
}

fn latest_segment(dir: &Path) -> Result<Option<u32>> {
    let mut latest = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(idx) = segment_index(&entry.file_name().to_string_lossy()) {
            latest = Some(latest.map_or(idx, |l: u32| l.max(idx)));
        }
    }
    Ok(latest)
}

/// Reads every complete record across all segments, in append order.
/// A truncated tail (torn final write) ends the scan with a warning; a
/// malformed record elsewhere is corruption.
pub fn scan(dir: &Path) -> Result<Vec<WalRecord>> {
    let mut segments: Vec<u32> = Vec::new();
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(idx) = segment_index(&entry.file_name().to_string_lossy()) {
                segments.push(idx);
            }
        }
    }
    segments.sort_unstable();

    let mut records = Vec::new();
    for (seg_pos, idx) in segments.iter().enumerate() {
        let path = segment_path(dir, *idx);
        let mut buf = Vec::new();
        File::open(&path)?.read_to_end(&mut buf)?;
        let mut pos = 0usize;
        while pos < buf.len() {
            if pos + WAL_HEADER_LEN > buf.len() {
                warn!(segment = idx, "wal segment ends in a torn header");
                return finish_scan(records, seg_pos, &segments);
            }
            let len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            let kind = buf[pos + 4];
            let ts = u32::from_le_bytes(buf[pos + 5..pos + 9].try_into().unwrap());
            if kind != WAL_RECORD_UPDATE {
                return Err(GraphError::Corrupt(format!(
                    "unknown wal record type {kind} in segment {idx}"
                )));
            }
            if pos + WAL_HEADER_LEN + len > buf.len() {
                warn!(segment = idx, "wal segment ends in a torn payload");
                return finish_scan(records, seg_pos, &segments);
            }
            records.push(WalRecord {
                ts: Timestamp(ts),
                kind,
                payload: buf[pos + WAL_HEADER_LEN..pos + WAL_HEADER_LEN + len].to_vec(),
            });
            pos += WAL_HEADER_LEN + len;
        }
    }
    Ok(records)
}

fn finish_scan(records: Vec<WalRecord>, seg_pos: usize, segments: &[u32]) -> Result<Vec<WalRecord>> {
    // A torn record is only tolerable at the very end of the log.
    if seg_pos + 1 != segments.len() {
        return Err(GraphError::Corrupt(
            "torn wal record before the final segment".into(),
        ));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_scan_roundtrip() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), DEFAULT_SEGMENT_BYTES).unwrap();
        writer.append(Timestamp(1), b"first").unwrap();
        writer.append(Timestamp(2), b"second record").unwrap();
        let records = scan(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ts, Timestamp(1));
        assert_eq!(records[0].payload, b"first");
        assert_eq!(records[1].ts, Timestamp(2));
        assert_eq!(records[1].payload, b"second record");
    }

    #[test]
    fn reopen_continues_the_latest_segment() {
        let dir = tempdir().unwrap();
        {
            let mut writer = WalWriter::open(dir.path(), DEFAULT_SEGMENT_BYTES).unwrap();
            writer.append(Timestamp(1), b"a").unwrap();
        }
        {
            let mut writer = WalWriter::open(dir.path(), DEFAULT_SEGMENT_BYTES).unwrap();
            writer.append(Timestamp(2), b"b").unwrap();
        }
        let records = scan(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, b"b");
    }

    #[test]
    fn rollover_splits_segments_and_scan_orders_them() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), 32).unwrap();
        for i in 0..10u32 {
            writer.append(Timestamp(i + 1), &[i as u8; 20]).unwrap();
        }
        assert!(writer.segment_index() > 0);
        let records = scan(dir.path()).unwrap();
        assert_eq!(records.len(), 10);
        let ts: Vec<u32> = records.iter().map(|r| r.ts.0).collect();
        assert_eq!(ts, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn torn_tail_is_tolerated() {
        let dir = tempdir().unwrap();
        let mut writer = WalWriter::open(dir.path(), DEFAULT_SEGMENT_BYTES).unwrap();
        writer.append(Timestamp(1), b"good").unwrap();
        writer.append(Timestamp(2), b"torn").unwrap();
        // Chop the final payload byte to simulate a crash mid-write.
        let path = dir.path().join("log_0");
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 1).unwrap();
        let records = scan(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, b"good");
    }
}
