//! Append-only byte log keyed by opaque stream path.
//!
//! Frames are newline-delimited JSON, one event per line, UTF-8. Appends are
//! serialised per path by a lock table; appends to different streams proceed
//! in parallel. A torn trailing frame (no final newline, or an unparseable
//! final line) is invisible to readers and overwritten by the next append.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::errors::StoreError;

/// Result of an ordered read over one stream.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    /// Every successfully-framed line, in append order, without newlines.
    pub lines: Vec<String>,
    /// Byte offset of the end of the last good frame. The next append
    /// truncates the file here before writing.
    pub durable_len: u64,
    /// True when a torn or non-JSON trailing frame was dropped.
    pub corrupt_tail: bool,
}

/// Durable append-only stream store.
///
/// Cheap to clone; clones share the per-path lock table.
#[derive(Debug, Clone, Default)]
pub struct StreamStore {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
    /// Byte offsets recorded by reads that hit a corrupt frame; the next
    /// append truncates to the offset so the corruption is never re-exposed.
    repair_hints: Arc<Mutex<HashMap<PathBuf, u64>>>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn take_repair_hint(&self, path: &Path) -> Option<u64> {
        self.repair_hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
    }

    fn set_repair_hint(&self, path: &Path, durable_len: u64) {
        self.repair_hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_path_buf(), durable_len);
    }

    /// Append one pre-encoded JSON frame.
    ///
    /// Atomic with respect to concurrent appenders on the same store: frames
    /// never interleave. The write is fsynced before returning; on fsync
    /// failure the frame is rolled back and `AppendNotDurable` is returned —
    /// the caller must treat the event as not having happened.
    pub fn append(&self, path: &Path, json_line: &str) -> Result<(), StoreError> {
        debug_assert!(!json_line.contains('\n'), "frames must be single lines");

        let lock = self.path_lock(path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(false)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?;

        // Overwrite any torn tail left by a mid-write crash (or corruption
        // a previous read flagged) so it is not re-exposed to readers.
        if let Some(durable_len) = self.take_repair_hint(path) {
            file.set_len(durable_len).map_err(|e| StoreError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        let start = repair_tail(&mut file, path)?;
        file.seek(SeekFrom::Start(start))
            .map_err(|e| StoreError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut frame = Vec::with_capacity(json_line.len() + 1);
        frame.extend_from_slice(json_line.as_bytes());
        frame.push(b'\n');
        file.write_all(&frame).map_err(|e| StoreError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        file.set_len(start + frame.len() as u64)
            .map_err(|e| StoreError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?;

        if let Err(e) = file.sync_all() {
            // Roll the frame back so a later successful append does not
            // publish an event the caller was told is not durable.
            let _ = file.set_len(start);
            return Err(StoreError::AppendNotDurable {
                path: path.to_path_buf(),
                source: e,
            });
        }

        Ok(())
    }

    /// Serialize and append one event.
    pub fn append_event<T: serde::Serialize>(
        &self,
        path: &Path,
        event: &T,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(event).map_err(|e| StoreError::EncodeError {
            message: e.to_string(),
        })?;
        self.append(path, &json)
    }

    /// Read every successfully-appended frame in append order.
    ///
    /// A missing stream reads as empty. A torn or non-JSON trailing frame is
    /// dropped with a warning; everything before it is returned.
    pub fn read(&self, path: &Path) -> Result<ReadOutcome, StoreError> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReadOutcome::default());
            }
            Err(e) => {
                return Err(StoreError::IoError {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| StoreError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let outcome = scan_frames(&bytes, path);
        if outcome.corrupt_tail {
            self.set_repair_hint(path, outcome.durable_len);
        }
        Ok(outcome)
    }
}

/// Offset appends should continue from, truncating a torn tail first.
///
/// Frames are single-line compact JSON ending in `\n`, so an intact file
/// always ends with a newline; checking the final byte keeps the append
/// path O(1). Only a torn tail (mid-write crash) pays for a full scan.
fn repair_tail(file: &mut std::fs::File, path: &Path) -> Result<u64, StoreError> {
    let len = file
        .metadata()
        .map_err(|e| StoreError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).map_err(|e| StoreError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    file.read_exact(&mut last).map_err(|e| StoreError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0)).map_err(|e| StoreError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    file.read_to_end(&mut bytes).map_err(|e| StoreError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let outcome = scan_frames(&bytes, path);
    warn!(
        event = "store.stream.tail_repaired",
        path = %path.display(),
        durable_len = outcome.durable_len,
        dropped_bytes = len - outcome.durable_len,
    );
    file.set_len(outcome.durable_len)
        .map_err(|e| StoreError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(outcome.durable_len)
}

/// Walk the raw bytes frame by frame, stopping at the first torn or
/// non-JSON frame.
fn scan_frames(bytes: &[u8], path: &Path) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();
    let mut offset: u64 = 0;

    for segment in bytes.split_inclusive(|b| *b == b'\n') {
        let terminated = segment.last() == Some(&b'\n');
        if !terminated {
            // Mid-write crash: the final frame never got its newline.
            outcome.corrupt_tail = true;
            debug!(
                event = "store.stream.torn_tail_dropped",
                path = %path.display(),
                offset,
                bytes = segment.len(),
            );
            break;
        }

        let line = &segment[..segment.len() - 1];
        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(_) => {
                outcome.corrupt_tail = true;
                warn!(
                    event = "store.stream.corrupt_frame",
                    path = %path.display(),
                    offset,
                    error = "frame is not valid UTF-8",
                );
                break;
            }
        };

        if text.is_empty() {
            offset += segment.len() as u64;
            outcome.durable_len = offset;
            continue;
        }

        if serde_json::from_str::<serde::de::IgnoredAny>(text).is_err() {
            outcome.corrupt_tail = true;
            warn!(
                event = "store.stream.corrupt_frame",
                path = %path.display(),
                offset,
                error = "frame is not valid JSON",
            );
            break;
        }

        outcome.lines.push(text.to_string());
        offset += segment.len() as u64;
        outcome.durable_len = offset;
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_then_read_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("streams/registry.log");
        let store = StreamStore::new();

        store.append(&path, r#"{"n":1}"#).unwrap();
        store.append(&path, r#"{"n":2}"#).unwrap();
        store.append(&path, r#"{"n":3}"#).unwrap();

        let outcome = store.read(&path).unwrap();
        assert_eq!(outcome.lines, vec![r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#]);
        assert!(!outcome.corrupt_tail);
    }

    #[test]
    fn test_read_missing_stream_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = StreamStore::new();
        let outcome = store.read(&dir.path().join("nope.log")).unwrap();
        assert!(outcome.lines.is_empty());
        assert!(!outcome.corrupt_tail);
    }

    #[test]
    fn test_torn_tail_is_dropped_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.log");
        std::fs::write(&path, "{\"n\":1}\n{\"n\":2}\n{\"n\":3").unwrap();

        let store = StreamStore::new();
        let outcome = store.read(&path).unwrap();
        assert_eq!(outcome.lines, vec![r#"{"n":1}"#, r#"{"n":2}"#]);
        assert!(outcome.corrupt_tail);
        assert_eq!(outcome.durable_len, 16);
    }

    #[test]
    fn test_append_overwrites_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.log");
        std::fs::write(&path, "{\"n\":1}\n{\"n\":2").unwrap();

        let store = StreamStore::new();
        store.append(&path, r#"{"n":3}"#).unwrap();

        let outcome = store.read(&path).unwrap();
        assert_eq!(outcome.lines, vec![r#"{"n":1}"#, r#"{"n":3}"#]);
        assert!(!outcome.corrupt_tail);

        // The torn bytes are gone from disk, not just hidden.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{\"n\":1}\n{\"n\":3}\n");
    }

    #[test]
    fn test_non_json_terminated_frame_stops_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.log");
        std::fs::write(&path, "{\"n\":1}\ngarbage\n{\"n\":3}\n").unwrap();

        let store = StreamStore::new();
        let outcome = store.read(&path).unwrap();
        // Prefix [0, p) only; frames after the corruption are not exposed.
        assert_eq!(outcome.lines, vec![r#"{"n":1}"#]);
        assert!(outcome.corrupt_tail);
    }

    #[test]
    fn test_append_after_corrupt_read_overwrites_from_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.log");
        // A newline-terminated garbage frame hides the frames after it.
        std::fs::write(&path, "{\"n\":1}\ngarbage\n{\"n\":3}\n").unwrap();

        let store = StreamStore::new();
        let outcome = store.read(&path).unwrap();
        assert!(outcome.corrupt_tail);

        store.append(&path, r#"{"n":4}"#).unwrap();
        let outcome = store.read(&path).unwrap();
        assert_eq!(outcome.lines, vec![r#"{"n":1}"#, r#"{"n":4}"#]);
        assert!(!outcome.corrupt_tail);
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.log");
        let store = StreamStore::new();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                let path = path.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let line = format!(r#"{{"thread":{},"i":{}}}"#, t, i);
                        store.append(&path, &line).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let outcome = store.read(&path).unwrap();
        assert_eq!(outcome.lines.len(), 200);
        assert!(!outcome.corrupt_tail);
        for line in &outcome.lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn test_append_event_serializes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.log");
        let store = StreamStore::new();

        #[derive(serde::Serialize)]
        struct Event {
            kind: &'static str,
        }
        store.append_event(&path, &Event { kind: "test" }).unwrap();

        let outcome = store.read(&path).unwrap();
        assert_eq!(outcome.lines, vec![r#"{"kind":"test"}"#]);
    }
}
