//! # memnexus-wal
//!
//! Append-only write-ahead log (C3) coordinating writes that must land in
//! both the Fact Store and the Vector Store without requiring cross-store
//! atomicity (spec §9: "use WAL + idempotent replay and accept brief
//! inconsistency"). Entries are JSON-lines records under `<root>/wal/`; a
//! write is "pending" until a matching remove record is appended, and replay
//! re-applies every still-pending entry through idempotent store calls.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use memnexus_core::{Error, Result};

const LOG_FILE_NAME: &str = "log.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Write {
        id: String,
        op: String,
        payload: serde_json::Value,
        timestamp: i64,
    },
    Remove {
        id: String,
    },
}

/// A still-pending entry returned by [`WriteAheadLog::replay`].
#[derive(Debug, Clone)]
pub struct PendingEntry {
    /// The WAL entry id.
    pub id: String,
    /// The logical operation name (`"fact_write"`, `"vector_write"`, …).
    pub op: String,
    /// Operation payload, shaped by the caller.
    pub payload: serde_json::Value,
    /// Epoch seconds the entry was first written.
    pub timestamp: i64,
}

/// Append-only write-ahead log.
pub struct WriteAheadLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog").field("path", &self.path).finish_non_exhaustive()
    }
}

impl WriteAheadLog {
    /// Opens (creating if necessary) the log file under `root` (typically
    /// `<data root>/wal/`).
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(Error::storage)?;
        let path = root.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::storage)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn append(&self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_string(record).map_err(Error::storage)?;
        line.push('\n');
        let mut file = self.file.lock().map_err(|_| Error::storage("poisoned lock"))?;
        file.write_all(line.as_bytes()).map_err(Error::storage)?;
        file.flush().map_err(Error::storage)?;
        Ok(())
    }

    /// Appends a pending write entry, returning its id.
    pub fn write(&self, op: &str, payload: serde_json::Value, now: i64) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.append(&Record::Write {
            id: id.clone(),
            op: op.to_string(),
            payload,
            timestamp: now,
        })?;
        Ok(id)
    }

    /// Marks `id` as fully applied. Safe to call more than once.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.append(&Record::Remove { id: id.to_string() })
    }

    /// Returns every entry that has a `Write` record with no matching
    /// `Remove` record, in the order they were written. Idempotent: calling
    /// this repeatedly without further writes returns the same set.
    pub fn replay(&self) -> Result<Vec<PendingEntry>> {
        let reader = BufReader::new(File::open(&self.path).map_err(Error::storage)?);
        let mut pending: Vec<PendingEntry> = Vec::new();
        let mut removed: std::collections::HashSet<String> = std::collections::HashSet::new();

        let lines: Vec<Record> = reader
            .lines()
            .map_while(std::result::Result::ok)
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(&l).ok())
            .collect();

        for record in &lines {
            if let Record::Remove { id } = record {
                removed.insert(id.clone());
            }
        }
        for record in lines {
            if let Record::Write { id, op, payload, timestamp } = record {
                if !removed.contains(&id) {
                    pending.push(PendingEntry { id, op, payload, timestamp });
                }
            }
        }
        Ok(pending)
    }

    /// Rewrites the log keeping only still-pending entries, bounding growth
    /// (spec §4.8 maintenance housekeeping).
    pub fn compact(&self) -> Result<()> {
        let pending = self.replay()?;
        let mut file = self.file.lock().map_err(|_| Error::storage("poisoned lock"))?;
        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(Error::storage)?;
            for entry in &pending {
                let record = Record::Write {
                    id: entry.id.clone(),
                    op: entry.op.clone(),
                    payload: entry.payload.clone(),
                    timestamp: entry.timestamp,
                };
                let mut line = serde_json::to_string(&record).map_err(Error::storage)?;
                line.push('\n');
                tmp.write_all(line.as_bytes()).map_err(Error::storage)?;
            }
            tmp.flush().map_err(Error::storage)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(Error::storage)?;
        *file = OpenOptions::new().append(true).open(&self.path).map_err(Error::storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn pending_entry_survives_until_removed() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        let id = wal.write("fact_write", serde_json::json!({"id": "f1"}), 1_000).unwrap();

        let pending = wal.replay().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        wal.remove(&id).unwrap();
        assert!(wal.replay().unwrap().is_empty());
    }

    #[test]
    fn replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        wal.write("fact_write", serde_json::json!({"id": "f1"}), 1_000).unwrap();

        let first = wal.replay().unwrap();
        let second = wal.replay().unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn compact_drops_completed_entries() {
        let dir = tempdir().unwrap();
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        let done = wal.write("fact_write", serde_json::json!({"id": "f1"}), 1_000).unwrap();
        let pending = wal.write("fact_write", serde_json::json!({"id": "f2"}), 1_001).unwrap();
        wal.remove(&done).unwrap();

        wal.compact().unwrap();
        let entries = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, pending);
    }

    #[test]
    fn reopening_existing_log_preserves_pending_entries() {
        let dir = tempdir().unwrap();
        let id = {
            let wal = WriteAheadLog::open(dir.path()).unwrap();
            wal.write("vector_write", serde_json::json!({"id": "f1"}), 1_000).unwrap()
        };
        let wal = WriteAheadLog::open(dir.path()).unwrap();
        let pending = wal.replay().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }
}
