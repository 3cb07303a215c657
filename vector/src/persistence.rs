//! Durable snapshot storage for the vector index, backed by `redb`.

use std::fs;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};

use memnexus_core::{Error, Result, VectorRecord};

const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vector_records");

/// Embedded key-value persistence for vector records, checkpointed
/// wholesale on a schedule and at shutdown (spec §4.2 `checkpoint`).
pub struct RedbPersistence {
    path: PathBuf,
    db: Database,
}

impl std::fmt::Debug for RedbPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbPersistence").field("path", &self.path).finish_non_exhaustive()
    }
}

impl RedbPersistence {
    /// Opens (creating if necessary) a redb-backed persistence file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(Error::vector_store)?;
            }
        }
        let db = Database::create(&path).map_err(Error::vector_store)?;
        Ok(Self { path, db })
    }

    /// Writes every record, replacing prior contents for ids present in the
    /// snapshot; ids absent from the snapshot remain untouched (callers are
    /// expected to pass the full current set on checkpoint).
    pub fn save(&self, records: &[VectorRecord]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(Error::vector_store)?;
        {
            let mut table = write_txn.open_table(RECORDS_TABLE).map_err(Error::vector_store)?;
            for record in records {
                let bytes = serde_json::to_vec(record).map_err(Error::vector_store)?;
                table.insert(record.id.as_str(), bytes.as_slice()).map_err(Error::vector_store)?;
            }
        }
        write_txn.commit().map_err(Error::vector_store)?;
        Ok(())
    }

    /// Removes a single record, used when a fact is hard-pruned.
    pub fn delete(&self, id: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(Error::vector_store)?;
        {
            let mut table = write_txn.open_table(RECORDS_TABLE).map_err(Error::vector_store)?;
            table.remove(id).map_err(Error::vector_store)?;
        }
        write_txn.commit().map_err(Error::vector_store)?;
        Ok(())
    }

    /// Loads every stored record.
    pub fn load(&self) -> Result<Vec<VectorRecord>> {
        let read_txn = self.db.begin_read().map_err(Error::vector_store)?;
        let table = match read_txn.open_table(RECORDS_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(Error::vector_store(e)),
        };
        let mut records = Vec::new();
        for entry in table.iter().map_err(Error::vector_store)? {
            let (_, value) = entry.map_err(Error::vector_store)?;
            let record: VectorRecord = serde_json::from_slice(value.value()).map_err(Error::vector_store)?;
            records.push(record);
        }
        Ok(records)
    }

    /// The file path this persistence instance is backed by.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
