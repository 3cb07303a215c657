//! # memnexus-vector
//!
//! Approximate nearest-neighbour vector store (C2): an in-memory HNSW index
//! over fact embeddings, checkpointed to `redb`. Opened once per process as
//! a refcounted singleton (spec §5: "a refcounted vector-store singleton →
//! explicit `open`/`close` with an arc'd counter").

mod index;
mod persistence;
mod registry;

use std::path::Path;
use std::sync::Arc;

use memnexus_core::{Category, Error, Result, VectorRecord};

pub use index::ScoredRecord;
use index::HnswIndex;
use persistence::RedbPersistence;

/// A ranked search hit, paired with the id for rehydration against the Fact
/// Store (spec §4.2: "returned ids are rehydrated by calling `C1.getById`").
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Fact id to rehydrate.
    pub id: String,
    /// Cosine similarity score.
    pub score: f32,
}

/// The vector store: an in-memory HNSW index backed by a `redb` checkpoint
/// file. Treat it as a cache keyed by fact id, never as a source of truth
/// (spec §9: "never derive correctness from the vector store alone").
pub struct VectorStore {
    index: HnswIndex,
    persistence: RedbPersistence,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("dimension", &self.index.dimension())
            .field("len", &self.index.len())
            .field("path", &self.persistence.path())
            .finish()
    }
}

impl VectorStore {
    fn open_fresh(path: &Path, dimension: usize) -> Result<Self> {
        let persistence = RedbPersistence::open(path)?;
        let index = HnswIndex::new(dimension);
        let existing = persistence.load()?;
        let existing = existing.into_iter().filter(|r| r.vector.len() == dimension).collect();
        index.load(existing);
        Ok(Self { index, persistence })
    }

    /// Upserts a record (spec §4.2 `store`). A byte-identical duplicate
    /// vector, per the caller's own [`Self::has_duplicate`] check, should be
    /// skipped by the caller before calling this — this method itself always
    /// writes, matching the Fact Store's "last write wins per id" semantics.
    pub fn store(&self, record: VectorRecord) -> Result<()> {
        if record.vector.len() != self.index.dimension() {
            return Err(Error::vector_store(format!(
                "dimension mismatch: expected {}, got {}",
                self.index.dimension(),
                record.vector.len()
            )));
        }
        self.index.upsert(record);
        Ok(())
    }

    /// Approximate nearest-neighbour search, descending cosine similarity
    /// (spec §4.2 `search`).
    pub fn search(&self, vector: &[f32], k: usize, min_score: f32) -> Result<Vec<VectorHit>> {
        if vector.len() != self.index.dimension() {
            return Err(Error::vector_store(format!(
                "dimension mismatch: expected {}, got {}",
                self.index.dimension(),
                vector.len()
            )));
        }
        Ok(self
            .index
            .search(vector, k, min_score)
            .into_iter()
            .map(|r| VectorHit {
                id: r.record.id,
                score: r.score,
            })
            .collect())
    }

    /// Cosine-threshold duplicate check, default threshold `0.85`
    /// (spec §4.2 `hasDuplicate`).
    #[must_use]
    pub fn has_duplicate(&self, vector: &[f32], threshold: f32) -> bool {
        self.index.has_duplicate(vector, threshold)
    }

    /// Returns the stored vector for `id`, if present (spec §4.7
    /// find-duplicates: pairwise cosine is computed over already-embedded
    /// records, not re-embedded from text).
    #[must_use]
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.index.get(id)
    }

    /// Removes a record, e.g. when its owning fact is hard-pruned or its
    /// vector is replaced during consolidation (spec §4.2 orphan cleanup,
    /// property P5).
    pub fn remove(&self, id: &str) -> Result<()> {
        self.index.remove(id);
        self.persistence.delete(id)
    }

    /// Total record count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Returns the ids of every stored record in `category`, used by
    /// maintenance's consolidation pass to scope candidate pairs.
    #[must_use]
    pub fn ids_with_category(&self, category: Category) -> Vec<String> {
        self.index.ids_with_category(category)
    }

    /// Flushes the full in-memory index to the `redb` checkpoint file
    /// (spec §4.2 `checkpoint`). Called by the scheduler and at shutdown.
    pub fn checkpoint(&self) -> Result<()> {
        self.persistence.save(&self.index.snapshot())
    }
}

/// Opens (or joins) the process-wide vector store singleton for `path`,
/// incrementing its refcount (spec §4.2 `open`). Returns a shared handle;
/// the underlying store stays alive until every handle calls
/// [`remove_session`].
pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Arc<VectorStore>> {
    registry::open(path.as_ref(), dimension)
}

/// Decrements the refcount for the store backing `path`. When it reaches
/// zero the store is checkpointed and evicted from the registry; a later
/// [`open`] call will rehydrate it from disk (spec §4.2 `removeSession`).
pub fn remove_session(path: impl AsRef<Path>) -> Result<()> {
    registry::remove_session(path.as_ref())
}

#[cfg(test)]
mod tests {
    use memnexus_core::Category;
    use tempfile::tempdir;

    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            text: id.into(),
            vector,
            category: Category::Fact,
            importance: 0.5,
        }
    }

    #[test]
    fn store_and_search_roundtrip() {
        let dir = tempdir().unwrap();
        let store = open(dir.path().join("v.redb"), 2).unwrap();
        store.store(record("f1", vec![1.0, 0.0])).unwrap();
        let hits = store.search(&[1.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].id, "f1");
        remove_session(dir.path().join("v.redb")).unwrap();
    }

    #[test]
    fn checkpoint_then_reopen_rehydrates_p5() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.redb");
        {
            let store = open(&path, 2).unwrap();
            store.store(record("f1", vec![1.0, 0.0])).unwrap();
            store.checkpoint().unwrap();
            remove_session(&path).unwrap();
        }
        let reopened = open(&path, 2).unwrap();
        assert_eq!(reopened.count(), 1);
        let hits = reopened.search(&[1.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].id, "f1");
        remove_session(&path).unwrap();
    }

    #[test]
    fn get_returns_stored_record_by_id() {
        let dir = tempdir().unwrap();
        let store = open(dir.path().join("v.redb"), 2).unwrap();
        store.store(record("f1", vec![1.0, 0.0])).unwrap();
        assert_eq!(store.get("f1").unwrap().vector, vec![1.0, 0.0]);
        assert!(store.get("missing").is_none());
        remove_session(dir.path().join("v.redb")).unwrap();
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let store = open(dir.path().join("v.redb"), 3).unwrap();
        let err = store.store(record("f1", vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, Error::VectorStore(_)));
        remove_session(dir.path().join("v.redb")).unwrap();
    }

    #[test]
    fn refcount_shares_one_instance_across_open_calls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.redb");
        let a = open(&path, 2).unwrap();
        let b = open(&path, 2).unwrap();
        a.store(record("f1", vec![1.0, 0.0])).unwrap();
        assert_eq!(b.count(), 1);
        remove_session(&path).unwrap();
        remove_session(&path).unwrap();
    }
}
