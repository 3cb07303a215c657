//! In-memory HNSW index over fact embeddings, rebuilt lazily on search.

use std::collections::HashMap;

use instant_distance::{Builder, HnswMap, Point, Search};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;

use memnexus_core::{Category, VectorRecord};

#[derive(Clone, Debug)]
struct EmbeddingPoint {
    vector: Vec<f32>,
}

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - dot(&self.vector, &other.vector)
    }
}

/// Dot product, which equals cosine similarity for unit-norm vectors
/// (spec §4.2: "Vectors are assumed L2-unit-norm").
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

struct State {
    records: Vec<VectorRecord>,
    id_to_index: HashMap<String, usize>,
    hnsw: Option<HnswMap<EmbeddingPoint, usize>>,
    dirty: bool,
}

impl State {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            id_to_index: HashMap::new(),
            hnsw: None,
            dirty: false,
        }
    }

    fn rebuild(&mut self) {
        if self.records.is_empty() {
            self.hnsw = None;
            self.dirty = false;
            return;
        }
        let points: Vec<EmbeddingPoint> = self
            .records
            .iter()
            .map(|r| EmbeddingPoint {
                vector: r.vector.clone(),
            })
            .collect();
        let indices: Vec<usize> = (0..self.records.len()).collect();
        self.hnsw = Some(Builder::default().build(points, indices));
        self.dirty = false;
    }
}

/// A single ranked match from [`HnswIndex::search`].
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The matched record.
    pub record: VectorRecord,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// HNSW-backed approximate nearest-neighbour index (spec §4.2 C2).
pub struct HnswIndex {
    dimension: usize,
    state: RwLock<State>,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("len", &state.records.len())
            .finish()
    }
}

impl HnswIndex {
    /// Creates an empty index for `dimension`-dimensional vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(State::new()),
        }
    }

    /// Upserts a record by id.
    pub fn upsert(&self, record: VectorRecord) {
        let mut state = self.state.write();
        if let Some(&idx) = state.id_to_index.get(&record.id) {
            state.records[idx] = record;
        } else {
            let idx = state.records.len();
            state.id_to_index.insert(record.id.clone(), idx);
            state.records.push(record);
        }
        state.dirty = true;
    }

    /// Removes a record by id, returning whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.state.write();
        let Some(&idx) = state.id_to_index.get(id) else {
            return false;
        };
        let removed = state.records.swap_remove(idx);
        state.id_to_index.remove(&removed.id);
        if idx < state.records.len() {
            let swapped_id = state.records[idx].id.clone();
            state.id_to_index.insert(swapped_id, idx);
        }
        state.dirty = true;
        true
    }

    /// Returns the record stored under `id`, if any.
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        let state = self.state.read();
        state.id_to_index.get(id).map(|&idx| state.records[idx].clone())
    }

    /// Approximate nearest-neighbour search, returning matches at or above
    /// `min_score`, sorted by descending cosine similarity.
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> Vec<ScoredRecord> {
        if k == 0 {
            return Vec::new();
        }
        let mut state = self.state.write();
        if state.records.is_empty() {
            return Vec::new();
        }
        if state.dirty || state.hnsw.is_none() {
            state.rebuild();
        }
        let Some(ref hnsw) = state.hnsw else {
            return Vec::new();
        };

        let query_point = EmbeddingPoint { vector: query.to_vec() };
        let mut search = Search::default();
        let mut results: Vec<ScoredRecord> = hnsw
            .search(&query_point, &mut search)
            .take(k)
            .filter_map(|candidate| {
                let idx = *candidate.value;
                let score = 1.0 - candidate.distance;
                if score >= min_score {
                    Some(ScoredRecord {
                        record: state.records[idx].clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by_key(|r| std::cmp::Reverse(OrderedFloat(r.score)));
        results
    }

    /// Cosine-threshold duplicate check (spec §4.2 `hasDuplicate`, default
    /// threshold `0.85`).
    pub fn has_duplicate(&self, query: &[f32], threshold: f32) -> bool {
        !self.search(query, 1, threshold).is_empty()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all records, for persistence.
    pub fn snapshot(&self) -> Vec<VectorRecord> {
        self.state.read().records.clone()
    }

    /// Replaces the index contents wholesale, used when rehydrating from disk.
    pub fn load(&self, records: Vec<VectorRecord>) {
        let mut state = self.state.write();
        state.records.clear();
        state.id_to_index.clear();
        for (idx, record) in records.into_iter().enumerate() {
            state.id_to_index.insert(record.id.clone(), idx);
            state.records.push(record);
        }
        state.dirty = true;
    }

    /// The configured embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Records carrying `category`, used by maintenance consolidation passes
    /// that only compare within a category.
    pub fn ids_with_category(&self, category: Category) -> Vec<String> {
        self.state
            .read()
            .records
            .iter()
            .filter(|r| r.category == category)
            .map(|r| r.id.clone())
            .collect()
    }
}
