//! Find-duplicates and union-find clustering (spec §4.7): "over a sample of
//! up to `limit` active facts, compute pairwise cosine ≥ threshold; return
//! pairs" plus "cluster by threshold via union-find over candidate pairs".

use memnexus_core::Fact;
use memnexus_vector::VectorStore;

/// A candidate duplicate pair, cosine similarity at or above the configured threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePair {
    /// Lexicographically smaller id.
    pub a: String,
    /// Lexicographically larger id.
    pub b: String,
    /// Cosine similarity between the pair's stored vectors.
    pub score: f32,
}

fn is_structured(fact: &Fact) -> bool {
    fact.entity.is_some() && fact.key.is_some() && fact.value.is_some()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scans `sample` (already capped to the configured limit by the caller) for
/// pairwise cosine similarity at or above `threshold`, using each fact's
/// already-stored vector. Facts with a structured `(entity, key, value)`
/// identifier are skipped unless `include_structured` is set, and facts with
/// no stored vector are silently skipped (a missing vector is a cache-consistency
/// gap, not a find-duplicates failure).
#[must_use]
pub fn find_duplicate_pairs(
    sample: &[Fact],
    vectors: &VectorStore,
    threshold: f32,
    include_structured: bool,
) -> Vec<DuplicatePair> {
    let candidates: Vec<(&Fact, Vec<f32>)> = sample
        .iter()
        .filter(|f| include_structured || !is_structured(f))
        .filter_map(|f| vectors.get(&f.id).map(|record| (f, record.vector)))
        .collect();

    let mut pairs = Vec::new();
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let (fact_a, vec_a) = &candidates[i];
            let (fact_b, vec_b) = &candidates[j];
            let score = cosine(vec_a, vec_b);
            if score >= threshold {
                let (a, b) = if fact_a.id < fact_b.id {
                    (fact_a.id.clone(), fact_b.id.clone())
                } else {
                    (fact_b.id.clone(), fact_a.id.clone())
                };
                pairs.push(DuplicatePair { a, b, score });
            }
        }
    }
    pairs
}

/// Union-find over a set of ids, used to cluster candidate pairs transitively
/// (spec §4.7 consolidate: "cluster by threshold via union-find over candidate pairs").
#[derive(Debug, Default)]
struct UnionFind {
    parent: std::collections::HashMap<String, String>,
}

impl UnionFind {
    fn find(&mut self, id: &str) -> String {
        if self.parent.get(id).is_none_or(|p| p == id) {
            self.parent.insert(id.to_string(), id.to_string());
            return id.to_string();
        }
        let parent = self.parent[id].clone();
        let root = self.find(&parent);
        self.parent.insert(id.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_a, root_b);
        }
    }
}

/// Clusters `pairs` transitively via union-find; returns groups of two or
/// more ids (singletons carry nothing to consolidate and are dropped).
#[must_use]
pub fn cluster_pairs(pairs: &[DuplicatePair]) -> Vec<Vec<String>> {
    let mut uf = UnionFind::default();
    for pair in pairs {
        uf.union(&pair.a, &pair.b);
    }

    let mut groups: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    let mut seen = std::collections::HashSet::new();
    for pair in pairs {
        for id in [&pair.a, &pair.b] {
            if seen.insert(id.clone()) {
                let root = uf.find(id);
                groups.entry(root).or_default().push(id.clone());
            }
        }
    }

    let mut clusters: Vec<Vec<String>> = groups.into_values().filter(|g| g.len() >= 2).collect();
    for cluster in &mut clusters {
        cluster.sort();
    }
    clusters.sort();
    clusters
}
