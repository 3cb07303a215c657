//! Text embedding trait (C4), generalized from `aither_core::EmbeddingModel`.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Converts text to unit-normalized dense vectors.
///
/// Implementations must return vectors of length [`EmbeddingModel::dim`]. Batching
/// is optional; the default [`EmbeddingModel::embed_batch`] simply loops over
/// [`EmbeddingModel::embed`], matching spec §4.4's "batching is optional" clause.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Fixed output vector dimension `d`.
    fn dim(&self) -> usize;

    /// Embeds a single string. Failures surface as [`Error::Embedding`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds many strings. The default implementation is sequential; providers
    /// with a native batch endpoint should override this for throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Normalizes a vector to unit L2 length in place. A no-op on an all-zero vector.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector {
            *value /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors assumed unit-normalized
/// (so this reduces to the dot product per spec §3.3).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Validates that an error from an embedding provider should be reported as
/// [`Error::Embedding`] (spec §4.4: "Failures surface as `EmbeddingUnavailable`").
#[must_use]
pub fn unavailable(msg: impl std::fmt::Display) -> Error {
    Error::Embedding(msg.to_string())
}
