//! Embedding client wrapper (spec §4.4 C4): guarantees unit-norm output
//! regardless of what the underlying provider returns.

use std::sync::Arc;

use memnexus_core::{embedding::normalize, EmbeddingModel, Error, Result};

/// Wraps a provider [`EmbeddingModel`], normalizing every output vector so
/// downstream cosine-similarity code can assume unit norm unconditionally.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingModel>,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient").field("dim", &self.provider.dim()).finish()
    }
}

impl EmbeddingClient {
    /// Wraps `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingModel>) -> Self {
        Self { provider }
    }

    /// The fixed embedding dimension `d`.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.provider.dim()
    }

    /// Embeds `text`, normalizing the result. Failures surface as
    /// [`Error::Embedding`] (spec §4.4: "Failures surface as
    /// `EmbeddingUnavailable`").
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = self.provider.embed(text).await.map_err(|e| match e {
            Error::Embedding(_) => e,
            other => Error::Embedding(other.to_string()),
        })?;
        normalize(&mut vector);
        Ok(vector)
    }

    /// Embeds every string in `texts`, normalizing each result.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = self.provider.embed_batch(texts).await.map_err(|e| match e {
            Error::Embedding(_) => e,
            other => Error::Embedding(other.to_string()),
        })?;
        for vector in &mut vectors {
            normalize(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FakeProvider;

    #[async_trait]
    impl EmbeddingModel for FakeProvider {
        fn dim(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0, 1.0])
        }
    }

    #[tokio::test]
    async fn embed_returns_unit_norm_vector() {
        let client = EmbeddingClient::new(Arc::new(FakeProvider));
        let vector = client.embed("hello").await.unwrap();
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
