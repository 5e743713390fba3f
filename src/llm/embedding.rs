//! Embedding client with an explicit degraded-result tag.
//!
//! A failed or malformed embedding call yields `Embedding::Degraded`
//! carrying the zero vector of the configured dimension, so callers decide
//! whether to proceed at reduced fidelity (query side) or abort (ingestion
//! must never index a zero vector).

use std::sync::Arc;

use super::provider::ModelProvider;

#[derive(Debug, Clone)]
pub enum Embedding {
    Computed(Vec<f32>),
    Degraded { vector: Vec<f32>, reason: String },
}

impl Embedding {
    pub fn vector(&self) -> &[f32] {
        match self {
            Embedding::Computed(vector) => vector,
            Embedding::Degraded { vector, .. } => vector,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Embedding::Degraded { .. })
    }
}

#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn ModelProvider>,
    model_id: String,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn ModelProvider>, model_id: String, dimension: usize) -> Self {
        Self {
            provider,
            model_id,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Embedding {
        match self.provider.embed_content(&self.model_id, text).await {
            Ok(vector) if vector.len() == self.dimension => Embedding::Computed(vector),
            Ok(vector) => {
                tracing::warn!(
                    expected = self.dimension,
                    actual = vector.len(),
                    "embedding dimension mismatch"
                );
                self.degraded(format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                ))
            }
            Err(err) => {
                tracing::error!("embedding call failed: {err}");
                self.degraded(err.to_string())
            }
        }
    }

    /// Per-item loop; semantically equivalent to calling `embed` once per
    /// text, not a server-side batch.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Embedding> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await);
        }
        embeddings
    }

    fn degraded(&self, reason: String) -> Embedding {
        Embedding::Degraded {
            vector: vec![0.0; self.dimension],
            reason,
        }
    }
}
