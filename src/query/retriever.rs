//! Query-side retrieval: embed the question, rank stored chunks.

use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::index::{RetrievedChunk, VectorIndex};
use crate::llm::embedding::{Embedding, EmbeddingClient};

/// Retrieval result with an explicit degradation marker. A degraded query
/// embedding still searches (preserving drop-in behavior), but callers can
/// tell the ranking is meaningless.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub chunks: Vec<RetrievedChunk>,
    pub degraded: Option<String>,
}

#[derive(Clone)]
pub struct Retriever {
    embedder: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: EmbeddingClient, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-`limit` chunks for the tenant. An empty result is valid — the
    /// tenant may simply have no matching data.
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Retrieval, ApiError> {
        let embedding = self.embedder.embed(query).await;
        let degraded = match &embedding {
            Embedding::Degraded { reason, .. } => {
                tracing::warn!(user_id, "query embedding degraded: {reason}");
                Some(reason.clone())
            }
            Embedding::Computed(_) => None,
        };

        let chunks = self.index.nearest(embedding.vector(), user_id, limit).await?;
        Ok(Retrieval { chunks, degraded })
    }
}
