//! Vector index gateway — persisted documents/chunks and nearest-neighbor
//! ranking over their embeddings.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Document row as persisted by a successful ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document_id: String,
    pub user_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub bucket: String,
    pub key: String,
}

/// Immutable chunk row. `metadata` carries `{source, page}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub user_id: String,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Chunk view returned by a similarity search, joined with the owning
/// document's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub user_id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub file_name: String,
    pub similarity_score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Persist the document row and all of its chunk rows in a single
    /// transaction. Rows are append-only; the document becomes visible to
    /// queries only once every chunk is written.
    async fn insert_document(
        &self,
        document: &IndexedDocument,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Top-`limit` chunks for one tenant, ordered by descending cosine
    /// similarity. Ties keep insertion order.
    async fn nearest(
        &self,
        query_embedding: &[f32],
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError>;
}
