//! Ingestion orchestrator.
//!
//! Drives one uploaded document through key resolution, loading, chunking,
//! embedding, and indexing. The document becomes visible to queries only
//! when every chunk has been embedded and persisted; any failure marks the
//! metadata row `failed` and leaves the index untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::chunker::Chunker;
use super::loader::{load_document, mime_type_from_extension};
use crate::core::errors::ApiError;
use crate::index::{ChunkRecord, IndexedDocument, VectorIndex};
use crate::llm::embedding::{Embedding, EmbeddingClient};
use crate::storage::metadata::{DocumentRecord, DocumentStatus, MetadataStore};
use crate::storage::object::ObjectStore;
use crate::storage::resolver::{resolve_key, unquote_plus};

/// Storage-creation event that triggers ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub num_chunks: usize,
    pub chunk_ids: Vec<String>,
}

/// Split a storage key following the `uploads/{user_id}/{document_id}/{file_name}`
/// convention. Unparseable keys fall back to the system tenant with the
/// filename stem as document id.
pub fn parse_object_key(key: &str) -> (String, String, String) {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() >= 4 {
        (
            parts[1].to_string(),
            parts[2].to_string(),
            parts[3].to_string(),
        )
    } else {
        let file_name = parts.last().copied().unwrap_or_default().to_string();
        let stem = file_name
            .split_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| file_name.clone());
        ("system".to_string(), stem, file_name)
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    objects: Arc<dyn ObjectStore>,
    index: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
    embedder: EmbeddingClient,
    chunker: Chunker,
}

impl IngestionPipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        index: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
        embedder: EmbeddingClient,
        chunker: Chunker,
    ) -> Self {
        Self {
            objects,
            index,
            metadata,
            embedder,
            chunker,
        }
    }

    pub async fn ingest(&self, event: &ObjectCreatedEvent) -> Result<IngestReport, ApiError> {
        // The event source encodes keys inconsistently; start from the
        // plus-decoded form and let resolution try the other variants.
        let key = unquote_plus(&event.key);
        let (user_id, document_id, file_name) = parse_object_key(&key);
        let mime_type = mime_type_from_extension(&file_name);

        tracing::info!(
            bucket = event.bucket.as_str(),
            key = key.as_str(),
            document_id = document_id.as_str(),
            "processing document"
        );

        match self
            .run(&event.bucket, &key, &document_id, &user_id, mime_type)
            .await
        {
            Ok(report) => {
                let mut record = DocumentRecord::uploaded(
                    document_id.clone(),
                    user_id,
                    file_name,
                    mime_type.to_string(),
                    event.bucket.clone(),
                    key,
                );
                record.status = DocumentStatus::Processed;
                record.num_chunks = Some(report.num_chunks as i64);
                record.chunk_ids = report.chunk_ids.clone();
                self.metadata.put(&record).await?;

                tracing::info!(
                    document_id = document_id.as_str(),
                    num_chunks = report.num_chunks,
                    "document processed"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!(
                    document_id = document_id.as_str(),
                    "ingestion failed: {err}"
                );
                let mut record = DocumentRecord::uploaded(
                    document_id,
                    user_id,
                    file_name,
                    mime_type.to_string(),
                    event.bucket.clone(),
                    key,
                );
                record.status = DocumentStatus::Failed;
                record.error = Some(err.to_string());
                if let Err(meta_err) = self.metadata.put(&record).await {
                    tracing::error!("failed to record ingestion failure: {meta_err}");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        bucket: &str,
        key: &str,
        document_id: &str,
        user_id: &str,
        mime_type: &str,
    ) -> Result<IngestReport, ApiError> {
        let resolved_key = resolve_key(self.objects.as_ref(), bucket, key).await?;
        if resolved_key != key {
            tracing::info!(
                original = key,
                resolved = resolved_key.as_str(),
                "storage key corrected"
            );
        }

        let bytes = self.objects.get(bucket, &resolved_key).await?;
        let pages = load_document(&bytes, mime_type)?;

        let file_name = resolved_key
            .rsplit('/')
            .next()
            .unwrap_or(&resolved_key)
            .to_string();

        let mut chunks = Vec::new();
        let mut chunk_ids = Vec::new();
        for page in &pages {
            for content in self.chunker.split(&page.text) {
                // Embeddings are computed one chunk at a time, in order. A
                // degraded embedding aborts the whole document: a zero
                // vector must never reach the index.
                let vector = match self.embedder.embed(&content).await {
                    Embedding::Computed(vector) => vector,
                    Embedding::Degraded { reason, .. } => {
                        return Err(ApiError::ExternalService(format!(
                            "embedding failed during ingestion: {reason}"
                        )));
                    }
                };

                let chunk_id = Uuid::new_v4().to_string();
                chunk_ids.push(chunk_id.clone());
                chunks.push((
                    ChunkRecord {
                        chunk_id,
                        document_id: document_id.to_string(),
                        user_id: user_id.to_string(),
                        content,
                        metadata: json!({ "source": resolved_key, "page": page.page }),
                    },
                    vector,
                ));
            }
        }

        let num_chunks = chunks.len();
        let document = IndexedDocument {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            file_name,
            mime_type: mime_type.to_string(),
            bucket: bucket.to_string(),
            key: resolved_key,
        };
        self.index.insert_document(&document, chunks).await?;

        Ok(IngestReport {
            document_id: document_id.to_string(),
            num_chunks,
            chunk_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sqlite::{test_pool, SqliteVectorIndex};
    use crate::llm::testing::StubProvider;
    use crate::storage::metadata::SqliteMetadataStore;
    use crate::storage::object::testing::MemoryObjectStore;

    const BUCKET: &str = "documents";

    struct Fixture {
        pipeline: IngestionPipeline,
        index: Arc<SqliteVectorIndex>,
        metadata: Arc<SqliteMetadataStore>,
        provider: Arc<StubProvider>,
        _tmp: tempfile::TempDir,
    }

    async fn fixture(objects: MemoryObjectStore, embed_fails: bool) -> Fixture {
        let (pool, _tmp) = test_pool().await;
        let index = Arc::new(SqliteVectorIndex::new(pool.clone()).await.unwrap());
        let metadata = Arc::new(SqliteMetadataStore::new(pool).await.unwrap());
        let provider = if embed_fails {
            Arc::new(StubProvider::new(8).with_embed_failure())
        } else {
            Arc::new(StubProvider::new(8))
        };
        let embedder = EmbeddingClient::new(provider.clone(), "embed-test".into(), 8);

        let pipeline = IngestionPipeline::new(
            Arc::new(objects),
            index.clone(),
            metadata.clone(),
            embedder,
            Chunker::default(),
        );

        Fixture {
            pipeline,
            index,
            metadata,
            provider,
            _tmp,
        }
    }

    fn event(key: &str) -> ObjectCreatedEvent {
        ObjectCreatedEvent {
            bucket: BUCKET.to_string(),
            key: key.to_string(),
        }
    }

    #[test]
    fn object_key_parsing() {
        assert_eq!(
            parse_object_key("uploads/user-1/doc-1/notes.txt"),
            (
                "user-1".to_string(),
                "doc-1".to_string(),
                "notes.txt".to_string()
            )
        );
        assert_eq!(
            parse_object_key("stray/file.txt"),
            (
                "system".to_string(),
                "file".to_string(),
                "file.txt".to_string()
            )
        );
    }

    #[tokio::test]
    async fn ingests_2500_char_document_into_three_chunks() {
        let text: String = (0..500).map(|i| format!("w{i:03} ")).collect();
        let key = "uploads/user-1/doc-1/notes.txt";
        let objects = MemoryObjectStore::with_object(BUCKET, key, text.as_bytes());
        let fx = fixture(objects, false).await;

        let report = fx.pipeline.ingest(&event(key)).await.unwrap();
        assert_eq!(report.num_chunks, 3);
        assert_eq!(report.chunk_ids.len(), 3);

        let mut unique = report.chunk_ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        let record = fx.metadata.get("doc-1").await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Processed);
        assert_eq!(record.num_chunks, Some(3));

        // All three chunks are retrievable for the owning tenant.
        let query = fx.provider.bag_of_words("w000 w001");
        let results = fx.index.nearest(&query, "user-1", 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|c| c.document_id == "doc-1"));
        assert!(results
            .iter()
            .all(|c| c.metadata.get("source").and_then(|v| v.as_str()) == Some(key)));
    }

    #[tokio::test]
    async fn percent_encoded_event_key_resolves_to_stored_object() {
        let stored = "uploads/user-1/doc-2/annual report.txt";
        let objects = MemoryObjectStore::with_object(BUCKET, stored, b"short document body");
        let fx = fixture(objects, false).await;

        let report = fx
            .pipeline
            .ingest(&event("uploads/user-1/doc-2/annual%20report.txt"))
            .await
            .unwrap();
        assert_eq!(report.num_chunks, 1);

        let results = fx
            .index
            .nearest(&fx.provider.bag_of_words("short document body"), "user-1", 5)
            .await
            .unwrap();
        assert_eq!(results[0].file_name, "annual report.txt");
    }

    #[tokio::test]
    async fn missing_object_aborts_with_not_found_and_marks_failed() {
        let fx = fixture(MemoryObjectStore::default(), false).await;

        let err = fx
            .pipeline
            .ingest(&event("uploads/user-1/doc-3/ghost.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let record = fx.metadata.get("doc-3").await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Failed);

        let results = fx.index.nearest(&[0.0; 8], "user-1", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_aborts_document_entirely() {
        let key = "uploads/user-1/doc-4/notes.txt";
        let objects = MemoryObjectStore::with_object(BUCKET, key, b"some document text");
        let fx = fixture(objects, true).await;

        let err = fx.pipeline.ingest(&event(key)).await.unwrap_err();
        assert!(matches!(err, ApiError::ExternalService(_)));

        let record = fx.metadata.get("doc-4").await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Failed);

        // Nothing was indexed: no zero vectors, no partial documents.
        let results = fx
            .index
            .nearest(&fx.provider.bag_of_words("some document text"), "user-1", 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
