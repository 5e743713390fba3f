//! SQLite-backed vector index.
//!
//! Metadata lives in relational rows; embeddings are little-endian f32
//! BLOBs ranked by brute-force cosine similarity in process.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{ChunkRecord, IndexedDocument, RetrievedChunk, VectorIndex};
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct ConnectRetry {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Open the pool with a bounded retry loop. The sleep function is injected
/// so the policy is testable without real timers.
pub async fn connect_with_retry<S, F>(
    db_path: &Path,
    retry: ConnectRetry,
    sleep: S,
) -> Result<SqlitePool, ApiError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let attempts = retry.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(err) => {
                tracing::warn!(
                    "database connect attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    err
                );
                last_err = Some(err);
                if attempt < attempts {
                    sleep(retry.delay).await;
                }
            }
        }
    }

    Err(ApiError::Storage(format!(
        "could not open database after {} attempts: {}",
        attempts,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'processed',
                bucket TEXT NOT NULL DEFAULT '',
                key TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_user ON chunks(user_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::storage)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn insert_document(
        &self,
        document: &IndexedDocument,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::storage)?;

        sqlx::query(
            "INSERT INTO documents (document_id, user_id, file_name, mime_type, status, bucket, key)
             VALUES (?1, ?2, ?3, ?4, 'processed', ?5, ?6)",
        )
        .bind(&document.document_id)
        .bind(&document.user_id)
        .bind(&document.file_name)
        .bind(&document.mime_type)
        .bind(&document.bucket)
        .bind(&document.key)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::storage)?;

        for (chunk, embedding) in &chunks {
            let blob = Self::serialize_embedding(embedding);
            let metadata =
                serde_json::to_string(&chunk.metadata).unwrap_or_else(|_| "{}".to_string());

            sqlx::query(
                "INSERT INTO chunks (chunk_id, document_id, user_id, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_id)
            .bind(&chunk.user_id)
            .bind(&chunk.content)
            .bind(&metadata)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::storage)?;
        }

        tx.commit().await.map_err(ApiError::storage)?;
        Ok(())
    }

    async fn nearest(
        &self,
        query_embedding: &[f32],
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        let rows = sqlx::query(
            "SELECT c.chunk_id, c.document_id, c.user_id, c.content, c.metadata,
                    c.embedding, d.file_name
             FROM chunks c
             JOIN documents d ON c.document_id = d.document_id
             WHERE c.user_id = ?1
             ORDER BY c.rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let metadata_raw: String = row.get("metadata");
                let metadata = serde_json::from_str(&metadata_raw)
                    .unwrap_or(serde_json::Value::Object(Default::default()));

                RetrievedChunk {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    user_id: row.get("user_id"),
                    content: row.get("content"),
                    metadata,
                    file_name: row.get("file_name"),
                    similarity_score: Self::cosine_similarity(query_embedding, &stored),
                }
            })
            .collect();

        // Stable sort: equal scores keep rowid (insertion) order.
        scored.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let pool = connect_with_retry(
        &tmp.path().join("test.db"),
        ConnectRetry {
            max_attempts: 1,
            delay: Duration::ZERO,
        },
        |_| async {},
    )
    .await
    .unwrap();
    (pool, tmp)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn doc(document_id: &str, user_id: &str, file_name: &str) -> IndexedDocument {
        IndexedDocument {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            mime_type: "text/plain".to_string(),
            bucket: "documents".to_string(),
            key: format!("uploads/{user_id}/{document_id}/{file_name}"),
        }
    }

    fn chunk(chunk_id: &str, document_id: &str, user_id: &str, content: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            metadata: serde_json::json!({ "source": "test", "page": 0 }),
        }
    }

    async fn test_index() -> (SqliteVectorIndex, tempfile::TempDir) {
        let (pool, tmp) = test_pool().await;
        (SqliteVectorIndex::new(pool).await.unwrap(), tmp)
    }

    #[tokio::test]
    async fn nearest_ranks_by_similarity_and_joins_file_name() {
        let (index, _tmp) = test_index().await;

        index
            .insert_document(
                &doc("d1", "u1", "notes.txt"),
                vec![
                    (chunk("c1", "d1", "u1", "far"), vec![0.0, 1.0, 0.0]),
                    (chunk("c2", "d1", "u1", "near"), vec![1.0, 0.1, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.nearest(&[1.0, 0.0, 0.0], "u1", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "c2");
        assert_eq!(results[0].file_name, "notes.txt");
        assert!(results[0].similarity_score > results[1].similarity_score);
    }

    #[tokio::test]
    async fn nearest_is_tenant_scoped() {
        let (index, _tmp) = test_index().await;

        index
            .insert_document(
                &doc("d1", "alice", "a.txt"),
                vec![(chunk("c1", "d1", "alice", "alpha"), vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        index
            .insert_document(
                &doc("d2", "bob", "b.txt"),
                vec![(chunk("c2", "d2", "bob", "beta"), vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        let results = index.nearest(&[1.0, 0.0], "alice", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "alice");
    }

    #[tokio::test]
    async fn nearest_scores_are_non_increasing_and_ties_keep_insertion_order() {
        let (index, _tmp) = test_index().await;

        index
            .insert_document(
                &doc("d1", "u1", "a.txt"),
                vec![
                    (chunk("c1", "d1", "u1", "first"), vec![0.0, 1.0]),
                    (chunk("c2", "d1", "u1", "second"), vec![0.0, 1.0]),
                    (chunk("c3", "d1", "u1", "third"), vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.nearest(&[1.0, 0.0], "u1", 5).await.unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
        // c1 and c2 tie at score 0; insertion order breaks the tie.
        assert_eq!(results[1].chunk_id, "c1");
        assert_eq!(results[2].chunk_id, "c2");
    }

    #[tokio::test]
    async fn nearest_respects_limit() {
        let (index, _tmp) = test_index().await;

        let chunks: Vec<_> = (0..8)
            .map(|i| {
                (
                    chunk(&format!("c{i}"), "d1", "u1", "text"),
                    vec![1.0, i as f32 / 10.0],
                )
            })
            .collect();
        index
            .insert_document(&doc("d1", "u1", "a.txt"), chunks)
            .await
            .unwrap();

        let results = index.nearest(&[1.0, 0.0], "u1", 5).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn zero_query_vector_scores_zero() {
        let (index, _tmp) = test_index().await;

        index
            .insert_document(
                &doc("d1", "u1", "a.txt"),
                vec![(chunk("c1", "d1", "u1", "text"), vec![1.0, 1.0])],
            )
            .await
            .unwrap();

        let results = index.nearest(&[0.0, 0.0], "u1", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity_score, 0.0);
    }

    #[tokio::test]
    async fn duplicate_document_id_is_rejected_not_overwritten() {
        let (index, _tmp) = test_index().await;

        index
            .insert_document(&doc("d1", "u1", "a.txt"), vec![])
            .await
            .unwrap();
        let err = index
            .insert_document(&doc("d1", "u1", "a.txt"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
    }

    #[tokio::test]
    async fn connect_retry_exhausts_attempts() {
        // Parent directory does not exist, so every attempt fails.
        let attempts = AtomicU32::new(0);
        let result = connect_with_retry(
            Path::new("/nonexistent-root/corpora/test.db"),
            ConnectRetry {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            },
            |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {}
            },
        )
        .await;

        assert!(matches!(result, Err(ApiError::Storage(_))));
        // Sleeps happen between attempts only.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
