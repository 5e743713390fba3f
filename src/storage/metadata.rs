//! Document metadata store — lifecycle status tracking by document id.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "processed" => DocumentStatus::Processed,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Uploaded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub user_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_chunks: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub chunk_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DocumentRecord {
    pub fn uploaded(
        document_id: String,
        user_id: String,
        file_name: String,
        mime_type: String,
        bucket: String,
        key: String,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            document_id,
            user_id,
            file_name,
            mime_type,
            status: DocumentStatus::Uploaded,
            bucket,
            key,
            num_chunks: None,
            chunk_ids: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or refresh the record for a document. `created_at` of an
    /// existing row is preserved.
    async fn put(&self, record: &DocumentRecord) -> Result<(), ApiError>;

    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>, ApiError>;
}

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS document_meta (
                document_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                bucket TEXT NOT NULL DEFAULT '',
                key TEXT NOT NULL DEFAULT '',
                num_chunks INTEGER,
                chunk_ids TEXT NOT NULL DEFAULT '[]',
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::storage)?;

        Ok(Self { pool })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
        let status: String = row.get("status");
        let chunk_ids_raw: String = row.get("chunk_ids");
        let chunk_ids = serde_json::from_str(&chunk_ids_raw).unwrap_or_default();

        DocumentRecord {
            document_id: row.get("document_id"),
            user_id: row.get("user_id"),
            file_name: row.get("file_name"),
            mime_type: row.get("mime_type"),
            status: DocumentStatus::parse(&status),
            bucket: row.get("bucket"),
            key: row.get("key"),
            num_chunks: row.get("num_chunks"),
            chunk_ids,
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn put(&self, record: &DocumentRecord) -> Result<(), ApiError> {
        let chunk_ids =
            serde_json::to_string(&record.chunk_ids).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            "INSERT INTO document_meta (document_id, user_id, file_name, mime_type, status,
                                        bucket, key, num_chunks, chunk_ids, error,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(document_id) DO UPDATE SET
                user_id = excluded.user_id,
                file_name = excluded.file_name,
                mime_type = excluded.mime_type,
                status = excluded.status,
                bucket = excluded.bucket,
                key = excluded.key,
                num_chunks = excluded.num_chunks,
                chunk_ids = excluded.chunk_ids,
                error = excluded.error,
                updated_at = excluded.updated_at",
        )
        .bind(&record.document_id)
        .bind(&record.user_id)
        .bind(&record.file_name)
        .bind(&record.mime_type)
        .bind(record.status.as_str())
        .bind(&record.bucket)
        .bind(&record.key)
        .bind(record.num_chunks)
        .bind(&chunk_ids)
        .bind(record.error.as_deref())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>, ApiError> {
        let row = sqlx::query(
            "SELECT document_id, user_id, file_name, mime_type, status, bucket, key,
                    num_chunks, chunk_ids, error, created_at, updated_at
             FROM document_meta
             WHERE document_id = ?1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::storage)?;

        Ok(row.as_ref().map(Self::row_to_record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::sqlite::test_pool;

    #[tokio::test]
    async fn put_then_update_preserves_created_at() {
        let (pool, _tmp) = test_pool().await;
        let store = SqliteMetadataStore::new(pool).await.unwrap();

        let mut record = DocumentRecord::uploaded(
            "doc-1".into(),
            "user-1".into(),
            "report.txt".into(),
            "text/plain".into(),
            "documents".into(),
            "uploads/user-1/doc-1/report.txt".into(),
        );
        store.put(&record).await.unwrap();

        let created = store.get("doc-1").await.unwrap().unwrap().created_at;

        record.status = DocumentStatus::Processed;
        record.num_chunks = Some(3);
        record.chunk_ids = vec!["c1".into(), "c2".into(), "c3".into()];
        record.updated_at += 1;
        store.put(&record).await.unwrap();

        let fetched = store.get("doc-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Processed);
        assert_eq!(fetched.num_chunks, Some(3));
        assert_eq!(fetched.chunk_ids.len(), 3);
        assert_eq!(fetched.created_at, created);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let (pool, _tmp) = test_pool().await;
        let store = SqliteMetadataStore::new(pool).await.unwrap();
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
