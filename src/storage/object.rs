//! ObjectStore trait — narrow interface over the document blob store.
//!
//! The deployment implementation is filesystem-rooted (a bucket is a
//! directory under the data root); tests use an in-memory fake.

use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::core::errors::ApiError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ApiError>;

    /// Check whether an object exists under exactly this key.
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, ApiError>;

    /// List keys under a prefix.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ApiError>;

    /// Write an object, creating parent prefixes as needed.
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ApiError>;
}

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ApiError> {
        let relative = Path::new(bucket).join(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(ApiError::Validation(format!(
                        "invalid object key: {key}"
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ApiError::NotFound(format!("object not found: {bucket}/{key}"))
            } else {
                ApiError::storage(err)
            }
        })
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<bool, ApiError> {
        let path = self.object_path(bucket, key)?;
        Ok(path.is_file())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ApiError> {
        let bucket_root = self.root.join(bucket);
        if !bucket_root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![bucket_root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(ApiError::storage)?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&bucket_root) {
                    let key = relative.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ApiError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ApiError::storage)?;
        }
        fs::write(&path, bytes).map_err(ApiError::storage)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trip_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path().to_path_buf());

        store
            .put("docs", "uploads/u1/d1/report.txt", b"hello")
            .await
            .unwrap();

        assert!(store.head("docs", "uploads/u1/d1/report.txt").await.unwrap());
        assert!(!store.head("docs", "uploads/u1/d1/other.txt").await.unwrap());

        let bytes = store.get("docs", "uploads/u1/d1/report.txt").await.unwrap();
        assert_eq!(bytes, b"hello");

        let keys = store.list("docs", "uploads/u1/").await.unwrap();
        assert_eq!(keys, vec!["uploads/u1/d1/report.txt".to_string()]);
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(tmp.path().to_path_buf());

        let err = store.get("docs", "../escape.txt").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
