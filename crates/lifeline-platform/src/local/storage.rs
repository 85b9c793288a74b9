use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{PlatformError, PlatformResult};

/// 10 MB per object
pub const MAX_OBJECT_SIZE: usize = 10 * 1024 * 1024;

/// On-disk object storage, one directory per bucket.
///
/// Objects live at `{dir}/{bucket}/{path}`. Uploads never overwrite: the
/// per-user, per-timestamp paths the front-end picks keep writers apart.
pub struct ObjectStore {
    dir: PathBuf,
}

impl ObjectStore {
    pub async fn new(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Resolve an object path, refusing anything that could escape the bucket.
    fn object_path(&self, bucket: &str, path: &str) -> PlatformResult<PathBuf> {
        let valid_segment = |s: &str| {
            !s.is_empty() && s != "." && s != ".." && !s.contains('\\') && !s.contains('\0')
        };
        if !valid_segment(bucket) || bucket.contains('/') || !path.split('/').all(valid_segment) {
            return Err(PlatformError::Rejected(format!("Invalid object path: {}/{}", bucket, path)));
        }
        Ok(self.dir.join(bucket).join(path))
    }

    pub async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> PlatformResult<()> {
        if bytes.is_empty() {
            return Err(PlatformError::Rejected("Upload is empty".into()));
        }
        if bytes.len() > MAX_OBJECT_SIZE {
            return Err(PlatformError::Rejected("Payload too large".into()));
        }

        let file_path = self.object_path(bucket, path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(storage_error)?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    PlatformError::Rejected("The resource already exists".into())
                }
                _ => storage_error(e),
            })?;
        file.write_all(bytes).await.map_err(storage_error)?;
        file.flush().await.map_err(storage_error)?;

        info!("Stored object {}/{} ({} bytes)", bucket, path, bytes.len());
        Ok(())
    }

    pub async fn get(&self, bucket: &str, path: &str) -> PlatformResult<Option<Vec<u8>>> {
        let file_path = self.object_path(bucket, path)?;
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    pub async fn delete(&self, bucket: &str, path: &str) -> PlatformResult<()> {
        let file_path = self.object_path(bucket, path)?;
        match fs::remove_file(&file_path).await {
            Ok(()) => {
                info!("Deleted object {}/{}", bucket, path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {}/{} already gone", bucket, path);
                Ok(())
            }
            Err(e) => Err(storage_error(e)),
        }
    }
}

fn storage_error(e: std::io::Error) -> PlatformError {
    PlatformError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn store() -> ObjectStore {
        let dir = std::env::temp_dir().join(format!("lifeline_store_test_{}", Uuid::new_v4()));
        ObjectStore::new(dir).await.unwrap()
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = store().await;
        store.put("rescue-photos", "user/1.jpg", b"jpeg").await.unwrap();
        assert_eq!(store.get("rescue-photos", "user/1.jpg").await.unwrap().unwrap(), b"jpeg");

        store.delete("rescue-photos", "user/1.jpg").await.unwrap();
        assert!(store.get("rescue-photos", "user/1.jpg").await.unwrap().is_none());
        // second delete is a no-op
        store.delete("rescue-photos", "user/1.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn refuses_overwrite_empty_and_traversal() {
        let store = store().await;
        store.put("b", "u/1.png", b"a").await.unwrap();
        assert!(matches!(store.put("b", "u/1.png", b"b").await, Err(PlatformError::Rejected(_))));
        assert!(matches!(store.put("b", "u/2.png", b"").await, Err(PlatformError::Rejected(_))));
        assert!(matches!(store.put("b", "../escape.png", b"x").await, Err(PlatformError::Rejected(_))));
        assert!(matches!(store.put("b", "u//x.png", b"x").await, Err(PlatformError::Rejected(_))));
    }
}
