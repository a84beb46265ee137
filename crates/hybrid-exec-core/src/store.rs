//! Artifact transfer between the host and object storage.
//!
//! Bytes are staged through scratch files because the storage backend moves
//! files, not buffers. Scratch files are removed once the transfer finishes,
//! whatever the outcome.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{ExecutorError, ExecutorResult};
use crate::service::ObjectStore;

/// Bucket-scoped view of an [`ObjectStore`].
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn ObjectStore>,
    bucket: String,
    scratch_dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store writing scratch files under `scratch_dir`.
    pub fn new(backend: Arc<dyn ObjectStore>, bucket: impl Into<String>, scratch_dir: impl AsRef<Path>) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    /// Target bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload `bytes` to `key`.
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, len = bytes.len()))]
    pub async fn upload(&self, bytes: Vec<u8>, key: &str) -> ExecutorResult<()> {
        let scratch_dir = self.scratch_dir.clone();
        // The handle deletes the file on drop, after the upload returns.
        let staged = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            std::fs::create_dir_all(&scratch_dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&scratch_dir)?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file)
        })
        .await??;

        self.backend
            .upload_file(staged.path(), &self.bucket, key)
            .await
            .map_err(ExecutorError::ArtifactTransfer)?;
        debug!("uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    /// Download `key` to `local_path` and return its contents. The local copy
    /// is removed afterwards.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn download(&self, key: &str, local_path: &Path) -> ExecutorResult<Vec<u8>> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let transfer = self
            .backend
            .download_file(&self.bucket, key, local_path)
            .await
            .map_err(ExecutorError::ArtifactTransfer);
        let contents = match transfer {
            Ok(()) => tokio::fs::read(local_path).await.map_err(ExecutorError::from),
            Err(e) => Err(e),
        };

        if tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            tokio::fs::remove_file(local_path).await?;
        }
        contents
    }

    /// Delete `key`.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn delete(&self, key: &str) -> ExecutorResult<()> {
        self.backend
            .delete_object(&self.bucket, key)
            .await
            .map_err(ExecutorError::ArtifactTransfer)
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("bucket", &self.bucket)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ServiceError, ServiceResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> ServiceResult<()> {
            if self.fail {
                return Err(ServiceError::new("s3", "Access Denied").with_code("AccessDenied"));
            }
            let bytes = std::fs::read(path).map_err(|e| ServiceError::new("s3", e.to_string()))?;
            self.objects
                .lock()
                .unwrap()
                .insert(format!("{bucket}/{key}"), bytes);
            Ok(())
        }

        async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> ServiceResult<()> {
            let objects = self.objects.lock().unwrap();
            let bytes = objects
                .get(&format!("{bucket}/{key}"))
                .ok_or_else(|| ServiceError::new("s3", "Not Found").with_code("NoSuchKey"))?;
            std::fs::write(path, bytes).map_err(|e| ServiceError::new("s3", e.to_string()))
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> ServiceResult<()> {
            self.objects
                .lock()
                .unwrap()
                .remove(&format!("{bucket}/{key}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_upload_download_delete() {
        let scratch = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryStore::default());
        let store = ArtifactStore::new(backend.clone(), "bucket", scratch.path());

        store.upload(b"payload".to_vec(), "inputs/a.json").await.unwrap();
        assert!(backend.objects.lock().unwrap().contains_key("bucket/inputs/a.json"));

        let local = scratch.path().join("results/d/a.json");
        let bytes = store.download("inputs/a.json", &local).await.unwrap();
        assert_eq!(bytes, b"payload");
        assert!(!local.exists());

        store.delete("inputs/a.json").await.unwrap();
        assert!(backend.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_leaves_no_scratch_files() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Arc::new(MemoryStore::default()), "b", scratch.path());
        store.upload(vec![1, 2, 3], "k").await.unwrap();
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_preserves_provider_error() {
        let scratch = tempfile::tempdir().unwrap();
        let backend = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let store = ArtifactStore::new(backend, "b", scratch.path());
        let err = store.upload(vec![0], "k").await.unwrap_err();
        assert_eq!(
            err.service_error().and_then(|e| e.code.as_deref()),
            Some("AccessDenied")
        );
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_missing_key() {
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Arc::new(MemoryStore::default()), "b", scratch.path());
        let err = store
            .download("missing", &scratch.path().join("out.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ArtifactTransfer(_)));
    }
}
