//! S3 object storage.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use hybrid_exec_core::service::ObjectStore;
use hybrid_exec_core::{ServiceError, ServiceResult};
use tracing::instrument;

use crate::error::service_error;
use crate::session::AwsSession;

/// [`ObjectStore`] backed by S3.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Create a store from a session.
    pub fn new(session: &AwsSession) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(session.sdk_config()),
        }
    }
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> ServiceResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| ServiceError::new("s3", e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| service_error("s3", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> ServiceResult<()> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| service_error("s3", e))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| ServiceError::new("s3", e.to_string()))?;

        tokio::fs::write(path, body.into_bytes())
            .await
            .map_err(|e| ServiceError::new("s3", format!("{}: {e}", path.display())))
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> ServiceResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| service_error("s3", e))?;

        Ok(())
    }
}
