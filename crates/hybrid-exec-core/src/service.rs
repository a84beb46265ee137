//! Remote collaborators consumed by the lifecycle.
//!
//! The core never talks to a cloud SDK directly. Each remote capability is
//! a small async trait; `hybrid-exec-aws` provides the AWS implementations
//! and tests provide in-memory fakes.
//!
//! | Trait | AWS service | Used by |
//! |-------|-------------|---------|
//! | [`IdentityService`] | STS | lifecycle (account resolution) |
//! | [`ObjectStore`] | S3 | artifact store |
//! | [`JobService`] | Braket | submitter, poller, cancel |
//! | [`LogService`] | CloudWatch Logs | result fetcher |
//! | [`RegistryAuth`] | ECR | image builder |
//! | [`ContainerEngine`] | local Docker | image builder |

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::job::{JobDescriptor, JobHandle, JobInfo};

/// Result type for collaborator calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error reported by a remote collaborator, preserved as the provider sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Short service name (`"s3"`, `"braket"`, ...).
    pub service: &'static str,
    /// Provider error code, e.g. `ValidationException`.
    pub code: Option<String>,
    /// Provider error message.
    pub message: String,
}

impl ServiceError {
    /// Create an error without a provider code.
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            code: None,
            message: message.into(),
        }
    }

    /// Attach a provider error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} {}: {}", self.service, code, self.message),
            None => write!(f, "{}: {}", self.service, self.message),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Identity of the credentials in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Account ID, if the service returned one.
    pub account: Option<String>,
    /// Caller ARN.
    pub arn: Option<String>,
    /// Raw response rendering, kept for diagnostics.
    pub raw: String,
}

/// Identity service (`sts:GetCallerIdentity`).
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolve the caller's identity.
    async fn caller_identity(&self) -> ServiceResult<CallerIdentity>;
}

/// Generic blob storage backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `bucket/key`.
    async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> ServiceResult<()>;

    /// Download `bucket/key` to a local file.
    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> ServiceResult<()>;

    /// Delete `bucket/key`.
    async fn delete_object(&self, bucket: &str, key: &str) -> ServiceResult<()>;
}

/// Managed job service.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Create a job and return its handle.
    async fn create_job(&self, descriptor: &JobDescriptor) -> ServiceResult<JobHandle>;

    /// Query a job's status and failure reason.
    async fn get_job(&self, handle: &JobHandle) -> ServiceResult<JobInfo>;

    /// Request cancellation; returns the service's cancellation status.
    async fn cancel_job(&self, handle: &JobHandle) -> ServiceResult<String>;
}

/// One page of log events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEventsPage {
    /// Event messages in the order the service returned them.
    pub messages: Vec<String>,
    /// Token for the next page, if the service returned one.
    pub next_token: Option<String>,
}

/// Log service.
#[async_trait]
pub trait LogService: Send + Sync {
    /// Names of the streams in `group` whose name starts with `prefix`.
    async fn describe_log_streams(&self, group: &str, prefix: &str) -> ServiceResult<Vec<String>>;

    /// Fetch a page of events from a stream, oldest first.
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<LogEventsPage>;
}

/// Encoded registry credentials as handed out by the registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryToken {
    /// Base64 of `username:password`.
    pub token: String,
    /// Registry endpoint, e.g. `https://123456789012.dkr.ecr.us-east-1.amazonaws.com`.
    pub endpoint: String,
}

impl fmt::Debug for RegistryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryToken")
            .field("token", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Container registry authorization.
#[async_trait]
pub trait RegistryAuth: Send + Sync {
    /// Obtain a short-lived registry token.
    async fn authorization_token(&self) -> ServiceResult<RegistryToken>;
}

/// Local container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image from `recipe` (a file inside `context_dir`) and tag it `tag`.
    async fn build(&self, context_dir: &Path, recipe: &Path, tag: &str) -> ServiceResult<()>;

    /// Log in to `registry`.
    async fn login(&self, registry: &str, username: &str, password: &str) -> ServiceResult<()>;

    /// Tag `source` as `target`.
    async fn tag(&self, source: &str, target: &str) -> ServiceResult<()>;

    /// Push `target`; returns the line-delimited status stream.
    async fn push(&self, target: &str) -> ServiceResult<Vec<String>>;
}
