//! Error types for the AWS adapter.

use std::error::Error as StdError;
use std::fmt::Debug;

use aws_sdk_braket::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use hybrid_exec_core::{ExecutorError, ServiceError};
use thiserror::Error;

/// Result type for adapter setup.
pub type AwsResult<T> = Result<T, AwsError>;

/// Errors raised while wiring AWS collaborators.
#[derive(Debug, Error)]
pub enum AwsError {
    /// No region could be resolved for the session.
    #[error("AWS region not configured. Set the region option or AWS_REGION.")]
    MissingRegion,

    /// The docker CLI could not be run.
    #[error("Docker not available: {0}")]
    DockerUnavailable(String),
}

impl From<AwsError> for ExecutorError {
    fn from(e: AwsError) -> Self {
        ExecutorError::Config(e.to_string())
    }
}

/// Convert an SDK error into a [`ServiceError`], keeping the provider's
/// error code and message.
pub(crate) fn service_error<E, R>(service: &'static str, err: SdkError<E, R>) -> ServiceError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    let error = ServiceError::new(service, message);
    match err.code() {
        Some(code) => error.with_code(code),
        None => error,
    }
}
