//! Error types for the remote task lifecycle.

use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceError;

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors that can occur while running a task on Braket Hybrid Jobs.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The task package or result envelope could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller's account could not be resolved from the identity service.
    #[error("Could not resolve AWS account: {message}\nIdentity service response: {raw}")]
    Credential {
        /// What went wrong.
        message: String,
        /// Raw identity service response, for diagnosis.
        raw: String,
    },

    /// Object storage upload, download or delete failed.
    #[error("Artifact transfer failed: {0}")]
    ArtifactTransfer(#[source] ServiceError),

    /// Building, tagging or pushing the task image failed.
    #[error(
        "There was an error uploading the container image to ECR.\n\
         Check that the repository {repository} exists.\n\
         This may also be resolved by removing ~/.docker/config.json and dispatching again.\n\
         {status}"
    )]
    ImagePublish {
        /// Raw status message from the container engine or registry.
        status: String,
        /// Target repository name.
        repository: String,
    },

    /// The job service rejected the job creation request.
    #[error("Job submission failed: {0}")]
    JobSubmission(#[source] ServiceError),

    /// A job status query failed.
    #[error("Job status query failed: {0}")]
    StatusQuery(#[source] ServiceError),

    /// The remote job reached the FAILED state.
    #[error("Job failed: {0}")]
    JobExecutionFailure(String),

    /// Cancellation was requested at a lifecycle checkpoint.
    #[error("Braket job {0} requested to be cancelled")]
    TaskCancelled(String),

    /// Log streams or events could not be retrieved.
    #[error("Log retrieval failed: {0}")]
    LogRetrieval(#[source] ServiceError),

    /// Polling exceeded the configured maximum wait.
    #[error("Timed out after {waited:?} waiting for job {job}")]
    PollTimeout {
        /// Total time spent sleeping between polls.
        waited: Duration,
        /// Job handle being polled.
        job: String,
    },

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task function lookup or invocation failed.
    #[error("Task function error: {0}")]
    Function(String),

    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Whether this error represents intentional cessation rather than malfunction.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecutorError::TaskCancelled(_))
    }

    /// The remote service error behind this error, if any.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            ExecutorError::ArtifactTransfer(e)
            | ExecutorError::JobSubmission(e)
            | ExecutorError::StatusQuery(e)
            | ExecutorError::LogRetrieval(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for ExecutorError {
    fn from(e: tokio::task::JoinError) -> Self {
        ExecutorError::Io(std::io::Error::other(e))
    }
}
