//! Job lifecycle types.
//!
//! ```text
//!   create_job() ──→ Queued ──→ Running ──→ Completed
//!                      │           │
//!                      │           ├──→ Failed
//!                      │           │
//!                      └───────────┴──→ Cancelling ──→ Cancelled
//! ```
//!
//! Terminal states (`Completed`, `Failed`, `Cancelled`) are permanent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a submitted job (the Braket job ARN).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl JobHandle {
    /// Create a job handle.
    pub fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    /// The underlying ARN.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for capacity.
    Queued,
    /// Executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancellation in progress.
    Cancelling,
    /// Cancelled.
    Cancelled,
    /// A status this client does not know; treated as non-terminal.
    Unknown(String),
}

impl JobStatus {
    /// Parse the service's status string.
    pub fn from_service(status: &str) -> Self {
        match status {
            "QUEUED" => JobStatus::Queued,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLING" => JobStatus::Cancelling,
            "CANCELLED" => JobStatus::Cancelled,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelling => write!(f, "CANCELLING"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
            JobStatus::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    /// Current status.
    pub status: JobStatus,
    /// Failure reason, present once the job has failed.
    pub failure_reason: Option<String>,
}

impl JobInfo {
    /// Status without a failure reason.
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status,
            failure_reason: None,
        }
    }
}

/// Everything needed to create a job. Built fresh per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    /// Job name.
    pub job_name: String,
    /// Idempotency token.
    pub client_token: String,
    /// Container image URI.
    pub image_uri: String,
    /// Target device ARN.
    pub device: String,
    /// Classical instance type.
    pub instance_type: String,
    /// Instance volume size in GB.
    pub volume_size_gb: u32,
    /// Maximum runtime in seconds.
    pub max_runtime_secs: u64,
    /// Checkpoint S3 URI.
    pub checkpoint_uri: String,
    /// Output S3 path.
    pub output_path: String,
    /// Execution role ARN.
    pub role_arn: String,
    /// Hyperparameters handed to the container.
    pub hyperparameters: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Cancelling.is_terminal());
        assert!(!JobStatus::Unknown("PAUSED".into()).is_terminal());
    }

    #[test]
    fn test_status_from_service() {
        assert_eq!(JobStatus::from_service("QUEUED"), JobStatus::Queued);
        assert_eq!(JobStatus::from_service("COMPLETED"), JobStatus::Completed);
        assert_eq!(JobStatus::from_service("CANCELLING"), JobStatus::Cancelling);
        assert_eq!(
            JobStatus::from_service("SUCCESS"),
            JobStatus::Unknown("SUCCESS".into())
        );
    }

    #[test]
    fn test_status_display_round_trip() {
        for s in ["QUEUED", "RUNNING", "COMPLETED", "FAILED", "CANCELLING", "CANCELLED"] {
            assert_eq!(JobStatus::from_service(s).to_string(), s);
        }
    }

    #[test]
    fn test_only_completed_is_success() {
        assert!(JobStatus::Completed.is_success());
        assert!(!JobStatus::Failed.is_success());
        assert!(!JobStatus::Cancelled.is_success());
    }
}
