//! Job submission.
//!
//! Every descriptor field is derived from the task identity and the resolved
//! configuration. Submission is never retried here: a client error from the
//! job service goes straight back to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::TaskIdentity;
use crate::job::{JobDescriptor, JobHandle};
use crate::service::JobService;

/// Hyperparameter naming the input artifact key.
pub const HP_FUNC_FILENAME: &str = "COVALENT_TASK_FUNC_FILENAME";

/// Hyperparameter naming the result artifact key.
pub const HP_RESULT_FILENAME: &str = "RESULT_FILENAME";

/// Hyperparameter naming the artifact bucket.
pub const HP_S3_BUCKET: &str = "S3_BUCKET_NAME";

/// Input to [`JobSubmitter::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Task being submitted.
    pub identity: TaskIdentity,
    /// Caller's AWS account ID.
    pub account: String,
    /// Container image the job runs.
    pub image_uri: String,
}

/// Creates Braket jobs.
#[derive(Clone)]
pub struct JobSubmitter {
    jobs: Arc<dyn JobService>,
    config: Arc<ExecutorConfig>,
}

impl JobSubmitter {
    /// Create a submitter.
    pub fn new(jobs: Arc<dyn JobService>, config: Arc<ExecutorConfig>) -> Self {
        Self { jobs, config }
    }

    /// Build the job descriptor for `request`.
    pub fn describe(&self, request: &SubmitRequest) -> JobDescriptor {
        let config = &self.config;
        let identity = &request.identity;
        let task_id = identity.task_id();

        let mut hyperparameters = BTreeMap::new();
        hyperparameters.insert(HP_FUNC_FILENAME.to_string(), identity.input_key());
        hyperparameters.insert(HP_RESULT_FILENAME.to_string(), identity.result_key());
        hyperparameters.insert(HP_S3_BUCKET.to_string(), config.s3_bucket.clone());

        JobDescriptor {
            job_name: identity.job_name(),
            client_token: identity.client_token(),
            image_uri: request.image_uri.clone(),
            device: config.quantum_device.clone(),
            instance_type: config.classical_device.clone(),
            volume_size_gb: config.storage_gb,
            max_runtime_secs: config.time_limit_secs,
            checkpoint_uri: format!("s3://{}/checkpoints/{}", config.s3_bucket, task_id),
            output_path: format!("s3://{}/braket/{}", config.s3_bucket, task_id),
            role_arn: format!(
                "arn:aws:iam::{}:role/{}",
                request.account, config.execution_role
            ),
            hyperparameters,
        }
    }

    /// Create the job and return its handle.
    #[instrument(skip(self, request), fields(task = %request.identity))]
    pub async fn submit(&self, request: &SubmitRequest) -> ExecutorResult<JobHandle> {
        let descriptor = self.describe(request);
        debug!(?descriptor, "creating job");

        let handle = self
            .jobs
            .create_job(&descriptor)
            .await
            .map_err(ExecutorError::JobSubmission)?;
        info!("Submitted job {} as {}", descriptor.job_name, handle);
        Ok(handle)
    }
}

impl std::fmt::Debug for JobSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSubmitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobInfo;
    use crate::service::{ServiceError, ServiceResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RejectingJobs {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl JobService for RejectingJobs {
        async fn create_job(&self, _descriptor: &JobDescriptor) -> ServiceResult<JobHandle> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::new("braket", "Rate exceeded").with_code("ThrottlingException"))
        }

        async fn get_job(&self, _handle: &JobHandle) -> ServiceResult<JobInfo> {
            unreachable!()
        }

        async fn cancel_job(&self, _handle: &JobHandle) -> ServiceResult<String> {
            unreachable!()
        }
    }

    fn submitter(jobs: Arc<dyn JobService>) -> JobSubmitter {
        let config = ExecutorConfig {
            s3_bucket: "bkt".into(),
            execution_role: "Role".into(),
            storage_gb: 50,
            time_limit_secs: 600,
            ..Default::default()
        };
        JobSubmitter::new(jobs, Arc::new(config))
    }

    fn request() -> SubmitRequest {
        SubmitRequest {
            identity: TaskIdentity::new("disp", 5),
            account: "123456789012".into(),
            image_uri: "img:1".into(),
        }
    }

    #[test]
    fn test_descriptor_fields() {
        let jobs = Arc::new(RejectingJobs {
            creates: AtomicUsize::new(0),
        });
        let d = submitter(jobs).describe(&request());

        assert_eq!(d.job_name, "covalent-disp-5");
        assert_eq!(d.image_uri, "img:1");
        assert_eq!(d.volume_size_gb, 50);
        assert_eq!(d.max_runtime_secs, 600);
        assert_eq!(d.checkpoint_uri, "s3://bkt/checkpoints/disp-5");
        assert_eq!(d.output_path, "s3://bkt/braket/disp-5");
        assert_eq!(d.role_arn, "arn:aws:iam::123456789012:role/Role");
        assert_eq!(d.hyperparameters[HP_FUNC_FILENAME], "inputs/func-disp-5.json");
        assert_eq!(d.hyperparameters[HP_RESULT_FILENAME], "outputs/result-disp-5.json");
        assert_eq!(d.hyperparameters[HP_S3_BUCKET], "bkt");
    }

    #[test]
    fn test_descriptor_deterministic() {
        let jobs = Arc::new(RejectingJobs {
            creates: AtomicUsize::new(0),
        });
        let s = submitter(jobs);
        assert_eq!(s.describe(&request()), s.describe(&request()));
    }

    #[tokio::test]
    async fn test_submit_error_not_retried() {
        let jobs = Arc::new(RejectingJobs {
            creates: AtomicUsize::new(0),
        });
        let err = submitter(jobs.clone()).submit(&request()).await.unwrap_err();

        assert!(matches!(err, ExecutorError::JobSubmission(_)));
        assert_eq!(
            err.service_error().and_then(|e| e.code.as_deref()),
            Some("ThrottlingException")
        );
        assert_eq!(jobs.creates.load(Ordering::SeqCst), 1);
    }
}
