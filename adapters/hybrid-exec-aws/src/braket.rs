//! Braket Hybrid Jobs.

use std::fmt;

use async_trait::async_trait;
use aws_sdk_braket::operation::create_job::builders::CreateJobFluentBuilder;
use aws_sdk_braket::types::{
    AlgorithmSpecification, ContainerImage, DeviceConfig, InstanceConfig, InstanceType,
    JobCheckpointConfig, JobOutputDataConfig, JobStoppingCondition,
};
use hybrid_exec_core::service::JobService;
use hybrid_exec_core::{
    JobDescriptor, JobHandle, JobInfo, JobStatus, ServiceError, ServiceResult,
};
use tracing::instrument;

use crate::error::service_error;
use crate::session::AwsSession;

/// [`JobService`] backed by Braket.
#[derive(Clone)]
pub struct BraketJobs {
    client: aws_sdk_braket::Client,
}

impl BraketJobs {
    /// Create a job service from a session.
    pub fn new(session: &AwsSession) -> Self {
        Self {
            client: aws_sdk_braket::Client::new(session.sdk_config()),
        }
    }

    fn create_request(&self, d: &JobDescriptor) -> ServiceResult<CreateJobFluentBuilder> {
        let build_error = |e: aws_sdk_braket::error::BuildError| ServiceError::new("braket", e.to_string());

        let algorithm = AlgorithmSpecification::builder()
            .container_image(ContainerImage::builder().uri(&d.image_uri).build().map_err(build_error)?)
            .build();
        let instance = InstanceConfig::builder()
            .instance_type(InstanceType::from(d.instance_type.as_str()))
            .volume_size_in_gb(to_i32("volume_size_gb", u64::from(d.volume_size_gb))?)
            .instance_count(1)
            .build()
            .map_err(build_error)?;
        let device = DeviceConfig::builder()
            .device(&d.device)
            .build()
            .map_err(build_error)?;
        let checkpoint = JobCheckpointConfig::builder()
            .s3_uri(&d.checkpoint_uri)
            .build()
            .map_err(build_error)?;
        let output = JobOutputDataConfig::builder()
            .s3_path(&d.output_path)
            .build()
            .map_err(build_error)?;
        let stopping = JobStoppingCondition::builder()
            .max_runtime_in_seconds(to_i32("max_runtime_secs", d.max_runtime_secs)?)
            .build();

        let mut request = self
            .client
            .create_job()
            .job_name(&d.job_name)
            .client_token(&d.client_token)
            .role_arn(&d.role_arn)
            .algorithm_specification(algorithm)
            .instance_config(instance)
            .device_config(device)
            .checkpoint_config(checkpoint)
            .output_data_config(output)
            .stopping_condition(stopping);
        for (name, value) in &d.hyperparameters {
            request = request.hyper_parameters(name, value);
        }
        Ok(request)
    }
}

fn to_i32(field: &str, value: u64) -> ServiceResult<i32> {
    i32::try_from(value)
        .map_err(|_| ServiceError::new("braket", format!("{field} out of range: {value}")))
}

impl fmt::Debug for BraketJobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BraketJobs")
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl JobService for BraketJobs {
    #[instrument(skip_all, fields(job_name = %descriptor.job_name))]
    async fn create_job(&self, descriptor: &JobDescriptor) -> ServiceResult<JobHandle> {
        let resp = self
            .create_request(descriptor)?
            .send()
            .await
            .map_err(|e| service_error("braket", e))?;

        Ok(JobHandle::new(resp.job_arn()))
    }

    #[instrument(skip(self))]
    async fn get_job(&self, handle: &JobHandle) -> ServiceResult<JobInfo> {
        let resp = self
            .client
            .get_job()
            .job_arn(handle.as_str())
            .send()
            .await
            .map_err(|e| service_error("braket", e))?;

        Ok(JobInfo {
            status: JobStatus::from_service(resp.status().as_str()),
            failure_reason: resp.failure_reason().map(str::to_string),
        })
    }

    #[instrument(skip(self))]
    async fn cancel_job(&self, handle: &JobHandle) -> ServiceResult<String> {
        let resp = self
            .client
            .cancel_job()
            .job_arn(handle.as_str())
            .send()
            .await
            .map_err(|e| service_error("braket", e))?;

        Ok(resp.cancellation_status().as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_braket::types::JobPrimaryStatus;

    #[test]
    fn test_primary_status_strings_map() {
        let cases = [
            (JobPrimaryStatus::Queued, JobStatus::Queued),
            (JobPrimaryStatus::Running, JobStatus::Running),
            (JobPrimaryStatus::Completed, JobStatus::Completed),
            (JobPrimaryStatus::Failed, JobStatus::Failed),
            (JobPrimaryStatus::Cancelling, JobStatus::Cancelling),
            (JobPrimaryStatus::Cancelled, JobStatus::Cancelled),
        ];
        for (sdk, expected) in cases {
            assert_eq!(JobStatus::from_service(sdk.as_str()), expected);
        }
    }

    #[test]
    fn test_to_i32_range() {
        assert_eq!(to_i32("t", 300).unwrap(), 300);
        assert!(to_i32("t", u64::MAX).is_err());
    }
}
