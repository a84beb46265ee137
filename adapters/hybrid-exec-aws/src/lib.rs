//! AWS collaborators for hybrid-exec.
//!
//! | Collaborator | Implementation | Service |
//! |--------------|----------------|---------|
//! | identity | [`StsIdentity`] | STS `GetCallerIdentity` |
//! | object store | [`S3ObjectStore`] | S3 |
//! | jobs | [`BraketJobs`] | Braket `CreateJob` / `GetJob` / `CancelJob` |
//! | logs | [`CloudWatchLogs`] | CloudWatch Logs, group `/aws/braket/jobs` |
//! | registry | [`EcrAuth`] | ECR `GetAuthorizationToken` |
//! | container engine | [`DockerCli`] | local `docker` |
//!
//! # Authentication
//!
//! Credentials come from the configured shared credentials file and
//! profile, falling back to the SDK default chain (environment, SSO, IAM
//! role). A region must resolve from configuration or `AWS_REGION`.
//!
//! # Example
//!
//! ```ignore
//! use hybrid_exec_core::{EnvConfigStore, ExecutorConfig, ExecutorOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExecutorConfig::resolve(ExecutorOptions::default(), &EnvConfigStore::new())?;
//!     let executor = hybrid_exec_aws::connect(config).await?;
//!     println!("{:?}", executor.config());
//!     Ok(())
//! }
//! ```

mod braket;
mod docker;
mod ecr;
mod error;
mod logs;
mod s3;
mod session;
mod sts;

use std::sync::Arc;

use hybrid_exec_core::{BraketExecutor, ExecutorConfig, ExecutorResult, PackagingMode};
use tracing::info;

pub use braket::BraketJobs;
pub use docker::DockerCli;
pub use ecr::EcrAuth;
pub use error::{AwsError, AwsResult};
pub use logs::CloudWatchLogs;
pub use s3::S3ObjectStore;
pub use session::AwsSession;
pub use sts::StsIdentity;

/// Build an executor wired to AWS.
///
/// In image-build mode the local docker daemon must be reachable.
pub async fn connect(config: ExecutorConfig) -> ExecutorResult<BraketExecutor> {
    let session = AwsSession::load(&config).await?;
    info!(
        "Connected to AWS in {}",
        session.region().unwrap_or("an unknown region")
    );

    let needs_image = matches!(config.packaging, PackagingMode::BuildImage { .. });
    let mut builder = BraketExecutor::builder(config)
        .identity_service(Arc::new(StsIdentity::new(&session)))
        .object_store(Arc::new(S3ObjectStore::new(&session)))
        .job_service(Arc::new(BraketJobs::new(&session)))
        .log_service(Arc::new(CloudWatchLogs::new(&session)));

    if needs_image {
        builder = builder
            .registry_auth(Arc::new(EcrAuth::new(&session)))
            .container_engine(Arc::new(DockerCli::detect().await?));
    }

    builder.build()
}
