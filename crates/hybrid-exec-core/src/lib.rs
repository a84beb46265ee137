//! Remote task lifecycle for AWS Braket Hybrid Jobs.
//!
//! This crate runs one task of a workflow as a Braket Hybrid Job:
//!
//! - **Package** the function and its arguments ([`serializer`])
//! - **Upload** the package to S3 ([`store`]), optionally building a
//!   per-task container image ([`image`])
//! - **Submit** the job ([`submit`])
//! - **Poll** it to a terminal state ([`poll`])
//! - **Fetch** the result envelope and the job logs ([`fetch`])
//!
//! [`BraketExecutor`] sequences the stages. Every remote capability sits
//! behind a trait in [`service`], so the lifecycle runs unchanged against
//! AWS (see `hybrid-exec-aws`) or in-memory fakes.
//!
//! # Example
//!
//! ```ignore
//! use hybrid_exec_core::{ExecutorConfig, ExecutorOptions, EnvConfigStore, TaskFunction, TaskMetadata};
//!
//! let config = ExecutorConfig::resolve(ExecutorOptions::default(), &EnvConfigStore::new())?;
//! let executor = hybrid_exec_aws::connect(config).await?;
//!
//! let metadata = TaskMetadata::new("dispatch-1", 0, "./results");
//! let value = executor
//!     .run(&TaskFunction::new("sum"), &[json!([1, 2, 3])], &Kwargs::new(), &metadata, &host)
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod function;
pub mod identity;
pub mod image;
pub mod job;
pub mod poll;
pub mod serializer;
pub mod service;
pub mod store;
pub mod submit;

pub use config::{
    ConfigStore, EnvConfigStore, ExecutorConfig, ExecutorOptions, LayeredConfigStore,
    MapConfigStore, PackagingMode, YamlConfigStore,
};
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{BraketExecutor, ExecutorBuilder, TaskHost, UploadRequest};
pub use fetch::{QueryRequest, ResultBundle, ResultFetcher};
pub use function::{FunctionRegistry, Kwargs, TaskFunction};
pub use identity::{TaskIdentity, TaskMetadata};
pub use image::ImageBuilder;
pub use job::{JobDescriptor, JobHandle, JobInfo, JobStatus};
pub use poll::{PollOutcome, PollRequest, PollState, Poller, Sleeper, TokioSleeper};
pub use serializer::{JsonSerializer, ResultEnvelope, TaskPackage, TaskSerializer};
pub use service::{ServiceError, ServiceResult};
pub use store::ArtifactStore;
pub use submit::{JobSubmitter, SubmitRequest};

// Re-exported so hosts can fire cancellation without a direct dependency.
pub use tokio_util::sync::CancellationToken;
