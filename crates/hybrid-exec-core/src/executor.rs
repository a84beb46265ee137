//! The task lifecycle.
//!
//! One call to [`BraketExecutor::run`] moves a task through strictly
//! sequential stages:
//!
//! ```text
//!   resolve account → scratch dir → [cancel?] → package + upload (+ image)
//!     → [cancel?] → submit → record handle → poll → fetch → host output
//!     → cleanup
//! ```
//!
//! Stages exchange typed requests ([`UploadRequest`], [`SubmitRequest`],
//! [`PollRequest`], [`QueryRequest`]). Nothing is shared between
//! invocations: every remote name derives from the task identity.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::{ExecutorConfig, PackagingMode};
use crate::error::{ExecutorError, ExecutorResult};
use crate::fetch::{QueryRequest, ResultFetcher};
use crate::function::{Kwargs, TaskFunction};
use crate::identity::{TaskIdentity, TaskMetadata};
use crate::image::ImageBuilder;
use crate::job::JobHandle;
use crate::poll::{PollOutcome, PollRequest, Poller, Sleeper, TokioSleeper};
use crate::serializer::{JsonSerializer, TaskPackage, TaskSerializer};
use crate::service::{
    ContainerEngine, IdentityService, JobService, LogService, ObjectStore, RegistryAuth,
};
use crate::store::ArtifactStore;
use crate::submit::{JobSubmitter, SubmitRequest};

/// The orchestrator side of one task invocation.
///
/// Every method has a default suitable for a standalone process.
pub trait TaskHost: Send + Sync {
    /// Whether the orchestrator asked for this task to stop.
    fn cancel_requested(&self) -> bool {
        false
    }

    /// Record the job handle so the task can be cancelled externally.
    fn set_job_handle(&self, _handle: &JobHandle) {}

    /// Token that interrupts polling when fired.
    fn cancellation_token(&self) -> CancellationToken {
        CancellationToken::new()
    }

    /// Forward captured job output.
    fn write_stdout(&self, text: &str) {
        print!("{text}");
    }

    /// Forward captured job error output.
    fn write_stderr(&self, text: &str) {
        eprint!("{text}");
    }
}

/// Input to the upload stage.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    /// Task being uploaded.
    pub identity: TaskIdentity,
    /// Function and arguments.
    pub package: TaskPackage,
}

/// Where the image a job runs comes from.
#[derive(Debug)]
enum ImageSource {
    Prebuilt(String),
    Build(ImageBuilder),
}

/// Runs tasks on Braket Hybrid Jobs.
pub struct BraketExecutor {
    config: Arc<ExecutorConfig>,
    identity: Arc<dyn IdentityService>,
    jobs: Arc<dyn JobService>,
    serializer: Arc<dyn TaskSerializer>,
    store: ArtifactStore,
    image: ImageSource,
    submitter: JobSubmitter,
    poller: Poller,
    fetcher: ResultFetcher,
}

impl BraketExecutor {
    /// Start building an executor.
    pub fn builder(config: ExecutorConfig) -> ExecutorBuilder {
        ExecutorBuilder::new(config)
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `function(args, kwargs)` remotely and return its output.
    ///
    /// Firing the host's cancellation token stops the run at the next
    /// checkpoint. Once a job was submitted it is also cancelled remotely.
    #[instrument(skip_all, fields(task = %metadata.identity))]
    pub async fn run(
        &self,
        function: &TaskFunction,
        args: &[Value],
        kwargs: &Kwargs,
        metadata: &TaskMetadata,
        host: &dyn TaskHost,
    ) -> ExecutorResult<Value> {
        let identity = &metadata.identity;
        let token = host.cancellation_token();
        let cancelled = || host.cancel_requested() || token.is_cancelled();

        let account = self.resolve_account().await?;
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;

        if cancelled() {
            return Err(ExecutorError::TaskCancelled(identity.job_name()));
        }

        let image_uri = self
            .upload(&UploadRequest {
                identity: identity.clone(),
                package: TaskPackage::new(function.clone(), args.to_vec(), kwargs.clone()),
            })
            .await?;

        if cancelled() {
            return Err(ExecutorError::TaskCancelled(identity.job_name()));
        }

        let job_handle = self
            .submitter
            .submit(&SubmitRequest {
                identity: identity.clone(),
                account,
                image_uri,
            })
            .await?;
        host.set_job_handle(&job_handle);

        // From here on a job exists: every failure surfaces its logs.
        let poll_request = PollRequest {
            job_handle: job_handle.clone(),
            interval: self.config.poll_interval(),
            timeout: self.config.poll_timeout(),
        };
        let fetched = match self.poller.poll(&poll_request, &token).await {
            Ok(PollOutcome::Completed) => {
                self.fetcher
                    .fetch(&QueryRequest {
                        identity: identity.clone(),
                        local_result_path: metadata.local_result_path(),
                        job_handle: job_handle.clone(),
                    })
                    .await
            }
            Ok(PollOutcome::Cancelled) => {
                Err(ExecutorError::TaskCancelled(job_handle.to_string()))
            }
            Err(e) => {
                // Only the local token fired; the job itself is still live.
                if e.is_cancellation() {
                    self.cancel(metadata, &job_handle).await;
                }
                Err(e)
            }
        };

        let bundle = match fetched {
            Ok(bundle) => bundle,
            Err(e) => {
                self.surface_logs(identity, host).await;
                return Err(e);
            }
        };

        host.write_stdout(&bundle.stdout);
        if !bundle.stderr.is_empty() {
            host.write_stderr(&bundle.stderr);
        }

        if self.config.cleanup {
            self.cleanup(identity).await;
        }

        Ok(bundle.value)
    }

    /// Ask the job service to stop a running job.
    ///
    /// Returns whether the request was accepted, not whether the job stopped.
    /// Service errors are logged and reported as `false`.
    #[instrument(skip(self, metadata), fields(task = %metadata.identity))]
    pub async fn cancel(&self, metadata: &TaskMetadata, job_handle: &JobHandle) -> bool {
        match self.jobs.cancel_job(job_handle).await {
            Ok(status) => {
                info!("Cancellation of job {} requested: {}", job_handle, status);
                true
            }
            Err(e) => {
                warn!("Failed to cancel job {}: {}", job_handle, e);
                false
            }
        }
    }

    async fn resolve_account(&self) -> ExecutorResult<String> {
        let caller = self
            .identity
            .caller_identity()
            .await
            .map_err(|e| ExecutorError::Credential {
                message: "identity service call failed".into(),
                raw: e.to_string(),
            })?;

        match caller.account.filter(|a| !a.is_empty()) {
            Some(account) => Ok(account),
            None => Err(ExecutorError::Credential {
                message: "response carries no account".into(),
                raw: caller.raw,
            }),
        }
    }

    /// Serialize and upload the package; returns the image the job runs.
    #[instrument(skip_all, fields(task = %request.identity))]
    async fn upload(&self, request: &UploadRequest) -> ExecutorResult<String> {
        let serializer = self.serializer.clone();
        let package = request.package.clone();
        let bytes = tokio::task::spawn_blocking(move || serializer.serialize(&package)).await??;

        self.store
            .upload(bytes, &request.identity.input_key())
            .await?;
        info!("Uploaded task package for {}", request.identity);

        match &self.image {
            ImageSource::Prebuilt(image_uri) => Ok(image_uri.clone()),
            ImageSource::Build(builder) => {
                builder
                    .build_and_push(&request.identity, self.store.bucket())
                    .await
            }
        }
    }

    async fn surface_logs(&self, identity: &TaskIdentity, host: &dyn TaskHost) {
        match self.fetcher.fetch_logs(identity).await {
            Ok(text) if !text.is_empty() => host.write_stdout(&text),
            Ok(_) => {}
            Err(e) => warn!("Could not retrieve logs for {}: {}", identity, e),
        }
    }

    async fn cleanup(&self, identity: &TaskIdentity) {
        for key in [identity.input_key(), identity.result_key()] {
            if let Err(e) = self.store.delete(&key).await {
                warn!("Failed to delete s3://{}/{}: {}", self.store.bucket(), key, e);
            }
        }
    }
}

impl std::fmt::Debug for BraketExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BraketExecutor")
            .field("config", &self.config)
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

/// Wires collaborators into a [`BraketExecutor`].
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    identity: Option<Arc<dyn IdentityService>>,
    objects: Option<Arc<dyn ObjectStore>>,
    jobs: Option<Arc<dyn JobService>>,
    logs: Option<Arc<dyn LogService>>,
    registry: Option<Arc<dyn RegistryAuth>>,
    engine: Option<Arc<dyn ContainerEngine>>,
    sleeper: Arc<dyn Sleeper>,
    serializer: Arc<dyn TaskSerializer>,
}

impl ExecutorBuilder {
    /// Start from a resolved configuration.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            identity: None,
            objects: None,
            jobs: None,
            logs: None,
            registry: None,
            engine: None,
            sleeper: Arc::new(TokioSleeper),
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Identity service.
    pub fn identity_service(mut self, service: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(service);
        self
    }

    /// Object storage.
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(store);
        self
    }

    /// Job service.
    pub fn job_service(mut self, service: Arc<dyn JobService>) -> Self {
        self.jobs = Some(service);
        self
    }

    /// Log service.
    pub fn log_service(mut self, service: Arc<dyn LogService>) -> Self {
        self.logs = Some(service);
        self
    }

    /// Registry authorization, required for image builds.
    pub fn registry_auth(mut self, auth: Arc<dyn RegistryAuth>) -> Self {
        self.registry = Some(auth);
        self
    }

    /// Container engine, required for image builds.
    pub fn container_engine(mut self, engine: Arc<dyn ContainerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the poll-loop sleeper.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the serializer.
    pub fn serializer(mut self, serializer: Arc<dyn TaskSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Validate and assemble.
    pub fn build(self) -> ExecutorResult<BraketExecutor> {
        self.config.validate()?;
        let missing = |what: &str| ExecutorError::Config(format!("{what} not configured"));

        let identity = self.identity.ok_or_else(|| missing("identity service"))?;
        let objects = self.objects.ok_or_else(|| missing("object store"))?;
        let jobs = self.jobs.ok_or_else(|| missing("job service"))?;
        let logs = self.logs.ok_or_else(|| missing("log service"))?;

        let config = Arc::new(self.config);
        let store = ArtifactStore::new(objects, config.s3_bucket.clone(), &config.cache_dir);

        let image = match &config.packaging {
            PackagingMode::Prebuilt { image_uri } => ImageSource::Prebuilt(image_uri.clone()),
            PackagingMode::BuildImage {
                repository,
                base_image,
            } => ImageSource::Build(ImageBuilder::new(
                self.engine.ok_or_else(|| missing("container engine"))?,
                self.registry.ok_or_else(|| missing("registry authorization"))?,
                repository.clone(),
                base_image.clone(),
                &config.cache_dir,
            )),
        };

        Ok(BraketExecutor {
            submitter: JobSubmitter::new(jobs.clone(), config.clone()),
            poller: Poller::new(jobs.clone(), self.sleeper),
            fetcher: ResultFetcher::new(store.clone(), logs, self.serializer.clone()),
            config,
            identity,
            jobs,
            serializer: self.serializer,
            store,
            image,
        })
    }
}
