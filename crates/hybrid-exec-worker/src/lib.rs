//! Runs one packaged task inside the job container.
//!
//! The worker finds its artifacts either through the variables exported by
//! the generated entry-point script or through the hyperparameters file
//! Braket mounts into the container:
//!
//! | Value | Variable | Hyperparameter |
//! |-------|----------|----------------|
//! | input key | `HYBRID_EXEC_INPUT_KEY` | `COVALENT_TASK_FUNC_FILENAME` |
//! | result key | `HYBRID_EXEC_OUTPUT_KEY` | `RESULT_FILENAME` |
//! | bucket | `HYBRID_EXEC_S3_BUCKET` | `S3_BUCKET_NAME` |
//!
//! It then downloads the package, calls the function from its registry and
//! uploads a [`ResultEnvelope`] under the result key.

pub mod builtins;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hybrid_exec_core::identity::INPUT_PREFIX;
use hybrid_exec_core::image::CONTAINER_WORKDIR;
use hybrid_exec_core::service::ObjectStore;
use hybrid_exec_core::submit::{HP_FUNC_FILENAME, HP_RESULT_FILENAME, HP_S3_BUCKET};
use hybrid_exec_core::{
    ArtifactStore, ExecutorError, ExecutorResult, FunctionRegistry, JsonSerializer,
    ResultEnvelope, TaskSerializer,
};
use serde_json::Value;
use tracing::{info, instrument};

/// Input key exported by the entry-point script.
pub const ENV_INPUT_KEY: &str = "HYBRID_EXEC_INPUT_KEY";
/// Result key exported by the entry-point script.
pub const ENV_OUTPUT_KEY: &str = "HYBRID_EXEC_OUTPUT_KEY";
/// Bucket exported by the entry-point script.
pub const ENV_S3_BUCKET: &str = "HYBRID_EXEC_S3_BUCKET";
/// Working directory exported by the entry-point script.
pub const ENV_WORKDIR: &str = "HYBRID_EXEC_WORKDIR";
/// Path of the hyperparameters file, set by Braket.
pub const ENV_HP_FILE: &str = "AMZN_BRAKET_HP_FILE";

/// Where the worker reads and writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnv {
    /// Key of the task package.
    pub input_key: String,
    /// Key the result envelope is uploaded to.
    pub output_key: String,
    /// Artifact bucket.
    pub bucket: String,
    /// Local working directory.
    pub workdir: PathBuf,
}

impl WorkerEnv {
    /// Resolve from the process environment.
    pub fn from_env() -> ExecutorResult<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` for variables.
    ///
    /// Explicit variables win. Without them the hyperparameters file must
    /// supply all three values.
    pub fn resolve<F>(lookup: F) -> ExecutorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workdir = lookup(ENV_WORKDIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONTAINER_WORKDIR));

        if let (Some(input_key), Some(output_key), Some(bucket)) = (
            lookup(ENV_INPUT_KEY),
            lookup(ENV_OUTPUT_KEY),
            lookup(ENV_S3_BUCKET),
        ) {
            return Ok(Self {
                input_key,
                output_key,
                bucket,
                workdir,
            });
        }

        let hp_file = lookup(ENV_HP_FILE).ok_or_else(|| {
            ExecutorError::Config(format!(
                "neither {ENV_INPUT_KEY}/{ENV_OUTPUT_KEY}/{ENV_S3_BUCKET} nor {ENV_HP_FILE} is set"
            ))
        })?;
        let hyperparameters = read_hyperparameters(Path::new(&hp_file))?;
        let take = |name: &str| {
            hyperparameters.get(name).cloned().ok_or_else(|| {
                ExecutorError::Config(format!("hyperparameter {name} missing from {hp_file}"))
            })
        };

        Ok(Self {
            input_key: take(HP_FUNC_FILENAME)?,
            output_key: take(HP_RESULT_FILENAME)?,
            bucket: take(HP_S3_BUCKET)?,
            workdir,
        })
    }

    /// Task id encoded in the input key (`inputs/func-{task_id}.json`).
    pub fn task_id(&self) -> ExecutorResult<String> {
        let file = self
            .input_key
            .strip_prefix(INPUT_PREFIX)
            .unwrap_or(&self.input_key);
        file.strip_prefix("func-")
            .and_then(|rest| rest.strip_suffix(".json"))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ExecutorError::Config(format!(
                    "input key '{}' does not name a task package",
                    self.input_key
                ))
            })
    }
}

fn read_hyperparameters(path: &Path) -> ExecutorResult<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    let raw: BTreeMap<String, Value> = serde_json::from_str(&contents)
        .map_err(|e| ExecutorError::Config(format!("{}: {e}", path.display())))?;
    // Values are normally strings; anything else is kept as its JSON text.
    Ok(raw
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

/// Downloads, runs and uploads one task.
pub struct Worker {
    store: ArtifactStore,
    registry: FunctionRegistry,
    serializer: Arc<dyn TaskSerializer>,
}

impl Worker {
    /// Create a worker for the artifacts described by `env`.
    pub fn new(backend: Arc<dyn ObjectStore>, env: &WorkerEnv, registry: FunctionRegistry) -> Self {
        Self {
            store: ArtifactStore::new(backend, env.bucket.clone(), &env.workdir),
            registry,
            serializer: Arc::new(JsonSerializer),
        }
    }

    /// Run the task and upload its result. Returns the function output.
    #[instrument(skip_all, fields(input = %env.input_key))]
    pub async fn run(&self, env: &WorkerEnv) -> ExecutorResult<Value> {
        let task_id = env.task_id()?;
        let local = env.workdir.join(format!("func-{task_id}.json"));
        let bytes = self.store.download(&env.input_key, &local).await?;
        let package = self.serializer.deserialize(&bytes)?;
        info!("Running {} for task {}", package.function.name, task_id);

        let registry = self.registry.clone();
        let value = tokio::task::spawn_blocking(move || {
            registry.invoke(&package.function, &package.args, &package.kwargs)
        })
        .await??;

        let envelope = ResultEnvelope {
            task_id,
            value: value.clone(),
        };
        let encoded = self.serializer.serialize_result(&envelope)?;
        self.store.upload(encoded, &env.output_key).await?;
        info!("Uploaded result to s3://{}/{}", env.bucket, env.output_key);
        Ok(value)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
