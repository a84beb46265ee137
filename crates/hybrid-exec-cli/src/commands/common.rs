//! Shared helpers for CLI commands.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use hybrid_exec_core::{
    CancellationToken, EnvConfigStore, ExecutorConfig, ExecutorOptions, JobHandle, Kwargs,
    LayeredConfigStore, TaskHost, YamlConfigStore,
};

/// Configuration overrides accepted by every command.
///
/// Flags win over `HYBRID_EXEC_BRAKET_*` variables, which win over the
/// config file, which wins over built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// YAML config file (default: ~/.config/hybrid-exec/config.yaml if present)
    #[arg(long, global = true, env = "HYBRID_EXEC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Shared AWS credentials file
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// AWS credentials profile
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// AWS region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// S3 bucket for task artifacts
    #[arg(long, global = true)]
    pub s3_bucket: Option<String>,

    /// IAM role the job runs as
    #[arg(long, global = true)]
    pub execution_role: Option<String>,

    /// Prebuilt worker image
    #[arg(long, global = true)]
    pub image_uri: Option<String>,

    /// Build a per-task image and push it to this ECR repository
    #[arg(long, global = true)]
    pub ecr_repository: Option<String>,

    /// Base image for per-task images
    #[arg(long, global = true)]
    pub base_image: Option<String>,

    /// Target device ARN
    #[arg(long, global = true)]
    pub quantum_device: Option<String>,

    /// Classical instance type
    #[arg(long, global = true)]
    pub classical_device: Option<String>,

    /// Job volume size in GB
    #[arg(long, global = true)]
    pub storage: Option<u32>,

    /// Job time limit in seconds
    #[arg(long, global = true)]
    pub time_limit: Option<u64>,

    /// Local scratch directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Poll interval in seconds
    #[arg(long, global = true)]
    pub poll_freq: Option<u64>,

    /// Give up polling after this many seconds
    #[arg(long, global = true)]
    pub poll_timeout: Option<u64>,

    /// Keep remote artifacts after the result is fetched
    #[arg(long, global = true)]
    pub keep_artifacts: bool,
}

impl ConfigArgs {
    /// Explicit options from the flags.
    pub fn options(&self) -> ExecutorOptions {
        ExecutorOptions {
            credentials: self.credentials.clone(),
            profile: self.profile.clone(),
            region: self.region.clone(),
            s3_bucket_name: self.s3_bucket.clone(),
            execution_role: self.execution_role.clone(),
            image_uri: self.image_uri.clone(),
            ecr_repository: self.ecr_repository.clone(),
            base_image: self.base_image.clone(),
            quantum_device: self.quantum_device.clone(),
            classical_device: self.classical_device.clone(),
            storage: self.storage,
            time_limit: self.time_limit,
            cache_dir: self.cache_dir.clone(),
            poll_freq: self.poll_freq,
            poll_timeout: self.poll_timeout,
            cleanup: self.keep_artifacts.then_some(false),
        }
    }

    /// Resolve the executor configuration.
    pub fn resolve(&self) -> Result<ExecutorConfig> {
        let mut store = LayeredConfigStore::new().layer(EnvConfigStore::new());
        if let Some(path) = self.config_file() {
            let yaml = YamlConfigStore::from_file(&path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            store = store.layer(yaml);
        }
        ExecutorConfig::resolve(self.options(), &store).context("Invalid configuration")
    }

    fn config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        let default = dirs::config_dir()?.join("hybrid-exec").join("config.yaml");
        default.exists().then_some(default)
    }
}

/// Parse a JSON array of positional arguments.
pub fn parse_args(raw: Option<&str>) -> Result<Vec<Value>> {
    match raw {
        None => Ok(Vec::new()),
        Some(text) => match serde_json::from_str(text).context("--args is not valid JSON")? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        },
    }
}

/// Parse a JSON object of keyword arguments.
pub fn parse_kwargs(raw: Option<&str>) -> Result<Kwargs> {
    match raw {
        None => Ok(Kwargs::new()),
        Some(text) => match serde_json::from_str(text).context("--kwargs is not valid JSON")? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("--kwargs must be a JSON object, got {other}"),
        },
    }
}

/// Parse the bound state of a function.
pub fn parse_bound(raw: Option<&str>) -> Result<Value> {
    raw.map_or(Ok(Value::Null), |text| {
        serde_json::from_str(text).context("--bound is not valid JSON")
    })
}

/// Task host for a single CLI invocation.
#[derive(Debug, Default)]
pub struct CliHost {
    cancelled: AtomicBool,
    token: CancellationToken,
    job_handle: Mutex<Option<JobHandle>>,
}

impl CliHost {
    /// Create a host with no cancellation pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the task cancelled and interrupt polling.
    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    /// Handle of the submitted job, once there is one.
    pub fn job_handle(&self) -> Option<JobHandle> {
        self.job_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TaskHost for CliHost {
    fn cancel_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_job_handle(&self, handle: &JobHandle) {
        *self
            .job_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_exec_core::PackagingMode;
    use serde_json::json;

    #[test]
    fn test_parse_args_wraps_scalars() {
        assert_eq!(parse_args(Some("[1, \"a\"]")).unwrap(), vec![json!(1), json!("a")]);
        assert_eq!(parse_args(Some("3")).unwrap(), vec![json!(3)]);
        assert!(parse_args(None).unwrap().is_empty());
        assert!(parse_args(Some("[")).is_err());
    }

    #[test]
    fn test_parse_kwargs_requires_object() {
        let kwargs = parse_kwargs(Some(r#"{"offset": 2}"#)).unwrap();
        assert_eq!(kwargs.get("offset"), Some(&json!(2)));
        assert!(parse_kwargs(Some("[1]")).is_err());
    }

    #[test]
    fn test_parse_bound_defaults_to_null() {
        assert_eq!(parse_bound(None).unwrap(), Value::Null);
        assert_eq!(parse_bound(Some("{\"k\": 1}")).unwrap(), json!({"k": 1}));
    }

    #[test]
    fn test_keep_artifacts_disables_cleanup() {
        let args = ConfigArgs {
            keep_artifacts: true,
            ..ConfigArgs::default()
        };
        assert_eq!(args.options().cleanup, Some(false));
        assert_eq!(ConfigArgs::default().options().cleanup, None);
    }

    #[test]
    fn test_config_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "executors:\n  braket:\n    s3_bucket_name: from-file\n    ecr_repo_name: tasks\n",
        )
        .unwrap();

        let args = ConfigArgs {
            config: Some(path),
            region: Some("eu-west-2".into()),
            ..ConfigArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-2"));
        assert!(matches!(config.packaging, PackagingMode::BuildImage { ref repository, .. } if repository == "tasks"));
    }

    #[test]
    fn test_host_cancel_fires_token() {
        let host = CliHost::new();
        let token = host.cancellation_token();
        assert!(!host.cancel_requested());
        host.request_cancel();
        assert!(host.cancel_requested());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_host_records_handle() {
        let host = CliHost::new();
        assert!(host.job_handle().is_none());
        host.set_job_handle(&JobHandle::new("arn:job"));
        assert_eq!(host.job_handle(), Some(JobHandle::new("arn:job")));
    }
}
