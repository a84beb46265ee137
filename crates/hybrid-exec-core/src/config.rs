//! Executor configuration.
//!
//! Every option is resolved once, at construction, through a fixed chain:
//!
//! 1. explicit value in [`ExecutorOptions`]
//! 2. [`ConfigStore`] lookup under `executors.braket.<key>`
//! 3. hardcoded default
//!
//! The result is an immutable [`ExecutorConfig`]; nothing is re-resolved at
//! runtime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};

/// Config store section holding executor settings.
pub const CONFIG_SECTION: &str = "executors.braket";

/// Prebuilt executor image containing the task worker.
pub const DEFAULT_IMAGE_URI: &str = "public.ecr.aws/covalent/covalent-braket-executor:latest";

/// Default S3 bucket for job resources.
pub const DEFAULT_S3_BUCKET: &str = "amazon-braket-covalent-job-resources";

/// Default IAM role Braket assumes for the job.
pub const DEFAULT_EXECUTION_ROLE: &str = "CovalentBraketJobsExecutionRole";

/// SV1 state vector simulator.
pub const DEFAULT_QUANTUM_DEVICE: &str = "arn:aws:braket:::device/quantum-simulator/amazon/sv1";

/// Default classical instance type.
pub const DEFAULT_CLASSICAL_DEVICE: &str = "ml.m5.large";

/// Default instance volume size in GB.
pub const DEFAULT_STORAGE_GB: u32 = 30;

/// Default job time limit in seconds.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 300;

/// Default local scratch directory.
pub const DEFAULT_CACHE_DIR: &str = "/tmp/covalent";

/// Default poll interval in seconds.
pub const DEFAULT_POLL_FREQ_SECS: u64 = 30;

/// How the task reaches the job container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PackagingMode {
    /// Run a prebuilt worker image; artifact keys travel as hyperparameters.
    Prebuilt {
        /// Image URI.
        image_uri: String,
    },
    /// Build a per-task image with an embedded entry point and push it to ECR.
    BuildImage {
        /// ECR repository name.
        repository: String,
        /// Base image providing the worker binary.
        base_image: String,
    },
}

/// Explicit constructor arguments. `None` falls through to the config store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Shared credentials file.
    pub credentials: Option<PathBuf>,
    /// Credentials profile.
    pub profile: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// S3 bucket for artifacts and job output.
    pub s3_bucket_name: Option<String>,
    /// Execution role name.
    pub execution_role: Option<String>,
    /// Prebuilt image URI.
    pub image_uri: Option<String>,
    /// ECR repository for per-task images.
    pub ecr_repository: Option<String>,
    /// Base image for per-task images.
    pub base_image: Option<String>,
    /// Target device ARN.
    pub quantum_device: Option<String>,
    /// Classical instance type.
    pub classical_device: Option<String>,
    /// Volume size in GB.
    pub storage: Option<u32>,
    /// Job time limit in seconds.
    pub time_limit: Option<u64>,
    /// Local scratch directory.
    pub cache_dir: Option<PathBuf>,
    /// Poll interval in seconds.
    pub poll_freq: Option<u64>,
    /// Upper bound on total polling time in seconds.
    pub poll_timeout: Option<u64>,
    /// Delete remote artifacts after a successful fetch.
    pub cleanup: Option<bool>,
}

/// Resolved, immutable executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorConfig {
    /// Shared credentials file.
    pub credentials_file: PathBuf,
    /// Credentials profile.
    pub profile: String,
    /// AWS region; `None` defers to the SDK's region chain.
    pub region: Option<String>,
    /// S3 bucket.
    pub s3_bucket: String,
    /// Execution role name.
    pub execution_role: String,
    /// Packaging mode.
    pub packaging: PackagingMode,
    /// Target device ARN.
    pub quantum_device: String,
    /// Classical instance type.
    pub classical_device: String,
    /// Volume size in GB.
    pub storage_gb: u32,
    /// Job time limit in seconds.
    pub time_limit_secs: u64,
    /// Local scratch directory.
    pub cache_dir: PathBuf,
    /// Poll interval in seconds.
    pub poll_freq_secs: u64,
    /// Upper bound on total polling time in seconds.
    pub poll_timeout_secs: Option<u64>,
    /// Delete remote artifacts after a successful fetch.
    pub cleanup: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            profile: "default".to_string(),
            region: None,
            s3_bucket: DEFAULT_S3_BUCKET.to_string(),
            execution_role: DEFAULT_EXECUTION_ROLE.to_string(),
            packaging: PackagingMode::Prebuilt {
                image_uri: DEFAULT_IMAGE_URI.to_string(),
            },
            quantum_device: DEFAULT_QUANTUM_DEVICE.to_string(),
            classical_device: DEFAULT_CLASSICAL_DEVICE.to_string(),
            storage_gb: DEFAULT_STORAGE_GB,
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            poll_freq_secs: DEFAULT_POLL_FREQ_SECS,
            poll_timeout_secs: None,
            cleanup: true,
        }
    }
}

fn default_credentials_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".aws")
        .join("credentials")
}

impl ExecutorConfig {
    /// Resolve options against a config store and defaults, then validate.
    pub fn resolve(options: ExecutorOptions, store: &dyn ConfigStore) -> ExecutorResult<Self> {
        let r = Resolver { store };
        let defaults = Self::default();

        let packaging = if let Some(repository) = options.ecr_repository {
            PackagingMode::BuildImage {
                repository,
                base_image: r.string(options.base_image, "base_image", DEFAULT_IMAGE_URI),
            }
        } else if let Some(image_uri) = options.image_uri {
            PackagingMode::Prebuilt { image_uri }
        } else if let Some(repository) = r.lookup("ecr_repo_name") {
            PackagingMode::BuildImage {
                repository,
                base_image: r.string(options.base_image, "base_image", DEFAULT_IMAGE_URI),
            }
        } else {
            PackagingMode::Prebuilt {
                image_uri: r.string(None, "image_uri", DEFAULT_IMAGE_URI),
            }
        };

        let config = Self {
            credentials_file: options
                .credentials
                .or_else(|| r.lookup("credentials").map(PathBuf::from))
                .unwrap_or(defaults.credentials_file),
            profile: r.string(options.profile, "profile", &defaults.profile),
            region: options.region.or_else(|| r.lookup("region")),
            s3_bucket: r.string(options.s3_bucket_name, "s3_bucket_name", DEFAULT_S3_BUCKET),
            execution_role: r.string(
                options.execution_role,
                "braket_job_execution_role_name",
                DEFAULT_EXECUTION_ROLE,
            ),
            packaging,
            quantum_device: r.string(options.quantum_device, "quantum_device", DEFAULT_QUANTUM_DEVICE),
            classical_device: r.string(
                options.classical_device,
                "classical_device",
                DEFAULT_CLASSICAL_DEVICE,
            ),
            storage_gb: r.parsed(options.storage, "storage")?.unwrap_or(DEFAULT_STORAGE_GB),
            time_limit_secs: r
                .parsed(options.time_limit, "time_limit")?
                .unwrap_or(DEFAULT_TIME_LIMIT_SECS),
            cache_dir: options
                .cache_dir
                .or_else(|| r.lookup("cache_dir").map(PathBuf::from))
                .unwrap_or(defaults.cache_dir),
            poll_freq_secs: r
                .parsed(options.poll_freq, "poll_freq")?
                .unwrap_or(DEFAULT_POLL_FREQ_SECS),
            poll_timeout_secs: r.parsed(options.poll_timeout, "poll_timeout")?,
            cleanup: r.parsed(options.cleanup, "cleanup")?.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.s3_bucket.trim().is_empty() {
            return Err(ExecutorError::Config("s3_bucket_name must not be empty".into()));
        }
        if self.execution_role.trim().is_empty() {
            return Err(ExecutorError::Config(
                "braket_job_execution_role_name must not be empty".into(),
            ));
        }
        if self.quantum_device.trim().is_empty() {
            return Err(ExecutorError::Config("quantum_device must not be empty".into()));
        }
        if self.storage_gb == 0 {
            return Err(ExecutorError::Config("storage must be > 0".into()));
        }
        if self.time_limit_secs == 0 {
            return Err(ExecutorError::Config("time_limit must be > 0".into()));
        }
        if self.poll_freq_secs == 0 {
            return Err(ExecutorError::Config("poll_freq must be > 0".into()));
        }
        if let PackagingMode::BuildImage { repository, .. } = &self.packaging {
            if repository.trim().is_empty() {
                return Err(ExecutorError::Config("ecr_repo_name must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_freq_secs)
    }

    /// Upper bound on total polling time.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> ExecutorResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| ExecutorError::Config(e.to_string()))
    }
}

struct Resolver<'a> {
    store: &'a dyn ConfigStore,
}

impl Resolver<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.store
            .get(&format!("{CONFIG_SECTION}.{key}"))
            .filter(|v| !v.trim().is_empty())
    }

    fn string(&self, explicit: Option<String>, key: &str, default: &str) -> String {
        explicit
            .or_else(|| self.lookup(key))
            .unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, explicit: Option<T>, key: &str) -> ExecutorResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if explicit.is_some() {
            return Ok(explicit);
        }
        self.lookup(key)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|e| ExecutorError::Config(format!("invalid value '{raw}' for {key}: {e}")))
            })
            .transpose()
    }
}

/// Key/value source for executor settings. Keys are dotted paths such as
/// `executors.braket.s3_bucket_name`.
pub trait ConfigStore: Send + Sync {
    /// Look up a key.
    fn get(&self, key: &str) -> Option<String>;
}

/// Environment variable store.
///
/// `executors.braket.<key>` is read from `HYBRID_EXEC_BRAKET_<KEY>`, then
/// from the well-known variable for that key, if any:
/// - `credentials` → `AWS_SHARED_CREDENTIALS_FILE`
/// - `profile` → `AWS_PROFILE`
/// - `region` → `AWS_REGION`
/// - `s3_bucket_name` → `BRAKET_COVALENT_S3`
pub struct EnvConfigStore {
    source: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl EnvConfigStore {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::with_source(|name| std::env::var(name).ok())
    }

    /// Read variables through `source` instead of the process environment.
    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            source: Box::new(source),
        }
    }

    fn variable_names(key: &str) -> Vec<String> {
        let short = key
            .strip_prefix(CONFIG_SECTION)
            .and_then(|k| k.strip_prefix('.'))
            .unwrap_or(key);
        let mut names = vec![format!("HYBRID_EXEC_BRAKET_{}", short.to_uppercase())];
        let alias = match short {
            "credentials" => Some("AWS_SHARED_CREDENTIALS_FILE"),
            "profile" => Some("AWS_PROFILE"),
            "region" => Some("AWS_REGION"),
            "s3_bucket_name" => Some("BRAKET_COVALENT_S3"),
            _ => None,
        };
        names.extend(alias.map(str::to_string));
        names
    }
}

impl Default for EnvConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for EnvConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        Self::variable_names(key)
            .iter()
            .find_map(|name| (self.source)(name))
    }
}

/// YAML document store, e.g.
///
/// ```yaml
/// executors:
///   braket:
///     s3_bucket_name: my-bucket
///     poll_freq: 10
/// ```
#[derive(Debug, Clone)]
pub struct YamlConfigStore {
    root: serde_yaml_ng::Value,
}

impl YamlConfigStore {
    /// Parse a YAML document.
    pub fn parse(contents: &str) -> ExecutorResult<Self> {
        let root = serde_yaml_ng::from_str(contents)
            .map_err(|e| ExecutorError::Config(format!("invalid config document: {e}")))?;
        Ok(Self { root })
    }

    /// Load a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ExecutorResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }
}

impl ConfigStore for YamlConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut node = &self.root;
        for segment in key.split('.') {
            node = node.get(segment)?;
        }
        match node {
            serde_yaml_ng::Value::String(s) => Some(s.clone()),
            serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
            serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MapConfigStore {
    values: FxHashMap<String, String>,
}

impl MapConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `executors.braket.<key>`.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(format!("{CONFIG_SECTION}.{key}"), value.into());
        self
    }
}

impl ConfigStore for MapConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Consults stores in order; the first hit wins.
#[derive(Default)]
pub struct LayeredConfigStore {
    layers: Vec<Box<dyn ConfigStore>>,
}

impl LayeredConfigStore {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower-priority layer.
    pub fn layer(mut self, store: impl ConfigStore + 'static) -> Self {
        self.layers.push(Box::new(store));
        self
    }
}

impl ConfigStore for LayeredConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|store| store.get(key))
    }
}
