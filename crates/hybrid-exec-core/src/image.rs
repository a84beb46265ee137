//! Per-task container image.
//!
//! In [`BuildImage`](crate::config::PackagingMode::BuildImage) mode the task's
//! artifact locations are baked into a generated entry-point script, the
//! script is layered onto the worker base image, and the result is pushed to
//! ECR under a per-task tag.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, info, instrument};

use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::TaskIdentity;
use crate::service::{ContainerEngine, RegistryAuth};

/// File name of the generated entry-point script.
pub const ENTRYPOINT_SCRIPT: &str = "hybrid-exec-entrypoint.sh";

/// File name of the generated build recipe.
pub const DOCKERFILE: &str = "Dockerfile";

/// Worker binary shipped in the base image.
pub const WORKER_BINARY: &str = "hybrid-exec-worker";

/// Working directory inside the job container.
pub const CONTAINER_WORKDIR: &str = "/opt/ml/code";

/// Render the entry-point script for one task.
pub fn render_entrypoint(identity: &TaskIdentity, bucket: &str, workdir: &str) -> String {
    let mut script = String::new();

    script.push_str("#!/bin/sh\n");
    script.push_str("set -e\n\n");

    script.push_str("# Artifact locations\n");
    script.push_str(&format!("export HYBRID_EXEC_INPUT_KEY=\"{}\"\n", identity.input_key()));
    script.push_str(&format!("export HYBRID_EXEC_OUTPUT_KEY=\"{}\"\n", identity.result_key()));
    script.push_str(&format!("export HYBRID_EXEC_S3_BUCKET=\"{bucket}\"\n"));
    script.push_str(&format!("export HYBRID_EXEC_WORKDIR=\"{workdir}\"\n\n"));

    script.push_str(&format!("mkdir -p \"{workdir}\"\n"));
    script.push_str(&format!("cd \"{workdir}\"\n"));
    script.push_str(&format!("echo \"Running task {}\"\n", identity.task_id()));
    script.push_str(&format!("exec {WORKER_BINARY}\n"));

    script
}

/// Render the build recipe layering the entry-point script onto `base_image`.
pub fn render_recipe(base_image: &str, workdir: &str) -> String {
    let mut recipe = String::new();

    recipe.push_str(&format!("FROM {base_image}\n\n"));
    recipe.push_str(&format!("WORKDIR {workdir}\n"));
    recipe.push_str(&format!("COPY {ENTRYPOINT_SCRIPT} {workdir}/{ENTRYPOINT_SCRIPT}\n"));
    recipe.push_str(&format!("RUN chmod +x {workdir}/{ENTRYPOINT_SCRIPT}\n\n"));
    recipe.push_str(&format!("ENTRYPOINT [\"{workdir}/{ENTRYPOINT_SCRIPT}\"]\n"));

    recipe
}

/// Decode a registry authorization token (`base64("user:password")`).
pub fn decode_authorization_token(token: &str) -> ExecutorResult<(String, String)> {
    let decoded = BASE64
        .decode(token.trim())
        .map_err(|e| ExecutorError::Config(format!("invalid registry token: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| ExecutorError::Config(format!("invalid registry token: {e}")))?;
    let (user, password) = decoded
        .split_once(':')
        .ok_or_else(|| ExecutorError::Config("registry token is not user:password".into()))?;
    Ok((user.to_string(), password.to_string()))
}

/// Registry host of an endpoint, without scheme or trailing slash.
pub fn registry_host(endpoint: &str) -> &str {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// Outcome of a successful push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Pushed manifest digest, if the stream reported one.
    pub digest: Option<String>,
}

/// Scan a push status stream.
///
/// Every line is inspected. JSON lines carrying `error` or `errorDetail`, and
/// plain lines starting with `error`, are failures. The push succeeded only if
/// no line in the whole stream is a failure.
pub fn scan_push_stream(lines: &[String], repository: &str) -> ExecutorResult<PushReport> {
    let mut report = PushReport::default();
    let mut errors = Vec::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(status)) => {
                if let Some(error) = status.get("error") {
                    errors.push(json_text(error));
                } else if let Some(detail) = status.get("errorDetail") {
                    errors.push(
                        detail
                            .get("message")
                            .map(json_text)
                            .unwrap_or_else(|| detail.to_string()),
                    );
                }
                if let Some(digest) = status
                    .get("aux")
                    .and_then(|aux| aux.get("Digest"))
                    .and_then(|d| d.as_str())
                {
                    report.digest = Some(digest.to_string());
                } else if let Some(digest) = status
                    .get("status")
                    .and_then(|s| s.as_str())
                    .and_then(extract_digest)
                {
                    report.digest = Some(digest);
                }
            }
            _ => {
                if line.to_ascii_lowercase().starts_with("error") {
                    errors.push(line.to_string());
                } else if let Some(digest) = extract_digest(line) {
                    report.digest = Some(digest);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(report)
    } else {
        Err(ExecutorError::ImagePublish {
            status: errors.join("\n"),
            repository: repository.to_string(),
        })
    }
}

fn json_text(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn extract_digest(text: &str) -> Option<String> {
    let (_, rest) = text.split_once("digest: ")?;
    let digest = rest.split_whitespace().next()?;
    digest.starts_with("sha256:").then(|| digest.to_string())
}

/// Builds and publishes per-task images.
#[derive(Clone)]
pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
    auth: Arc<dyn RegistryAuth>,
    repository: String,
    base_image: String,
    scratch_dir: PathBuf,
}

impl ImageBuilder {
    /// Create a builder publishing to `repository`.
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        auth: Arc<dyn RegistryAuth>,
        repository: impl Into<String>,
        base_image: impl Into<String>,
        scratch_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            engine,
            auth,
            repository: repository.into(),
            base_image: base_image.into(),
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    /// Target repository.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Build, tag and push the task image; returns the pushed image URI.
    #[instrument(skip(self), fields(repository = %self.repository, task = %identity))]
    pub async fn build_and_push(&self, identity: &TaskIdentity, bucket: &str) -> ExecutorResult<String> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let context = tempfile::Builder::new()
            .prefix("image-")
            .tempdir_in(&self.scratch_dir)?;

        tokio::fs::write(
            context.path().join(ENTRYPOINT_SCRIPT),
            render_entrypoint(identity, bucket, CONTAINER_WORKDIR),
        )
        .await?;
        let recipe = context.path().join(DOCKERFILE);
        tokio::fs::write(&recipe, render_recipe(&self.base_image, CONTAINER_WORKDIR)).await?;

        let tag = identity.image_tag();
        let local_image = format!("{}:{}", self.repository, tag);
        info!("Building image {}", local_image);
        self.engine
            .build(context.path(), &recipe, &local_image)
            .await
            .map_err(|e| self.publish_error(e))?;

        let token = self
            .auth
            .authorization_token()
            .await
            .map_err(|e| self.publish_error(e))?;
        let (username, password) =
            decode_authorization_token(&token.token).map_err(|e| self.publish_error(e))?;
        let registry = registry_host(&token.endpoint);
        self.engine
            .login(registry, &username, &password)
            .await
            .map_err(|e| self.publish_error(e))?;

        let remote_image = format!("{registry}/{}:{tag}", self.repository);
        self.engine
            .tag(&local_image, &remote_image)
            .await
            .map_err(|e| self.publish_error(e))?;

        info!("Pushing image {}", remote_image);
        let stream = self
            .engine
            .push(&remote_image)
            .await
            .map_err(|e| self.publish_error(e))?;
        let report = scan_push_stream(&stream, &self.repository)?;
        debug!(digest = ?report.digest, "push complete");

        Ok(remote_image)
    }

    fn publish_error(&self, e: impl std::fmt::Display) -> ExecutorError {
        ExecutorError::ImagePublish {
            status: e.to_string(),
            repository: self.repository.clone(),
        }
    }
}

impl std::fmt::Debug for ImageBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuilder")
            .field("repository", &self.repository)
            .field("base_image", &self.base_image)
            .finish()
    }
}
