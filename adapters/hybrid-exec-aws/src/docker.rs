//! Docker CLI container engine.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use hybrid_exec_core::service::ContainerEngine;
use hybrid_exec_core::{ServiceError, ServiceResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{AwsError, AwsResult};

/// [`ContainerEngine`] driving the `docker` command.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    leading_args: Vec<String>,
    command_timeout: Duration,
    transfer_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::with_program("docker")
    }
}

impl DockerCli {
    /// Use `program` instead of `docker` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self::with_command(program, Vec::<String>::new())
    }

    /// Run `program leading_args.. <docker args>`, e.g. `sudo docker`.
    pub fn with_command<I, S>(program: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
            command_timeout: Duration::from_secs(60),
            transfer_timeout: Duration::from_secs(1800),
        }
    }

    /// Check that the daemon answers and return an engine for it.
    pub async fn detect() -> AwsResult<Self> {
        let cli = Self::default();
        let output = cli
            .run(&["version", "--format", "{{.Server.Version}}"], None, cli.command_timeout)
            .await
            .map_err(|e| AwsError::DockerUnavailable(e.message))?;
        if !output.status.success() {
            return Err(AwsError::DockerUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        debug!(
            server = %String::from_utf8_lossy(&output.stdout).trim(),
            "docker daemon available"
        );
        Ok(cli)
    }

    async fn run(&self, args: &[&str], stdin: Option<&str>, limit: Duration) -> ServiceResult<Output> {
        let command = args.first().copied().unwrap_or_default();
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServiceError::new("docker", format!("docker {command}: {e}")))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| ServiceError::new("docker", format!("docker {command}: {e}")))?;
        }

        tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| {
                ServiceError::new(
                    "docker",
                    format!("docker {command} timed out after {}s", limit.as_secs()),
                )
            })?
            .map_err(|e| ServiceError::new("docker", format!("docker {command}: {e}")))
    }

    async fn run_checked(&self, args: &[&str], stdin: Option<&str>, limit: Duration) -> ServiceResult<()> {
        let output = self.run(args, stdin, limit).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ServiceError::new("docker", stderr.trim().to_string()))
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    #[instrument(skip(self))]
    async fn build(&self, context_dir: &Path, recipe: &Path, tag: &str) -> ServiceResult<()> {
        let recipe = recipe.to_string_lossy().into_owned();
        let context = context_dir.to_string_lossy().into_owned();
        self.run_checked(
            &["build", "--file", recipe.as_str(), "--tag", tag, context.as_str()],
            None,
            self.transfer_timeout,
        )
        .await
    }

    #[instrument(skip(self, password))]
    async fn login(&self, registry: &str, username: &str, password: &str) -> ServiceResult<()> {
        self.run_checked(
            &["login", "--username", username, "--password-stdin", registry],
            Some(password),
            self.command_timeout,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn tag(&self, source: &str, target: &str) -> ServiceResult<()> {
        self.run_checked(&["tag", source, target], None, self.command_timeout)
            .await
    }

    #[instrument(skip(self))]
    async fn push(&self, target: &str) -> ServiceResult<Vec<String>> {
        let output = self
            .run(&["push", target], None, self.transfer_timeout)
            .await?;

        let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        // A failed push may print nothing recognisable on stdout.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            lines.push(format!("error: {}", stderr.trim()));
        }
        Ok(lines)
    }
}
