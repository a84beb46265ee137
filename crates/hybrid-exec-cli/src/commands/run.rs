//! Run command implementation.
//!
//! Runs one task to completion. Ctrl-C fires the host's cancellation token;
//! the executor stops at its next checkpoint and cancels any submitted job.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use console::style;
use tracing::warn;

use hybrid_exec_core::{TaskFunction, TaskMetadata};
use hybrid_exec_worker::builtins;

use super::common::{CliHost, ConfigArgs, parse_args, parse_bound, parse_kwargs};

/// Function invocation requested on the command line.
pub struct RunTask<'a> {
    pub function: &'a str,
    pub bound: Option<&'a str>,
    pub args: Option<&'a str>,
    pub kwargs: Option<&'a str>,
    pub dispatch_id: &'a str,
    pub node_id: u64,
    pub results_dir: &'a Path,
}

/// Execute the run command.
pub async fn execute(task: RunTask<'_>, config_args: &ConfigArgs) -> Result<()> {
    let function = TaskFunction::new(task.function).with_bound(parse_bound(task.bound)?);
    let args = parse_args(task.args)?;
    let kwargs = parse_kwargs(task.kwargs)?;

    if !builtins::registry().contains(&function.name) {
        warn!(
            "'{}' is not a builtin; the worker image must register it",
            function.name
        );
    }

    let config = config_args.resolve()?;
    let executor = hybrid_exec_aws::connect(config).await?;
    let metadata = TaskMetadata::new(task.dispatch_id, task.node_id, task.results_dir);
    let host = Arc::new(CliHost::new());

    println!(
        "{} Running {} as task {}",
        style("→").cyan().bold(),
        style(&function.name).bold(),
        style(&metadata.identity).dim()
    );

    let interrupt = {
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            match host.job_handle() {
                Some(handle) => {
                    eprintln!("{} Cancelling job {}...", style("!").yellow().bold(), handle)
                }
                None => eprintln!("{} Cancelling task...", style("!").yellow().bold()),
            }
            host.request_cancel();
        })
    };

    let outcome = executor
        .run(&function, &args, &kwargs, &metadata, host.as_ref())
        .await;
    interrupt.abort();

    match outcome {
        Ok(value) => {
            println!("{} Result:", style("✓").green().bold());
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) if e.is_cancellation() => {
            println!("{} {}", style("✗").red().bold(), e);
            anyhow::bail!("Task {} was cancelled", metadata.identity)
        }
        Err(e) => Err(e.into()),
    }
}
