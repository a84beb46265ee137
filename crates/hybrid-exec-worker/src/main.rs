//! hybrid-exec-worker: runs the packaged task inside a Braket job container.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use console::style;
use hybrid_exec_aws::{AwsSession, S3ObjectStore};
use hybrid_exec_core::{EnvConfigStore, ExecutorConfig, ExecutorOptions};
use hybrid_exec_worker::{Worker, WorkerEnv, builtins};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hybrid-exec-worker")]
#[command(author, version, about = "Run a packaged hybrid-exec task", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// List the functions this worker can run and exit
    #[arg(long)]
    list: bool,
}

async fn run() -> anyhow::Result<()> {
    let env = WorkerEnv::from_env().context("Failed to locate task artifacts")?;
    info!(
        "Task package s3://{}/{}, result {}",
        env.bucket, env.input_key, env.output_key
    );

    let config = ExecutorConfig::resolve(ExecutorOptions::default(), &EnvConfigStore::new())?;
    let session = AwsSession::load(&config).await?;
    let backend = Arc::new(S3ObjectStore::new(&session));

    let value = Worker::new(backend, &env, builtins::registry())
        .run(&env)
        .await?;
    println!("{value}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if cli.list {
        for name in builtins::registry().names() {
            println!("{name}");
        }
        return Ok(());
    }

    // A non-zero exit is what marks the Braket job FAILED.
    if let Err(e) = run().await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
