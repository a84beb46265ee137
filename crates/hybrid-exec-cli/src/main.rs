//! hybrid-exec: run workflow tasks on AWS Braket Hybrid Jobs.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::ConfigArgs;
use commands::{cancel, config, render, run};

#[derive(Parser)]
#[command(name = "hybrid-exec")]
#[command(author, version, about = "Run workflow tasks on AWS Braket Hybrid Jobs", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task as a Braket job and print its result
    Run {
        /// Registered function name
        #[arg(short, long)]
        function: String,

        /// Bound state of the function (JSON)
        #[arg(long)]
        bound: Option<String>,

        /// Positional arguments (JSON array, or a single JSON value)
        #[arg(short, long)]
        args: Option<String>,

        /// Keyword arguments (JSON object)
        #[arg(short, long)]
        kwargs: Option<String>,

        /// Dispatch identifier
        #[arg(long)]
        dispatch_id: String,

        /// Node identifier within the dispatch
        #[arg(long)]
        node_id: u64,

        /// Directory the result file is downloaded to
        #[arg(long, default_value = "./results")]
        results_dir: PathBuf,
    },

    /// Request cancellation of a submitted job
    Cancel {
        /// Dispatch identifier
        #[arg(long)]
        dispatch_id: String,

        /// Node identifier within the dispatch
        #[arg(long)]
        node_id: u64,

        /// Job ARN returned at submission
        #[arg(long)]
        job_arn: String,
    },

    /// Print the resolved configuration as YAML
    Config,

    /// Print the entry-point script and build recipe for a task
    Render {
        /// Dispatch identifier
        #[arg(long)]
        dispatch_id: String,

        /// Node identifier within the dispatch
        #[arg(long)]
        node_id: u64,

        /// Write the files to this directory instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Run {
            function,
            bound,
            args,
            kwargs,
            dispatch_id,
            node_id,
            results_dir,
        } => {
            run::execute(
                run::RunTask {
                    function: &function,
                    bound: bound.as_deref(),
                    args: args.as_deref(),
                    kwargs: kwargs.as_deref(),
                    dispatch_id: &dispatch_id,
                    node_id,
                    results_dir: &results_dir,
                },
                &cli.config,
            )
            .await
        }

        Commands::Cancel {
            dispatch_id,
            node_id,
            job_arn,
        } => cancel::execute(&dispatch_id, node_id, &job_arn, &cli.config).await,

        Commands::Config => config::execute(&cli.config),

        Commands::Render {
            dispatch_id,
            node_id,
            output,
        } => render::execute(&dispatch_id, node_id, output.as_deref(), &cli.config),
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hybrid-exec",
            "render",
            "--dispatch-id",
            "d",
            "--node-id",
            "2",
            "--s3-bucket",
            "other",
        ])
        .unwrap();
        assert_eq!(cli.config.s3_bucket.as_deref(), Some("other"));
        assert!(matches!(cli.command, Commands::Render { node_id: 2, .. }));
    }
}
