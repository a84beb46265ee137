//! Cancel command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use hybrid_exec_core::{JobHandle, TaskMetadata};

use super::common::ConfigArgs;

/// Execute the cancel command.
pub async fn execute(
    dispatch_id: &str,
    node_id: u64,
    job_arn: &str,
    config_args: &ConfigArgs,
) -> Result<()> {
    let config = config_args.resolve()?;
    let metadata = TaskMetadata::new(dispatch_id, node_id, Path::new("."));
    let executor = hybrid_exec_aws::connect(config).await?;

    if executor.cancel(&metadata, &JobHandle::new(job_arn)).await {
        println!(
            "{} Cancellation requested for {}",
            style("✓").green().bold(),
            style(job_arn).dim()
        );
        Ok(())
    } else {
        anyhow::bail!("Braket did not accept the cancellation of {job_arn}")
    }
}
