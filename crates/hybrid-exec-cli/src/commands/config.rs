//! Config command implementation.

use anyhow::Result;

use super::common::ConfigArgs;

/// Print the resolved configuration as YAML.
pub fn execute(config_args: &ConfigArgs) -> Result<()> {
    let config = config_args.resolve()?;
    print!("{}", config.to_yaml()?);
    Ok(())
}
