//! Render command implementation.
//!
//! Prints, or writes to a directory, the entry-point script and build recipe
//! that image-build mode would produce for a task.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use hybrid_exec_core::image::{
    CONTAINER_WORKDIR, DOCKERFILE, ENTRYPOINT_SCRIPT, render_entrypoint, render_recipe,
};
use hybrid_exec_core::{ExecutorConfig, PackagingMode, TaskIdentity};

use super::common::ConfigArgs;

/// Entry-point script and recipe for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub entrypoint: String,
    pub recipe: String,
}

/// Render the build context for `identity` under `config`.
pub fn render(identity: &TaskIdentity, config: &ExecutorConfig) -> Rendered {
    let base_image = match &config.packaging {
        PackagingMode::BuildImage { base_image, .. } => base_image.as_str(),
        PackagingMode::Prebuilt { image_uri } => image_uri.as_str(),
    };
    Rendered {
        entrypoint: render_entrypoint(identity, &config.s3_bucket, CONTAINER_WORKDIR),
        recipe: render_recipe(base_image, CONTAINER_WORKDIR),
    }
}

/// Execute the render command.
pub fn execute(
    dispatch_id: &str,
    node_id: u64,
    output: Option<&Path>,
    config_args: &ConfigArgs,
) -> Result<()> {
    let config = config_args.resolve()?;
    let rendered = render(&TaskIdentity::new(dispatch_id, node_id), &config);

    let Some(dir) = output else {
        println!("{}", style(format!("# {ENTRYPOINT_SCRIPT}")).dim());
        print!("{}", rendered.entrypoint);
        println!();
        println!("{}", style(format!("# {DOCKERFILE}")).dim());
        print!("{}", rendered.recipe);
        return Ok(());
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    for (name, contents) in [
        (ENTRYPOINT_SCRIPT, &rendered.entrypoint),
        (DOCKERFILE, &rendered.recipe),
    ] {
        let path = dir.join(name);
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Wrote {}", style("✓").green().bold(), path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_build_base_image() {
        let config = ExecutorConfig {
            packaging: PackagingMode::BuildImage {
                repository: "tasks".into(),
                base_image: "registry/worker:1".into(),
            },
            s3_bucket: "bucket-r".into(),
            ..ExecutorConfig::default()
        };
        let rendered = render(&TaskIdentity::new("d", 9), &config);
        assert!(rendered.recipe.starts_with("FROM registry/worker:1\n"));
        assert!(rendered.entrypoint.contains("HYBRID_EXEC_S3_BUCKET=\"bucket-r\""));
        assert!(rendered.entrypoint.contains("inputs/func-d-9.json"));
    }

    #[test]
    fn test_render_prebuilt_layers_on_image_uri() {
        let rendered = render(&TaskIdentity::new("d", 1), &ExecutorConfig::default());
        assert!(rendered.recipe.contains("FROM public.ecr.aws/covalent/covalent-braket-executor:latest"));
    }
}
