use crate::cli::OutputFormat;
use crate::workspace::ResolveOptions;
use crate::Workspace;
use anyhow::{Context, Result};

pub fn execute(workspace: &Workspace, options: &ResolveOptions, format: OutputFormat) -> Result<()> {
    let resolution = workspace.resolve(options)?;
    let descriptor = &resolution.descriptor;

    let output = match format {
        OutputFormat::Toml => descriptor
            .to_toml()
            .context("Failed to serialize descriptor as TOML")?,
        OutputFormat::Json => serde_json::to_string_pretty(descriptor)
            .context("Failed to serialize descriptor as JSON")?,
    };
    print!("{output}");
    if !output.is_empty() && !output.ends_with('\n') {
        println!();
    }

    Ok(())
}
