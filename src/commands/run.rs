use crate::environment::Environment;
use crate::workspace::ResolveOptions;
use crate::{ui, Workspace};
use anyhow::{Context, Result};
use std::env;
use std::process::Command;
use tracing::debug;

pub fn execute(
    workspace: &Workspace,
    options: &ResolveOptions,
    script: Option<String>,
    args: Vec<String>,
) -> Result<()> {
    let resolution = workspace.resolve(options)?;
    let environment = Environment::from_descriptor(&resolution.descriptor, &resolution.paths)
        .context("Failed to resolve package paths")?;

    let Some(name) = script else {
        if environment.scripts.is_empty() {
            ui::info("No scripts defined.");
        }
        for (name, script) in &environment.scripts {
            match &script.description {
                Some(description) => println!("{name}\t{description}"),
                None => println!("{name}\t{}", script.exec),
            }
        }
        return Ok(());
    };

    let script = environment
        .scripts
        .get(&name)
        .with_context(|| format!("No script named '{name}'"))?;

    let mut search_path = environment.bin_paths.clone();
    if let Some(existing) = env::var_os("PATH") {
        search_path.extend(env::split_paths(&existing));
    }
    let search_path = env::join_paths(search_path).context("Invalid PATH entry")?;

    debug!("running script '{name}': {}", script.exec);
    let status = Command::new("sh")
        .arg("-c")
        .arg(&script.exec)
        .arg(&name)
        .args(&args)
        .envs(&environment.variables)
        .env("PATH", search_path)
        .current_dir(workspace.project_dir())
        .status()
        .with_context(|| format!("Failed to start script '{name}'"))?;

    if !status.success() {
        // Exit codes are inherited from the script.
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
