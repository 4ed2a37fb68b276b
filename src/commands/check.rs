use crate::lockfile::Lockfile;
use crate::workspace::{ResolveOptions, WorkspacePath};
use crate::{ui, Workspace};
use anyhow::Result;

pub fn execute(workspace: &Workspace, options: &ResolveOptions) -> Result<()> {
    let resolution = match workspace.resolve(options) {
        Ok(resolution) => resolution,
        Err(err) => {
            ui::error(format!("{err:#}"));
            anyhow::bail!("Environment check failed.");
        }
    };

    if resolution.fragments.is_empty() {
        ui::info(format!(
            "No fragment files found in {}.",
            workspace.project_dir().display()
        ));
        return Ok(());
    }

    for loaded in resolution.fragments.iter() {
        ui::status("Loaded", loaded.path.display());
    }

    let descriptor = &resolution.descriptor;
    if let Some(toolchain) = &descriptor.toolchain {
        ui::info(format!("toolchain {toolchain}"));
    }

    if !resolution.paths.is_empty() {
        if let Err(err) = descriptor.interpolated_env(&resolution.paths) {
            ui::error(&err);
            anyhow::bail!("Environment check failed.");
        }
    }

    let unresolved: Vec<&String> = descriptor
        .packages
        .iter()
        .filter(|package| resolution.paths.get(package).is_none())
        .collect();
    if !resolution.paths.is_empty() && !unresolved.is_empty() {
        ui::warn(format!(
            "no install path for {} package(s): {}",
            unresolved.len(),
            unresolved
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let lockfile_path = workspace.path(WorkspacePath::Lockfile);
    if lockfile_path.exists() {
        let lockfile = Lockfile::load(&lockfile_path)?;
        if !lockfile.is_current(descriptor)? {
            ui::warn(format!(
                "{} is out of date; run `shellenv lock`",
                lockfile_path.display()
            ));
        }
    }

    ui::success(
        "Check",
        format!(
            "{} fragment(s): {} package(s), {} variable(s), {} script(s), {} hook(s)",
            resolution.fragments.len(),
            descriptor.packages.len(),
            descriptor.env.len(),
            descriptor.scripts.len(),
            descriptor.enabled_hooks().count()
        ),
    );
    Ok(())
}
