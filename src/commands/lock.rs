use crate::lockfile::Lockfile;
use crate::workspace::{ResolveOptions, WorkspacePath};
use crate::{ui, Workspace};
use anyhow::Result;

pub fn execute(workspace: &Workspace, options: &ResolveOptions) -> Result<()> {
    let resolution = workspace.resolve(options)?;
    let lockfile = Lockfile::new(resolution.descriptor, resolution.fragments.paths())?;

    let path = workspace.path(WorkspacePath::Lockfile);
    lockfile.save(&path)?;

    ui::success(
        "Locked",
        format!("{} ({})", path.display(), &lockfile.metadata.digest[..12]),
    );
    Ok(())
}
