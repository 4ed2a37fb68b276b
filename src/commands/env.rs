use crate::workspace::ResolveOptions;
use crate::Workspace;
use anyhow::Result;

pub fn execute(workspace: &Workspace, options: &ResolveOptions, shell: String) -> Result<()> {
    let export = workspace.environment_export(&shell, options)?;
    if export.defaulted {
        eprintln!(
            "Unknown shell '{}'; defaulting to {}.",
            shell,
            export.shell.as_str()
        );
    }
    println!("{}", export.script);

    Ok(())
}
