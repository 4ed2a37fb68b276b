use crate::cli::{Cli, Commands, ResolveArgs};
use crate::workspace::ResolveOptions;
use crate::Workspace;
use anyhow::Result;

mod check;
mod env;
mod lock;
mod merge;
mod run;

pub fn execute(cli: Cli) -> Result<()> {
    // Create workspace - this is the root entry point
    let workspace = Workspace::new(cli.dir)?;

    match cli.command {
        Commands::Merge {
            resolve,
            format,
            interpolate,
        } => merge::execute(&workspace, &resolve.options(interpolate), format),

        Commands::Check { resolve } => check::execute(&workspace, &resolve.options(false)),

        Commands::Env { resolve, shell } => env::execute(&workspace, &resolve.options(true), shell),

        Commands::Run {
            resolve,
            script,
            args,
        } => run::execute(&workspace, &resolve.options(true), script, args),

        Commands::Lock { resolve } => lock::execute(&workspace, &resolve.options(false)),
    }
}

impl ResolveArgs {
    fn options(&self, interpolate: bool) -> ResolveOptions {
        ResolveOptions {
            on_conflict: self.on_conflict,
            paths_file: self.paths.clone(),
            interpolate,
        }
    }
}
