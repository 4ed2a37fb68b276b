use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::policy::ConflictPolicy;

/// Shell environment - merge declarative development-shell fragments
///
/// shellenv reads `shellenv.toml` (plus platform/host overlays and imports)
/// from a project directory and folds the fragments into one resolved
/// environment: packages, environment variables, a toolchain pin, named
/// scripts and hook registrations.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that merges fragments.
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Override the configured conflict policy for every field
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_conflict: Option<ConflictPolicy>,

    /// TOML table of package install prefixes (`name = "path"`)
    #[arg(long, value_name = "FILE", env = "SHELLENV_PATHS")]
    pub paths: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Toml,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved descriptor
    Merge {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Toml)]
        format: OutputFormat,

        /// Substitute package path references instead of leaving them deferred
        #[arg(long)]
        interpolate: bool,
    },

    /// Validate fragments and report what they resolve to
    Check {
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Output environment setup (used in shell init)
    Env {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Shell type (zsh, bash, fish)
        #[arg(short, long, value_name = "SHELL", default_value = "zsh")]
        shell: String,
    },

    /// Run a named script inside the resolved environment
    ///
    /// Without a script name, lists the available scripts.
    Run {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Script name
        #[arg(value_name = "SCRIPT")]
        script: Option<String>,

        /// Arguments passed to the script
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Write shellenv.lock with a snapshot of the resolved descriptor
    Lock {
        #[command(flatten)]
        resolve: ResolveArgs,
    },
}
