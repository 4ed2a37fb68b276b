use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{self, Config};
use crate::descriptor::ResolvedDescriptor;
use crate::environment::{Environment, EnvironmentExport, Shell};
use crate::interpolate::PackagePaths;
use crate::manifest::{FragmentSet, BASE_FRAGMENT};
use crate::policy::ConflictPolicy;

/// Workspace path types
#[derive(Debug, Clone, Copy)]
pub enum WorkspacePath {
    /// Project root holding `shellenv.toml`
    Root,
    /// Base fragment: project/shellenv.toml
    Fragment,
    /// Lockfile path: project/shellenv.lock
    Lockfile,
    /// Config directory: $XDG_CONFIG_HOME/shellenv
    ConfigDir,
    /// Config file: $XDG_CONFIG_HOME/shellenv/config.toml
    ConfigFile,
}

/// Command-line knobs that change how a project resolves.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Replaces every per-field policy from the config file.
    pub on_conflict: Option<ConflictPolicy>,
    /// Extra package path table layered over the config file's `[paths]`.
    pub paths_file: Option<PathBuf>,
    /// Substitute `${pkgs...}` references while merging.
    pub interpolate: bool,
}

/// Result of loading and merging a project.
#[derive(Debug)]
pub struct Resolution {
    pub fragments: FragmentSet,
    pub paths: PackagePaths,
    pub descriptor: ResolvedDescriptor,
}

/// Workspace - a project directory plus the user's shellenv configuration
#[derive(Debug)]
pub struct Workspace {
    project_dir: PathBuf,
    config_dir: PathBuf,
}

impl Workspace {
    /// Create a workspace rooted at `project_dir` (default: current directory).
    ///
    /// The config directory is `$XDG_CONFIG_HOME/shellenv` (default:
    /// `~/.config/shellenv`).
    pub fn new(project_dir: Option<PathBuf>) -> Result<Self> {
        let project_dir = match project_dir {
            Some(dir) => dir,
            None => env::current_dir().context("Failed to determine current directory")?,
        };
        let config_dir = Self::get_config_dir()?;

        Ok(Self {
            project_dir,
            config_dir,
        })
    }

    /// Get the config directory (XDG_CONFIG_HOME/shellenv)
    fn get_config_dir() -> Result<PathBuf> {
        let base = match env::var("XDG_CONFIG_HOME") {
            Ok(value) if !value.is_empty() => PathBuf::from(value),
            _ => directories::BaseDirs::new()
                .context("Failed to get home directory")?
                .home_dir()
                .join(".config"),
        };

        Ok(base.join("shellenv"))
    }

    /// Get path for a specific workspace location
    pub fn path(&self, path_type: WorkspacePath) -> PathBuf {
        match path_type {
            WorkspacePath::Root => self.project_dir.clone(),
            WorkspacePath::Fragment => self.project_dir.join(BASE_FRAGMENT),
            WorkspacePath::Lockfile => self.project_dir.join("shellenv.lock"),
            WorkspacePath::ConfigDir => self.config_dir.clone(),
            WorkspacePath::ConfigFile => self.config_dir.join("config.toml"),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Load the user config
    pub fn config(&self) -> Result<Config> {
        Config::load(&self.path(WorkspacePath::ConfigFile))
    }

    /// Load every fragment file for this project
    pub fn fragments(&self) -> Result<FragmentSet> {
        FragmentSet::load_from_dir(&self.project_dir)
            .with_context(|| format!("Failed to load fragments from {:?}", self.project_dir))
    }

    /// Load config and fragments and merge them.
    pub fn resolve(&self, options: &ResolveOptions) -> Result<Resolution> {
        let config = self.config()?.with_conflict_override(options.on_conflict);

        let mut paths = config.paths;
        if let Some(file) = &options.paths_file {
            paths.extend(config::load_package_paths(file)?);
        }

        let fragments = self.fragments()?;
        if fragments.is_empty() {
            warn!(
                "no {} found in {:?}; resolving an empty environment",
                BASE_FRAGMENT, self.project_dir
            );
        }

        let interpolation = options.interpolate.then_some(&paths);
        let descriptor = fragments
            .merge(config.policy, interpolation)
            .context("Failed to merge environment fragments")?;

        debug!(
            "resolved {} fragment(s) into {} package(s)",
            fragments.len(),
            descriptor.packages.len()
        );

        Ok(Resolution {
            fragments,
            paths,
            descriptor,
        })
    }

    /// Render the activation script for `shell`, falling back to zsh.
    pub fn environment_export(
        &self,
        shell: &str,
        options: &ResolveOptions,
    ) -> Result<EnvironmentExport> {
        let (shell, defaulted) = match Shell::from_name(shell) {
            Some(shell) => (shell, false),
            None => (Shell::Zsh, true),
        };

        let resolution = self.resolve(options)?;
        let environment = Environment::from_descriptor(&resolution.descriptor, &resolution.paths)
            .context("Failed to resolve package paths")?;

        Ok(EnvironmentExport {
            shell,
            defaulted,
            script: environment.format_for_shell(shell),
        })
    }
}
