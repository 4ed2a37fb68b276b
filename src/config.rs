use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::interpolate::PackagePaths;
use crate::policy::{ConflictPolicy, MergePolicy};

/// User configuration stored in `$XDG_CONFIG_HOME/shellenv/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub policy: MergePolicy,
    /// Install prefixes for packages, keyed by package identifier.
    #[serde(skip_serializing_if = "PackagePaths::is_empty")]
    pub paths: PackagePaths,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            toml::to_string_pretty(self).context("Failed to serialize shellenv config file")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }

    /// Replace every field policy with `policy` when one is given on the command line.
    pub fn with_conflict_override(mut self, policy: Option<ConflictPolicy>) -> Self {
        if let Some(policy) = policy {
            self.policy = MergePolicy::uniform(policy);
        }
        self
    }
}

/// Read a standalone `name = "prefix"` table, as produced by the package provisioner.
pub fn load_package_paths(path: &Path) -> Result<PackagePaths> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read package paths {:?}", path))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse package paths {:?}", path))
}
