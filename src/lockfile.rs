use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::ResolvedDescriptor;

const LOCKFILE_VERSION: u32 = 1;

/// Snapshot of a resolved descriptor (similar to Cargo.lock).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    /// Version of the lockfile format
    version: u32,
    pub metadata: Metadata,
    pub descriptor: ResolvedDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// When this snapshot was written (RFC 3339)
    pub generated_at: String,
    /// SHA-256 of the descriptor's canonical TOML
    pub digest: String,
    /// Fragment files that contributed, in merge order
    #[serde(default)]
    pub fragments: Vec<PathBuf>,
}

impl Lockfile {
    pub fn new(descriptor: ResolvedDescriptor, fragments: Vec<PathBuf>) -> Result<Self> {
        let digest = descriptor
            .digest()
            .context("Failed to compute descriptor digest")?;
        Ok(Self {
            version: LOCKFILE_VERSION,
            metadata: Metadata {
                generated_at: chrono::Utc::now().to_rfc3339(),
                digest,
                fragments,
            },
            descriptor,
        })
    }

    /// Load lockfile from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read lockfile from {:?}", path))?;

        let lockfile: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse lockfile from {:?}", path))?;

        if lockfile.version != LOCKFILE_VERSION {
            bail!(
                "Unsupported lockfile version {} in {:?} (expected {}); run `shellenv lock` to regenerate it",
                lockfile.version,
                path,
                LOCKFILE_VERSION
            );
        }

        Ok(lockfile)
    }

    /// Save lockfile to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lockfile directory {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize lockfile")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write lockfile to {:?}", path))?;

        Ok(())
    }

    /// Whether `descriptor` matches the snapshot.
    pub fn is_current(&self, descriptor: &ResolvedDescriptor) -> Result<bool> {
        let digest = descriptor
            .digest()
            .context("Failed to compute descriptor digest")?;
        Ok(digest == self.metadata.digest)
    }
}
