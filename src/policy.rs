use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::KeyKind;

/// What the merger does when two fragments assign different values to one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Fail activation with a conflict error.
    #[default]
    Error,
    /// The later fragment replaces the earlier value.
    LastWins,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Error => write!(f, "error"),
            ConflictPolicy::LastWins => write!(f, "last-wins"),
        }
    }
}

/// Per-field override policy handed to the merger.
///
/// Defaults: env vars, scripts and hooks reject divergent redefinitions;
/// the toolchain pin is last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergePolicy {
    pub env: ConflictPolicy,
    pub scripts: ConflictPolicy,
    pub hooks: ConflictPolicy,
    pub toolchain: ConflictPolicy,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            env: ConflictPolicy::Error,
            scripts: ConflictPolicy::Error,
            hooks: ConflictPolicy::Error,
            toolchain: ConflictPolicy::LastWins,
        }
    }
}

impl MergePolicy {
    /// Same policy for every field.
    pub fn uniform(policy: ConflictPolicy) -> Self {
        Self {
            env: policy,
            scripts: policy,
            hooks: policy,
            toolchain: policy,
        }
    }

    pub fn for_kind(&self, kind: KeyKind) -> ConflictPolicy {
        match kind {
            KeyKind::Env => self.env,
            KeyKind::Script => self.scripts,
            KeyKind::Hook => self.hooks,
            KeyKind::Toolchain => self.toolchain,
        }
    }
}
