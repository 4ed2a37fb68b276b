use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{MergeError, Result};

/// Release channel selected for a toolchain.
///
/// Anything other than the three named channels is kept verbatim as an
/// explicit version pin (e.g. `1.75.0` or `nightly-2024-05-01`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
    Nightly,
    Version(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Nightly => "nightly",
            Channel::Version(version) => version,
        }
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "stable" => Channel::Stable,
            "beta" => Channel::Beta,
            "nightly" => Channel::Nightly,
            _ => Channel::Version(value.trim().to_string()),
        }
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The compiler/runtime pin for the primary development language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSpec {
    pub name: String,
    #[serde(default)]
    pub channel: Channel,
    /// Optional components such as `clippy`, `rustfmt` or `rust-analyzer`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    /// Extra compilation targets, e.g. `wasm32-unknown-unknown`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl ToolchainSpec {
    pub fn new(name: impl Into<String>, channel: Channel) -> Self {
        Self {
            name: name.into(),
            channel,
            components: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.channel)?;
        if !self.components.is_empty() {
            write!(f, " [{}]", self.components.join(", "))?;
        }
        if !self.targets.is_empty() {
            write!(f, " ({})", self.targets.join(", "))?;
        }
        Ok(())
    }
}

/// A named command made invocable inside the shell.
///
/// Declared either as a bare string or as `{ exec = "...", description = "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawScript", into = "RawScript")]
pub struct ScriptDefinition {
    pub exec: String,
    pub description: Option<String>,
}

impl ScriptDefinition {
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            exec: exec.into(),
            description: None,
        }
    }
}

impl fmt::Display for ScriptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.exec)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawScript {
    Command(String),
    Table(ScriptTable),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptTable {
    exec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl From<RawScript> for ScriptDefinition {
    fn from(raw: RawScript) -> Self {
        match raw {
            RawScript::Command(exec) => ScriptDefinition::new(exec),
            RawScript::Table(table) => ScriptDefinition {
                exec: table.exec,
                description: table.description,
            },
        }
    }
}

impl From<ScriptDefinition> for RawScript {
    fn from(script: ScriptDefinition) -> Self {
        match script.description {
            None => RawScript::Command(script.exec),
            Some(description) => RawScript::Table(ScriptTable {
                exec: script.exec,
                description: Some(description),
            }),
        }
    }
}

/// One declarative unit of environment configuration (a partial descriptor).
///
/// Every field is optional; an empty TOML document is an empty fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fragment {
    /// Other fragment files merged before this one. Only the loader reads this.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub packages: BTreeSet<String>,
    /// Commands run, in order, when the shell is activated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enter_shell: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, ScriptDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, bool>,
}

impl Fragment {
    /// Parse and validate a fragment from TOML text. `origin` names the
    /// fragment in diagnostics.
    pub fn parse(contents: &str, origin: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let fragment: Fragment = toml::from_str(contents)
            .map_err(|err| MergeError::malformed(origin, err.message().to_string()))?;
        fragment.validate(origin)?;
        Ok(fragment)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.env.is_empty()
            && self.toolchain.is_none()
            && self.scripts.is_empty()
            && self.hooks.is_empty()
            && self.enter_shell.is_empty()
    }

    /// Check identifiers and required fields.
    pub fn validate(&self, origin: &str) -> Result<()> {
        for package in &self.packages {
            if !is_package_name(package) {
                return Err(MergeError::malformed(
                    origin,
                    format!("invalid package identifier '{package}'"),
                ));
            }
        }

        for name in self.env.keys() {
            if !is_env_name(name) {
                return Err(MergeError::malformed(
                    origin,
                    format!("invalid environment variable name '{name}'"),
                ));
            }
        }

        if let Some(toolchain) = &self.toolchain {
            if toolchain.name.trim().is_empty() {
                return Err(MergeError::malformed(origin, "toolchain is missing a name"));
            }
            if toolchain.channel.as_str().is_empty() {
                return Err(MergeError::malformed(
                    origin,
                    format!("toolchain '{}' has an empty channel", toolchain.name),
                ));
            }
        }

        for (name, script) in &self.scripts {
            if !is_command_name(name) {
                return Err(MergeError::malformed(
                    origin,
                    format!("invalid script name '{name}'"),
                ));
            }
            if script.exec.trim().is_empty() {
                return Err(MergeError::malformed(
                    origin,
                    format!("script '{name}' has an empty command"),
                ));
            }
        }

        for name in self.hooks.keys() {
            if !is_command_name(name) {
                return Err(MergeError::malformed(
                    origin,
                    format!("invalid hook name '{name}'"),
                ));
            }
        }

        Ok(())
    }
}

fn package_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+/-]*$").unwrap())
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn command_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").unwrap())
}

pub fn is_package_name(value: &str) -> bool {
    package_pattern().is_match(value)
}

pub fn is_env_name(value: &str) -> bool {
    env_pattern().is_match(value)
}

/// Script and hook names share one rule.
pub fn is_command_name(value: &str) -> bool {
    command_pattern().is_match(value)
}
