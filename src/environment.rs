use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::descriptor::ResolvedDescriptor;
use crate::error::Result;
use crate::fragment::ScriptDefinition;
use crate::interpolate::PackagePaths;

/// Shell type for environment generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Zsh,
    Bash,
    Fish,
}

impl Shell {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "zsh" => Some(Shell::Zsh),
            "bash" => Some(Shell::Bash),
            "fish" => Some(Shell::Fish),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shell::Zsh => "zsh",
            Shell::Bash => "bash",
            Shell::Fish => "fish",
        }
    }
}

/// Everything an activated shell needs, with package references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub bin_paths: Vec<PathBuf>,
    pub variables: BTreeMap<String, String>,
    pub scripts: BTreeMap<String, ScriptDefinition>,
    pub enter_shell: Vec<String>,
}

impl Environment {
    /// Resolve a descriptor against the package path table.
    ///
    /// Toolchain and hook registrations are exposed as `SHELLENV_TOOLCHAIN`
    /// and `SHELLENV_HOOKS`; a `rust` toolchain also sets `RUSTUP_TOOLCHAIN`.
    pub fn from_descriptor(descriptor: &ResolvedDescriptor, paths: &PackagePaths) -> Result<Self> {
        let mut variables = descriptor.interpolated_env(paths)?;

        if let Some(toolchain) = &descriptor.toolchain {
            variables.insert(
                "SHELLENV_TOOLCHAIN".to_string(),
                format!("{}@{}", toolchain.name, toolchain.channel),
            );
            if toolchain.name == "rust" {
                variables
                    .entry("RUSTUP_TOOLCHAIN".to_string())
                    .or_insert_with(|| toolchain.channel.to_string());
            }
        }

        let hooks: Vec<&str> = descriptor.enabled_hooks().collect();
        if !hooks.is_empty() {
            variables.insert("SHELLENV_HOOKS".to_string(), hooks.join(" "));
        }

        Ok(Self {
            bin_paths: paths.bin_dirs(&descriptor.packages),
            variables,
            scripts: descriptor.scripts.clone(),
            enter_shell: descriptor.enter_shell.clone(),
        })
    }

    /// Format the environment for the given shell
    pub fn format_for_shell(&self, shell: Shell) -> String {
        match shell {
            Shell::Zsh | Shell::Bash => self.format_posix(),
            Shell::Fish => self.format_fish(),
        }
    }

    fn format_posix(&self) -> String {
        let mut lines = Vec::new();

        if !self.bin_paths.is_empty() {
            let joined: Vec<String> = self
                .bin_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            lines.push(format!(
                "export PATH={}:\"$PATH\"",
                posix_quote(&joined.join(":"))
            ));
        }

        for (name, value) in &self.variables {
            lines.push(format!("export {}={}", name, posix_quote(value)));
        }

        for (name, script) in &self.scripts {
            if let Some(description) = &script.description {
                lines.push(format!("# {description}"));
            }
            lines.push(format!("{name}() {{\n{}\n}}", script.exec.trim_end()));
        }

        lines.extend(self.enter_shell.iter().cloned());
        lines.join("\n")
    }

    fn format_fish(&self) -> String {
        let mut lines = Vec::new();

        if !self.bin_paths.is_empty() {
            let joined: Vec<String> = self
                .bin_paths
                .iter()
                .map(|p| fish_quote(&p.display().to_string()))
                .collect();
            lines.push(format!("set -gx PATH {} $PATH", joined.join(" ")));
        }

        for (name, value) in &self.variables {
            lines.push(format!("set -gx {} {}", name, fish_quote(value)));
        }

        for (name, script) in &self.scripts {
            let header = match &script.description {
                Some(description) => {
                    format!("function {name} --description {}", fish_quote(description))
                }
                None => format!("function {name}"),
            };
            lines.push(format!("{header}\n    {}\nend", script.exec.trim_end()));
        }

        lines.extend(self.enter_shell.iter().cloned());
        lines.join("\n")
    }
}

/// Activation script plus the shell it was rendered for.
#[derive(Debug, Clone)]
pub struct EnvironmentExport {
    pub shell: Shell,
    /// True when the requested shell was unknown and zsh was used instead.
    pub defaulted: bool,
    pub script: String,
}

fn posix_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn fish_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}
