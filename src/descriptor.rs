use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;
use tracing::debug;

use crate::error::{KeyKind, MergeError, Result};
use crate::fragment::{Fragment, ScriptDefinition, ToolchainSpec};
use crate::interpolate::{self, PackagePaths};
use crate::policy::{ConflictPolicy, MergePolicy};

/// The fully merged, ready-to-activate environment specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolvedDescriptor {
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub packages: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enter_shell: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSpec>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, ScriptDefinition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, bool>,
}

impl ResolvedDescriptor {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.env.is_empty()
            && self.toolchain.is_none()
            && self.scripts.is_empty()
            && self.hooks.is_empty()
            && self.enter_shell.is_empty()
    }

    /// Names of hooks registered as enabled.
    pub fn enabled_hooks(&self) -> impl Iterator<Item = &str> {
        self.hooks
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.as_str())
    }

    /// Env map with every `${pkgs...}` reference replaced by its install path.
    pub fn interpolated_env(&self, paths: &PackagePaths) -> Result<BTreeMap<String, String>> {
        self.env
            .iter()
            .map(|(name, value)| {
                interpolate::interpolate(value, &self.packages, paths)
                    .map(|resolved| (name.clone(), resolved))
                    .map_err(|reason| MergeError::malformed(format!("env.{name}"), reason))
            })
            .collect()
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// SHA-256 over the canonical TOML form.
    pub fn digest(&self) -> std::result::Result<String, toml::ser::Error> {
        let mut hasher = Sha256::new();
        hasher.update(toml::to_string(self)?.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

impl From<ResolvedDescriptor> for Fragment {
    fn from(descriptor: ResolvedDescriptor) -> Self {
        Fragment {
            imports: Vec::new(),
            packages: descriptor.packages,
            enter_shell: descriptor.enter_shell,
            env: descriptor.env,
            toolchain: descriptor.toolchain,
            scripts: descriptor.scripts,
            hooks: descriptor.hooks,
        }
    }
}

/// Left fold over fragments.
///
/// Each pushed fragment is validated and then folded into the running
/// descriptor under the configured [`MergePolicy`]. Identical redefinitions
/// are never conflicts.
///
/// `enter_shell` is the only order-sensitive field: commands keep the order
/// in which they were first pushed and a command already present is not
/// repeated.
#[derive(Debug)]
pub struct Merger<'a> {
    policy: MergePolicy,
    paths: Option<&'a PackagePaths>,
    descriptor: ResolvedDescriptor,
    origins: HashMap<(KeyKind, String), String>,
    pushed: usize,
}

impl<'a> Merger<'a> {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            paths: None,
            descriptor: ResolvedDescriptor::default(),
            origins: HashMap::new(),
            pushed: 0,
        }
    }

    /// Resolve `${pkgs...}` references in [`Merger::finish`] instead of
    /// leaving them deferred.
    pub fn with_package_paths(mut self, paths: &'a PackagePaths) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Fold one fragment. `origin` names it in diagnostics.
    ///
    /// On error the merger is left exactly as it was before the call.
    pub fn push(&mut self, origin: &str, fragment: &Fragment) -> Result<()> {
        fragment.validate(origin)?;

        if !fragment.imports.is_empty() {
            debug!("{origin}: ignoring imports outside of the fragment loader");
        }

        let mut staged = self.descriptor.clone();
        let mut origins = self.origins.clone();

        staged.packages.extend(fragment.packages.iter().cloned());
        for command in &fragment.enter_shell {
            if !staged.enter_shell.contains(command) {
                staged.enter_shell.push(command.clone());
            }
        }

        for (name, value) in &fragment.env {
            merge_key(
                &mut staged.env,
                &mut origins,
                self.policy.env,
                KeyKind::Env,
                origin,
                name,
                value,
            )?;
        }

        for (name, script) in &fragment.scripts {
            merge_key(
                &mut staged.scripts,
                &mut origins,
                self.policy.scripts,
                KeyKind::Script,
                origin,
                name,
                script,
            )?;
        }

        for (name, enabled) in &fragment.hooks {
            merge_key(
                &mut staged.hooks,
                &mut origins,
                self.policy.hooks,
                KeyKind::Hook,
                origin,
                name,
                enabled,
            )?;
        }

        if let Some(toolchain) = &fragment.toolchain {
            merge_toolchain(
                &mut staged.toolchain,
                &mut origins,
                self.policy.toolchain,
                origin,
                toolchain,
            )?;
        }

        self.descriptor = staged;
        self.origins = origins;
        self.pushed += 1;
        Ok(())
    }

    /// Check references and produce the descriptor.
    pub fn finish(self) -> Result<ResolvedDescriptor> {
        let mut descriptor = self.descriptor;

        for (name, value) in &descriptor.env {
            interpolate::check_declared(value, &descriptor.packages).map_err(|reason| {
                let origin = self
                    .origins
                    .get(&(KeyKind::Env, name.clone()))
                    .cloned()
                    .unwrap_or_else(|| format!("env.{name}"));
                MergeError::malformed(origin, reason)
            })?;
        }

        if let Some(paths) = self.paths {
            descriptor.env = descriptor.interpolated_env(paths)?;
        }

        debug!(
            fragments = self.pushed,
            packages = descriptor.packages.len(),
            env = descriptor.env.len(),
            scripts = descriptor.scripts.len(),
            "merged environment descriptor"
        );
        Ok(descriptor)
    }
}

fn merge_toolchain(
    slot: &mut Option<ToolchainSpec>,
    origins: &mut HashMap<(KeyKind, String), String>,
    policy: ConflictPolicy,
    origin: &str,
    toolchain: &ToolchainSpec,
) -> Result<()> {
    let key = (KeyKind::Toolchain, String::new());
    match slot {
        Some(current) if *current == *toolchain => {}
        Some(current) => {
            let previous = origins.get(&key).cloned().unwrap_or_default();
            match policy {
                ConflictPolicy::Error => {
                    return Err(MergeError::conflict(
                        KeyKind::Toolchain,
                        toolchain.name.clone(),
                        (current.to_string(), previous),
                        (toolchain, origin),
                    ));
                }
                ConflictPolicy::LastWins => {
                    debug!("{origin}: toolchain {toolchain} overrides {current} from {previous}");
                    *current = toolchain.clone();
                    origins.insert(key, origin.to_string());
                }
            }
        }
        None => {
            *slot = Some(toolchain.clone());
            origins.insert(key, origin.to_string());
        }
    }
    Ok(())
}

fn merge_key<V>(
    map: &mut BTreeMap<String, V>,
    origins: &mut HashMap<(KeyKind, String), String>,
    policy: ConflictPolicy,
    kind: KeyKind,
    origin: &str,
    name: &str,
    value: &V,
) -> Result<()>
where
    V: Clone + PartialEq + Display,
{
    let key = (kind, name.to_string());
    match map.get(name) {
        Some(current) if current == value => {}
        Some(current) => {
            let previous = origins.get(&key).cloned().unwrap_or_default();
            match policy {
                ConflictPolicy::Error => {
                    return Err(MergeError::conflict(
                        kind,
                        name,
                        (current, previous),
                        (value, origin),
                    ));
                }
                ConflictPolicy::LastWins => {
                    debug!("{origin}: {kind} '{name}' overrides value from {previous}");
                    map.insert(name.to_string(), value.clone());
                    origins.insert(key, origin.to_string());
                }
            }
        }
        None => {
            map.insert(name.to_string(), value.clone());
            origins.insert(key, origin.to_string());
        }
    }
    Ok(())
}

/// Merge fragments under the default policy.
pub fn merge<'f>(fragments: impl IntoIterator<Item = &'f Fragment>) -> Result<ResolvedDescriptor> {
    merge_with(fragments, MergePolicy::default())
}

/// Merge fragments under an explicit policy. Fragments are named
/// `fragment #N` (1-based) in diagnostics.
pub fn merge_with<'f>(
    fragments: impl IntoIterator<Item = &'f Fragment>,
    policy: MergePolicy,
) -> Result<ResolvedDescriptor> {
    let mut merger = Merger::new(policy);
    for (index, fragment) in fragments.into_iter().enumerate() {
        merger.push(&format!("fragment #{}", index + 1), fragment)?;
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Channel;

    fn fragment(contents: &str) -> Fragment {
        Fragment::parse(contents, "test").unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn empty_sequence_is_empty_descriptor() {
        let none: Vec<Fragment> = Vec::new();
        let descriptor = merge(&none).unwrap();
        assert!(descriptor.is_empty());
        assert_eq!(descriptor, ResolvedDescriptor::default());
    }

    #[test]
    fn git_and_lldb_scenario() {
        let a = fragment("packages = [\"git\"]\n");
        let b = fragment("packages = [\"git\", \"lldb\"]\n[env]\nFOO = \"bar\"\n");

        let descriptor = merge([&a, &b]).unwrap();
        assert_eq!(descriptor.packages, set(&["git", "lldb"]));
        assert_eq!(descriptor.env.len(), 1);
        assert_eq!(descriptor.env["FOO"], "bar");
        assert!(descriptor.toolchain.is_none());
        assert!(descriptor.scripts.is_empty());
        assert!(descriptor.hooks.is_empty());
    }

    #[test]
    fn disjoint_packages_union_without_duplicates() {
        let a = fragment("packages = [\"git\", \"jq\"]\n");
        let b = fragment("packages = [\"lldb\", \"jq\"]\n");
        let c = fragment("packages = [\"kubectl\"]\n");

        let descriptor = merge([&a, &b, &c]).unwrap();
        assert_eq!(descriptor.packages, set(&["git", "jq", "kubectl", "lldb"]));
    }

    #[test]
    fn merge_is_idempotent() {
        let fragments = vec![
            fragment("packages = [\"git\"]\nenter_shell = [\"echo hi\"]\n[env]\nA = \"1\"\n"),
            fragment("[toolchain]\nname = \"rust\"\nchannel = \"stable\"\n[hooks]\nrustfmt = true\n"),
            fragment("[scripts]\ncrdgen = \"cargo run --bin crdgen\"\n"),
        ];

        let once = merge(&fragments).unwrap();
        let again = merge([&Fragment::from(once.clone())]).unwrap();
        assert_eq!(again, once);
    }

    #[test]
    fn grouping_and_order_do_not_matter_without_conflicts() {
        let a = fragment("packages = [\"git\"]\n[env]\nA = \"1\"\n");
        let b = fragment("packages = [\"lldb\"]\n[scripts]\nbuild = \"cargo build\"\n");
        let c = fragment("[hooks]\nclippy = true\n[env]\nC = \"3\"\n");

        let flat = merge([&a, &b, &c]).unwrap();

        let left = Fragment::from(merge([&a, &b]).unwrap());
        let left_grouped = merge([&left, &c]).unwrap();

        let right = Fragment::from(merge([&b, &c]).unwrap());
        let right_grouped = merge([&a, &right]).unwrap();

        let reversed = merge([&c, &b, &a]).unwrap();

        assert_eq!(flat, left_grouped);
        assert_eq!(flat, right_grouped);
        assert_eq!(flat, reversed);
    }

    #[test]
    fn divergent_env_is_a_conflict() {
        let a = fragment("[env]\nFOO = \"bar\"\n");
        let b = fragment("[env]\nFOO = \"baz\"\n");

        let error = merge([&a, &b]).unwrap_err();
        assert!(error.is_conflict());
        let message = error.to_string();
        assert!(message.contains("'FOO'"), "{message}");
        assert!(message.contains("fragment #1"), "{message}");
        assert!(message.contains("fragment #2"), "{message}");
    }

    #[test]
    fn identical_redefinitions_are_not_conflicts() {
        let a = fragment("[env]\nFOO = \"bar\"\n[scripts]\nx = \"true\"\n[hooks]\nfmt = true\n");
        let descriptor = merge([&a, &a.clone()]).unwrap();
        assert_eq!(descriptor.env["FOO"], "bar");
    }

    #[test]
    fn divergent_script_and_hook_are_conflicts_by_default() {
        let a = fragment("[scripts]\nbuild = \"cargo build\"\n");
        let b = fragment("[scripts]\nbuild = \"make\"\n");
        assert!(merge([&a, &b]).unwrap_err().is_conflict());

        let a = fragment("[hooks]\nclippy = true\n");
        let b = fragment("[hooks]\nclippy = false\n");
        assert!(merge([&a, &b]).unwrap_err().is_conflict());
    }

    #[test]
    fn last_wins_policy_takes_later_value() {
        let a = fragment("[env]\nFOO = \"bar\"\n[hooks]\nclippy = true\n");
        let b = fragment("[env]\nFOO = \"baz\"\n[hooks]\nclippy = false\n");

        let descriptor =
            merge_with([&a, &b], MergePolicy::uniform(ConflictPolicy::LastWins)).unwrap();
        assert_eq!(descriptor.env["FOO"], "baz");
        assert_eq!(descriptor.enabled_hooks().count(), 0);
    }

    #[test]
    fn toolchain_last_one_wins_by_default() {
        let a = fragment("[toolchain]\nname = \"rust\"\nchannel = \"stable\"\n");
        let b = fragment("[toolchain]\nname = \"rust\"\nchannel = \"nightly\"\n");

        let descriptor = merge([&a, &b]).unwrap();
        assert_eq!(descriptor.toolchain.unwrap().channel, Channel::Nightly);

        let strict = MergePolicy::uniform(ConflictPolicy::Error);
        assert!(merge_with([&a, &b], strict).unwrap_err().is_conflict());
    }

    #[test]
    fn enter_shell_is_concatenated_in_order() {
        let a = fragment("enter_shell = [\"echo one\"]\n");
        let b = fragment("enter_shell = [\"echo two\"]\n");
        let descriptor = merge([&a, &b]).unwrap();
        assert_eq!(descriptor.enter_shell, vec!["echo one", "echo two"]);

        let reversed = merge([&b, &a]).unwrap();
        assert_eq!(reversed.enter_shell, vec!["echo two", "echo one"]);
    }

    #[test]
    fn enter_shell_keeps_first_occurrence_only() {
        let a = fragment("enter_shell = [\"echo a\", \"echo shared\"]\n");
        let b = fragment("enter_shell = [\"echo shared\", \"echo b\"]\n");

        let twice = merge([&a, &a]).unwrap();
        assert_eq!(twice.enter_shell, vec!["echo a", "echo shared"]);

        let both = merge([&a, &b]).unwrap();
        assert_eq!(both.enter_shell, vec!["echo a", "echo shared", "echo b"]);
    }

    #[test]
    fn enter_shell_survives_regrouping() {
        let a = fragment("enter_shell = [\"echo a\"]\n");
        let b = fragment("enter_shell = [\"echo b\", \"echo a\"]\n");
        let c = fragment("enter_shell = [\"echo c\", \"echo b\"]\n");

        let flat = merge([&a, &b, &c]).unwrap();
        let left = Fragment::from(merge([&a, &b]).unwrap());
        let right = Fragment::from(merge([&b, &c]).unwrap());

        assert_eq!(flat.enter_shell, vec!["echo a", "echo b", "echo c"]);
        assert_eq!(merge([&left, &c]).unwrap(), flat);
        assert_eq!(merge([&a, &right]).unwrap(), flat);
    }

    #[test]
    fn rejected_fragment_leaves_merger_untouched() {
        let a = fragment("packages = [\"git\"]\nenter_shell = [\"echo a\"]\n[env]\nFOO = \"bar\"\n");
        let b = fragment(
            "packages = [\"lldb\"]\nenter_shell = [\"echo b\"]\n[env]\nAAA = \"1\"\nFOO = \"baz\"\n",
        );

        let mut merger = Merger::new(MergePolicy::default());
        merger.push("a", &a).unwrap();
        let error = merger.push("b", &b).unwrap_err();
        assert!(error.is_conflict());

        let descriptor = merger.finish().unwrap();
        assert_eq!(descriptor, merge([&a]).unwrap());
        assert!(!descriptor.packages.contains("lldb"));
        assert!(!descriptor.env.contains_key("AAA"));
        assert_eq!(descriptor.enter_shell, vec!["echo a"]);
    }

    #[test]
    fn rejected_toolchain_keeps_earlier_keys_out() {
        let a = fragment("[toolchain]\nname = \"rust\"\nchannel = \"stable\"\n");
        let b = fragment(
            "[hooks]\nclippy = true\n[toolchain]\nname = \"rust\"\nchannel = \"nightly\"\n",
        );
        let c = fragment("[hooks]\nclippy = false\n");

        let mut merger = Merger::new(MergePolicy::uniform(ConflictPolicy::Error));
        merger.push("a", &a).unwrap();
        assert!(merger.push("b", &b).unwrap_err().is_conflict());
        merger.push("c", &c).unwrap();

        let descriptor = merger.finish().unwrap();
        assert_eq!(descriptor.toolchain.unwrap().channel, Channel::Stable);
        assert!(!descriptor.hooks["clippy"]);
    }

    #[test]
    fn malformed_fragment_stops_the_merge() {
        let mut bad = Fragment::default();
        bad.packages.insert("not valid".to_string());
        let good = fragment("packages = [\"git\"]\n");

        let error = merge([&good, &bad]).unwrap_err();
        assert!(error.is_malformed());
        assert!(error.to_string().contains("fragment #2"));
    }

    #[test]
    fn references_must_name_declared_packages() {
        let a = fragment("[env]\nPKG_CONFIG_PATH = \"${pkgs.openssl}/lib/pkgconfig\"\n");
        let error = merge([&a]).unwrap_err();
        assert!(error.is_malformed());

        let b = fragment("packages = [\"openssl\"]\n");
        let descriptor = merge([&a, &b]).unwrap();
        assert_eq!(
            descriptor.env["PKG_CONFIG_PATH"],
            "${pkgs.openssl}/lib/pkgconfig"
        );
    }

    #[test]
    fn package_paths_are_resolved_when_supplied() {
        let a = fragment(
            "packages = [\"openssl\"]\n[env]\nPKG_CONFIG_PATH = \"${pkgs.openssl}/lib/pkgconfig\"\n",
        );
        let mut paths = PackagePaths::new();
        paths.insert("openssl", "/opt/openssl");

        let mut merger = Merger::new(MergePolicy::default()).with_package_paths(&paths);
        merger.push("shellenv.toml", &a).unwrap();
        let descriptor = merger.finish().unwrap();
        assert_eq!(descriptor.env["PKG_CONFIG_PATH"], "/opt/openssl/lib/pkgconfig");
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let a = merge([&fragment("packages = [\"git\"]\n")]).unwrap();
        let b = merge([&fragment("packages = [\"git\", \"lldb\"]\n")]).unwrap();
        assert_eq!(a.digest().unwrap(), a.clone().digest().unwrap());
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }
}
