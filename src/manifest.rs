use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use whoami::fallible;

use crate::descriptor::{Merger, ResolvedDescriptor};
use crate::error::{MergeError, Result};
use crate::fragment::Fragment;
use crate::interpolate::PackagePaths;
use crate::policy::MergePolicy;

/// File name of the base fragment in a project directory.
pub const BASE_FRAGMENT: &str = "shellenv.toml";

/// Layer a fragment file was discovered in. Imports inherit the layer of
/// the file that imports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FragmentScope {
    Base,
    Platform,
    Host,
}

/// A fragment together with the file it was read from.
#[derive(Debug, Clone)]
pub struct LoadedFragment {
    pub path: PathBuf,
    pub scope: FragmentScope,
    pub fragment: Fragment,
}

/// All fragments discovered for a project, in merge order.
#[derive(Debug, Default)]
pub struct FragmentSet {
    fragments: Vec<LoadedFragment>,
}

impl FragmentSet {
    /// Load `shellenv.toml`, then the platform and host overlays, expanding
    /// `imports` depth-first ahead of the importing file.
    ///
    /// A directory without `shellenv.toml` yields an empty set.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let base_path = dir.join(BASE_FRAGMENT);
        if !base_path.exists() {
            debug!("no {BASE_FRAGMENT} in {:?}", dir);
            return Ok(Self::default());
        }

        let mut loader = Loader::default();
        loader.load(&base_path, FragmentScope::Base)?;

        if let Some(platform_path) = platform_fragment_path(dir) {
            loader.load(&platform_path, FragmentScope::Platform)?;
        }

        if let Some(host_path) = host_fragment_path(dir) {
            loader.load(&host_path, FragmentScope::Host)?;
        }

        Ok(Self {
            fragments: loader.loaded,
        })
    }

    /// Fold every fragment in order.
    pub fn merge(
        &self,
        policy: MergePolicy,
        paths: Option<&PackagePaths>,
    ) -> Result<ResolvedDescriptor> {
        let mut merger = Merger::new(policy);
        if let Some(paths) = paths {
            merger = merger.with_package_paths(paths);
        }

        for loaded in &self.fragments {
            merger.push(&loaded.path.display().to_string(), &loaded.fragment)?;
        }

        merger.finish()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedFragment> {
        self.fragments.iter()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.fragments.iter().map(|f| f.path.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct Loader {
    loaded: Vec<LoadedFragment>,
    seen: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
}

impl Loader {
    fn load(&mut self, path: &Path, scope: FragmentScope) -> Result<()> {
        let canonical = fs::canonicalize(path).map_err(|source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if self.stack.contains(&canonical) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            return Err(MergeError::malformed(
                path.display(),
                format!("import cycle: {}", chain.join(" -> ")),
            ));
        }

        if !self.seen.insert(canonical.clone()) {
            debug!("skipping already loaded fragment {:?}", canonical);
            return Ok(());
        }

        let contents = fs::read_to_string(&canonical).map_err(|source| MergeError::Io {
            path: canonical.clone(),
            source,
        })?;
        let fragment = Fragment::parse(&contents, &path.display().to_string())?;
        debug!(
            "loaded fragment {:?} ({} package(s), {} import(s))",
            canonical,
            fragment.packages.len(),
            fragment.imports.len()
        );

        let parent = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        self.stack.push(canonical.clone());
        for import in &fragment.imports {
            let import_path = resolve_import(&parent, import);
            self.load(&import_path, scope)?;
        }
        self.stack.pop();

        self.loaded.push(LoadedFragment {
            path: path.to_path_buf(),
            scope,
            fragment,
        });
        Ok(())
    }
}

fn resolve_import(parent: &Path, import: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(import).into_owned());
    if expanded.is_absolute() {
        expanded
    } else {
        parent.join(expanded)
    }
}

fn platform_fragment_path(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(format!("shellenv-{}.toml", platform_slug()));
    path.exists().then_some(path)
}

fn host_fragment_path(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(format!("shellenv-{}.toml", host_slug()));
    path.exists().then_some(path)
}

pub fn platform_slug() -> &'static str {
    std::env::consts::OS
}

/// Lowercased hostname with runs of non-alphanumerics collapsed to `-`.
pub fn host_slug() -> String {
    let raw = fallible::hostname()
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            std::env::var("HOSTNAME")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .or_else(|| {
            std::env::var("COMPUTERNAME")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| "local".to_string());

    slugify(&raw)
}

fn slugify(raw: &str) -> String {
    let mut slug = String::new();
    let mut previous_dash = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            previous_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if !previous_dash {
            previous_dash = true;
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "local".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn file_names(set: &FragmentSet) -> Vec<String> {
        set.iter()
            .map(|f| {
                f.path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn empty_directory_returns_empty_set() {
        let temp = TempDir::new().unwrap();
        let set = FragmentSet::load_from_dir(temp.path()).unwrap();
        assert!(set.is_empty());
        assert!(set.merge(MergePolicy::default(), None).unwrap().is_empty());
    }

    #[test]
    fn overlays_follow_precedence() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        write(
            dir,
            BASE_FRAGMENT,
            r#"
packages = ["git"]

[toolchain]
name = "rust"
channel = "stable"
"#,
        );
        write(
            dir,
            &format!("shellenv-{}.toml", platform_slug()),
            r#"
packages = ["lldb"]

[toolchain]
name = "rust"
channel = "beta"
"#,
        );
        write(
            dir,
            &format!("shellenv-{}.toml", host_slug()),
            r#"
[toolchain]
name = "rust"
channel = "nightly"
"#,
        );

        let set = FragmentSet::load_from_dir(dir).unwrap();
        let scopes: Vec<_> = set.iter().map(|f| f.scope).collect();
        assert_eq!(
            scopes,
            vec![FragmentScope::Base, FragmentScope::Platform, FragmentScope::Host]
        );

        let descriptor = set.merge(MergePolicy::default(), None).unwrap();
        assert_eq!(
            descriptor.toolchain.unwrap().channel.as_str(),
            "nightly"
        );
        assert!(descriptor.packages.contains("lldb"));
    }

    #[test]
    fn imports_are_merged_before_the_importer() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        write(
            dir,
            "shared/rust.toml",
            "packages = [\"rust-analyzer\"]\nenter_shell = [\"echo shared\"]\n",
        );
        write(
            dir,
            BASE_FRAGMENT,
            "imports = [\"shared/rust.toml\"]\nenter_shell = [\"echo local\"]\n",
        );

        let set = FragmentSet::load_from_dir(dir).unwrap();
        assert_eq!(file_names(&set), vec!["rust.toml", BASE_FRAGMENT]);

        let descriptor = set.merge(MergePolicy::default(), None).unwrap();
        assert_eq!(descriptor.enter_shell, vec!["echo shared", "echo local"]);
    }

    #[test]
    fn diamond_imports_load_once() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        write(dir, "common.toml", "packages = [\"git\"]\n");
        write(dir, "a.toml", "imports = [\"common.toml\"]\n");
        write(dir, "b.toml", "imports = [\"common.toml\"]\n");
        write(dir, BASE_FRAGMENT, "imports = [\"a.toml\", \"b.toml\"]\n");

        let set = FragmentSet::load_from_dir(dir).unwrap();
        assert_eq!(
            file_names(&set),
            vec!["common.toml", "a.toml", "b.toml", BASE_FRAGMENT]
        );
    }

    #[test]
    fn import_cycles_are_malformed() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        write(dir, "a.toml", "imports = [\"shellenv.toml\"]\n");
        write(dir, BASE_FRAGMENT, "imports = [\"a.toml\"]\n");

        let error = FragmentSet::load_from_dir(dir).unwrap_err();
        assert!(error.is_malformed());
        assert!(error.to_string().contains("import cycle"), "{error}");
    }

    #[test]
    fn missing_import_is_an_io_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), BASE_FRAGMENT, "imports = [\"nope.toml\"]\n");

        let error = FragmentSet::load_from_dir(temp.path()).unwrap_err();
        assert!(matches!(error, MergeError::Io { .. }));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), BASE_FRAGMENT, "packages = [\n");

        let error = FragmentSet::load_from_dir(temp.path()).unwrap_err();
        assert!(error.is_malformed());
        assert!(error.to_string().contains(BASE_FRAGMENT));
    }

    #[test]
    fn conflicts_across_files_name_both_sources() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        write(dir, "other.toml", "[env]\nFOO = \"bar\"\n");
        write(
            dir,
            BASE_FRAGMENT,
            "imports = [\"other.toml\"]\n[env]\nFOO = \"baz\"\n",
        );

        let set = FragmentSet::load_from_dir(dir).unwrap();
        let error = set.merge(MergePolicy::default(), None).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("other.toml"), "{message}");
        assert!(message.contains(BASE_FRAGMENT), "{message}");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Work.Laptop--01"), "work-laptop-01");
        assert_eq!(slugify("..."), "local");
    }
}
