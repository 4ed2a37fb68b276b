//! Deferred package path references.
//!
//! An environment value may embed `${pkgs.<name>}` (or `${pkgs.<name>.<output>}`)
//! to point at a package's install location. The location is looked up in a
//! [`PackagePaths`] table supplied by whatever provisions the packages; a
//! literal `${pkgs.` is written as `$${pkgs.`. Nothing else in a value is
//! touched here, and values are exported single-quoted, so any other `${...}`
//! reaches the shell literally.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Package identifier -> install prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackagePaths(BTreeMap<String, PathBuf>);

impl PackagePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, package: impl Into<String>, path: impl Into<PathBuf>) {
        self.0.insert(package.into(), path.into());
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.0.get(key).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries from `other` replace entries with the same key.
    pub fn extend(&mut self, other: PackagePaths) {
        self.0.extend(other.0);
    }

    /// `bin/` directories of the given packages that have a known prefix, in package order.
    pub fn bin_dirs<'a>(&self, packages: impl IntoIterator<Item = &'a String>) -> Vec<PathBuf> {
        packages
            .into_iter()
            .filter_map(|package| self.get(package))
            .map(|prefix| prefix.join("bin"))
            .collect()
    }
}

impl FromIterator<(String, PathBuf)> for PackagePaths {
    fn from_iter<T: IntoIterator<Item = (String, PathBuf)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single `${pkgs...}` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub package: String,
    pub output: Option<String>,
}

impl PackageRef {
    /// Lookup key in the path table: `name` or `name.output`.
    pub fn key(&self) -> String {
        match &self.output {
            Some(output) => format!("{}.{}", self.package, output),
            None => self.package.clone(),
        }
    }

    /// Split `text` into the longest declared package and the output after it.
    ///
    /// Package names may themselves contain dots, so `py.black.dev` is
    /// `py.black` + `dev` when `py.black` is declared and `py` + `black.dev`
    /// when only `py` is.
    pub fn resolve(text: &str, packages: &BTreeSet<String>) -> Option<Self> {
        if packages.contains(text) {
            return Some(Self {
                package: text.to_string(),
                output: None,
            });
        }

        let mut end = text.len();
        while let Some(dot) = text[..end].rfind('.') {
            let output = &text[dot + 1..];
            if !output.is_empty() && packages.contains(&text[..dot]) {
                return Some(Self {
                    package: text[..dot].to_string(),
                    output: Some(output.to_string()),
                });
            }
            end = dot;
        }
        None
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\$?)\$\{pkgs\.([A-Za-z0-9][A-Za-z0-9._+/-]*)\}").unwrap()
    })
}

fn opening_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\$?)\$\{pkgs\.").unwrap())
}

/// Text between `${pkgs.` and `}` for every unescaped reference.
///
/// Fails when an unescaped `${pkgs.` does not close over a package identifier.
fn reference_texts(value: &str) -> Result<Vec<&str>, String> {
    let mut texts = Vec::new();
    let mut starts = Vec::new();
    for caps in reference_pattern().captures_iter(value) {
        if caps[1].is_empty() {
            if let (Some(whole), Some(text)) = (caps.get(0), caps.get(2)) {
                starts.push(whole.start());
                texts.push(text.as_str());
            }
        }
    }

    for caps in opening_pattern().captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        if caps[1].is_empty() && !starts.contains(&whole.start()) {
            return Err(format!(
                "invalid package reference '{}'",
                &value[whole.start()..]
            ));
        }
    }

    Ok(texts)
}

/// All unescaped references in `value`, in order of appearance, split
/// against the declared `packages`.
pub fn references(value: &str, packages: &BTreeSet<String>) -> Result<Vec<PackageRef>, String> {
    reference_texts(value)?
        .into_iter()
        .map(|text| {
            PackageRef::resolve(text, packages).ok_or_else(|| {
                format!("'${{pkgs.{text}}}' references undeclared package '{text}'")
            })
        })
        .collect()
}

/// Fail with a reason when `value` references a package outside `packages`
/// or holds a `${pkgs.` that is not a reference.
pub fn check_declared(value: &str, packages: &BTreeSet<String>) -> Result<(), String> {
    references(value, packages).map(|_| ())
}

/// Substitute every reference in `value` with its install path.
///
/// The error string names the first reference that cannot be resolved.
pub fn interpolate(
    value: &str,
    packages: &BTreeSet<String>,
    paths: &PackagePaths,
) -> Result<String, String> {
    check_declared(value, packages)?;

    let mut missing = None;
    let replaced = reference_pattern().replace_all(value, |caps: &Captures<'_>| {
        if !caps[1].is_empty() {
            // `$${pkgs.x}` drops one `$` and stays literal.
            return caps[0][1..].to_string();
        }

        let key = &caps[2];
        match paths.get(key) {
            Some(path) => path.display().to_string(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(key) => Err(format!("no install path known for package '{key}'")),
        None => Ok(replaced.into_owned()),
    }
}
