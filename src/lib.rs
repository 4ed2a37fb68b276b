// Public API
pub mod cli;
pub mod commands;

// Core domain types
mod config;
mod descriptor;
mod environment;
mod error;
mod fragment;
mod interpolate;
mod lockfile;
mod manifest;
mod policy;
mod ui;
mod workspace;

// Re-export main types
pub use config::Config;
pub use descriptor::{merge, merge_with, Merger, ResolvedDescriptor};
pub use environment::{Environment, EnvironmentExport, Shell};
pub use error::{KeyKind, MergeError};
pub use fragment::{Channel, Fragment, ScriptDefinition, ToolchainSpec};
pub use interpolate::{PackagePaths, PackageRef};
pub use lockfile::Lockfile;
pub use manifest::{FragmentScope, FragmentSet, LoadedFragment};
pub use policy::{ConflictPolicy, MergePolicy};
pub use workspace::{ResolveOptions, Resolution, Workspace, WorkspacePath};
