use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which mapping a conflicting key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Env,
    Script,
    Hook,
    Toolchain,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Env => write!(f, "environment variable"),
            KeyKind::Script => write!(f, "script"),
            KeyKind::Hook => write!(f, "hook"),
            KeyKind::Toolchain => write!(f, "toolchain"),
        }
    }
}

/// Errors raised while loading or merging environment fragments.
///
/// Every variant is fatal to activation: the merger never returns a
/// partially merged descriptor.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("conflicting {kind} '{key}': '{first}' ({first_origin}) vs '{second}' ({second_origin})")]
    Conflict {
        kind: KeyKind,
        key: String,
        first: String,
        first_origin: String,
        second: String,
        second_origin: String,
    },

    #[error("malformed fragment {origin}: {reason}")]
    MalformedFragment { origin: String, reason: String },

    #[error("failed to read fragment {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    pub fn malformed(origin: impl fmt::Display, reason: impl Into<String>) -> Self {
        MergeError::MalformedFragment {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }

    /// `first` and `second` are `(value, origin)` pairs in fragment order.
    pub fn conflict(
        kind: KeyKind,
        key: impl Into<String>,
        first: (impl fmt::Display, impl fmt::Display),
        second: (impl fmt::Display, impl fmt::Display),
    ) -> Self {
        MergeError::Conflict {
            kind,
            key: key.into(),
            first: first.0.to_string(),
            first_origin: first.1.to_string(),
            second: second.0.to_string(),
            second_origin: second.1.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MergeError::Conflict { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, MergeError::MalformedFragment { .. })
    }
}

pub type Result<T, E = MergeError> = std::result::Result<T, E>;
