//! Registry error types.

use std::path::PathBuf;

/// Errors that can occur while resolving and fetching dependencies.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Manifest key does not split into `namespace/package`.
    #[error("malformed identifier '{key}': expected 'namespace/package'")]
    MalformedIdentifier { key: String },

    /// Constraint is neither a semver range nor the mutable branch marker.
    #[error("invalid constraint '{constraint}' for '{key}': {detail}")]
    InvalidConstraint {
        key: String,
        constraint: String,
        detail: String,
    },

    /// No published tag satisfies the constraint.
    #[error("no version of '{id}' satisfies '{constraint}'")]
    NoMatchingVersion { id: String, constraint: String },

    /// The remote tag listing could not be obtained.
    #[error("listing tags of {remote} failed: {detail}")]
    TagListing { remote: String, detail: String },

    /// Archive download failed.
    #[error("downloading {url} failed: {detail}")]
    Download { url: String, detail: String },

    /// Archive extraction failed.
    #[error("extracting {path} failed: {detail}")]
    Extract { path: PathBuf, detail: String },

    /// Moving an extracted archive into its cache slot failed.
    #[error("installing into {path} failed: {detail}")]
    Install { path: PathBuf, detail: String },

    /// Manifest file is not a JSON object of strings.
    #[error("invalid manifest {path}: {detail}")]
    ManifestParse { path: PathBuf, detail: String },

    /// Cache I/O error.
    #[error("cache error at {path}: {detail}")]
    CacheError { path: PathBuf, detail: String },

    /// Invalid resolver configuration.
    #[error("invalid configuration {path}: {detail}")]
    Config { path: PathBuf, detail: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
