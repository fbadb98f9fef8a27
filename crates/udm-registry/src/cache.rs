//! Directory-based package cache.
//!
//! Layout:
//! ```text
//! <cache_root>/
//!   <package>/
//!     <version>/
//!       ...extracted archive contents...
//! ```
//!
//! The presence of a slot directory is the only existence check. Slot
//! contents are never inspected, so an interrupted install that left a
//! directory behind is indistinguishable from a complete one.

use std::path::{Path, PathBuf};

use crate::error::{RegistryError, Result};

/// A local package cache backed by the filesystem.
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    /// Create a cache rooted at the given directory.
    pub fn new(root: PathBuf) -> Self {
        PackageCache { root }
    }

    /// Get the root directory of this cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache root if it does not exist yet.
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| RegistryError::CacheError {
            path: self.root.clone(),
            detail: format!("creating cache root: {e}"),
        })
    }

    /// Location of the slot for a package version.
    pub fn slot(&self, package: &str, version: &str) -> PathBuf {
        self.root.join(package).join(version)
    }

    /// Check if a package version is already installed.
    pub fn exists(&self, package: &str, version: &str) -> bool {
        self.slot(package, version).is_dir()
    }

    /// Move an extracted archive root into its slot.
    ///
    /// The package directory is created if needed; the move itself is a
    /// single rename.
    pub fn install(&self, extracted: &Path, package: &str, version: &str) -> Result<PathBuf> {
        let package_dir = self.root.join(package);
        std::fs::create_dir_all(&package_dir).map_err(|e| RegistryError::Install {
            path: package_dir.clone(),
            detail: format!("creating package dir: {e}"),
        })?;

        let slot = package_dir.join(version);
        std::fs::rename(extracted, &slot).map_err(|e| RegistryError::Install {
            path: slot.clone(),
            detail: format!("moving {}: {e}", extracted.display()),
        })?;
        Ok(slot)
    }

    /// List all cached versions of a package.
    pub fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        list_dirs(&self.root.join(package))
    }

    /// List all cached package names.
    pub fn list_packages(&self) -> Result<Vec<String>> {
        list_dirs(&self.root)
    }
}

/// Sorted names of the subdirectories of `dir`; empty if `dir` is missing.
fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| RegistryError::CacheError {
        path: dir.to_path_buf(),
        detail: format!("listing: {e}"),
    })? {
        let entry = entry.map_err(|e| RegistryError::CacheError {
            path: dir.to_path_buf(),
            detail: format!("reading entry: {e}"),
        })?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
