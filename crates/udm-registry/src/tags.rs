//! Remote tag listing.
//!
//! The [`TagSource`] trait abstracts over how tags are discovered. The
//! [`GitTagSource`] shells out to `git ls-remote`; [`TagCache`] memoizes any
//! source by remote URL for the lifetime of one resolution run.

use std::collections::HashMap;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{RegistryError, Result};
use crate::manifest::DependencyId;

/// Abstract tag listing backend.
pub trait TagSource {
    /// Fully-qualified remote identifier for a dependency. Used as memo key.
    fn remote(&self, id: &DependencyId) -> String;

    /// List raw tag names published on `remote`, in the order reported.
    fn list_tags(&self, remote: &str) -> Result<Vec<String>>;
}

impl<T: TagSource + ?Sized> TagSource for &T {
    fn remote(&self, id: &DependencyId) -> String {
        (**self).remote(id)
    }

    fn list_tags(&self, remote: &str) -> Result<Vec<String>> {
        (**self).list_tags(remote)
    }
}

/// Lists tags with `git ls-remote -t`.
#[derive(Debug, Clone)]
pub struct GitTagSource {
    host: String,
}

impl GitTagSource {
    /// Create a source for repositories under `host` (e.g. `https://github.com`).
    pub fn new(host: impl Into<String>) -> Self {
        GitTagSource { host: host.into() }
    }
}

impl TagSource for GitTagSource {
    fn remote(&self, id: &DependencyId) -> String {
        format!(
            "{}/{}/{}.git",
            self.host.trim_end_matches('/'),
            id.namespace,
            id.package
        )
    }

    fn list_tags(&self, remote: &str) -> Result<Vec<String>> {
        let output = Command::new("git")
            .args(["ls-remote", "-t", remote])
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| RegistryError::TagListing {
                remote: remote.to_string(),
                detail: format!("running git: {e}"),
            })?;

        if !output.status.success() {
            return Err(RegistryError::TagListing {
                remote: remote.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Extract tag names from `git ls-remote -t` output.
///
/// Each line looks like `<sha>\trefs/tags/<name>`; everything up to and
/// including `refs/tags/` is dropped.
pub fn parse_ls_remote(output: &str) -> Vec<String> {
    const PREFIX: &str = "refs/tags/";
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.rfind(PREFIX) {
            Some(pos) => line[pos + PREFIX.len()..].to_string(),
            None => line.to_string(),
        })
        .collect()
}

/// Per-run memo over a [`TagSource`].
///
/// Failed listings are remembered as empty so a broken remote is queried
/// once per run.
pub struct TagCache<S> {
    source: S,
    memo: HashMap<String, Vec<String>>,
}

impl<S: TagSource> TagCache<S> {
    pub fn new(source: S) -> Self {
        TagCache {
            source,
            memo: HashMap::new(),
        }
    }

    /// Tags for `id`, querying the source at most once per remote.
    pub fn tags(&mut self, id: &DependencyId) -> &[String] {
        let remote = self.source.remote(id);
        if self.memo.contains_key(&remote) {
            debug!(%remote, "tag list memo hit");
        } else {
            let tags = match self.source.list_tags(&remote) {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(%remote, error = %e, "tag listing failed, treating as untagged");
                    Vec::new()
                }
            };
            debug!(%remote, count = tags.len(), "listed tags");
            self.memo.insert(remote.clone(), tags);
        }
        self.memo.get(&remote).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct remotes queried so far.
    pub fn remotes_queried(&self) -> usize {
        self.memo.len()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
