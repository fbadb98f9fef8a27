//! Recursive manifest resolution.
//!
//! Walks a manifest entry by entry: resolve a version from the remote tags,
//! skip the entry if its cache slot already exists, otherwise fetch, install
//! and descend into the package's own manifest. Entries are processed
//! sequentially and nested manifests are resolved before the next sibling.
//!
//! A failing entry is reported at its own depth and never stops its siblings
//! or its parent.

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::cache::PackageCache;
use crate::error::RegistryError;
use crate::fetch::ArchiveFetcher;
use crate::manifest::{Constraint, Dependency, Manifest, ManifestEntry};
use crate::tags::{TagCache, TagSource};
use crate::version::{self, ResolvedVersion};

/// The fetch-pipeline stage at which an entry failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Download,
    Extract,
    Install,
}

impl FetchStage {
    fn diagnostic(&self) -> &'static str {
        match self {
            FetchStage::Download => "err: downloading archive",
            FetchStage::Extract => "err: extracting archive",
            FetchStage::Install => "err: installing package",
        }
    }

    fn of(error: &RegistryError) -> Self {
        match error {
            RegistryError::Download { .. } => FetchStage::Download,
            RegistryError::Extract { .. } => FetchStage::Extract,
            // Local filesystem trouble: staging dir, package dir or rename.
            _ => FetchStage::Install,
        }
    }
}

/// Terminal state of one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Key or constraint could not be parsed.
    Rejected,
    /// No tag satisfies the constraint.
    Unresolved,
    /// The cache slot already existed; nothing fetched, nothing recursed.
    CacheHit(ResolvedVersion),
    /// Fetching or installing failed.
    Failed(ResolvedVersion, FetchStage),
    /// Installed; `nested` is true when a nested manifest was resolved.
    Installed { version: ResolvedVersion, nested: bool },
}

impl EntryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EntryOutcome::Rejected | EntryOutcome::Unresolved | EntryOutcome::Failed(..)
        )
    }
}

/// One processed manifest entry.
#[derive(Debug, Clone)]
pub struct EntryReport {
    /// Manifest key as written.
    pub key: String,
    /// Recursion depth (0 for the root manifest).
    pub depth: usize,
    pub outcome: EntryOutcome,
}

/// Everything that happened during one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Entries in visit order.
    pub entries: Vec<EntryReport>,
    /// Number of times the archive fetcher was invoked.
    pub fetches: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_failure())
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    pub fn installed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Installed { .. }))
            .count()
    }
}

/// Owns the per-run state: tag memo, cache, fetcher and output sink.
pub struct Resolver<S, F, W> {
    tags: TagCache<S>,
    cache: PackageCache,
    fetcher: F,
    manifest_file: String,
    out: W,
    summary: RunSummary,
}

impl<S: TagSource, F: ArchiveFetcher, W: Write> Resolver<S, F, W> {
    pub fn new(
        source: S,
        cache: PackageCache,
        fetcher: F,
        manifest_file: impl Into<String>,
        out: W,
    ) -> Self {
        Resolver {
            tags: TagCache::new(source),
            cache,
            fetcher,
            manifest_file: manifest_file.into(),
            out,
            summary: RunSummary::default(),
        }
    }

    /// Resolve every entry of `manifest`, descending into nested manifests.
    pub fn resolve_all(&mut self, manifest: &Manifest, depth: usize) {
        for entry in manifest.entries() {
            let (key, outcome, nested) = match entry {
                ManifestEntry::Valid(dep) => {
                    let (outcome, nested) = self.resolve_entry(dep, depth);
                    (dep.id.to_string(), outcome, nested)
                }
                ManifestEntry::Rejected {
                    key,
                    constraint,
                    error,
                } => {
                    let reason = match error {
                        RegistryError::MalformedIdentifier { .. } => "malformed identifier",
                        _ => "invalid constraint",
                    };
                    warn!(error = %error, "skipping manifest entry");
                    self.emit(depth, &format!("{key}@{constraint}: err: {reason}"));
                    (key.clone(), EntryOutcome::Rejected, None)
                }
            };

            self.summary.entries.push(EntryReport {
                key,
                depth,
                outcome,
            });

            if let Some(nested) = nested {
                self.resolve_all(&nested, depth + 1);
            }
        }
    }

    /// Run one entry to a terminal state. Returns the nested manifest to
    /// descend into, if the freshly installed package has one.
    fn resolve_entry(&mut self, dep: &Dependency, depth: usize) -> (EntryOutcome, Option<Manifest>) {
        let label = format!("{}@{}", dep.id, dep.constraint);

        let resolved = {
            let tags = match dep.constraint {
                Constraint::MutableBranch => &[][..],
                _ => self.tags.tags(&dep.id),
            };
            version::resolve(tags, &dep.constraint)
        };
        let Some(resolved) = resolved else {
            let err = RegistryError::NoMatchingVersion {
                id: dep.id.to_string(),
                constraint: dep.constraint.to_string(),
            };
            warn!(error = %err, "unresolved");
            self.emit(depth, &format!("{label}: err: no version found"));
            return (EntryOutcome::Unresolved, None);
        };

        let version = resolved.to_string();
        self.emit(depth, &format!("{label}: {version}"));

        let package = &dep.id.package;
        if self.cache.exists(package, &version) {
            debug!(%package, %version, "cache hit");
            return (EntryOutcome::CacheHit(resolved), None);
        }

        self.summary.fetches += 1;
        let installed = self
            .fetcher
            .fetch(&dep.id, resolved.tag(), self.cache.root())
            .and_then(|extracted| self.cache.install(extracted.root(), package, &version));
        let slot = match installed {
            Ok(slot) => slot,
            Err(e) => {
                let stage = FetchStage::of(&e);
                warn!(id = %dep.id, %version, error = %e, "fetch failed");
                self.emit(depth, stage.diagnostic());
                return (EntryOutcome::Failed(resolved, stage), None);
            }
        };
        info!(id = %dep.id, %version, slot = %slot.display(), "installed");

        let nested = self.nested_manifest(slot);
        let outcome = EntryOutcome::Installed {
            version: resolved,
            nested: nested.is_some(),
        };
        (outcome, nested)
    }

    /// Load the manifest inside an installed slot. Missing or unparseable
    /// manifests make the package a leaf.
    fn nested_manifest(&self, slot: PathBuf) -> Option<Manifest> {
        let path = slot.join(&self.manifest_file);
        if !path.is_file() {
            return None;
        }
        match Manifest::load(&path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring nested manifest");
                None
            }
        }
    }

    fn emit(&mut self, depth: usize, line: &str) {
        let indent = "  ".repeat(depth);
        if let Err(e) = writeln!(self.out, "{indent}{line}") {
            warn!(error = %e, "writing progress output failed");
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Number of distinct remotes whose tags were listed.
    pub fn remotes_queried(&self) -> usize {
        self.tags.remotes_queried()
    }

    /// End the run, returning the summary and the output sink.
    pub fn finish(self) -> (RunSummary, W) {
        (self.summary, self.out)
    }
}
