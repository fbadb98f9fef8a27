//! Manifest-driven dependency fetching.
//!
//! Reads a `dependencies.json` manifest mapping `namespace/package` to a
//! version constraint, picks the best published tag for each entry, fetches
//! the tagged source archive and installs it into a directory cache, then
//! recurses into any manifest the installed package carries.
//!
//! # Architecture
//!
//! - **Tag source** — lists remote tags, memoized per remote for one run
//! - **Version resolver** — picks the highest tag satisfying a constraint
//! - **Package cache** — `<root>/<package>/<version>` directories
//! - **Archive fetcher** — downloads and unpacks `.tar.gz` archives
//! - **Resolver** — the recursive orchestrator tying them together

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod resolution;
pub mod tags;
pub mod version;

// Re-exports for convenience.
pub use cache::PackageCache;
pub use config::{ResolverConfig, CONFIG_FILE};
pub use error::{RegistryError, Result};
pub use fetch::{archive_url, ArchiveFetcher, ExtractedArchive, HttpFetcher};
pub use manifest::{Constraint, Dependency, DependencyId, Manifest, ManifestEntry, MUTABLE_BRANCH};
pub use resolution::{EntryOutcome, EntryReport, FetchStage, Resolver, RunSummary};
pub use tags::{GitTagSource, TagCache, TagSource};
pub use version::{clean_tag, resolve, ResolvedVersion, Version};
