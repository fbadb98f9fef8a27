//! `udm install`: resolve the root manifest into the cache.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;
use udm_registry::{GitTagSource, HttpFetcher, Manifest, PackageCache, Resolver, ResolverConfig};

/// Run `udm install`.
///
/// Progress lines go to stdout. Fails if the root manifest cannot be read,
/// or after the run if any entry ended unresolved, rejected or failed.
pub fn run(cwd: &Path, config: &ResolverConfig, manifest_path: &Path) -> Result<()> {
    let cache = PackageCache::new(config.cache_root(cwd));
    cache
        .ensure_root()
        .with_context(|| format!("creating cache at {}", cache.root().display()))?;

    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;

    let stdout = std::io::stdout();
    let mut resolver = Resolver::new(
        GitTagSource::new(&config.host),
        cache,
        HttpFetcher::new(&config.host, config.timeout()),
        &config.manifest_file,
        stdout.lock(),
    );
    resolver.resolve_all(&manifest, 0);
    let remotes = resolver.remotes_queried();
    let (summary, _) = resolver.finish();

    info!(
        entries = summary.entries.len(),
        installed = summary.installed(),
        fetches = summary.fetches,
        remotes,
        "resolution finished"
    );

    if summary.has_failures() {
        bail!(
            "{} of {} dependencies could not be installed",
            summary.failures(),
            summary.entries.len()
        );
    }
    Ok(())
}
