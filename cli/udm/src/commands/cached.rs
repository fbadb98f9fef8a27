//! `udm cached`: list what the cache holds.

use std::path::Path;

use anyhow::{Context, Result};
use udm_registry::{PackageCache, ResolverConfig};

/// Run `udm cached`.
pub fn run(cwd: &Path, config: &ResolverConfig) -> Result<()> {
    let cache = PackageCache::new(config.cache_root(cwd));
    let entries = list(&cache)?;

    if entries.is_empty() {
        println!("No cached packages in {}", cache.root().display());
        return Ok(());
    }
    for (package, version) in &entries {
        println!("{package} {version}");
    }
    Ok(())
}

/// All `(package, version)` pairs in the cache, sorted.
pub fn list(cache: &PackageCache) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for package in cache.list_packages().context("listing cache")? {
        for version in cache
            .list_versions(&package)
            .with_context(|| format!("listing versions of {package}"))?
        {
            entries.push((package.clone(), version));
        }
    }
    Ok(entries)
}
