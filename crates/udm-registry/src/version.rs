//! Tag cleaning and best-version selection.
//!
//! Wraps the `semver` crate. Remote tags are free-form strings such as
//! `v2.1.0` or `=1.0.0`; they are cleaned to a semantic version before
//! matching, and the raw tag is kept for building archive URLs.

use std::cmp::Ordering;
use std::fmt;

use crate::manifest::{Constraint, MUTABLE_BRANCH};

/// A parsed semantic version.
pub type Version = semver::Version;

/// The concrete version chosen for a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedVersion {
    /// A published tag and its cleaned version.
    Tagged { tag: String, version: Version },
    /// The mutable default branch.
    MutableBranch,
}

impl ResolvedVersion {
    /// The ref to request from the archive host.
    pub fn tag(&self) -> &str {
        match self {
            ResolvedVersion::Tagged { tag, .. } => tag,
            ResolvedVersion::MutableBranch => MUTABLE_BRANCH,
        }
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedVersion::Tagged { version, .. } => {
                write!(f, "{}.{}.{}", version.major, version.minor, version.patch)?;
                if !version.pre.is_empty() {
                    write!(f, "-{}", version.pre)?;
                }
                Ok(())
            }
            ResolvedVersion::MutableBranch => f.write_str(MUTABLE_BRANCH),
        }
    }
}

/// Clean a raw tag into a semantic version.
///
/// Surrounding whitespace and any leading `=` or `v` characters are
/// dropped. Returns `None` for tags that are not versions at all.
pub fn clean_tag(tag: &str) -> Option<Version> {
    let trimmed = tag.trim().trim_start_matches(['=', 'v', 'V']);
    Version::parse(trimmed).ok()
}

/// Order by semver precedence. Build metadata is ignored.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Select the highest tag satisfying `constraint`.
///
/// The mutable branch marker resolves to itself without looking at `tags`.
/// When several tags clean to the same version, the one listed last wins.
pub fn resolve(tags: &[String], constraint: &Constraint) -> Option<ResolvedVersion> {
    if let Constraint::MutableBranch = constraint {
        return Some(ResolvedVersion::MutableBranch);
    }

    tags.iter()
        .filter_map(|tag| clean_tag(tag).map(|version| (tag, version)))
        .filter(|(_, version)| constraint.matches(version))
        .max_by(|(_, a), (_, b)| precedence(a, b))
        .map(|(tag, version)| ResolvedVersion::Tagged {
            tag: tag.clone(),
            version,
        })
}
