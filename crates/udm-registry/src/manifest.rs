//! Per-directory dependency manifest (`dependencies.json`).
//!
//! A manifest is a JSON object mapping `namespace/package` identifiers to
//! version constraints:
//!
//! ```json
//! { "acme/widget": "^1.2.0", "acme/gadget": "master" }
//! ```
//!
//! Every entry is classified once at load time. Entries whose key or
//! constraint cannot be understood are kept as [`ManifestEntry::Rejected`]
//! so the orchestrator can report them in place without dropping siblings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use semver::VersionReq;

use crate::error::{RegistryError, Result};

/// Constraint value that tracks the remote's mutable default branch.
pub const MUTABLE_BRANCH: &str = "master";

/// A `namespace/package` pair naming one remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId {
    pub namespace: String,
    pub package: String,
}

impl DependencyId {
    /// Split a manifest key into its namespace and package.
    ///
    /// Exactly two non-empty tokens are required. The package name becomes
    /// a cache directory, so neither token may be `.`, `..` or contain a
    /// backslash or NUL.
    pub fn parse(key: &str) -> Result<Self> {
        let mut tokens = key.split('/').map(str::trim);
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(namespace), Some(package), None)
                if is_path_safe(namespace) && is_path_safe(package) =>
            {
                Ok(DependencyId {
                    namespace: namespace.to_string(),
                    package: package.to_string(),
                })
            }
            _ => Err(RegistryError::MalformedIdentifier {
                key: key.to_string(),
            }),
        }
    }
}

fn is_path_safe(token: &str) -> bool {
    !token.is_empty() && token != "." && token != ".." && !token.contains(['\\', '\0'])
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.package)
    }
}

/// A version constraint from a manifest entry.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// A semver range. Satisfied when any `||` alternative matches.
    Range {
        raw: String,
        alternatives: Vec<VersionReq>,
    },
    /// Always use the default branch, bypassing version resolution.
    MutableBranch,
}

impl Constraint {
    /// Parse a raw constraint string.
    pub fn parse(raw: &str) -> std::result::Result<Self, semver::Error> {
        let trimmed = raw.trim();
        if trimmed == MUTABLE_BRANCH {
            return Ok(Constraint::MutableBranch);
        }
        let alternatives = trimmed
            .split("||")
            .map(|alt| VersionReq::parse(&normalize_comparators(alt)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Constraint::Range {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    /// Check whether a concrete version satisfies this constraint.
    ///
    /// The mutable branch marker has no version and matches nothing.
    pub fn matches(&self, version: &semver::Version) -> bool {
        match self {
            Constraint::Range { alternatives, .. } => {
                alternatives.iter().any(|req| req.matches(version))
            }
            Constraint::MutableBranch => false,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Range { raw, .. } => f.write_str(raw),
            Constraint::MutableBranch => f.write_str(MUTABLE_BRANCH),
        }
    }
}

/// Rewrite space-separated comparators (`>=1.0.0 <2.0.0`) and hyphen ranges
/// (`1.0.0 - 2.0.0`) into the comma-separated form `VersionReq` accepts.
///
/// A bare version (`1.2.3`) is an exact match, not a caret range.
fn normalize_comparators(expr: &str) -> String {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", strip_v(low), strip_v(high));
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        let token = token.trim_end_matches(',');
        if token.is_empty() {
            continue;
        }
        let split = token.find(|c: char| !is_op_char(c)).unwrap_or(token.len());
        let (op, version) = token.split_at(split);
        if version.is_empty() {
            pending_op = Some(op);
            continue;
        }
        let op = if op.is_empty() {
            pending_op.take().unwrap_or("")
        } else {
            pending_op = None;
            op
        };
        let version = strip_v(version);
        let core = version.split(['-', '+']).next().unwrap_or(version);
        let is_wildcard = core.contains(['*', 'x', 'X']);
        if op.is_empty() && !is_wildcard {
            comparators.push(format!("={version}"));
        } else {
            comparators.push(format!("{op}{version}"));
        }
    }
    if comparators.is_empty() {
        return "*".to_string();
    }
    comparators.join(", ")
}

fn is_op_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '^' | '~')
}

fn strip_v(version: &str) -> &str {
    version.trim_start_matches(['v', 'V'])
}

/// A well-formed manifest entry.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub id: DependencyId,
    pub constraint: Constraint,
}

/// One manifest entry, classified at load time.
#[derive(Debug)]
pub enum ManifestEntry {
    Valid(Dependency),
    Rejected {
        key: String,
        constraint: String,
        error: RegistryError,
    },
}

impl ManifestEntry {
    fn classify(key: String, raw: String) -> Self {
        let id = match DependencyId::parse(&key) {
            Ok(id) => id,
            Err(error) => {
                return ManifestEntry::Rejected {
                    key,
                    constraint: raw,
                    error,
                }
            }
        };
        match Constraint::parse(&raw) {
            Ok(constraint) => ManifestEntry::Valid(Dependency { id, constraint }),
            Err(e) => ManifestEntry::Rejected {
                error: RegistryError::InvalidConstraint {
                    key: key.clone(),
                    constraint: raw.clone(),
                    detail: e.to_string(),
                },
                key,
                constraint: raw,
            },
        }
    }
}

/// A parsed manifest. Entries are ordered by key.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse manifest JSON. `origin` is only used in error messages.
    pub fn parse(json: &str, origin: &Path) -> Result<Self> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| RegistryError::ManifestParse {
                path: origin.to_path_buf(),
                detail: e.to_string(),
            })?;
        let entries = raw
            .into_iter()
            .map(|(key, constraint)| ManifestEntry::classify(key, constraint))
            .collect();
        Ok(Manifest { entries })
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| RegistryError::ManifestParse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::parse(&json, path)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Manifest {
        Manifest::parse(json, Path::new("dependencies.json")).unwrap()
    }

    #[test]
    fn split_identifier() {
        let id = DependencyId::parse("acme/widget").unwrap();
        assert_eq!(id.namespace, "acme");
        assert_eq!(id.package, "widget");
        assert_eq!(id.to_string(), "acme/widget");
    }

    #[test]
    fn reject_malformed_identifiers() {
        for key in [
            "widget",
            "acme/",
            "/widget",
            "a/b/c",
            "",
            "acme/..",
            "../widget",
            "acme/.",
            "acme/ .. ",
            "acme/wid\\get",
            "acme/wid\0get",
        ] {
            assert!(
                matches!(
                    DependencyId::parse(key),
                    Err(RegistryError::MalformedIdentifier { .. })
                ),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn master_is_mutable_branch() {
        let c = Constraint::parse("master").unwrap();
        assert!(matches!(c, Constraint::MutableBranch));
        assert_eq!(c.to_string(), "master");
    }

    #[test]
    fn caret_range_keeps_raw_text() {
        let c = Constraint::parse("^2.0.0").unwrap();
        assert_eq!(c.to_string(), "^2.0.0");
        assert!(c.matches(&semver::Version::new(2, 1, 0)));
        assert!(!c.matches(&semver::Version::new(3, 0, 0)));
    }

    #[test]
    fn space_separated_comparators() {
        let c = Constraint::parse(">=1.0.0 <2.0.0").unwrap();
        assert!(c.matches(&semver::Version::new(1, 5, 0)));
        assert!(!c.matches(&semver::Version::new(2, 0, 0)));

        let c = Constraint::parse(">= 1.2.0").unwrap();
        assert!(c.matches(&semver::Version::new(1, 2, 0)));
    }

    #[test]
    fn bare_version_is_exact() {
        let c = Constraint::parse("1.2.3").unwrap();
        assert!(c.matches(&semver::Version::new(1, 2, 3)));
        assert!(!c.matches(&semver::Version::new(1, 2, 4)));

        let c = Constraint::parse("1.x").unwrap();
        assert!(c.matches(&semver::Version::new(1, 9, 0)));
        assert!(!c.matches(&semver::Version::new(2, 0, 0)));
    }

    #[test]
    fn hyphen_and_alternative_ranges() {
        let c = Constraint::parse("1.0.0 - 1.4.0").unwrap();
        assert!(c.matches(&semver::Version::new(1, 4, 0)));
        assert!(!c.matches(&semver::Version::new(1, 4, 1)));

        let c = Constraint::parse("^1.0.0 || ^3.0.0").unwrap();
        assert!(c.matches(&semver::Version::new(3, 2, 0)));
        assert!(!c.matches(&semver::Version::new(2, 0, 0)));
    }

    #[test]
    fn entries_sorted_and_classified() {
        let manifest = parse(r#"{"acme/zeta": "^1.0.0", "bogus": "^1.0.0", "acme/alpha": "not a range"}"#);
        assert_eq!(manifest.len(), 3);

        let keys: Vec<&str> = manifest
            .entries()
            .iter()
            .map(|e| match e {
                ManifestEntry::Valid(dep) => dep.id.package.as_str(),
                ManifestEntry::Rejected { key, .. } => key.as_str(),
            })
            .collect();
        assert_eq!(keys, vec!["acme/alpha", "zeta", "bogus"]);

        assert!(matches!(
            &manifest.entries()[0],
            ManifestEntry::Rejected {
                error: RegistryError::InvalidConstraint { .. },
                ..
            }
        ));
        assert!(matches!(
            &manifest.entries()[2],
            ManifestEntry::Rejected {
                error: RegistryError::MalformedIdentifier { .. },
                ..
            }
        ));
    }

    #[test]
    fn non_object_manifest_is_parse_error() {
        for json in ["[1, 2]", "{\"acme/a\": 1}", "not json"] {
            let err = Manifest::parse(json, Path::new("x.json")).unwrap_err();
            assert!(matches!(err, RegistryError::ManifestParse { .. }));
        }
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("dependencies.json")).unwrap_err();
        assert!(matches!(err, RegistryError::ManifestParse { .. }));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dependencies.json");
        std::fs::write(&path, r#"{"acme/widget": "^1.2.0", "acme/gadget": "master"}"#).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest
            .entries()
            .iter()
            .all(|e| matches!(e, ManifestEntry::Valid(_))));
    }
}
