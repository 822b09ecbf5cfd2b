//! Local references, content addresses and server paths.

use crate::entity::EntityKind;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A within-document key identifying an entity by kind and name.
///
/// Renders as `?hdml-<kind>=<name>`. Only meaningful within one parse pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalReference {
    /// Kind of the referenced entity.
    pub kind: EntityKind,
    /// Name of the referenced entity.
    pub name: String,
}

impl LocalReference {
    /// Creates a reference.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for LocalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?hdml-{}={}", self.kind, self.name)
    }
}

impl FromStr for LocalReference {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("?hdml-")
            .ok_or_else(|| ProtocolError::InvalidReference(s.to_string()))?;
        let (kind, name) = rest
            .split_once('=')
            .ok_or_else(|| ProtocolError::InvalidReference(s.to_string()))?;
        let kind =
            EntityKind::from_name(kind).ok_or_else(|| ProtocolError::InvalidReference(s.to_string()))?;
        Ok(Self::new(kind, name))
    }
}

/// Hex-encoded SHA-256 of an entity's base64-encoded binary form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Wraps an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The durable identity of an entity on the remote side:
/// `hdml-<kind>=<name>@<hash>.html`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerPath(String);

impl ServerPath {
    /// Derives the server path of an entity from its content address.
    pub fn new(kind: EntityKind, name: &str, address: &ContentAddress) -> Self {
        Self(format!("hdml-{kind}={name}@{address}.html"))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping from local references to server paths for one parse pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMapping {
    entries: BTreeMap<LocalReference, ServerPath>,
}

impl ReferenceMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reference. A later declaration with the same kind and name
    /// replaces the earlier one.
    pub fn insert(&mut self, reference: LocalReference, path: ServerPath) {
        self.entries.insert(reference, path);
    }

    /// Looks up a reference.
    pub fn get(&self, reference: &LocalReference) -> Option<&ServerPath> {
        self.entries.get(reference)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in reference order.
    pub fn iter(&self) -> impl Iterator<Item = (&LocalReference, &ServerPath)> {
        self.entries.iter()
    }
}

/// Classification of a frame's `source` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSource<'a> {
    /// Absolute path, rewritten into canonical path form.
    Path(&'a str),
    /// Reference to an entity declared in the same document.
    Local(&'a str),
    /// Anything else, kept verbatim.
    Verbatim(&'a str),
}

impl<'a> FrameSource<'a> {
    /// Classifies a source string.
    pub fn classify(source: &'a str) -> Self {
        if source.starts_with('/') {
            FrameSource::Path(source)
        } else if source.starts_with('?') {
            FrameSource::Local(source)
        } else {
            FrameSource::Verbatim(source)
        }
    }

    /// Resolves the source against the mapping built so far.
    pub fn resolve(&self, mapping: &ReferenceMapping) -> ProtocolResult<String> {
        match *self {
            FrameSource::Path(path) => canonical_path(path),
            FrameSource::Local(raw) => {
                let reference: LocalReference =
                    raw.parse().map_err(|_| ProtocolError::dangling(raw))?;
                mapping
                    .get(&reference)
                    .map(|path| path.to_string())
                    .ok_or_else(|| ProtocolError::dangling(raw))
            }
            FrameSource::Verbatim(source) => Ok(source.to_string()),
        }
    }
}

/// Rewrites an absolute source path into its canonical `dir/query@file` form.
///
/// `/a/b?q=1` becomes `a/q=1@b`. Sources without a query part are rejected.
pub fn canonical_path(source: &str) -> ProtocolResult<String> {
    let (path, query) = source
        .split_once('?')
        .ok_or_else(|| ProtocolError::malformed_source(source))?;
    if query.is_empty() {
        return Err(ProtocolError::malformed_source(source));
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    let (dir, filename) = match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    Ok(format!("{dir}{query}@{filename}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_reference_parse_and_display() {
        let reference: LocalReference = "?hdml-model=users".parse().unwrap();
        assert_eq!(reference, LocalReference::new(EntityKind::Model, "users"));
        assert_eq!(reference.to_string(), "?hdml-model=users");

        assert!("?hdml-table=x".parse::<LocalReference>().is_err());
        assert!("hdml-model=x".parse::<LocalReference>().is_err());
        assert!("?hdml-model".parse::<LocalReference>().is_err());
    }

    #[test]
    fn server_path_format() {
        let address = ContentAddress::from_hex("abc123");
        let path = ServerPath::new(EntityKind::Frame, "active", &address);
        assert_eq!(path.as_str(), "hdml-frame=active@abc123.html");
    }

    #[test]
    fn canonical_path_rewrites() {
        assert_eq!(canonical_path("/a/b?q=1").unwrap(), "a/q=1@b");
        assert_eq!(canonical_path("/b?q=1").unwrap(), "q=1@b");
        assert_eq!(
            canonical_path("/data/sales/orders.html?hdml-frame=totals").unwrap(),
            "data/sales/hdml-frame=totals@orders.html"
        );
    }

    #[test]
    fn canonical_path_rejects_missing_query() {
        assert!(matches!(
            canonical_path("/a/b"),
            Err(ProtocolError::MalformedSource { .. })
        ));
        assert!(matches!(
            canonical_path("/a/b?"),
            Err(ProtocolError::MalformedSource { .. })
        ));
    }

    #[test]
    fn frame_source_resolution() {
        let mut mapping = ReferenceMapping::new();
        let path = ServerPath::new(
            EntityKind::Model,
            "users",
            &ContentAddress::from_hex("ff"),
        );
        mapping.insert(LocalReference::new(EntityKind::Model, "users"), path.clone());

        let local = FrameSource::classify("?hdml-model=users");
        assert_eq!(local.resolve(&mapping).unwrap(), path.to_string());

        let missing = FrameSource::classify("?hdml-frame=missing");
        assert!(matches!(
            missing.resolve(&mapping),
            Err(ProtocolError::DanglingReference { .. })
        ));

        let verbatim = FrameSource::classify("https://example.com/data.csv");
        assert_eq!(
            verbatim.resolve(&mapping).unwrap(),
            "https://example.com/data.csv"
        );
    }
}
