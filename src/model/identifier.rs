//! Collection identifiers
//!
//! A `CollectionIdentifier` is derived from the source a collection was
//! fetched from. Two sources that differ only in URL scheme/host casing or
//! a trailing slash map to the same identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Format of the document a source serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// JSON collection document
    Json,
}

impl SourceKind {
    /// Prefix used in the identifier key
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Json => "json",
        }
    }
}

/// Where a collection comes from: a remote URL or a local file path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionSource {
    pub kind: SourceKind,
    pub location: String,
}

impl CollectionSource {
    pub fn new(kind: SourceKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }

    /// Shorthand for a JSON source
    pub fn json(location: impl Into<String>) -> Self {
        Self::new(SourceKind::Json, location)
    }

    pub fn identifier(&self) -> CollectionIdentifier {
        CollectionIdentifier::from(self)
    }
}

/// Stable lookup key for one collection source
///
/// The key is the canonical string `"<kind>:<location>"`. Ordering is
/// lexicographic on that string, which is also the order the store pages
/// through entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionIdentifier(String);

impl CollectionIdentifier {
    /// Rebuild an identifier from its stored key form
    ///
    /// Used when reading keys back from the table or from user input; no
    /// canonicalization is applied.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key bytes as written to the backing table
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&CollectionSource> for CollectionIdentifier {
    fn from(source: &CollectionSource) -> Self {
        let location = canonical_location(&source.location);
        Self(format!("{}:{}", source.kind.as_str(), location))
    }
}

impl fmt::Display for CollectionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a URL or filesystem path
///
/// URLs get a lower-cased scheme and host; paths are case-sensitive and
/// kept as-is. Both lose surrounding whitespace and a trailing `/`.
fn canonical_location(raw: &str) -> String {
    let trimmed = raw.trim();

    let canonical = match trimmed.find("://") {
        Some(scheme_end) => {
            let scheme = &trimmed[..scheme_end];
            let rest = &trimmed[scheme_end + 3..];
            let (host, path) = match rest.find('/') {
                Some(slash) => rest.split_at(slash),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => trimmed.to_string(),
    };

    strip_trailing_slash(canonical)
}

fn strip_trailing_slash(mut location: String) -> String {
    while location.len() > 1
        && location.ends_with('/')
        && !location.ends_with("://")
        && !location.ends_with(":///")
    {
        location.pop();
    }
    location
}
