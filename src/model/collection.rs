//! Package collection metadata
//!
//! The value cached per source. Encoded with bincode at the store boundary.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{CollectionIdentifier, CollectionSource};

/// A named set of package metadata originating from one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCollection {
    /// Lookup key, derived from `source`
    pub identifier: CollectionIdentifier,
    pub source: CollectionSource,
    pub name: String,
    pub overview: Option<String>,
    pub keywords: Vec<String>,
    pub packages: Vec<Package>,
    /// Present when the collection document was signed
    pub signer: Option<Signer>,
    /// Unix millis the collection document was generated
    pub created_at: u64,
    /// Unix millis the client last fetched and processed it
    pub last_processed_at: u64,
}

/// One package listed by a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub repository_url: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub versions: Vec<PackageVersion>,
}

/// A released version of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    pub summary: Option<String>,
    pub license: Option<String>,
}

/// Certificate that signed the collection document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub kind: SignerKind,
    pub common_name: String,
    pub organizational_unit: String,
    pub organization: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerKind {
    AppleDistribution,
    AppleDevelopment,
    Other,
}

impl PackageCollection {
    /// Create an empty collection for `source`
    pub fn new(source: CollectionSource, name: impl Into<String>) -> Self {
        Self {
            identifier: source.identifier(),
            source,
            name: name.into(),
            overview: None,
            keywords: Vec::new(),
            packages: Vec::new(),
            signer: None,
            created_at: 0,
            last_processed_at: 0,
        }
    }

    /// Total number of versions across all packages
    pub fn version_count(&self) -> usize {
        self.packages.iter().map(|p| p.versions.len()).sum()
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// Encode into the opaque payload stored in the table
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a payload read back from the table
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
