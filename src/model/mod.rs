//! Data Model
//!
//! Types the store keys and persists.
//!
//! ## Responsibilities
//! - Derive a stable lookup key from a collection's source
//! - Describe the collection metadata cached per source
//!
//! The store treats `PackageCollection` as an opaque value: it is encoded
//! to bytes on the way in and decoded on the way out, never queried by
//! field.

mod collection;
mod identifier;

pub use collection::{Package, PackageCollection, PackageVersion, Signer, SignerKind};
pub use identifier::{CollectionIdentifier, CollectionSource, SourceKind};
