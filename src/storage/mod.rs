//! The storage facade: a capability trait for listing, uploading, and
//! downloading named blobs, plus the principal-scoped key scheme.
//!
//! The sync core never talks to a concrete backend; it sees only
//! [`StorageProvider`]. Three implementations ship with the crate:
//!
//! 1. [`memory::MemoryStorage`] — in-process map with fault injection, for
//!    tests and demos
//! 2. [`fs::FsStorage`] — a directory tree on the local filesystem, the CLI
//!    default
//! 3. [`http::HttpStorage`] — the ReadsAI storage gateway (Supabase-style
//!    object REST API), the production backend
//!
//! ## Key scheme
//!
//! Every object lives in a flat keyspace partitioned per principal and per
//! logical bucket:
//!
//! ```text
//! {principal}/documents/{name}    uploaded source documents
//! {principal}/artifacts/{name}    derived audio artifacts
//! ```
//!
//! [`Namespace`] builds and splits these keys so no other module ever
//! concatenates path strings.

pub mod fs;
pub mod http;
pub mod memory;

use crate::error::StorageError;
use crate::identity::Principal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use fs::FsStorage;
pub use http::HttpStorage;
pub use memory::MemoryStorage;

/// One object in a storage listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Full key, e.g. `alice@example.com/documents/book1.epub`.
    pub key: String,
    /// Object size in bytes, when the backend reports it.
    pub size: Option<u64>,
    /// Backend-native last-modified timestamp. Opaque; display only.
    pub updated_at: Option<String>,
}

/// Capability interface over the object store.
///
/// Listings carry **no ordering guarantee**; callers must not depend on the
/// order of returned entries. A prefix with no entries yields an empty vec,
/// not an error.
#[async_trait]
pub trait StorageProvider: Send + Sync + fmt::Debug {
    /// List all objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError>;

    /// Store `bytes` under `key`.
    ///
    /// With `overwrite = false` an existing object is preserved and
    /// `AlreadyExists` returned.
    async fn put(&self, key: &str, bytes: &[u8], overwrite: bool) -> Result<(), StorageError>;

    /// Fetch the object at `key`, or `NotFound`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Presence check via a key-filtered listing.
    ///
    /// This is how the tracker tests for a derived artifact: list scoped to
    /// the exact expected key, present iff an entry matches it.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let entries = self.list(key).await?;
        Ok(entries.iter().any(|e| e.key == key))
    }
}

/// Key builder for one principal's slice of the keyspace.
#[derive(Debug, Clone)]
pub struct Namespace {
    root: String,
}

impl Namespace {
    pub fn new(principal: &Principal) -> Self {
        Self {
            root: principal.as_str().to_string(),
        }
    }

    /// Key of an uploaded source document.
    pub fn document_key(&self, name: &str) -> String {
        format!("{}/documents/{}", self.root, name)
    }

    /// Key a derived artifact will appear under.
    pub fn artifact_key(&self, name: &str) -> String {
        format!("{}/artifacts/{}", self.root, name)
    }

    /// Listing prefix covering all of this principal's documents.
    pub fn document_prefix(&self) -> String {
        format!("{}/documents/", self.root)
    }

    /// Listing prefix covering all of this principal's artifacts.
    pub fn artifact_prefix(&self) -> String {
        format!("{}/artifacts/", self.root)
    }

    /// Extract the document name from a full document key, if the key
    /// belongs to this namespace.
    pub fn document_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.document_prefix())
            .filter(|name| !name.is_empty())
    }
}
