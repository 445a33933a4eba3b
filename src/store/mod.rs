//! Document store collaborator interface.
//!
//! Configuration documents live in an external store (a repository, a
//! database, a directory tree). The loader only needs three operations from
//! it: resolve a logical reference to a concrete id, fetch raw bytes, and
//! persist raw bytes. Everything else — locking, versioning, permissions —
//! stays on the store's side of the boundary.
//!
//! Two implementations ship with the crate:
//! - [`InMemoryStore`], a concurrent-map-backed store for tests and embedders
//!   that keep configuration in process memory
//! - none for real repositories; embedders implement [`DocumentStore`] against
//!   their own backend
//!
//! Clients without direct store access can instead delegate resolution and
//! merging to a [`RemoteConfigService`], which performs the whole operation
//! on a backend that does have access.

use dashmap::DashMap;
use serde_json::Value;

use crate::core::{ConfectError, Result};

/// Concrete identifier of a document within its store.
///
/// Opaque to the loader; only the store interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wraps a store-specific identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// External key-value document store consumed by the configuration loader.
pub trait DocumentStore: Send + Sync {
    /// Resolves a logical reference (path, guid, id) to a concrete document
    /// id. `Ok(None)` means "not found" — absence is not an error.
    fn resolve_reference(&self, reference: &str) -> Result<Option<DocumentId>>;

    /// Fetches the raw bytes of a document.
    fn fetch_document(&self, id: &DocumentId) -> Result<Vec<u8>>;

    /// Persists the raw bytes of a document under an existing id.
    fn store_document(&self, id: &DocumentId, bytes: &[u8]) -> Result<()>;
}

/// Remote configuration procedure for execution contexts without direct
/// store access.
///
/// Resolution and merging run on the remote side; the local
/// [`crate::config::ConfigCache`] still applies around the call.
pub trait RemoteConfigService: Send + Sync {
    /// Fetches a single configuration document, parsed.
    fn fetch_config(&self, reference: &str, force_reload: bool) -> Result<Value>;

    /// Fetches the merged effective configuration for a compose path.
    fn fetch_merged_config(&self, compose: &str, force_reload: bool) -> Result<Value>;
}

/// In-memory [`DocumentStore`] backed by a concurrent map.
///
/// References resolve by exact key match, so the reference namespace and the
/// id namespace coincide. Intended for tests and for embedders that ship
/// their configuration inside the process image.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<String, Vec<u8>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a document under `reference`.
    pub fn insert(&self, reference: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.documents.insert(reference.into(), content.into());
    }

    /// Removes a document, returning `true` if it existed.
    pub fn remove(&self, reference: &str) -> bool {
        self.documents.remove(reference).is_some()
    }
}

impl DocumentStore for InMemoryStore {
    fn resolve_reference(&self, reference: &str) -> Result<Option<DocumentId>> {
        if self.documents.contains_key(reference) {
            Ok(Some(DocumentId::new(reference)))
        } else {
            Ok(None)
        }
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Vec<u8>> {
        self.documents
            .get(id.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfectError::Store(format!("no document with id '{id}'")))
    }

    fn store_document(&self, id: &DocumentId, bytes: &[u8]) -> Result<()> {
        self.documents.insert(id.as_str().to_string(), bytes.to_vec());
        Ok(())
    }
}
