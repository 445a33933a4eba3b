//! Caching policy for configuration documents.
//!
//! [`ConfigCache`] wraps two [`KeyedCache`] instances — a local one owned by
//! the cache and a global one injected at construction so several services
//! can share it — and layers the configuration-specific rules on top:
//!
//! - caching is bypassed entirely for interactive administrative principals,
//!   so an admin debugging configuration never sees stale values
//! - entries whose document carries a top-level `$protected` marker are never
//!   served through [`ConfigCache::get_protected`]; such documents are only
//!   reachable through the authoritative loader path
//! - empty keys are rejected, empty values are silently not stored
//!
//! There is no automatic eviction: entries persist until explicitly removed,
//! force-reloaded, or the process exits.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::KeyedCache;
use crate::core::{ConfectError, Result};

/// Top-level marker property of protected configuration documents.
pub const PROTECTED_KEY: &str = "$protected";

/// Suffix of the derived key under which the raw (pre-parse) document text is
/// cached alongside the parsed form.
pub const RAW_KEY_SUFFIX: &str = "_raw";

/// Identity attributes of the caller the cache policy cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Principal {
    /// Administrative principal.
    pub admin: bool,
    /// Non-interactive service principal.
    pub service: bool,
}

impl Principal {
    /// A regular, non-administrative caller.
    pub const fn user() -> Self {
        Self { admin: false, service: false }
    }

    /// An interactive administrative caller (cache bypassed).
    pub const fn admin() -> Self {
        Self { admin: true, service: false }
    }

    /// A non-interactive administrative service account (cache active).
    pub const fn service_admin() -> Self {
        Self { admin: true, service: true }
    }
}

/// Supplies the principal of the current caller.
///
/// Injected into [`ConfigCache`]; hosts with per-request identities implement
/// this against their session state.
pub trait PrincipalProvider: Send + Sync {
    /// The principal on whose behalf the current operation runs.
    fn current(&self) -> Principal;
}

/// A [`PrincipalProvider`] returning one fixed principal.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrincipal(pub Principal);

impl PrincipalProvider for StaticPrincipal {
    fn current(&self) -> Principal {
        self.0
    }
}

/// Per-call cache options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Use the shared global cache instead of the local one.
    pub use_global_cache: bool,
}

impl CacheOptions {
    /// Options selecting the global cache scope.
    pub const fn global() -> Self {
        Self { use_global_cache: true }
    }
}

/// A cached configuration value: either the parsed document or its raw
/// pre-parse text (stored under the derived `_raw` key).
#[derive(Debug, Clone)]
pub enum CachedEntry {
    /// Parsed effective configuration, shared by reference.
    Parsed(Arc<Value>),
    /// Raw JSON text, parsed afresh by callers requesting an independent copy.
    Raw(Arc<str>),
}

impl CachedEntry {
    /// The parsed document, if this entry holds one.
    pub fn as_parsed(&self) -> Option<&Arc<Value>> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// The raw text, if this entry holds one.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Self::Raw(raw) => Some(raw),
            Self::Parsed(_) => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Parsed(value) => value.is_null(),
            Self::Raw(raw) => raw.is_empty(),
        }
    }
}

/// Policy layer over the keyed caches holding loaded configurations.
pub struct ConfigCache {
    local: KeyedCache<CachedEntry>,
    global: Arc<KeyedCache<CachedEntry>>,
    principals: Arc<dyn PrincipalProvider>,
}

impl ConfigCache {
    /// Creates a cache with its own private global scope.
    ///
    /// Use [`ConfigCache::with_global`] to share the global scope between
    /// several caches.
    pub fn new(principals: Arc<dyn PrincipalProvider>) -> Self {
        Self::with_global(principals, Arc::new(KeyedCache::new()))
    }

    /// Creates a cache backed by a shared global-scope store.
    pub fn with_global(
        principals: Arc<dyn PrincipalProvider>,
        global: Arc<KeyedCache<CachedEntry>>,
    ) -> Self {
        Self { local: KeyedCache::new(), global, principals }
    }

    fn scope(&self, options: CacheOptions) -> &KeyedCache<CachedEntry> {
        if options.use_global_cache { &self.global } else { &self.local }
    }

    /// Retrieves a configuration from the cache.
    ///
    /// Returns `Ok(None)` when caching is disabled for the current principal
    /// or the key is absent. An empty key is an invalid argument.
    pub fn get(&self, key: &str, options: CacheOptions) -> Result<Option<CachedEntry>> {
        if key.is_empty() {
            return Err(ConfectError::InvalidArgument(
                "can not access config cache with an empty key".to_string(),
            ));
        }
        if self.cache_disabled() {
            return Ok(None);
        }
        let cached = self.scope(options).get(key);
        if cached.is_some() {
            tracing::debug!("cache hit for key={key}");
        }
        Ok(cached)
    }

    /// Like [`ConfigCache::get`], but never serves documents carrying the
    /// `$protected` marker. Protected configurations must go through the
    /// authoritative loader so access control applies to every read.
    pub fn get_protected(&self, key: &str, options: CacheOptions) -> Result<Option<CachedEntry>> {
        let cached = self.get(key, options)?;
        Ok(cached.filter(|entry| !is_protected(entry)))
    }

    /// Puts a configuration into the cache. Empty keys and empty values are
    /// silently ignored so failed loads can not poison the cache.
    pub fn put(&self, key: &str, entry: CachedEntry, options: CacheOptions) {
        if key.is_empty() || entry.is_empty() {
            return;
        }
        tracing::debug!("put key={key} into cache");
        self.scope(options).put(key, entry);
    }

    /// Removes a cached configuration (and its raw-text companion entry).
    pub fn remove(&self, key: &str, options: CacheOptions) {
        let scope = self.scope(options);
        scope.remove(key);
        scope.remove(&format!("{key}{RAW_KEY_SUFFIX}"));
    }

    /// Removes all entries from the selected scope.
    pub fn clear(&self, options: CacheOptions) {
        self.scope(options).clear();
    }

    /// Caching is disabled for administrative principals without the service
    /// flag: interactive admins must always see live data.
    fn cache_disabled(&self) -> bool {
        let principal = self.principals.current();
        let disabled = principal.admin && !principal.service;
        if disabled {
            tracing::debug!("caching disabled for administrative users");
        }
        disabled
    }
}

fn is_protected(entry: &CachedEntry) -> bool {
    entry
        .as_parsed()
        .is_some_and(|value| value.as_object().is_some_and(|map| map.contains_key(PROTECTED_KEY)))
}
