//! Configuration loading and composition.
//!
//! Configurations are JSON documents living in an external
//! [`DocumentStore`]. A caller asks for one in one of three ways:
//!
//! 1. **Direct load** — a concrete reference (id, guid, path). The document
//!    is fetched and parsed; that is the effective config.
//! 2. **Compose** — a logical relative path. The path is combined with an
//!    ordered list of base-path tiers (lowest priority first), each tier is
//!    resolved and fetched independently, and the surviving documents are
//!    deep-merged into one effective config (see [`merge`]).
//! 3. **Inline** — a caller-supplied object, used as-is.
//!
//! Results are cached through [`ConfigCache`] under the resolved key, with
//! the raw document text stored under a derived `_raw` key so callers that
//! request `copy` get an independently parsed object and can never corrupt
//! the shared cache entry.
//!
//! # Loading a composed configuration
//!
//! ```rust
//! use std::sync::Arc;
//! use confect::config::{ConfigCache, ConfigLoader, ConfigOptions, Principal, StaticPrincipal};
//! use confect::store::InMemoryStore;
//!
//! let store = Arc::new(InMemoryStore::new());
//! store.insert("base/app.config", r#"{ "greeting": "Hello {{name}}", "retries": 3 }"#);
//! store.insert("custom/app.config", r#"{ "retries": 5 }"#);
//!
//! let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::user()))));
//! let loader = ConfigLoader::new(store, cache);
//!
//! let loaded = loader.load(&ConfigOptions::compose("/app.config")).unwrap();
//! assert_eq!(loaded.config()["retries"], 5);
//! assert_eq!(loaded.config()["greeting"], "Hello {{name}}");
//! ```
//!
//! In execution contexts without direct store access, construct the loader
//! with a [`RemoteConfigService`]; resolution and merging then happen
//! remotely while the local cache keeps applying identically.

pub mod cache;
pub mod merge;

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use cache::{
    CacheOptions, CachedEntry, ConfigCache, PROTECTED_KEY, Principal, PrincipalProvider,
    RAW_KEY_SUFFIX, StaticPrincipal,
};
pub use merge::{MERGE_LOG_KEY, MergeOptions, merge_objects};

use crate::core::{ConfectError, Result};
use crate::store::{DocumentId, DocumentStore, RemoteConfigService};

/// Base-path tiers used when no bootstrap document overrides them.
pub const DEFAULT_BASE_PATHS: [&str; 2] = ["base", "custom"];

/// Property of the bootstrap document listing the base-path tiers.
pub const BASE_MERGE_PATHS_KEY: &str = "baseMergePaths";

/// How a configuration should be located and returned.
///
/// Exactly one of `load`, `compose` or `config` must be set. The struct
/// deserializes from the camel-cased option objects call sites convention-
/// ally pass (`{ "compose": "/app.config", "forceReload": true }`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOptions {
    /// Concrete document reference for a direct load.
    pub load: Option<String>,
    /// Logical relative path for tiered composition.
    pub compose: Option<String>,
    /// Inline configuration object (no store access).
    pub config: Option<Value>,
    /// With `load`: treat the reference as a compose path and merge anyway.
    pub merge: bool,
    /// Bypass and refresh the cache.
    pub force_reload: bool,
    /// Return an independently parsed copy instead of the shared cache
    /// reference.
    pub copy: bool,
    /// Allow saving changes back through [`ConfigLoader::save`]. Ignored for
    /// composed configurations, which are never writable.
    pub writable: bool,
    /// Abort composition when any resolved tier fails to load or parse.
    pub exception_on_broken_config: bool,
    /// Cache in the shared global scope instead of the local one.
    pub use_global_cache: bool,
}

impl ConfigOptions {
    /// Options for a direct load of `reference`.
    pub fn direct(reference: impl Into<String>) -> Self {
        Self { load: Some(reference.into()), ..Self::default() }
    }

    /// Options for composing the tiers of `compose_path`.
    pub fn compose(compose_path: impl Into<String>) -> Self {
        Self { compose: Some(compose_path.into()), ..Self::default() }
    }

    fn cache_options(&self) -> CacheOptions {
        CacheOptions { use_global_cache: self.use_global_cache }
    }
}

/// One resolved tier of a merge hierarchy.
#[derive(Debug, Clone)]
pub struct HierarchyEntry {
    /// Concrete document id of the tier.
    pub id: DocumentId,
    /// The base path that produced this tier.
    pub base_path: String,
    /// The full reference the id was resolved from.
    pub reference: String,
}

/// An effective configuration produced by [`ConfigLoader::load`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    config: Arc<Value>,
    reference: Option<String>,
    compose: Option<String>,
    writable: bool,
}

impl LoadedConfig {
    /// The effective configuration object.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Shared handle to the effective configuration.
    pub fn config_arc(&self) -> Arc<Value> {
        Arc::clone(&self.config)
    }

    /// Consumes the handle and returns an owned configuration object.
    ///
    /// Free of charge when the config was loaded with `copy: true` (the
    /// allocation is unshared); otherwise clones.
    pub fn into_config(self) -> Value {
        Arc::try_unwrap(self.config).unwrap_or_else(|shared| (*shared).clone())
    }

    /// The compose path this config was merged from, if any.
    pub fn compose_path(&self) -> Option<&str> {
        self.compose.as_deref()
    }

    /// Whether [`ConfigLoader::save`] will accept this config.
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Resolves, composes, caches and persists configurations.
pub struct ConfigLoader {
    store: Arc<dyn DocumentStore>,
    remote: Option<Arc<dyn RemoteConfigService>>,
    cache: Arc<ConfigCache>,
    bootstrap_ref: Option<String>,
    default_base_paths: Vec<String>,
    base_paths: OnceLock<Vec<String>>,
}

impl ConfigLoader {
    /// Creates a loader working directly against `store`.
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<ConfigCache>) -> Self {
        Self {
            store,
            remote: None,
            cache,
            bootstrap_ref: None,
            default_base_paths: DEFAULT_BASE_PATHS.iter().map(ToString::to_string).collect(),
            base_paths: OnceLock::new(),
        }
    }

    /// Delegates resolution and merging to a remote service. The local cache
    /// still applies around the remote calls.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn RemoteConfigService>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Reads the base-path tier list from the `baseMergePaths` property of
    /// the referenced bootstrap document instead of the built-in default.
    #[must_use]
    pub fn with_bootstrap(mut self, reference: impl Into<String>) -> Self {
        self.bootstrap_ref = Some(reference.into());
        self
    }

    /// Overrides the fallback tier list used when no bootstrap document is
    /// configured or readable. Ordered lowest priority first.
    #[must_use]
    pub fn with_base_paths(mut self, base_paths: Vec<String>) -> Self {
        self.default_base_paths = base_paths;
        self
    }

    /// Loads an effective configuration per `options`.
    pub fn load(&self, options: &ConfigOptions) -> Result<LoadedConfig> {
        if let Some(inline) = &options.config {
            return Ok(LoadedConfig {
                config: Arc::new(inline.clone()),
                reference: options.load.clone(),
                compose: None,
                writable: options.writable,
            });
        }

        if let Some(reference) = options.load.as_deref().filter(|_| !options.merge) {
            let config = match &self.remote {
                Some(remote) => self.reload_remote(remote.as_ref(), reference, false, options)?,
                None => self.reload_direct(reference, options)?,
            };
            return Ok(LoadedConfig {
                config,
                reference: Some(reference.to_string()),
                compose: None,
                writable: options.writable,
            });
        }

        // Compose mode; `load` with `merge` treats the reference as the
        // compose path.
        let compose = options
            .compose
            .as_deref()
            .or(options.load.as_deref())
            .ok_or_else(|| {
                ConfectError::InvalidArgument(
                    "one of `load`, `compose` or `config` is required".to_string(),
                )
            })?;

        let config = match &self.remote {
            Some(remote) => self.reload_remote(remote.as_ref(), compose, true, options)?,
            None => self.reload_compose(compose, options)?,
        };

        Ok(LoadedConfig {
            config,
            reference: None,
            compose: Some(compose.to_string()),
            // Saving is always deactivated for composed configurations.
            writable: false,
        })
    }

    /// Resolves the merge hierarchy for a compose path: one entry per
    /// base-path tier, `None` for tiers that do not resolve. Resolution
    /// failures are tolerated and logged.
    pub fn retrieve_merge_hierarchy(&self, compose: &str) -> Vec<Option<HierarchyEntry>> {
        self.base_paths()
            .iter()
            .map(|base_path| {
                let reference = join_reference(base_path, compose);
                match self.store.resolve_reference(&reference) {
                    Ok(Some(id)) => {
                        Some(HierarchyEntry { id, base_path: base_path.clone(), reference })
                    }
                    Ok(None) => {
                        tracing::info!("could not determine document for reference='{reference}'");
                        None
                    }
                    Err(err) => {
                        tracing::info!(
                            "could not determine document for reference='{reference}': {err}"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Persists a writable, directly loaded configuration back to the store
    /// (pretty-printed).
    pub fn save(&self, loaded: &LoadedConfig) -> Result<()> {
        if !loaded.writable {
            return Err(ConfectError::ReadOnly);
        }
        let reference = loaded
            .reference
            .as_deref()
            .ok_or_else(|| ConfectError::InvalidArgument("no target path".to_string()))?;
        let id = self
            .store
            .resolve_reference(reference)?
            .ok_or_else(|| ConfectError::NotFound { reference: reference.to_string() })?;

        let text = serde_json::to_string_pretty(loaded.config())
            .map_err(|err| ConfectError::Store(err.to_string()))?;
        self.store.store_document(&id, text.as_bytes())
    }

    /// Persists a new configuration document under `reference` and returns
    /// its id. The store decides whether creating at that reference is legal.
    pub fn save_new(&self, reference: &str, config: &Value) -> Result<DocumentId> {
        if reference.is_empty() {
            return Err(ConfectError::InvalidArgument("repository path is missing".to_string()));
        }
        let id = self
            .store
            .resolve_reference(reference)?
            .unwrap_or_else(|| DocumentId::new(reference));
        let text = serde_json::to_string_pretty(config)
            .map_err(|err| ConfectError::Store(err.to_string()))?;
        self.store.store_document(&id, text.as_bytes())?;
        Ok(id)
    }

    /// Interprets the `$config` / `$property` configuration convention.
    ///
    /// `spec` is an object (or a JSON string parsing to one) that may name a
    /// configuration to load (`$config`), a dotted sub-property to extract
    /// (`$property`), and the cache scope (`$useGlobalCache`). All remaining
    /// properties without a `$` prefix (all properties, with `all_props`)
    /// overlay the loaded part, so call sites can splice ad-hoc values over
    /// file-backed configuration.
    pub fn parse_configuration(&self, spec: &Value, all_props: bool, copy: bool) -> Result<Value> {
        let parsed_spec;
        let spec_obj = match spec {
            Value::String(text) => {
                parsed_spec = serde_json::from_str::<Value>(text).map_err(|source| {
                    ConfectError::Parse { reference: "$config spec".to_string(), source }
                })?;
                &parsed_spec
            }
            other => other,
        };
        let Some(map) = spec_obj.as_object() else {
            return Err(ConfectError::InvalidArgument(
                "configuration spec must be an object".to_string(),
            ));
        };

        let mut config = Value::Object(serde_json::Map::new());

        if let Some(reference) = map.get("$config").and_then(Value::as_str) {
            let use_global_cache =
                map.get("$useGlobalCache").and_then(Value::as_bool).unwrap_or(false);
            let options = ConfigOptions {
                compose: Some(reference.to_string()),
                copy,
                use_global_cache,
                ..ConfigOptions::default()
            };
            let loaded = match self.load(&options) {
                Ok(loaded) => loaded,
                // Not part of any merge hierarchy: reload in simple mode.
                Err(ConfectError::NotFound { .. }) => {
                    self.load(&ConfigOptions { compose: None, load: Some(reference.to_string()), ..options })?
                }
                Err(err) => return Err(err),
            };
            config = loaded.into_config();
        }

        if let Some(property) = map.get("$property").and_then(Value::as_str) {
            config = extract_config_part(&config, property)
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        }

        if let Some(target) = config.as_object_mut() {
            for (key, value) in map {
                if all_props || !key.starts_with('$') {
                    target.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(config)
    }

    fn base_paths(&self) -> &[String] {
        self.base_paths.get_or_init(|| {
            if let Some(reference) = &self.bootstrap_ref {
                match self.fetch_parsed(reference) {
                    Ok(bootstrap) => {
                        let tiers: Option<Vec<String>> = bootstrap
                            .get(BASE_MERGE_PATHS_KEY)
                            .and_then(Value::as_array)
                            .map(|paths| {
                                paths
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .map(ToString::to_string)
                                    .collect()
                            });
                        if let Some(tiers) = tiers.filter(|t| !t.is_empty()) {
                            return tiers;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("could not load base paths from '{reference}': {err}");
                    }
                }
            }
            self.default_base_paths.clone()
        })
    }

    fn fetch_parsed(&self, reference: &str) -> Result<Value> {
        let id = self
            .store
            .resolve_reference(reference)?
            .ok_or_else(|| ConfectError::NotFound { reference: reference.to_string() })?;
        let bytes = self.store.fetch_document(&id)?;
        serde_json::from_slice(&bytes)
            .map_err(|source| ConfectError::Parse { reference: reference.to_string(), source })
    }

    fn reload_direct(&self, reference: &str, options: &ConfigOptions) -> Result<Arc<Value>> {
        let copts = options.cache_options();
        let raw_key = format!("{reference}{RAW_KEY_SUFFIX}");

        let cached = self
            .cache
            .get_protected(reference, copts)?
            .and_then(|entry| entry.as_parsed().cloned());

        if let Some(parsed) = cached.filter(|_| !options.force_reload) {
            return self.from_cache(parsed, &raw_key, options);
        }

        tracing::debug!("load configuration in simple mode (reference={reference})");
        let id = self
            .store
            .resolve_reference(reference)?
            .ok_or_else(|| ConfectError::NotFound { reference: reference.to_string() })?;
        let bytes = self.store.fetch_document(&id)?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|source| ConfectError::Parse { reference: reference.to_string(), source })?;

        self.store_in_cache(reference, &raw_key, parsed, raw, options)
    }

    fn reload_compose(&self, compose: &str, options: &ConfigOptions) -> Result<Arc<Value>> {
        let copts = options.cache_options();
        let raw_key = format!("{compose}{RAW_KEY_SUFFIX}");

        let cached = self
            .cache
            .get_protected(compose, copts)?
            .and_then(|entry| entry.as_parsed().cloned());

        if let Some(parsed) = cached.filter(|_| !options.force_reload) {
            return self.from_cache(parsed, &raw_key, options);
        }

        let hierarchy = self.retrieve_merge_hierarchy(compose);
        tracing::debug!(
            "load configuration in merge mode (compose={compose}), merging {} configs",
            hierarchy.len()
        );

        let mut documents = Vec::new();
        for entry in hierarchy.into_iter().flatten() {
            match self.fetch_tier(&entry) {
                Ok(document) => documents.push(document),
                Err(err) => {
                    tracing::warn!("no valid config in '{}': {err}", entry.reference);
                    if options.exception_on_broken_config {
                        return Err(ConfectError::BrokenConfig { path: entry.reference });
                    }
                }
            }
        }

        let Some((seed, overrides)) = documents.split_first() else {
            return Err(ConfectError::NotFound { reference: compose.to_string() });
        };
        let merged = merge_objects(seed, overrides, &MergeOptions::default());
        let raw = serde_json::to_string(&merged)
            .map_err(|err| ConfectError::Store(err.to_string()))?;

        self.store_in_cache(compose, &raw_key, merged, raw, options)
    }

    fn reload_remote(
        &self,
        remote: &dyn RemoteConfigService,
        key: &str,
        merged: bool,
        options: &ConfigOptions,
    ) -> Result<Arc<Value>> {
        let copts = options.cache_options();
        let raw_key = format!("{key}{RAW_KEY_SUFFIX}");

        let cached = self.cache.get(key, copts)?.and_then(|entry| entry.as_parsed().cloned());
        if let Some(parsed) = cached.filter(|_| !options.force_reload) {
            return self.from_cache(parsed, &raw_key, options);
        }

        tracing::info!("load configuration remotely: {key} (merged={merged})");
        let value = if merged {
            remote.fetch_merged_config(key, options.force_reload)?
        } else {
            remote.fetch_config(key, options.force_reload)?
        };
        let raw =
            serde_json::to_string(&value).map_err(|err| ConfectError::Remote(err.to_string()))?;

        self.store_in_cache(key, &raw_key, value, raw, options)
    }

    fn store_in_cache(
        &self,
        key: &str,
        raw_key: &str,
        parsed: Value,
        raw: String,
        options: &ConfigOptions,
    ) -> Result<Arc<Value>> {
        let copts = options.cache_options();
        let shared = Arc::new(parsed);
        self.cache.put(key, CachedEntry::Parsed(Arc::clone(&shared)), copts);
        self.cache.put(raw_key, CachedEntry::Raw(Arc::from(raw.as_str())), copts);

        if options.copy {
            let fresh: Value = serde_json::from_str(&raw)
                .map_err(|source| ConfectError::Parse { reference: key.to_string(), source })?;
            return Ok(Arc::new(fresh));
        }
        Ok(shared)
    }

    fn from_cache(
        &self,
        parsed: Arc<Value>,
        raw_key: &str,
        options: &ConfigOptions,
    ) -> Result<Arc<Value>> {
        if !options.copy {
            return Ok(parsed);
        }
        let raw = self
            .cache
            .get(raw_key, options.cache_options())?
            .and_then(|entry| entry.as_raw().map(ToString::to_string));
        let text = match raw {
            Some(text) => text,
            // Raw companion entry missing; fall back to re-serializing.
            None => serde_json::to_string(parsed.as_ref())
                .map_err(|err| ConfectError::Store(err.to_string()))?,
        };
        let fresh: Value = serde_json::from_str(&text)
            .map_err(|source| ConfectError::Parse { reference: raw_key.to_string(), source })?;
        Ok(Arc::new(fresh))
    }

    fn fetch_tier(&self, entry: &HierarchyEntry) -> Result<Value> {
        let bytes = self.store.fetch_document(&entry.id)?;
        serde_json::from_slice(&bytes)
            .map_err(|source| ConfectError::Parse { reference: entry.reference.clone(), source })
    }
}

/// Extracts a dotted-path sub-object of a larger configuration. Returns
/// `None` when the path does not lead to an object.
fn extract_config_part(config: &Value, property: &str) -> Option<Value> {
    let mut current = config;
    for segment in property.split('.') {
        current = current.get(segment)?;
    }
    current.is_object().then(|| current.clone())
}

fn join_reference(base_path: &str, compose: &str) -> String {
    format!("{}/{}", base_path.trim_end_matches('/'), compose.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loader_with(store: Arc<crate::store::InMemoryStore>) -> ConfigLoader {
        let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::user()))));
        ConfigLoader::new(store, cache)
    }

    #[test]
    fn options_deserialize_from_camel_case_objects() {
        let options: ConfigOptions = serde_json::from_value(json!({
            "compose": "/app.config",
            "forceReload": true,
            "useGlobalCache": true
        }))
        .unwrap();
        assert_eq!(options.compose.as_deref(), Some("/app.config"));
        assert!(options.force_reload);
        assert!(options.use_global_cache);
        assert!(!options.copy);
    }

    #[test]
    fn direct_load_parses_the_document() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("app.config", r#"{ "a": 1 }"#);

        let loaded = loader_with(store).load(&ConfigOptions::direct("app.config"))?;
        assert_eq!(loaded.config(), &json!({ "a": 1 }));
        Ok(())
    }

    #[test]
    fn direct_load_of_missing_reference_fails() {
        let store = Arc::new(crate::store::InMemoryStore::new());
        let err = loader_with(store).load(&ConfigOptions::direct("missing")).unwrap_err();
        assert!(matches!(err, ConfectError::NotFound { .. }));
    }

    #[test]
    fn direct_load_of_invalid_json_is_a_parse_error() {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("broken.config", "not json");
        let err = loader_with(store).load(&ConfigOptions::direct("broken.config")).unwrap_err();
        assert!(matches!(err, ConfectError::Parse { .. }));
    }

    #[test]
    fn compose_merges_tiers_in_priority_order() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("base/app.config", r#"{ "a": 1, "nested": { "x": 1, "y": 2 } }"#);
        store.insert("custom/app.config", r#"{ "nested": { "y": 9 } }"#);

        let loaded = loader_with(store).load(&ConfigOptions::compose("/app.config"))?;
        assert_eq!(loaded.config(), &json!({ "a": 1, "nested": { "x": 1, "y": 9 } }));
        assert!(!loaded.is_writable());
        Ok(())
    }

    #[test]
    fn missing_tier_is_skipped() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("base/app.config", r#"{ "a": 1 }"#);

        let loaded = loader_with(store).load(&ConfigOptions::compose("/app.config"))?;
        assert_eq!(loaded.config(), &json!({ "a": 1 }));
        Ok(())
    }

    #[test]
    fn broken_tier_is_fatal_in_strict_mode() {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("base/app.config", r#"{ "a": 1 }"#);
        store.insert("custom/app.config", "not json");

        let options = ConfigOptions {
            exception_on_broken_config: true,
            ..ConfigOptions::compose("/app.config")
        };
        let err = loader_with(store).load(&options).unwrap_err();
        assert!(matches!(err, ConfectError::BrokenConfig { .. }));
    }

    #[test]
    fn broken_tier_is_skipped_otherwise() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("base/app.config", r#"{ "a": 1 }"#);
        store.insert("custom/app.config", "not json");

        let loaded = loader_with(store).load(&ConfigOptions::compose("/app.config"))?;
        assert_eq!(loaded.config(), &json!({ "a": 1 }));
        Ok(())
    }

    #[test]
    fn second_load_is_served_from_cache() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("app.config", r#"{ "a": 1 }"#);
        let loader = loader_with(store.clone());

        loader.load(&ConfigOptions::direct("app.config"))?;
        store.insert("app.config", r#"{ "a": 2 }"#);

        let cached = loader.load(&ConfigOptions::direct("app.config"))?;
        assert_eq!(cached.config()["a"], 1);

        let forced = loader.load(&ConfigOptions {
            force_reload: true,
            ..ConfigOptions::direct("app.config")
        })?;
        assert_eq!(forced.config()["a"], 2);
        Ok(())
    }

    #[test]
    fn copy_returns_an_unshared_object() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("app.config", r#"{ "a": 1 }"#);
        let loader = loader_with(store);

        let copied =
            loader.load(&ConfigOptions { copy: true, ..ConfigOptions::direct("app.config") })?;
        let mut owned = copied.into_config();
        owned["a"] = json!(42);

        // The cached entry is untouched by the caller's mutation.
        let again = loader.load(&ConfigOptions::direct("app.config"))?;
        assert_eq!(again.config()["a"], 1);
        Ok(())
    }

    #[test]
    fn protected_configs_are_reloaded_every_time() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("secret.config", r#"{ "$protected": true, "pw": "a" }"#);
        let loader = loader_with(store.clone());

        loader.load(&ConfigOptions::direct("secret.config"))?;
        store.insert("secret.config", r#"{ "$protected": true, "pw": "b" }"#);

        // A cached protected entry is never served, so the fresh value wins.
        let reloaded = loader.load(&ConfigOptions::direct("secret.config"))?;
        assert_eq!(reloaded.config()["pw"], "b");
        Ok(())
    }

    #[test]
    fn save_round_trips_a_writable_config() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("app.config", r#"{ "a": 1 }"#);
        let loader = loader_with(store.clone());

        let loaded = loader
            .load(&ConfigOptions { writable: true, ..ConfigOptions::direct("app.config") })?;
        loader.save(&loaded)?;

        let id = store.resolve_reference("app.config")?.unwrap();
        let text = String::from_utf8(store.fetch_document(&id)?).unwrap();
        assert!(text.contains("\"a\": 1"));
        Ok(())
    }

    #[test]
    fn save_refuses_readonly_and_composed_configs() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("app.config", r#"{ "a": 1 }"#);
        store.insert("base/app.config", r#"{ "a": 1 }"#);
        let loader = loader_with(store);

        let readonly = loader.load(&ConfigOptions::direct("app.config"))?;
        assert!(matches!(loader.save(&readonly), Err(ConfectError::ReadOnly)));

        let composed = loader.load(&ConfigOptions {
            writable: true,
            ..ConfigOptions::compose("/app.config")
        })?;
        assert!(matches!(loader.save(&composed), Err(ConfectError::ReadOnly)));
        Ok(())
    }

    #[test]
    fn bootstrap_document_overrides_base_paths() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert("bootstrap.config", r#"{ "baseMergePaths": ["defaults", "site", "user"] }"#);
        store.insert("defaults/app.config", r#"{ "a": 1 }"#);
        store.insert("user/app.config", r#"{ "a": 3 }"#);

        let loader = loader_with(store).with_bootstrap("bootstrap.config");
        let loaded = loader.load(&ConfigOptions::compose("/app.config"))?;
        assert_eq!(loaded.config()["a"], 3);
        Ok(())
    }

    #[test]
    fn parse_configuration_extracts_and_overlays() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        store.insert(
            "base/parts.config",
            r#"{ "configParts": { "part1": { "first": "a", "second": "b" } } }"#,
        );
        let loader = loader_with(store);

        let spec = json!({
            "$config": "/parts.config",
            "$property": "configParts.part1",
            "extra": "extra-value"
        });
        let config = loader.parse_configuration(&spec, false, false)?;
        assert_eq!(
            config,
            json!({ "first": "a", "second": "b", "extra": "extra-value" })
        );
        Ok(())
    }

    #[test]
    fn parse_configuration_falls_back_to_direct_load() -> Result<()> {
        let store = Arc::new(crate::store::InMemoryStore::new());
        // Present only at its direct reference, not under any tier.
        store.insert("standalone.config", r#"{ "a": 1 }"#);
        let loader = loader_with(store);

        let spec = json!({ "$config": "standalone.config" });
        let config = loader.parse_configuration(&spec, false, false)?;
        assert_eq!(config["a"], 1);
        Ok(())
    }

    #[test]
    fn remote_delegation_caches_identically() -> Result<()> {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingRemote(AtomicUsize);
        impl RemoteConfigService for CountingRemote {
            fn fetch_config(&self, _reference: &str, _force: bool) -> Result<Value> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "a": 1 }))
            }
            fn fetch_merged_config(&self, _compose: &str, _force: bool) -> Result<Value> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "merged": true }))
            }
        }

        let remote = Arc::new(CountingRemote(AtomicUsize::new(0)));
        let store = Arc::new(crate::store::InMemoryStore::new());
        let loader = loader_with(store).with_remote(remote.clone());

        loader.load(&ConfigOptions::direct("app.config"))?;
        loader.load(&ConfigOptions::direct("app.config"))?;
        assert_eq!(remote.0.load(Ordering::SeqCst), 1);

        let merged = loader.load(&ConfigOptions::compose("/other.config"))?;
        assert_eq!(merged.config()["merged"], true);
        Ok(())
    }
}
