//! Cache scoping, protection and principal policy across the public API.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use confect::cache::KeyedCache;
use confect::config::{
    CacheOptions, ConfigCache, ConfigLoader, ConfigOptions, Principal, PrincipalProvider,
    StaticPrincipal,
};
use confect::store::InMemoryStore;

#[test]
fn interactive_admins_always_load_fresh() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "version": 1 }"#);

    let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::admin()))));
    let loader = ConfigLoader::new(store.clone(), cache);

    loader.load(&ConfigOptions::compose("/app.config"))?;
    store.insert("base/app.config", r#"{ "version": 2 }"#);

    // No force needed: the admin principal bypasses the cache entirely.
    let reloaded = loader.load(&ConfigOptions::compose("/app.config"))?;
    assert_eq!(reloaded.config()["version"], 2);
    Ok(())
}

#[test]
fn service_accounts_are_served_from_cache() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "version": 1 }"#);

    let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::service_admin()))));
    let loader = ConfigLoader::new(store.clone(), cache);

    loader.load(&ConfigOptions::compose("/app.config"))?;
    store.insert("base/app.config", r#"{ "version": 2 }"#);

    let cached = loader.load(&ConfigOptions::compose("/app.config"))?;
    assert_eq!(cached.config()["version"], 1);
    Ok(())
}

#[test]
fn protected_documents_bypass_the_shared_cache() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/secrets.config", r#"{ "$protected": true, "password": "one" }"#);

    let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::user()))));
    let loader = ConfigLoader::new(store.clone(), cache);

    loader.load(&ConfigOptions::compose("/secrets.config"))?;
    store.insert("base/secrets.config", r#"{ "$protected": true, "password": "two" }"#);

    // The cached copy exists but is never served for protected documents.
    let reloaded = loader.load(&ConfigOptions::compose("/secrets.config"))?;
    assert_eq!(reloaded.config()["password"], "two");
    Ok(())
}

#[test]
fn global_scope_is_shared_across_loaders() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "version": 1 }"#);

    let principals = Arc::new(StaticPrincipal(Principal::user()));
    let global = Arc::new(KeyedCache::new());
    let loader_a = ConfigLoader::new(
        store.clone(),
        Arc::new(ConfigCache::with_global(principals.clone(), global.clone())),
    );
    let loader_b = ConfigLoader::new(
        store.clone(),
        Arc::new(ConfigCache::with_global(principals, global)),
    );

    let options = ConfigOptions { use_global_cache: true, ..ConfigOptions::compose("/app.config") };
    loader_a.load(&options)?;
    store.insert("base/app.config", r#"{ "version": 2 }"#);

    // The second loader hits the shared global entry written by the first.
    assert_eq!(loader_b.load(&options)?.config()["version"], 1);
    Ok(())
}

#[test]
fn local_scopes_stay_isolated() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "version": 1 }"#);

    let principals: Arc<dyn PrincipalProvider> = Arc::new(StaticPrincipal(Principal::user()));
    let loader_a =
        ConfigLoader::new(store.clone(), Arc::new(ConfigCache::new(principals.clone())));
    let loader_b = ConfigLoader::new(store.clone(), Arc::new(ConfigCache::new(principals)));

    loader_a.load(&ConfigOptions::compose("/app.config"))?;
    store.insert("base/app.config", r#"{ "version": 2 }"#);

    // Loader B has its own local cache and sees the fresh document.
    assert_eq!(loader_b.load(&ConfigOptions::compose("/app.config"))?.config()["version"], 2);
    Ok(())
}

#[test]
fn explicit_remove_invalidates() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "version": 1 }"#);

    let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::user()))));
    let loader = ConfigLoader::new(store.clone(), cache.clone());

    loader.load(&ConfigOptions::compose("/app.config"))?;
    store.insert("base/app.config", r#"{ "version": 2 }"#);

    cache.remove("/app.config", CacheOptions::default());
    assert_eq!(loader.load(&ConfigOptions::compose("/app.config"))?.config()["version"], 2);
    Ok(())
}
