//! Composing configurations and rendering their values end to end.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use confect::config::{
    ConfigCache, ConfigLoader, ConfigOptions, MERGE_LOG_KEY, Principal, StaticPrincipal,
};
use confect::store::InMemoryStore;
use confect::templating::{RenderOptions, TemplateEngine};

fn loader(store: Arc<InMemoryStore>) -> ConfigLoader {
    let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::user()))));
    ConfigLoader::new(store, cache)
}

#[test]
fn compose_then_render_greeting() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/greeting.config", r#"{ "greeting": "Hello {{name}}" }"#);
    store.insert("custom/greeting.config", r#"{ "name_default": "World" }"#);

    let loaded = loader(store).load(&ConfigOptions::compose("/greeting.config"))?;
    assert_eq!(loaded.config()["name_default"], "World");

    let engine = TemplateEngine::new();
    let greeting = engine.apply_str(
        loaded.config()["greeting"].as_str().unwrap(),
        &json!({ "name": "World" }),
    )?;
    assert_eq!(greeting, "Hello World");
    Ok(())
}

#[test]
fn three_tier_composition_with_mismatch_log() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert(
        "defaults/app.config",
        r#"{ "mail": { "retries": 3, "subject": "Dear {{user}}" }, "tags": ["a"] }"#,
    );
    store.insert("site/app.config", r#"{ "mail": { "retries": 5 } }"#);
    store.insert("user/app.config", r#"{ "mail": { "retries": "lots" }, "tags": ["b", "c"] }"#);

    let loader = loader(store).with_base_paths(vec![
        "defaults".to_string(),
        "site".to_string(),
        "user".to_string(),
    ]);
    let loaded = loader.load(&ConfigOptions::compose("/app.config"))?;
    let config = loaded.config();

    // The string override of a numeric base value is discarded, the numeric
    // one from the middle tier wins, and the incident is logged.
    assert_eq!(config["mail"]["retries"], 5);
    assert_eq!(config["tags"], json!(["b", "c"]));
    assert!(config[MERGE_LOG_KEY].as_array().is_some_and(|log| !log.is_empty()));
    Ok(())
}

#[test]
fn whole_config_renders_recursively() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert(
        "base/doc.config",
        r#"{
            "header": "Invoice {{invoice.no}}",
            "lines": ["{{invoice.net}}", "{{invoice.missing}}"],
            "footer": { "note": "Generated for {{invoice.customer}}" }
        }"#,
    );

    let loaded = loader(store).load(&ConfigOptions::compose("/doc.config"))?;
    let engine = TemplateEngine::new();
    let data = json!({ "invoice": { "no": "4711", "net": "99,50", "customer": "ACME" } });

    let rendered = engine.render(loaded.config(), &data, RenderOptions::default())?;

    assert_eq!(rendered["header"], "Invoice 4711");
    assert_eq!(rendered["lines"][0], "99,50");
    // Unresolved placeholders stay visible instead of vanishing.
    assert_eq!(rendered["lines"][1], "{{invoice.missing}}");
    assert_eq!(rendered["footer"]["note"], "Generated for ACME");
    Ok(())
}

#[test]
fn force_reload_sees_store_updates() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "version": 1 }"#);
    let loader = loader(store.clone());

    assert_eq!(loader.load(&ConfigOptions::compose("/app.config"))?.config()["version"], 1);

    store.insert("base/app.config", r#"{ "version": 2 }"#);
    assert_eq!(
        loader.load(&ConfigOptions::compose("/app.config"))?.config()["version"],
        1,
        "stale entry served until explicitly refreshed"
    );

    let forced = loader.load(&ConfigOptions {
        force_reload: true,
        ..ConfigOptions::compose("/app.config")
    })?;
    assert_eq!(forced.config()["version"], 2);
    Ok(())
}

#[test]
fn copied_configs_are_isolated_from_each_other() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/app.config", r#"{ "list": [1, 2] }"#);
    let loader = loader(store);

    let options = ConfigOptions { copy: true, ..ConfigOptions::compose("/app.config") };
    let first = loader.load(&options)?;
    let mut first = first.into_config();
    first["list"].as_array_mut().unwrap().push(json!(3));

    let second = loader.load(&options)?;
    assert_eq!(second.config()["list"], json!([1, 2]));
    Ok(())
}

#[test]
fn save_new_then_load_round_trips() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let loader = loader(store);

    let config = json!({ "exampleConfigProperty": "a String", "anotherProperty": 4711 });
    loader.save_new("base/new.config", &config)?;

    let loaded = loader.load(&ConfigOptions::direct("base/new.config"))?;
    assert_eq!(loaded.config(), &config);
    Ok(())
}

#[test]
fn custom_helpers_reach_composed_values() -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    store.insert("base/doc.config", r#"{ "line": "{{custom 'upper' name}}" }"#);

    let loaded = loader(store).load(&ConfigOptions::compose("/doc.config"))?;

    let engine = TemplateEngine::new();
    engine.register_custom_helper(
        "upper",
        Arc::new(|args: &[serde_json::Value]| {
            Ok(json!(args.first().and_then(|v| v.as_str()).unwrap_or("").to_uppercase()))
        }),
    );

    let rendered =
        engine.render(loaded.config(), &json!({ "name": "acme" }), RenderOptions::default())?;
    assert_eq!(rendered["line"], "ACME");
    Ok(())
}
