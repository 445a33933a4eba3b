//! confect — layered configuration composition and template rendering.
//!
//! confect loads JSON configuration documents from a pluggable document
//! store, composes them across priority tiers into one effective
//! configuration, and renders configuration values into final document text
//! through a double-curly template engine with a pluggable helper registry.
//!
//! # Architecture Overview
//!
//! A configuration request flows through four stages:
//!
//! 1. The [`config::ConfigLoader`] resolves the request — a direct document
//!    reference, or a compose path expanded across base-path tiers — against
//!    the [`store::DocumentStore`] collaborator.
//! 2. Fetched documents are folded by the deep-merge algorithm in
//!    [`config::merge`]: later tiers override earlier ones per key, and
//!    overrides that would change the base's shape are discarded with a
//!    logged warning.
//! 3. The effective configuration is cached through [`config::ConfigCache`],
//!    which also enforces the `$protected` and admin-bypass policies.
//! 4. Configuration values are rendered by the
//!    [`templating::TemplateEngine`], which compiles template strings (with
//!    a size-bounded compiled-template cache) and executes them against a
//!    data context, dispatching `{{helper ...}}` invocations through the
//!    [`templating::HelperRegistry`].
//!
//! # Core Modules
//!
//! - [`cache`] - concurrent keyed store underneath both caches
//! - [`config`] - loader, tier composition, deep merge, cache policy
//! - [`core`] - error types
//! - [`store`] - document store and remote delegation traits
//! - [`templating`] - template compiler, renderer and helper registries
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use confect::config::{ConfigCache, ConfigLoader, ConfigOptions, Principal, StaticPrincipal};
//! use confect::store::InMemoryStore;
//! use confect::templating::TemplateEngine;
//!
//! let store = Arc::new(InMemoryStore::new());
//! store.insert("base/mail.config", r#"{ "subject": "Hello {{name}}" }"#);
//!
//! let cache = Arc::new(ConfigCache::new(Arc::new(StaticPrincipal(Principal::user()))));
//! let loader = ConfigLoader::new(store, cache);
//! let config = loader.load(&ConfigOptions::compose("/mail.config")).unwrap();
//!
//! let engine = TemplateEngine::new();
//! let subject = engine
//!     .apply_str(config.config()["subject"].as_str().unwrap(), &json!({ "name": "World" }))
//!     .unwrap();
//! assert_eq!(subject, "Hello World");
//! ```
//!
//! # Failure philosophy
//!
//! Wherever output is end-user-facing document text, confect prefers
//! visible degradation over silent loss or hard failure: merge type
//! mismatches keep the base value and log, unresolved templates fall back
//! to their original text, and missing helpers render a marked placeholder.
//! Programmer errors (empty cache keys, missing mandatory parameters) fail
//! fast instead.

pub mod cache;
pub mod config;
pub mod core;
pub mod store;
pub mod templating;

pub use crate::core::{ConfectError, Result};
