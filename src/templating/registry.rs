//! Helper registries.
//!
//! Two registries back helper dispatch:
//!
//! - [`HelperRegistry`] maps helper names to [`Helper`] implementations and
//!   is consulted for every `{{name ...}}` invocation. The built-in helpers
//!   are registered here when a [`crate::templating::TemplateEngine`] is
//!   constructed; embedders may add their own.
//! - [`CustomHelperRegistry`] holds the plain functions reachable through the
//!   `custom` indirection helper (`{{custom 'name' args...}}`), the
//!   extension point for helpers registered at runtime.
//!
//! Both registries live for the engine's lifetime and are deliberately
//! permissive: re-registering a name overwrites the previous entry with a
//! warning, which keeps hot-patching helpers during development possible.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::core::Result;

use super::renderer::HelperOptions;

/// A named template helper.
///
/// Helpers receive their evaluated positional parameters, hash parameters
/// and — for block invocations — the body and inverse continuations through
/// [`HelperOptions`], and produce a value that is spliced into the output.
pub trait Helper: Send + Sync {
    /// Invokes the helper.
    fn call(&self, options: &mut HelperOptions<'_, '_>) -> Result<Value>;
}

impl<F> Helper for F
where
    F: Fn(&mut HelperOptions<'_, '_>) -> Result<Value> + Send + Sync,
{
    fn call(&self, options: &mut HelperOptions<'_, '_>) -> Result<Value> {
        self(options)
    }
}

/// Name → helper mapping consulted by the renderer.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: DashMap<String, Arc<dyn Helper>>,
}

impl HelperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a helper under `name`. Last write wins; replacing an
    /// existing helper logs a warning.
    pub fn register(&self, name: impl Into<String>, helper: Arc<dyn Helper>) {
        let name = name.into();
        if self.helpers.insert(name.clone(), helper).is_some() {
            tracing::warn!("overriding existing helper '{name}'");
        }
    }

    /// Resolves a helper by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Helper>> {
        self.helpers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }
}

/// A function reachable through the `custom` indirection helper.
///
/// Receives the evaluated arguments after the helper name.
pub type CustomHelperFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// Name → function mapping behind `{{custom 'name' ...}}`.
#[derive(Default)]
pub struct CustomHelperRegistry {
    helpers: DashMap<String, Arc<CustomHelperFn>>,
}

impl CustomHelperRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom helper function. Last write wins; replacing an
    /// existing function logs a warning.
    pub fn register(&self, name: impl Into<String>, function: Arc<CustomHelperFn>) {
        let name = name.into();
        if self.helpers.insert(name.clone(), function).is_some() {
            tracing::warn!("overriding existing custom helper '{name}'");
        }
    }

    /// Resolves a custom helper function by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<CustomHelperFn>> {
        self.helpers.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_and_resolve() {
        let registry = HelperRegistry::new();
        assert!(registry.resolve("upper").is_none());

        registry.register(
            "upper",
            Arc::new(|options: &mut HelperOptions<'_, '_>| {
                let input = options.param_string(0);
                Ok(json!(input.to_uppercase()))
            }),
        );
        assert!(registry.contains("upper"));
        assert!(registry.resolve("upper").is_some());
    }

    #[test]
    fn last_registration_wins() {
        let registry = CustomHelperRegistry::new();
        registry.register("f", Arc::new(|_: &[Value]| Ok(json!(1))));
        registry.register("f", Arc::new(|_: &[Value]| Ok(json!(2))));

        let f = registry.resolve("f").unwrap();
        assert_eq!(f(&[]).unwrap(), json!(2));
    }
}
