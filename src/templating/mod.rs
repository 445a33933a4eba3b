//! Template compilation and rendering.
//!
//! This module provides the double-curly template engine used to turn
//! configuration values into final document text. Templates interpolate
//! dotted data paths, call named helpers with positional and `key=value`
//! arguments, and nest block helpers that render their body zero or more
//! times against new contexts.
//!
//! # Using templates from a string
//!
//! ```rust
//! use serde_json::json;
//! use confect::templating::TemplateEngine;
//!
//! let engine = TemplateEngine::new();
//! let result = engine.apply_str("Hello {{name}}.", &json!({ "name": "Marcus" })).unwrap();
//! assert_eq!(result, "Hello Marcus.");
//! ```
//!
//! # Helper functions
//!
//! Built-in helpers cover conditionals, string manipulation and iteration
//! over index-suffixed table data (see [`registry`] and the examples below).
//! Additional helpers can be registered on the engine, either as first-class
//! [`Helper`] implementations or as plain functions reachable through the
//! `custom` indirection helper:
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use confect::templating::TemplateEngine;
//!
//! let engine = TemplateEngine::new();
//! engine.register_custom_helper("shout", Arc::new(|args| {
//!     Ok(json!(args.first().map(|v| v.as_str().unwrap_or("").to_uppercase()).unwrap_or_default()))
//! }));
//!
//! let result = engine.apply_str("{{custom 'shout' word}}", &json!({ "word": "hi" })).unwrap();
//! assert_eq!(result, "HI");
//! ```
//!
//! Invoking an unregistered name does not fail the render; it produces a
//! visibly marked placeholder so a missing helper degrades gracefully in
//! generated documents.
//!
//! # Conditionals and iteration
//!
//! ```text
//! {{#ifCond invoice.status '==' 'open'}}pending{{else}}done{{/ifCond}}
//!
//! {{#mapTable positions indicatorKey="POS_NO" delimiter=","}}
//!   {{POS_NO}} {{POS_DATA}}
//! {{/mapTable}}
//! ```
//!
//! # Deep rendering
//!
//! [`TemplateEngine::render`] templates whole JSON trees in one call:
//! strings containing template markers are rendered, arrays and objects
//! recurse, everything else passes through. A string template that renders
//! to nothing returns the original template text by default, so unresolved
//! placeholders stay visible rather than silently disappearing — set
//! [`RenderOptions::empty_non_rendered`] to get the empty string instead.
//!
//! # Concurrency
//!
//! Compiled templates are immutable and execution keeps its state on the
//! call stack, so templates compile and execute concurrently without any
//! locking. The compiled-template cache tolerates racing duplicate compiles;
//! the last writer wins.

pub mod compiler;
mod helpers;
mod parser;
pub mod registry;
pub mod renderer;


use std::sync::Arc;

use serde_json::{Map, Value};

pub use compiler::{CACHEABLE_SOURCE_LIMIT, COMPILE_RETRIES, CompiledTemplate, TemplateCompiler};
pub use registry::{CustomHelperFn, CustomHelperRegistry, Helper, HelperRegistry};
pub use renderer::{HelperOptions, RenderOptions};

use crate::core::{ConfectError, Result};
use renderer::Executor;

/// Compiles and executes templates against a helper registry.
///
/// Owns the compiled-template cache and both helper registries. Construct
/// one per process (or per isolation domain) and share it by reference;
/// all state is internally synchronized.
pub struct TemplateEngine {
    compiler: TemplateCompiler,
    helpers: HelperRegistry,
    custom: Arc<CustomHelperRegistry>,
}

impl TemplateEngine {
    /// Creates an engine with the built-in helpers registered.
    pub fn new() -> Self {
        let helpers = HelperRegistry::new();
        let custom = Arc::new(CustomHelperRegistry::new());
        helpers::register_builtins(&helpers, Arc::clone(&custom));
        Self { compiler: TemplateCompiler::new(), helpers, custom }
    }

    /// Compiles `source`, using the compiled-template cache.
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledTemplate>> {
        self.compiler.compile(source)
    }

    /// Executes a compiled template against `data`.
    pub fn apply(&self, template: &CompiledTemplate, data: &Value) -> Result<String> {
        Executor::execute(self, template, data)
    }

    /// Executes a compiled template, preserving the result type when the
    /// template is a single bare expression (`"{{prop}}"`).
    pub fn apply_value(&self, template: &CompiledTemplate, data: &Value) -> Result<Value> {
        Executor::execute_value(self, template, data)
    }

    /// Compiles and executes `source` in one step.
    pub fn apply_str(&self, source: &str, data: &Value) -> Result<String> {
        let template = self.compile(source)?;
        self.apply(&template, data)
    }

    /// Recursively renders a JSON tree against `data`.
    ///
    /// Strings containing template markers are rendered and trimmed; arrays
    /// and objects recurse; other values pass through unchanged. String
    /// templates rendering to nothing fall back to the original template
    /// text unless [`RenderOptions::empty_non_rendered`] is set. Failures
    /// while rendering an object property leave that property unchanged;
    /// failures at the top level or inside arrays propagate.
    pub fn render(&self, template: &Value, data: &Value, options: RenderOptions) -> Result<Value> {
        match template {
            Value::String(source) => self.render_string(source, data, options),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render(item, data, options))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = Map::new();
                for (key, value) in map {
                    match self.render(value, data, options) {
                        Ok(result) => {
                            rendered.insert(key.clone(), result);
                        }
                        Err(err) => {
                            tracing::debug!("keeping property '{key}' unrendered: {err}");
                            rendered.insert(key.clone(), value.clone());
                        }
                    }
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }

    /// The helper registry consulted for every invocation.
    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    /// Registers a first-class helper under `name` (last write wins, with a
    /// warning on overwrite).
    pub fn register_helper(&self, name: impl Into<String>, helper: Arc<dyn Helper>) {
        self.helpers.register(name, helper);
    }

    /// Registers a function reachable through `{{custom 'name' ...}}`.
    pub fn register_custom_helper(&self, name: impl Into<String>, function: Arc<CustomHelperFn>) {
        self.custom.register(name, function);
    }

    fn render_string(&self, source: &str, data: &Value, options: RenderOptions) -> Result<Value> {
        if !source.contains("{{") {
            return Ok(Value::String(source.to_string()));
        }

        let template = self.compile(source)?;
        let rendered = self.apply_value(&template, data)?;

        match rendered {
            Value::String(_) | Value::Null => {
                let text = match &rendered {
                    Value::String(text) => text.trim(),
                    _ => "",
                };
                if text.is_empty() && !options.empty_non_rendered {
                    // Fail soft: an unresolved template stays visible.
                    return Ok(Value::String(source.to_string()));
                }
                Ok(Value::String(text.to_string()))
            }
            other if options.stringify_results => serde_json::to_string(&other)
                .map(Value::String)
                .map_err(|err| ConfectError::Render(err.to_string())),
            other => Ok(other),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
