//! Template execution.
//!
//! The executor walks a compiled node tree against a stack of data scopes.
//! Block helpers push the context they iterate with onto the stack, which is
//! what gives `../` paths their meaning inside a block. Execution never
//! mutates the compiled template, so any number of threads may execute the
//! same template concurrently.
//!
//! Failure policy follows the rest of the crate: content-shaped problems
//! degrade visibly instead of failing. A path that resolves nowhere renders
//! empty, an invocation of an unregistered helper renders a marked
//! placeholder, and the deep [`render`](crate::templating::TemplateEngine::render)
//! utility falls back to the original template text when a render comes back
//! empty — unresolved placeholders stay visible in generated documents
//! rather than silently disappearing.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::Result;

use super::TemplateEngine;
use super::compiler::CompiledTemplate;
use super::parser::{Argument, Invocation, Node, PathExpr};

static NULL: Value = Value::Null;

/// Options for the deep-render utility. Deserializes from the camel-cased
/// option objects call sites conventionally pass
/// (`{ "emptyNonRendered": true }`).
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Return the empty string for templates that render to nothing, instead
    /// of falling back to the original template text.
    pub empty_non_rendered: bool,
    /// JSON-serialize non-string results of single-expression templates.
    pub stringify_results: bool,
}

/// The body and inverse sections of a block invocation.
#[derive(Clone, Copy)]
pub(crate) struct BlockParts<'t> {
    pub body: &'t [Node],
    pub inverse: &'t [Node],
}

/// Everything a helper gets to see: evaluated parameters, hash arguments,
/// the current context, and — for block helpers — the continuations that
/// render the contained block or its inverse against a chosen context.
pub struct HelperOptions<'a, 'e> {
    params: Vec<Value>,
    hash: BTreeMap<String, Value>,
    block: Option<BlockParts<'a>>,
    executor: &'a mut Executor<'e>,
}

impl HelperOptions<'_, '_> {
    /// All evaluated positional parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The `i`-th positional parameter.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }

    /// The `i`-th positional parameter rendered to a string (missing
    /// parameters render empty).
    pub fn param_string(&self, index: usize) -> String {
        self.params.get(index).map(value_to_string).unwrap_or_default()
    }

    /// A hash argument by key.
    pub fn hash_value(&self, key: &str) -> Option<&Value> {
        self.hash.get(key)
    }

    /// A hash argument rendered to a string.
    pub fn hash_string(&self, key: &str) -> Option<String> {
        self.hash.get(key).map(value_to_string)
    }

    /// The current data context (`this`).
    pub fn context(&self) -> &Value {
        self.executor.scopes.last().unwrap_or(&NULL)
    }

    /// Whether this is a block invocation.
    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }

    /// Renders the contained block against `context`. Returns the empty
    /// string for non-block invocations.
    pub fn render_block(&mut self, context: &Value) -> Result<String> {
        let Some(parts) = self.block else {
            return Ok(String::new());
        };
        self.executor.render_section(parts.body, context)
    }

    /// Renders the `{{else}}` section against `context`.
    pub fn render_inverse(&mut self, context: &Value) -> Result<String> {
        let Some(parts) = self.block else {
            return Ok(String::new());
        };
        self.executor.render_section(parts.inverse, context)
    }
}

pub(crate) struct Executor<'e> {
    engine: &'e TemplateEngine,
    scopes: Vec<Value>,
}

impl<'e> Executor<'e> {
    pub(crate) fn new(engine: &'e TemplateEngine, data: &Value) -> Self {
        Self { engine, scopes: vec![data.clone()] }
    }

    /// Executes a compiled template to a string.
    pub(crate) fn execute(engine: &TemplateEngine, template: &CompiledTemplate, data: &Value) -> Result<String> {
        let mut executor = Executor::new(engine, data);
        let mut out = String::new();
        executor.render_nodes(template.nodes(), &mut out)?;
        Ok(out)
    }

    /// Executes a compiled template, preserving the value type when the
    /// whole template is one bare expression.
    pub(crate) fn execute_value(
        engine: &TemplateEngine,
        template: &CompiledTemplate,
        data: &Value,
    ) -> Result<Value> {
        if let [Node::Expression(invocation)] = template.nodes() {
            let mut executor = Executor::new(engine, data);
            return executor.eval_invocation(invocation, None);
        }
        Self::execute(engine, template, data).map(Value::String)
    }

    fn render_section(&mut self, nodes: &[Node], context: &Value) -> Result<String> {
        self.scopes.push(context.clone());
        let mut out = String::new();
        let result = self.render_nodes(nodes, &mut out);
        self.scopes.pop();
        result?;
        Ok(out)
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Expression(invocation) => {
                    let value = self.eval_invocation(invocation, None)?;
                    out.push_str(&value_to_string(&value));
                }
                Node::Block { invocation, body, inverse } => {
                    let parts = BlockParts { body, inverse };
                    let value = self.eval_invocation(invocation, Some(parts))?;
                    out.push_str(&value_to_string(&value));
                }
            }
        }
        Ok(())
    }

    fn eval_invocation(
        &mut self,
        invocation: &Invocation,
        block: Option<BlockParts<'_>>,
    ) -> Result<Value> {
        let plain_name = invocation.path.parents == 0 && invocation.path.segments.len() <= 1;
        let helper_shaped = block.is_some()
            || !invocation.args.is_empty()
            || !invocation.hash.is_empty()
            || (plain_name && self.engine.helpers().contains(&invocation.name));

        if !helper_shaped {
            return Ok(self.lookup(&invocation.path).unwrap_or(Value::Null));
        }

        let Some(helper) = self.engine.helpers().resolve(&invocation.name) else {
            // Missing helpers degrade to a visible marker, never an error.
            tracing::warn!("no helper registered for name '{}'", invocation.name);
            return Ok(Value::String(missing_helper_placeholder(&invocation.name)));
        };

        let params: Vec<Value> =
            invocation.args.iter().map(|arg| self.eval_argument(arg)).collect();
        let hash: BTreeMap<String, Value> = invocation
            .hash
            .iter()
            .map(|(key, arg)| (key.clone(), self.eval_argument(arg)))
            .collect();

        let mut options = HelperOptions { params, hash, block, executor: self };
        helper.call(&mut options)
    }

    fn eval_argument(&self, argument: &Argument) -> Value {
        match argument {
            Argument::Path(path) => self.lookup(path).unwrap_or(Value::Null),
            Argument::String(text) => Value::String(text.clone()),
            Argument::Number(number) => number_value(*number),
            Argument::Bool(flag) => Value::Bool(*flag),
        }
    }

    fn lookup(&self, path: &PathExpr) -> Option<Value> {
        let index = self.scopes.len().checked_sub(1 + path.parents)?;
        let mut current = self.scopes.get(index)?;
        for segment in &path.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

/// Placeholder rendered for invocations of unregistered helpers.
pub(crate) fn missing_helper_placeholder(name: &str) -> String {
    format!("# no helper registered for name '{name}' #")
}

/// Stringifies a value for interpolation into template output.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

/// Template truthiness: null, `false`, `0` and the empty string are falsy.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Converts a parsed numeric literal, preferring integer representation.
fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}
