//! Deep merge of configuration documents.
//!
//! The merge folds an ordered list of JSON documents into one effective
//! configuration. Later documents override earlier ones per key, recursively
//! for nested objects, with one hard rule: an override may never change the
//! *shape* of the base. A value whose type differs from the base's is
//! discarded, the base value is deep-cloned in its place, and a warning line
//! naming the dotted path is recorded. All such lines are attached to the
//! final result under [`MERGE_LOG_KEY`] so broken override documents are
//! observable without failing the load.
//!
//! # Priority
//!
//! ```rust
//! use serde_json::json;
//! use confect::config::merge::{merge_objects, MergeOptions};
//!
//! let base = json!({ "a": "hello", "b": "world" });
//! let over = json!({ "b": "developer", "c": "foobar" });
//!
//! let merged = merge_objects(&base, &[over], &MergeOptions::default());
//! assert_eq!(merged, json!({ "a": "hello", "b": "developer", "c": "foobar" }));
//! ```
//!
//! Inputs are taken by reference and never mutated; callers keep sole
//! ownership of the documents they pass in.

use std::mem::discriminant;

use serde_json::{Map, Value};

/// Key under which accumulated type-mismatch warnings are attached to the
/// merged result.
pub const MERGE_LOG_KEY: &str = "_$mergeLog$_";

/// Property assignment hook, called for every scalar copied from base into
/// the override. The callback performs the assignment itself.
pub type AssignFn<'f> = dyn Fn(&mut Map<String, Value>, &str, &Value) + Send + Sync + 'f;

/// Per-property recursion decision: given the override object, the property
/// name and the base value, returns `true` to merge recursively.
pub type RecursionCheck<'f> = dyn Fn(&Map<String, Value>, &str, &Value) -> bool + Send + Sync + 'f;

/// Options for [`merge`] and [`merge_objects`].
#[derive(Default)]
pub struct MergeOptions<'a> {
    /// Start path prepended to the dotted paths in log lines.
    pub path: Option<&'a str>,
    /// Assignment callback; plain insertion when absent.
    pub assign: Option<&'a AssignFn<'a>>,
    /// Recursion decision; when absent, every object-valued base property
    /// recurses.
    pub recursion_check: Option<&'a RecursionCheck<'a>>,
}

/// Merges a prioritized list of documents into one effective configuration.
///
/// `base` is the lowest-priority document; priority increases left to right
/// through `merge_list`, so for any key the value from the highest-index
/// document that defines it (with a type-compatible value) wins. Unmergeable
/// overrides are replaced per the type-mismatch rule and the collected
/// warnings, if any, end up under [`MERGE_LOG_KEY`] in the result.
///
/// With an empty `merge_list` the base is returned as-is (cloned).
pub fn merge_objects(base: &Value, merge_list: &[Value], options: &MergeOptions<'_>) -> Value {
    if merge_list.is_empty() {
        return base.clone();
    }

    let path = options.path.unwrap_or("");
    let mut log: Vec<String> = Vec::new();

    // Fold from the highest-priority document downwards, so each step sees
    // the next-lower layer as its base.
    let mut layers: Vec<Value> = Vec::with_capacity(merge_list.len() + 1);
    layers.push(base.clone());
    layers.extend(merge_list.iter().cloned());

    let mut idx = layers.len() - 1;
    let mut custom = match layers.pop() {
        Some(top) => top,
        None => return base.clone(),
    };

    while let Some(lower) = layers.pop() {
        let mut step_log = Vec::new();
        custom = merge(custom, &lower, &mut step_log, path, options);
        if !step_log.is_empty() {
            log.push(format!("Custom argument id {idx} contains logs!"));
            log.append(&mut step_log);
        }
        idx -= 1;
    }

    if !log.is_empty() {
        if let Value::Object(map) = &mut custom {
            map.insert(
                MERGE_LOG_KEY.to_string(),
                Value::Array(log.into_iter().map(Value::String).collect()),
            );
        }
    }

    custom
}

/// Merges all properties of `base` into `custom` and returns the result.
///
/// Existing properties in `custom` are preserved, but only if their type
/// matches the type of the property in `base`; otherwise the base value is
/// used (deep-cloned) and a warning is pushed to `log`. Nested objects merge
/// recursively with the dotted path extended per level.
///
/// Non-object inputs pass through: there is nothing to iterate when `base`
/// is a scalar, and nothing to assign into when `custom` is one.
pub fn merge(
    mut custom: Value,
    base: &Value,
    log: &mut Vec<String>,
    path: &str,
    options: &MergeOptions<'_>,
) -> Value {
    let Value::Object(base_map) = base else {
        return custom;
    };
    let Value::Object(custom_map) = &mut custom else {
        return custom;
    };

    for (key, base_value) in base_map {
        let mismatch = match custom_map.get(key) {
            Some(custom_value) => {
                !custom_value.is_null()
                    && !base_value.is_null()
                    && discriminant(custom_value) != discriminant(base_value)
            }
            None => false,
        };

        if mismatch {
            // Override documents may not change the shape of the base schema.
            log.push(format!(
                "Warning: The type of custom property {path}.{key} is not the same as in the target. Custom property is ignored."
            ));
            custom_map.insert(key.clone(), base_value.clone());
        } else if should_recurse(custom_map, key, base_value, options) {
            let slot = match custom_map.remove(key) {
                Some(value @ Value::Object(_)) => value,
                _ => Value::Object(Map::new()),
            };
            let merged = merge(slot, base_value, log, &format!("{path}.{key}"), options);
            custom_map.insert(key.clone(), merged);
        } else if !custom_map.contains_key(key) {
            match (base_value, options.assign) {
                // Arrays are always deep-cloned, never shared with the base.
                (Value::Array(_), _) => {
                    custom_map.insert(key.clone(), base_value.clone());
                }
                (_, Some(assign)) => assign(custom_map, key, base_value),
                (_, None) => {
                    custom_map.insert(key.clone(), base_value.clone());
                }
            }
        }
        // Same-typed value already present in custom: the override wins.
    }

    custom
}

fn should_recurse(
    custom_map: &Map<String, Value>,
    key: &str,
    base_value: &Value,
    options: &MergeOptions<'_>,
) -> bool {
    match options.recursion_check {
        Some(check) => check(custom_map, key, base_value),
        None => base_value.is_object(),
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod merge_tests;
