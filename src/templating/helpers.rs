//! Built-in template helpers.
//!
//! The generic helper set registered into every [`TemplateEngine`]:
//! conditionals (`ifCond`, `ifContains`, `ifKey`, `ifNegative`), string
//! manipulation (`substring`, `replace`, `padLeft`), iteration over
//! index-suffixed table data (`mapTable`, `mapFieldSum`), collection
//! extremes (`minOf`, `maxOf`) and the `custom` indirection helper that
//! dispatches into the runtime-registered custom helper registry.
//!
//! Helpers never abort rendering over content problems: missing parameters
//! produce empty output and unknown custom helper names produce a marked
//! placeholder in the document.
//!
//! [`TemplateEngine`]: super::TemplateEngine

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::core::Result;

use super::registry::{CustomHelperRegistry, HelperRegistry};
use super::renderer::{HelperOptions, truthy, value_to_string};

/// Hard ceiling on `mapTable` iterations, guarding against indicator columns
/// that never run out.
const MAX_TABLE_ROWS: usize = 2000;

fn trailing_index_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.*?)(\d+)$").expect("trailing-index pattern is a valid literal")
    })
}

/// Registers the built-in helpers into `registry`.
pub(crate) fn register_builtins(registry: &HelperRegistry, custom: Arc<CustomHelperRegistry>) {
    registry.register(
        "custom",
        Arc::new(move |options: &mut HelperOptions<'_, '_>| {
            if options.params().is_empty() {
                return Ok(json!("# no custom helper name given #"));
            }
            let name = options.param_string(0);
            match custom.resolve(&name) {
                Some(function) => function(&options.params()[1..]),
                None => Ok(json!(format!("# no custom helper registered for name '{name}' #"))),
            }
        }),
    );

    registry.register("ifCond", Arc::new(if_cond));
    registry.register("ifContains", Arc::new(if_contains));
    registry.register("ifKey", Arc::new(if_key));
    registry.register("ifNegative", Arc::new(if_negative));
    registry.register("substring", Arc::new(substring));
    registry.register("replace", Arc::new(replace));
    registry.register("padLeft", Arc::new(pad_left));
    registry.register("mapTable", Arc::new(map_table));
    registry.register("mapFieldSum", Arc::new(map_field_sum));
    registry.register("minOf", Arc::new(min_of));
    registry.register("maxOf", Arc::new(max_of));
}

/// `{{#ifCond v1 'op' v2}}...{{else}}...{{/ifCond}}`
fn if_cond(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let v1 = options.param(0).cloned().unwrap_or(Value::Null);
    let operator = options.param_string(1);
    let v2 = options.param(2).cloned().unwrap_or(Value::Null);

    let matched = match operator.as_str() {
        "==" => loose_eq(&v1, &v2),
        "===" => v1 == v2,
        "!=" => !loose_eq(&v1, &v2),
        "!==" => v1 != v2,
        "<" => compare(&v1, &v2) == Ordering::Less,
        "<=" => compare(&v1, &v2) != Ordering::Greater,
        ">" => compare(&v1, &v2) == Ordering::Greater,
        ">=" => compare(&v1, &v2) != Ordering::Less,
        "&&" => truthy(&v1) && truthy(&v2),
        "||" => truthy(&v1) || truthy(&v2),
        // Unknown operators select the inverse section.
        _ => false,
    };

    render_condition(options, matched)
}

/// `{{#ifContains input needle}}...{{/ifContains}}`
fn if_contains(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let input = options.param_string(0);
    let needle = options.param_string(1);
    render_condition(options, input.contains(&needle))
}

/// `{{#ifKey input key}}...{{/ifKey}}` — matches on the first
/// whitespace-separated token of the input.
fn if_key(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let input = options.param_string(0);
    let key = options.param_string(1);
    let first = input.split(' ').next().unwrap_or("");
    render_condition(options, first == key)
}

/// `{{#ifNegative input}}...{{/ifNegative}}`
fn if_negative(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let input = options.param_string(0);
    render_condition(options, input.starts_with('-'))
}

fn render_condition(options: &mut HelperOptions<'_, '_>, matched: bool) -> Result<Value> {
    let context = options.context().clone();
    let rendered = if matched {
        options.render_block(&context)?
    } else {
        options.render_inverse(&context)?
    };
    Ok(Value::String(rendered))
}

/// `{{substring value start end [uppercase=true]}}`
fn substring(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let text = options.param_string(0);
    let chars: Vec<char> = text.chars().collect();

    let mut start = index_param(options, 1).unwrap_or(0).min(chars.len());
    let mut end = index_param(options, 2).unwrap_or(chars.len()).min(chars.len());
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }

    let mut result: String = chars[start..end].iter().collect();
    if options.hash_value("uppercase").is_some_and(truthy) {
        result = result.to_uppercase();
    }
    Ok(Value::String(result))
}

/// `{{replace value find with}}`
fn replace(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let text = options.param_string(0);
    let find = options.param_string(1);
    if text.is_empty() || find.is_empty() {
        return Ok(Value::String(text));
    }
    let with = options.param_string(2);
    Ok(Value::String(text.replace(&find, &with)))
}

/// `{{padLeft value '0000'}}` — pads to the pattern's length with its first
/// character; longer values pass through unchanged.
fn pad_left(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let text = options.param_string(0);
    let pattern = options.param_string(1);
    let width = pattern.chars().count();
    let length = text.chars().count();

    let Some(fill) = pattern.chars().next() else {
        return Ok(Value::String(text));
    };
    if length >= width {
        return Ok(Value::String(text));
    }

    let mut padded = String::with_capacity(width);
    for _ in 0..(width - length) {
        padded.push(fill);
    }
    padded.push_str(&text);
    Ok(Value::String(padded))
}

/// `{{#mapTable ctx indicatorKey="POS_NO" delimiter=","}}...{{/mapTable}}`
///
/// Iterates a flattened table: keys of the form `<field><index>` are grouped
/// by index, and the block renders once per row (in index order, starting at
/// 1) for as long as the indicator column is populated. The row context
/// carries the de-suffixed field names plus `mapIndex`.
fn map_table(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let context = options.param(0).cloned().unwrap_or(Value::Null);
    let Some(map) = context.as_object() else {
        return Ok(json!(""));
    };
    let indicator = options.hash_string("indicatorKey").unwrap_or_default();
    if indicator.is_empty() {
        return Ok(json!(""));
    }
    let delimiter = options.hash_string("delimiter");

    let rows = group_by_trailing_index(map);

    let mut out = String::new();
    for index in 1..MAX_TABLE_ROWS {
        let indicator_key = format!("{indicator}{index}");
        if !map.get(&indicator_key).is_some_and(truthy) {
            break;
        }
        if index > 1 {
            if let Some(delimiter) = &delimiter {
                out.push_str(delimiter);
            }
        }

        let mut row = rows.get(&index).cloned().unwrap_or_default();
        row.insert("mapIndex".to_string(), json!(index.to_string()));
        out.push_str(&options.render_block(&Value::Object(row))?);
    }

    Ok(Value::String(out))
}

/// `{{mapFieldSum ctx field='AMOUNT' decimals=2 onlyIfEmpty=... onlyIfNotEmpty=...}}`
///
/// Sums the values of one index-suffixed column, tolerating decimal commas,
/// and renders the total with a decimal comma.
fn map_field_sum(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    let Some(field) = options.hash_string("field").filter(|f| !f.is_empty()) else {
        return Ok(json!(""));
    };
    let context = options.param(0).cloned().unwrap_or(Value::Null);
    let Some(map) = context.as_object() else {
        return Ok(json!(""));
    };
    let only_if_empty = options.hash_string("onlyIfEmpty");
    let only_if_not_empty = options.hash_string("onlyIfNotEmpty");
    let decimals = options.hash_value("decimals").and_then(Value::as_u64);

    let mut sum = 0.0_f64;
    for (key, value) in map {
        let Some(captures) = trailing_index_pattern().captures(key) else {
            continue;
        };
        if &captures[1] != field {
            continue;
        }
        let index = &captures[2];

        if let Some(guard) = &only_if_empty {
            if !field_is_empty(map, guard, index) {
                continue;
            }
        }
        if let Some(guard) = &only_if_not_empty {
            if field_is_empty(map, guard, index) {
                continue;
            }
        }

        if let Ok(number) = value_to_string(value).replace(',', ".").parse::<f64>() {
            sum += number;
        }
    }

    let formatted = match decimals {
        Some(decimals) => format!("{:.*}", decimals as usize, sum),
        None => sum.to_string(),
    };
    Ok(Value::String(formatted.replace('.', ",")))
}

/// `{{#minOf items}}...{{/minOf}}` — renders the block once per element and
/// returns the smallest rendered value.
fn min_of(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    extreme_of(options, Ordering::Less)
}

/// `{{#maxOf items}}...{{/maxOf}}` — renders the block once per element and
/// returns the largest rendered value.
fn max_of(options: &mut HelperOptions<'_, '_>) -> Result<Value> {
    extreme_of(options, Ordering::Greater)
}

fn extreme_of(options: &mut HelperOptions<'_, '_>, wanted: Ordering) -> Result<Value> {
    let items = match options.param(0) {
        Some(Value::Array(items)) => items.clone(),
        _ => return Ok(json!("")),
    };

    let mut best: Option<String> = None;
    for item in &items {
        let rendered = options.render_block(item)?.trim().to_string();
        if rendered.is_empty() {
            continue;
        }
        best = Some(match best {
            None => rendered,
            Some(current) if compare_strings(&rendered, &current) == wanted => rendered,
            Some(current) => current,
        });
    }

    Ok(Value::String(best.unwrap_or_default()))
}

fn group_by_trailing_index(map: &Map<String, Value>) -> std::collections::BTreeMap<usize, Map<String, Value>> {
    let mut rows = std::collections::BTreeMap::new();
    for (key, value) in map {
        let Some(captures) = trailing_index_pattern().captures(key) else {
            continue;
        };
        let Ok(index) = captures[2].parse::<usize>() else {
            continue;
        };
        rows.entry(index)
            .or_insert_with(Map::new)
            .insert(captures[1].to_string(), value.clone());
    }
    rows
}

fn field_is_empty(map: &Map<String, Value>, field: &str, index: &str) -> bool {
    map.get(&format!("{field}{index}")).map(value_to_string).unwrap_or_default().is_empty()
}

fn index_param(options: &HelperOptions<'_, '_>, index: usize) -> Option<usize> {
    options.param(index).and_then(as_number).map(|n| n.max(0.0) as usize)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Loose equality: exact match, numeric match, or equal string renditions.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => value_to_string(a) == value_to_string(b),
    }
}

/// Ordering for `ifCond` relations: numeric when both sides are numeric,
/// lexicographic otherwise.
fn compare(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => value_to_string(a).cmp(&value_to_string(b)),
    }
}

fn compare_strings(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}
