//! Tests for the deep-merge algorithm.

use serde_json::json;

use super::{MERGE_LOG_KEY, MergeOptions, merge, merge_objects};

#[test]
fn later_documents_override_earlier_ones() {
    let base = json!({ "a": 1, "b": 2 });
    let over = json!({ "b": 3, "c": 4 });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());
    assert_eq!(merged, json!({ "a": 1, "b": 3, "c": 4 }));
}

#[test]
fn highest_priority_type_compatible_value_wins() {
    let a = json!({ "x": "base", "y": "base" });
    let b = json!({ "x": "mid" });
    let c = json!({ "x": "top", "z": "top" });

    let merged = merge_objects(&a, &[b, c], &MergeOptions::default());
    assert_eq!(merged, json!({ "x": "top", "y": "base", "z": "top" }));
}

#[test]
fn nested_objects_merge_recursively() {
    let base = json!({ "server": { "host": "localhost", "port": 8080 } });
    let over = json!({ "server": { "port": 9090 } });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());
    assert_eq!(merged, json!({ "server": { "host": "localhost", "port": 9090 } }));
}

#[test]
fn type_mismatch_falls_back_to_base_and_logs() {
    let base = json!({ "a": { "x": 1 } });
    let over = json!({ "a": "oops" });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());

    assert_eq!(merged["a"], json!({ "x": 1 }));
    let log = merged[MERGE_LOG_KEY].as_array().expect("merge log attached");
    assert!(!log.is_empty());
    assert!(
        log.iter().any(|line| line.as_str().is_some_and(|s| s.contains(".a"))),
        "log names the offending path: {log:?}"
    );
}

#[test]
fn array_vs_scalar_is_a_mismatch() {
    let base = json!({ "list": [1, 2, 3] });
    let over = json!({ "list": "not a list" });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());
    assert_eq!(merged["list"], json!([1, 2, 3]));
    assert!(merged.get(MERGE_LOG_KEY).is_some());
}

#[test]
fn same_typed_arrays_override_wholesale() {
    let base = json!({ "list": [1, 2, 3] });
    let over = json!({ "list": [9] });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());
    assert_eq!(merged["list"], json!([9]));
    assert!(merged.get(MERGE_LOG_KEY).is_none());
}

#[test]
fn explicit_null_override_stands_for_scalar_base() {
    let base = json!({ "a": 1 });
    let over = json!({ "a": null });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());
    assert_eq!(merged["a"], json!(null));
}

#[test]
fn null_override_is_reseeded_for_object_base() {
    let base = json!({ "a": { "x": 1 } });
    let over = json!({ "a": null });

    let merged = merge_objects(&base, &[over], &MergeOptions::default());
    assert_eq!(merged["a"], json!({ "x": 1 }));
}

#[test]
fn inputs_are_not_mutated() {
    let base = json!({ "a": { "x": 1 }, "b": 2 });
    let over = json!({ "a": "mismatch", "c": 3 });
    let base_before = base.clone();
    let over_before = over.clone();

    let _ = merge_objects(&base, &[over.clone()], &MergeOptions::default());

    assert_eq!(base, base_before);
    assert_eq!(over, over_before);
}

#[test]
fn merge_is_idempotent_once_converged() {
    let base = json!({ "a": { "x": 1 }, "b": [1, 2] });
    let over = json!({ "a": { "y": 2 }, "b": [3] });

    let mut once = merge_objects(&base, &[over], &MergeOptions::default());
    let twice = merge_objects(&once, &[once.clone()], &MergeOptions::default());

    // A self-merge introduces no new log lines.
    if let Some(map) = once.as_object_mut() {
        map.remove(MERGE_LOG_KEY);
    }
    let mut twice = twice;
    if let Some(map) = twice.as_object_mut() {
        map.remove(MERGE_LOG_KEY);
    }
    assert_eq!(once, twice);
}

#[test]
fn empty_merge_list_returns_base() {
    let base = json!({ "a": 1 });
    let merged = merge_objects(&base, &[], &MergeOptions::default());
    assert_eq!(merged, base);
}

#[test]
fn merge_log_names_the_contributing_layer() {
    let base = json!({ "a": 1 });
    let over1 = json!({ "a": 2 });
    let over2 = json!({ "a": "mismatch" });

    let merged = merge_objects(&base, &[over1, over2], &MergeOptions::default());
    let log = merged[MERGE_LOG_KEY].as_array().expect("merge log attached");
    assert!(
        log[0].as_str().is_some_and(|s| s.contains("id 2")),
        "first batch header names layer 2: {log:?}"
    );
}

#[test]
fn scalar_base_passes_through_merge() {
    let mut log = Vec::new();
    let merged = merge(json!({ "a": 1 }), &json!("scalar"), &mut log, "", &MergeOptions::default());
    assert_eq!(merged, json!({ "a": 1 }));
    assert!(log.is_empty());
}

#[test]
fn assignment_callback_sees_every_copied_scalar() {
    use std::sync::Mutex;

    let seen: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let assign = |target: &mut serde_json::Map<String, serde_json::Value>,
                  key: &str,
                  value: &serde_json::Value| {
        if let Ok(mut guard) = seen.lock() {
            guard.push(key.to_string());
        }
        target.insert(key.to_string(), value.clone());
    };

    let base = json!({ "kept": "base", "copied": "base" });
    let over = json!({ "kept": "override" });
    let options = MergeOptions { assign: Some(&assign), ..MergeOptions::default() };

    let merged = merge_objects(&base, &[over], &options);
    assert_eq!(merged, json!({ "kept": "override", "copied": "base" }));
    assert_eq!(*seen.lock().unwrap(), vec!["copied".to_string()]);
}
