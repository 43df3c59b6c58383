//! Per-user flow context and its merge rules.

use serde_json::{Map, Value};

/// Arbitrary per-user state persisted between turns.
pub type FlowContext = Map<String, Value>;

/// Deep-merges `patch` into `base`.
///
/// - a `null` in the patch removes the key (at any depth);
/// - objects merge recursively;
/// - arrays merge as an order-preserving, deduplicated union;
/// - anything else is replaced.
///
/// With `strict`, top-level keys of the patch replace the base value
/// outright (nulls still delete).
///
/// Merging is not idempotent in general: merging `{a:[1]}` with `{a:[2]}`
/// grows the array, and only deduplication makes a second identical merge
/// a no-op.
pub fn deep_merge(base: &FlowContext, patch: &FlowContext, strict: bool) -> FlowContext {
    let mut result = base.clone();

    for (key, value) in patch {
        if value.is_null() {
            result.remove(key);
            continue;
        }

        if strict {
            result.insert(key.clone(), value.clone());
            continue;
        }

        let merged = match (result.get(key), value) {
            (Some(Value::Array(left)), Value::Array(right)) => {
                let mut union = left.clone();
                for item in right {
                    if !union.contains(item) {
                        union.push(item.clone());
                    }
                }
                Value::Array(union)
            }
            (Some(Value::Object(left)), Value::Object(right)) => {
                Value::Object(deep_merge(left, right, false))
            }
            // New objects still go through the merge so nested nulls vanish.
            (_, Value::Object(right)) => Value::Object(deep_merge(&Map::new(), right, false)),
            (_, other) => other.clone(),
        };
        result.insert(key.clone(), merged);
    }

    result
}

/// Writes `value` at a dotted `path`, creating intermediate objects.
///
/// Non-object intermediates are overwritten.
pub fn set_path(target: &mut FlowContext, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
}

/// Reads the value at a dotted `path`.
pub fn get_path<'a>(source: &'a FlowContext, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    segments.try_fold(source.get(first)?, |value, segment| value.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> FlowContext {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_nested_objects_merge() {
        let merged = deep_merge(
            &ctx(json!({"a": {"x": 1}})),
            &ctx(json!({"a": {"y": 2}})),
            false,
        );
        assert_eq!(Value::Object(merged), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_null_deletes_key() {
        let merged = deep_merge(
            &ctx(json!({"a": 1, "b": {"c": 2, "d": 3}})),
            &ctx(json!({"a": null, "b": {"c": null}})),
            false,
        );
        assert_eq!(Value::Object(merged), json!({"b": {"d": 3}}));
    }

    #[test]
    fn test_nulls_in_new_objects_are_dropped() {
        let merged = deep_merge(&FlowContext::new(), &ctx(json!({"m": {"7": null, "8": 1}})), false);
        assert_eq!(Value::Object(merged), json!({"m": {"8": 1}}));
    }

    #[test]
    fn test_arrays_union_and_idempotence() {
        let same = ctx(json!({"a": [1]}));
        let once = deep_merge(&same, &same, false);
        assert_eq!(Value::Object(once.clone()), json!({"a": [1]}));

        let other = ctx(json!({"a": [2]}));
        let first = deep_merge(&same, &other, false);
        assert_eq!(Value::Object(first.clone()), json!({"a": [1, 2]}));
        // Dedup makes the repeated merge a no-op here...
        let second = deep_merge(&first, &other, false);
        assert_eq!(second, first);
        // ...but the merged result differs from the base: merging is not a
        // projection of the base.
        assert_ne!(first, same);
    }

    #[test]
    fn test_strict_replaces_arrays_and_objects() {
        let merged = deep_merge(
            &ctx(json!({"a": [1, 2], "o": {"x": 1}})),
            &ctx(json!({"a": [3], "o": {"y": 2}})),
            true,
        );
        assert_eq!(Value::Object(merged), json!({"a": [3], "o": {"y": 2}}));
    }

    #[test]
    fn test_set_and_get_path() {
        let mut target = ctx(json!({"menu": 5}));
        set_path(&mut target, "menu.7", json!(42));
        set_path(&mut target, "sum.9", json!(1));
        assert_eq!(Value::Object(target.clone()), json!({"menu": {"7": 42}, "sum": {"9": 1}}));
        assert_eq!(get_path(&target, "menu.7"), Some(&json!(42)));
        assert_eq!(get_path(&target, "menu.8"), None);
    }
}
