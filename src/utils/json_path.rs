//! Dotted-path accessors over `serde_json` object trees.
//!
//! Paths look like `config.retries`. Segments must be non-empty; a path with
//! a leading dot, trailing dot, or `..` addresses nothing.

use serde_json::{Map, Value};

fn segments(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return None;
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

/// Read the value at `path`, descending only through objects.
pub fn get<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let parts = segments(path)?;
    let (last, parents) = parts.split_last()?;
    let mut current = root;
    for part in parents {
        current = current.get(*part)?.as_object()?;
    }
    current.get(*last)
}

/// Read the value at `path`, treating JSON null as absent.
pub fn get_present<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    get(root, path).filter(|v| !v.is_null())
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// A non-object value sitting on an intermediate segment is replaced by an
/// empty object. Returns `false` when the path is malformed.
pub fn set(root: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    let Some(parts) = segments(path) else {
        return false;
    };
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };
    let mut current = root;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot.as_object_mut() {
            Some(map) => map,
            None => return false,
        };
    }
    current.insert(last.to_string(), value);
    true
}

/// Remove the value at `path`, returning it. Intermediate objects are kept.
pub fn remove(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let parts = segments(path)?;
    let (last, parents) = parts.split_last()?;
    let mut current = root;
    for part in parents {
        current = current.get_mut(*part)?.as_object_mut()?;
    }
    current.remove(*last)
}

/// Render a scalar the way placeholders and string parameters expect:
/// strings verbatim, everything else as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_nested() {
        let root = obj(json!({"config": {"retries": 3}, "name": "a"}));
        assert_eq!(get(&root, "config.retries"), Some(&json!(3)));
        assert_eq!(get(&root, "name"), Some(&json!("a")));
        assert_eq!(get(&root, "config.missing"), None);
        assert_eq!(get(&root, "name.inner"), None);
    }

    #[test]
    fn test_malformed_paths_address_nothing() {
        let root = obj(json!({"a": {"b": 1}}));
        assert_eq!(get(&root, ".a"), None);
        assert_eq!(get(&root, "a."), None);
        assert_eq!(get(&root, "a..b"), None);
        assert_eq!(get(&root, ""), None);
    }

    #[test]
    fn test_null_is_absent() {
        let root = obj(json!({"a": null}));
        assert!(get(&root, "a").is_some());
        assert!(get_present(&root, "a").is_none());
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut root = Map::new();
        assert!(set(&mut root, "config.limits.max", json!(5)));
        assert_eq!(Value::Object(root), json!({"config": {"limits": {"max": 5}}}));
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut root = obj(json!({"config": "oops"}));
        assert!(set(&mut root, "config.a", json!(true)));
        assert_eq!(Value::Object(root), json!({"config": {"a": true}}));
    }

    #[test]
    fn test_remove_keeps_parent() {
        let mut root = obj(json!({"config": {"a": 1, "b": 2}}));
        assert_eq!(remove(&mut root, "config.a"), Some(json!(1)));
        assert_eq!(Value::Object(root), json!({"config": {"b": 2}}));
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render(&json!("x")), "x");
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!(true)), "true");
    }
}
