//! Object builtins. Path arguments (`get`, `set`, `has`, `delete`) use
//! dotted notation with numeric segments indexing into arrays.

use serde_json::{Map, Value};

use super::{arg, coerce_arr, coerce_str};
use crate::expr::eval::values_equal;

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "keys" => match arg(args, 0) {
            Value::Object(map) => Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            ),
            _ => Value::Array(Vec::new()),
        },
        "values" => match arg(args, 0) {
            Value::Object(map) => Value::Array(map.values().cloned().collect()),
            _ => Value::Array(Vec::new()),
        },
        "entries" => match arg(args, 0) {
            Value::Object(map) => Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ),
            _ => Value::Array(Vec::new()),
        },
        "from_entries" => {
            let mut map = Map::new();
            for entry in coerce_arr(arg(args, 0)) {
                if let Value::Array(pair) = entry
                    && let Some(key) = pair.first()
                {
                    map.insert(
                        coerce_str(key),
                        pair.get(1).cloned().unwrap_or(Value::Null),
                    );
                }
            }
            Value::Object(map)
        }
        "get" => {
            let path = coerce_str(arg(args, 1));
            let found = get_path(arg(args, 0), &path);
            if found.is_null() {
                args.get(2).cloned().unwrap_or(Value::Null)
            } else {
                found
            }
        }
        "has" => {
            let path = coerce_str(arg(args, 1));
            Value::Bool(has_path(arg(args, 0), &path))
        }
        "merge" => {
            // Shallow merge, later arguments winning.
            let mut out = Map::new();
            for value in args {
                if let Value::Object(map) = value {
                    for (k, v) in map {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
            Value::Object(out)
        }
        "pick" => {
            let keys: Vec<String> = coerce_arr(arg(args, 1)).iter().map(coerce_str).collect();
            match arg(args, 0) {
                Value::Object(map) => Value::Object(
                    map.iter()
                        .filter(|(k, _)| keys.iter().any(|want| want == *k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                _ => Value::Object(Map::new()),
            }
        }
        "omit" => {
            let keys: Vec<String> = coerce_arr(arg(args, 1)).iter().map(coerce_str).collect();
            match arg(args, 0) {
                Value::Object(map) => Value::Object(
                    map.iter()
                        .filter(|(k, _)| !keys.iter().any(|drop| drop == *k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                _ => Value::Object(Map::new()),
            }
        }
        "size" => {
            let n = match arg(args, 0) {
                Value::Object(map) => map.len(),
                Value::Array(items) => items.len(),
                Value::String(s) => s.chars().count(),
                _ => 0,
            };
            Value::Number(serde_json::Number::from(n))
        }
        "set" => {
            let mut out = arg(args, 0).clone();
            let path = coerce_str(arg(args, 1));
            set_path(&mut out, &path, arg(args, 2).clone());
            out
        }
        "delete" => {
            let mut out = arg(args, 0).clone();
            let path = coerce_str(arg(args, 1));
            delete_path(&mut out, &path);
            out
        }
        "equals" => Value::Bool(values_equal(arg(args, 0), arg(args, 1))),
        "clone" => arg(args, 0).clone(),
        _ => return None,
    };
    Some(Ok(result))
}

/// Resolve a dotted path; missing segments yield `null`.
pub(super) fn get_path(value: &Value, path: &str) -> Value {
    if path.is_empty() {
        return value.clone();
    }
    let mut cursor = value;
    for segment in path.split('.') {
        cursor = match cursor {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    cursor.clone()
}

fn has_path(value: &Value, path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let mut cursor = value;
    for segment in path.split('.') {
        cursor = match cursor {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return false,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return false,
            },
            _ => return false,
        };
    }
    true
}

/// Set a dotted path, creating intermediate objects as needed. Returns the
/// modified value through the `&mut` root (the builtin works on a clone).
fn set_path(root: &mut Value, path: &str, new_value: Value) {
    if path.is_empty() {
        return;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut cursor = root;
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        if !cursor.is_object() && !cursor.is_array() {
            *cursor = Value::Object(Map::new());
        }
        match cursor {
            Value::Object(map) => {
                if last {
                    map.insert((*segment).to_string(), new_value);
                    return;
                }
                cursor = map
                    .entry((*segment).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            Value::Array(items) => {
                let Some(index) = segment.parse::<usize>().ok().filter(|i| *i < items.len())
                else {
                    return;
                };
                if last {
                    items[index] = new_value;
                    return;
                }
                cursor = &mut items[index];
            }
            _ => unreachable!("coerced to object above"),
        }
    }
}

fn delete_path(root: &mut Value, path: &str) {
    if path.is_empty() {
        return;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut cursor = root;
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        match cursor {
            Value::Object(map) => {
                if last {
                    map.remove(*segment);
                    return;
                }
                match map.get_mut(*segment) {
                    Some(next) => cursor = next,
                    None => return,
                }
            }
            Value::Array(items) => {
                let Some(index) = segment.parse::<usize>().ok().filter(|i| *i < items.len())
                else {
                    return;
                };
                if last {
                    items.remove(index);
                    return;
                }
                cursor = &mut items[index];
            }
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::call;
    use serde_json::json;

    #[test]
    fn null_safety() {
        assert_eq!(call("keys", &[json!(null)]).unwrap(), json!([]));
        assert_eq!(call("merge", &[json!(null), json!({"a": 1})]).unwrap(), json!({"a": 1}));
        assert_eq!(call("size", &[json!(null)]).unwrap(), json!(0));
    }

    #[test]
    fn get_with_default_and_nested_path() {
        let obj = json!({"a": {"b": [10, 20]}});
        assert_eq!(call("get", &[obj.clone(), json!("a.b.1")]).unwrap(), json!(20));
        assert_eq!(
            call("get", &[obj, json!("a.missing"), json!("fallback")]).unwrap(),
            json!("fallback")
        );
    }

    #[test]
    fn set_creates_intermediates() {
        let out = call("set", &[json!({}), json!("a.b"), json!(1)]).unwrap();
        assert_eq!(out, json!({"a": {"b": 1}}));
    }

    #[test]
    fn delete_and_entries_round_trip() {
        let out = call("delete", &[json!({"a": 1, "b": 2}), json!("a")]).unwrap();
        assert_eq!(out, json!({"b": 2}));
        let entries = call("entries", &[json!({"x": 1})]).unwrap();
        assert_eq!(call("from_entries", &[entries]).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn pick_and_omit() {
        let obj = json!({"a": 1, "b": 2, "c": 3});
        assert_eq!(
            call("pick", &[obj.clone(), json!(["a", "c"])]).unwrap(),
            json!({"a": 1, "c": 3})
        );
        assert_eq!(call("omit", &[obj, json!(["a", "c"])]).unwrap(), json!({"b": 2}));
    }
}
