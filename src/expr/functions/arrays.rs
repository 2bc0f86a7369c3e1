//! Array builtins.
//!
//! `concat` lives here but also accepts strings, since the name is shared
//! between the two domains; dispatch is by first-argument type.

use serde_json::Value;

use super::{arg, coerce_arr, coerce_num, coerce_str, opt_str};
use crate::expr::eval::{is_truthy, values_equal};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "length" => Value::Number(serde_json::Number::from(coerce_arr(arg(args, 0)).len())),
        "first" => coerce_arr(arg(args, 0)).first().cloned().unwrap_or(Value::Null),
        "last" => coerce_arr(arg(args, 0)).last().cloned().unwrap_or(Value::Null),
        "slice" => {
            let items = coerce_arr(arg(args, 0));
            let len = items.len() as i64;
            let start = resolve_index(coerce_num(arg(args, 1)) as i64, len);
            let end = match args.get(2) {
                Some(v) if !v.is_null() => resolve_index(coerce_num(v) as i64, len),
                _ => len as usize,
            };
            if start >= end {
                Value::Array(Vec::new())
            } else {
                Value::Array(items[start..end].to_vec())
            }
        }
        "flatten" => {
            let mut out = Vec::new();
            for item in coerce_arr(arg(args, 0)) {
                match item {
                    Value::Array(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "unique" => {
            let mut out: Vec<Value> = Vec::new();
            for item in coerce_arr(arg(args, 0)) {
                if !out.iter().any(|seen| values_equal(seen, item)) {
                    out.push(item.clone());
                }
            }
            Value::Array(out)
        }
        "reverse" => {
            let mut items = coerce_arr(arg(args, 0)).to_vec();
            items.reverse();
            Value::Array(items)
        }
        "contains" => {
            let needle = arg(args, 1);
            Value::Bool(
                coerce_arr(arg(args, 0))
                    .iter()
                    .any(|item| values_equal(item, needle)),
            )
        }
        "index_of" => {
            let needle = arg(args, 1);
            let idx = coerce_arr(arg(args, 0))
                .iter()
                .position(|item| values_equal(item, needle));
            match idx {
                Some(i) => Value::Number(serde_json::Number::from(i)),
                None => Value::Number(serde_json::Number::from(-1)),
            }
        }
        "sort" => {
            let mut items = coerce_arr(arg(args, 0)).to_vec();
            let key = opt_str(arg(args, 1)).map(str::to_string);
            let descending = matches!(opt_str(arg(args, 2)), Some("desc"))
                || matches!(opt_str(arg(args, 1)), Some("desc"));
            items.sort_by(|a, b| {
                let (a, b) = match &key {
                    Some(k) if k != "asc" && k != "desc" => {
                        (super::objects::get_path(a, k), super::objects::get_path(b, k))
                    }
                    _ => (a.clone(), b.clone()),
                };
                compare_values(&a, &b)
            });
            if descending {
                items.reverse();
            }
            Value::Array(items)
        }
        "compact" => Value::Array(
            coerce_arr(arg(args, 0))
                .iter()
                .filter(|item| is_truthy(item))
                .cloned()
                .collect(),
        ),
        "count" => {
            let items = coerce_arr(arg(args, 0));
            match args.get(1) {
                Some(needle) => Value::Number(serde_json::Number::from(
                    items.iter().filter(|i| values_equal(i, needle)).count(),
                )),
                None => Value::Number(serde_json::Number::from(items.len())),
            }
        }
        "at" => {
            let items = coerce_arr(arg(args, 0));
            let len = items.len() as i64;
            let i = coerce_num(arg(args, 1)) as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                Value::Null
            } else {
                items[resolved as usize].clone()
            }
        }
        "concat" => match arg(args, 0) {
            Value::Array(_) | Value::Null => {
                let mut out = Vec::new();
                for value in args {
                    match value {
                        Value::Array(items) => out.extend(items.iter().cloned()),
                        Value::Null => {}
                        other => out.push(other.clone()),
                    }
                }
                Value::Array(out)
            }
            _ => Value::String(args.iter().map(coerce_str).collect::<Vec<_>>().concat()),
        },
        "every" => Value::Bool(coerce_arr(arg(args, 0)).iter().all(is_truthy)),
        "some" => Value::Bool(coerce_arr(arg(args, 0)).iter().any(is_truthy)),
        "find" => {
            let items = coerce_arr(arg(args, 0));
            if args.len() >= 3 {
                // find(items, key, value): first object whose field matches.
                let key = coerce_str(arg(args, 1));
                let wanted = arg(args, 2);
                items
                    .iter()
                    .find(|item| values_equal(&super::objects::get_path(item, &key), wanted))
                    .cloned()
                    .unwrap_or(Value::Null)
            } else {
                let wanted = arg(args, 1);
                items
                    .iter()
                    .find(|item| values_equal(item, wanted))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
        }
        "take" => {
            let n = coerce_num(arg(args, 1)).max(0.0) as usize;
            Value::Array(coerce_arr(arg(args, 0)).iter().take(n).cloned().collect())
        }
        "skip" => {
            let n = coerce_num(arg(args, 1)).max(0.0) as usize;
            Value::Array(coerce_arr(arg(args, 0)).iter().skip(n).cloned().collect())
        }
        "range" => {
            let start = coerce_num(arg(args, 0)) as i64;
            let end = coerce_num(arg(args, 1)) as i64;
            let step = match args.get(2) {
                Some(v) if !v.is_null() => coerce_num(v) as i64,
                _ => 1,
            };
            let mut out = Vec::new();
            if step > 0 {
                let mut n = start;
                while n < end {
                    out.push(Value::Number(serde_json::Number::from(n)));
                    n += step;
                }
            } else if step < 0 {
                let mut n = start;
                while n > end {
                    out.push(Value::Number(serde_json::Number::from(n)));
                    n += step;
                }
            }
            Value::Array(out)
        }
        _ => return None,
    };
    Some(Ok(result))
}

fn resolve_index(i: i64, len: i64) -> usize {
    let resolved = if i < 0 { (len + i).max(0) } else { i.min(len) };
    resolved as usize
}

/// Total order used by `sort`: group by type, then compare within.
pub(super) fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use crate::expr::eval::as_number;
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (as_number(a), as_number(b)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
            _ => crate::expr::eval::type_name(a).cmp(crate::expr::eval::type_name(b)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::call;
    use serde_json::json;

    #[test]
    fn null_safety() {
        assert_eq!(call("length", &[json!(null)]).unwrap(), json!(0));
        assert_eq!(call("first", &[json!(null)]).unwrap(), json!(null));
        assert_eq!(call("unique", &[json!(null)]).unwrap(), json!([]));
    }

    #[test]
    fn sort_by_key_and_direction() {
        let items = json!([{"n": 3}, {"n": 1}, {"n": 2}]);
        assert_eq!(
            call("sort", &[items.clone(), json!("n")]).unwrap(),
            json!([{"n": 1}, {"n": 2}, {"n": 3}])
        );
        assert_eq!(
            call("sort", &[items, json!("n"), json!("desc")]).unwrap(),
            json!([{"n": 3}, {"n": 2}, {"n": 1}])
        );
    }

    #[test]
    fn negative_indices() {
        assert_eq!(call("at", &[json!([1, 2, 3]), json!(-1)]).unwrap(), json!(3));
        assert_eq!(
            call("slice", &[json!([1, 2, 3, 4]), json!(-2)]).unwrap(),
            json!([3, 4])
        );
    }

    #[test]
    fn range_with_step() {
        assert_eq!(
            call("range", &[json!(0), json!(6), json!(2)]).unwrap(),
            json!([0, 2, 4])
        );
        assert_eq!(call("range", &[json!(3), json!(0), json!(-1)]).unwrap(), json!([3, 2, 1]));
        assert_eq!(call("range", &[json!(0), json!(3), json!(0)]).unwrap(), json!([]));
    }

    #[test]
    fn find_by_field() {
        let items = json!([{"id": "a", "v": 1}, {"id": "b", "v": 2}]);
        assert_eq!(
            call("find", &[items, json!("id"), json!("b")]).unwrap(),
            json!({"id": "b", "v": 2})
        );
    }

    #[test]
    fn concat_strings_and_arrays() {
        assert_eq!(
            call("concat", &[json!([1]), json!([2, 3]), json!(4)]).unwrap(),
            json!([1, 2, 3, 4])
        );
        assert_eq!(
            call("concat", &[json!("a"), json!("b")]).unwrap(),
            json!("ab")
        );
    }
}
