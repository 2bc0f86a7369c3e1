//! Type inspection and coercion builtins.

use serde_json::Value;

use super::{arg, coerce_str};
use crate::expr::eval::{is_truthy, type_name};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "typeof" => Value::String(type_name(arg(args, 0)).to_string()),
        "is_null" => Value::Bool(arg(args, 0).is_null()),
        "is_array" => Value::Bool(arg(args, 0).is_array()),
        "is_object" => Value::Bool(arg(args, 0).is_object()),
        "is_string" => Value::Bool(arg(args, 0).is_string()),
        "is_number" => Value::Bool(arg(args, 0).is_number()),
        "is_boolean" => Value::Bool(arg(args, 0).is_boolean()),
        "is_empty" => Value::Bool(match arg(args, 0) {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }),
        "to_string" => Value::String(coerce_str(arg(args, 0))),
        "to_number" => match numeric_view(arg(args, 0)) {
            Some(n) => super::num(n),
            None => super::num(0.0),
        },
        "to_boolean" => Value::Bool(is_truthy(arg(args, 0))),
        "to_array" => match arg(args, 0) {
            Value::Null => Value::Array(Vec::new()),
            Value::Array(items) => Value::Array(items.clone()),
            other => Value::Array(vec![other.clone()]),
        },
        "coalesce" => args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null),
        "default" => {
            let value = arg(args, 0);
            if value.is_null() {
                arg(args, 1).clone()
            } else {
                value.clone()
            }
        }
        "if_else" => {
            if is_truthy(arg(args, 0)) {
                arg(args, 1).clone()
            } else {
                arg(args, 2).clone()
            }
        }
        "is_finite" => Value::Bool(matches!(arg(args, 0), Value::Number(_))),
        "is_integer" => Value::Bool(match arg(args, 0) {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        }),
        "is_nan" => Value::Bool(numeric_view(arg(args, 0)).is_none()),
        "is_truthy" => Value::Bool(is_truthy(arg(args, 0))),
        "is_falsy" => Value::Bool(!is_truthy(arg(args, 0))),
        "switch" => {
            let key = coerce_str(arg(args, 0));
            match arg(args, 1) {
                Value::Object(cases) => cases
                    .get(&key)
                    .cloned()
                    .or_else(|| args.get(2).cloned())
                    .unwrap_or(Value::Null),
                _ => args.get(2).cloned().unwrap_or(Value::Null),
            }
        }
        _ => return None,
    };
    Some(Ok(result))
}

/// Numeric coercion with failure: `None` is the NaN analogue (JSON cannot
/// hold NaN, so "not a number" is represented by absence).
fn numeric_view(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::call;
    use serde_json::json;

    #[test]
    fn typeof_labels() {
        assert_eq!(call("typeof", &[json!(null)]).unwrap(), json!("null"));
        assert_eq!(call("typeof", &[json!([1])]).unwrap(), json!("array"));
        assert_eq!(call("typeof", &[json!({"a": 1})]).unwrap(), json!("object"));
        assert_eq!(call("typeof", &[json!("s")]).unwrap(), json!("string"));
        assert_eq!(call("typeof", &[json!(1)]).unwrap(), json!("number"));
        assert_eq!(call("typeof", &[json!(true)]).unwrap(), json!("boolean"));
    }

    #[test]
    fn coercions() {
        assert_eq!(call("to_number", &[json!("42")]).unwrap(), json!(42));
        assert_eq!(call("to_number", &[json!("nope")]).unwrap(), json!(0));
        assert_eq!(call("to_array", &[json!(1)]).unwrap(), json!([1]));
        assert_eq!(call("to_array", &[json!(null)]).unwrap(), json!([]));
        assert_eq!(call("to_string", &[json!(null)]).unwrap(), json!(""));
    }

    #[test]
    fn conditionals() {
        assert_eq!(
            call("coalesce", &[json!(null), json!(null), json!(3)]).unwrap(),
            json!(3)
        );
        assert_eq!(call("default", &[json!(null), json!("d")]).unwrap(), json!("d"));
        assert_eq!(call("default", &[json!(0), json!("d")]).unwrap(), json!(0));
        assert_eq!(
            call("if_else", &[json!(true), json!("a"), json!("b")]).unwrap(),
            json!("a")
        );
    }

    #[test]
    fn switch_dispatch() {
        let cases = json!({"a": 1, "b": 2});
        assert_eq!(call("switch", &[json!("b"), cases.clone()]).unwrap(), json!(2));
        assert_eq!(
            call("switch", &[json!("zz"), cases, json!("dflt")]).unwrap(),
            json!("dflt")
        );
    }

    #[test]
    fn nan_and_integer_checks() {
        assert_eq!(call("is_nan", &[json!("abc")]).unwrap(), json!(true));
        assert_eq!(call("is_nan", &[json!(null)]).unwrap(), json!(false));
        assert_eq!(call("is_integer", &[json!(3)]).unwrap(), json!(true));
        assert_eq!(call("is_integer", &[json!(3.5)]).unwrap(), json!(false));
        assert_eq!(call("is_empty", &[json!({})]).unwrap(), json!(true));
        assert_eq!(call("is_empty", &[json!(0)]).unwrap(), json!(false));
    }
}
