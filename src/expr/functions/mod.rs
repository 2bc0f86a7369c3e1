//! Built-in expression functions.
//!
//! A fixed, pure registry dispatched by name. Every function is null-safe:
//! missing or `null` operands fall back to the empty value for the
//! function's domain (empty string, empty array, zero, `null`) instead of
//! raising. The only non-deterministic builtins are `random`,
//! `random_int`, `uuid`, and the clock functions.

use serde_json::Value;

mod arrays;
mod math;
mod objects;
mod strings;
mod time;
mod types;
mod util;

/// Dispatch a function call by name. `Err` carries a bare message; the
/// evaluator wraps it with the failing expression and context snapshot.
pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, String> {
    let tables = [
        strings::call,
        arrays::call,
        math::call,
        time::call,
        objects::call,
        types::call,
        util::call,
    ];
    for table in tables {
        if let Some(result) = table(name, args) {
            return result;
        }
    }
    Err(format!("unknown function `{name}`"))
}

// ---------------------------------------------------------------------------
// Shared coercion helpers
// ---------------------------------------------------------------------------

/// The i-th argument, defaulting to `null` when absent.
pub(crate) fn arg<'a>(args: &'a [Value], i: usize) -> &'a Value {
    args.get(i).unwrap_or(&Value::Null)
}

/// Coerce to a string: strings pass through, `null` becomes `""`, other
/// values render as they would in a template.
pub(crate) fn coerce_str(value: &Value) -> String {
    super::eval::stringify(value)
}

/// Coerce to a number: numbers/bools directly, numeric strings parsed,
/// everything else 0.
pub(crate) fn coerce_num(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Array view: arrays borrow, everything else is empty.
pub(crate) fn coerce_arr(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        _ => &[],
    }
}

pub(crate) fn opt_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

pub(crate) fn num(value: f64) -> Value {
    super::eval::number_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_function_is_an_error() {
        assert!(call("definitely_not_a_builtin", &[]).is_err());
    }

    #[test]
    fn dispatch_reaches_every_table() {
        assert_eq!(call("upper", &[json!("a")]).unwrap(), json!("A"));
        assert_eq!(call("length", &[json!([1, 2])]).unwrap(), json!(2));
        assert_eq!(call("abs", &[json!(-2)]).unwrap(), json!(2));
        assert_eq!(call("keys", &[json!({"a": 1})]).unwrap(), json!(["a"]));
        assert_eq!(call("typeof", &[json!(null)]).unwrap(), json!("null"));
        assert_eq!(call("json_encode", &[json!(1)]).unwrap(), json!("1"));
        assert!(call("now", &[]).is_ok());
    }
}
