//! Expression evaluation over a layered context.
//!
//! Semantics follow the template language's scripting heritage: truthiness
//! treats `null`, `false`, `0`, and `""` as falsy; `&&`/`||` return the
//! deciding operand; `+` concatenates when either side is a string.
//! Division and remainder by zero are hard errors, as is an identifier no
//! context layer defines.

use serde_json::Value;

use super::context::EvalContext;
use super::functions;
use super::parse::{BinaryOp, Expr, UnaryOp};

/// Internal evaluation failure; the public wrapper in `expr::mod` attaches
/// the source expression and redacted context.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EvalFailure {
    pub message: String,
}

impl EvalFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub(crate) fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalFailure> {
    match expr {
        Expr::Number(n) => Ok(number_value(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => ctx
            .lookup(name)
            .ok_or_else(|| EvalFailure::new(format!("unknown identifier `{name}`"))),
        Expr::Member(base, field) => {
            let base = evaluate(base, ctx)?;
            Ok(member_access(&base, field))
        }
        Expr::Index(base, index) => {
            let base = evaluate(base, ctx)?;
            let index = evaluate(index, ctx)?;
            Ok(index_access(&base, &index))
        }
        Expr::Unary(op, operand) => {
            let operand = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&operand))),
                UnaryOp::Neg => {
                    let n = as_number(&operand).ok_or_else(|| {
                        EvalFailure::new(format!("cannot negate {}", type_name(&operand)))
                    })?;
                    Ok(number_value(-n))
                }
            }
        }
        Expr::Binary(op, left, right) => binary(*op, left, right, ctx),
        Expr::Ternary(cond, then, otherwise) => {
            let cond = evaluate(cond, ctx)?;
            if is_truthy(&cond) {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, ctx)?);
            }
            functions::call(name, &values).map_err(EvalFailure::new)
        }
    }
}

fn binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalFailure> {
    // Short-circuit forms evaluate the right side lazily.
    match op {
        BinaryOp::And => {
            let left = evaluate(left, ctx)?;
            if !is_truthy(&left) {
                return Ok(left);
            }
            return evaluate(right, ctx);
        }
        BinaryOp::Or => {
            let left = evaluate(left, ctx)?;
            if is_truthy(&left) {
                return Ok(left);
            }
            return evaluate(right, ctx);
        }
        BinaryOp::Coalesce => {
            let left = evaluate(left, ctx)?;
            if !left.is_null() {
                return Ok(left);
            }
            return evaluate(right, ctx);
        }
        _ => {}
    }

    let left = evaluate(left, ctx)?;
    let right = evaluate(right, ctx)?;
    match op {
        BinaryOp::Add => {
            if left.is_string() || right.is_string() {
                return Ok(Value::String(format!(
                    "{}{}",
                    stringify(&left),
                    stringify(&right)
                )));
            }
            numeric_op(&left, &right, "+", |a, b| Ok(a + b))
        }
        BinaryOp::Sub => numeric_op(&left, &right, "-", |a, b| Ok(a - b)),
        BinaryOp::Mul => numeric_op(&left, &right, "*", |a, b| Ok(a * b)),
        BinaryOp::Div => numeric_op(&left, &right, "/", |a, b| {
            if b == 0.0 {
                Err(EvalFailure::new("division by zero"))
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Rem => numeric_op(&left, &right, "%", |a, b| {
            if b == 0.0 {
                Err(EvalFailure::new("division by zero"))
            } else {
                Ok(a % b)
            }
        }),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt => ordering_op(&left, &right, "<", |o| o == std::cmp::Ordering::Less),
        BinaryOp::Le => ordering_op(&left, &right, "<=", |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => ordering_op(&left, &right, ">", |o| o == std::cmp::Ordering::Greater),
        BinaryOp::Ge => ordering_op(&left, &right, ">=", |o| o != std::cmp::Ordering::Less),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => unreachable!("handled above"),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    symbol: &str,
    f: impl FnOnce(f64, f64) -> Result<f64, EvalFailure>,
) -> Result<Value, EvalFailure> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => Ok(number_value(f(a, b)?)),
        _ => Err(EvalFailure::new(format!(
            "type mismatch: cannot apply `{symbol}` to {} and {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn ordering_op(
    left: &Value,
    right: &Value,
    symbol: &str,
    accept: impl FnOnce(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalFailure> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
                EvalFailure::new(format!("cannot compare {left} {symbol} {right}"))
            })?,
            _ => {
                return Err(EvalFailure::new(format!(
                    "type mismatch: cannot compare {} {symbol} {}",
                    type_name(left),
                    type_name(right)
                )));
            }
        },
    };
    Ok(Value::Bool(accept(ordering)))
}

/// Property access; missing fields yield `null` rather than an error.
pub(crate) fn member_access(base: &Value, field: &str) -> Value {
    match base {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn index_access(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Array(items), _) => {
            let Some(i) = as_number(index) else {
                return Value::Null;
            };
            let i = i as i64;
            let len = items.len() as i64;
            // Negative indices count from the end.
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                Value::Null
            } else {
                items[resolved as usize].clone()
            }
        }
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Truthiness: `null`, `false`, `0`, and `""` are falsy; everything else
/// (including empty arrays and objects) is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Loose numeric view of a value: numbers as-is, booleans as 0/1.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        _ => None,
    }
}

/// Equality: numbers compare numerically, `null` only equals `null`,
/// everything else compares structurally.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => left == right,
    }
}

/// Store a float back into the JSON value domain, preferring integers when
/// the value is whole (so `2 + 3` renders as `5`, not `5.0`).
#[must_use]
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(serde_json::Number::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Render a value into template output. `null` renders as the empty
/// string; arrays and objects render as compact JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The type name `typeof` and error messages report.
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse::parse;
    use serde_json::json;

    fn eval_str(src: &str) -> Result<Value, EvalFailure> {
        let expr = parse(src).expect("parse");
        evaluate(&expr, &EvalContext::new())
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_str("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval_str("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(eval_str("7 % 4").unwrap(), json!(3));
        assert_eq!(eval_str("10 / 4").unwrap(), json!(2.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval_str("1 / 0").is_err());
        assert!(eval_str("1 % 0").is_err());
    }

    #[test]
    fn string_concat_via_plus() {
        assert_eq!(eval_str("'a' + 1").unwrap(), json!("a1"));
        assert_eq!(eval_str("1 + 'a'").unwrap(), json!("1a"));
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(eval_str("0 || 'fallback'").unwrap(), json!("fallback"));
        assert_eq!(eval_str("'x' && 'y'").unwrap(), json!("y"));
        assert_eq!(eval_str("null ?? 5").unwrap(), json!(5));
        assert_eq!(eval_str("0 ?? 5").unwrap(), json!(0));
    }

    #[test]
    fn unknown_identifier_errors() {
        let err = eval_str("missing").unwrap_err();
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn member_and_index_are_null_safe() {
        let mut ctx = EvalContext::new();
        ctx.insert_local("obj", json!({"a": {"b": 2}, "list": [10, 20]}));
        let expr = parse("obj.a.missing").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::Null);
        let expr = parse("obj.list[-1]").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap(), json!(20));
        let expr = parse("obj.list[9]").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn ternary() {
        assert_eq!(eval_str("1 < 2 ? 'yes' : 'no'").unwrap(), json!("yes"));
    }

    #[test]
    fn whole_floats_render_as_integers() {
        assert_eq!(number_value(5.0), json!(5));
        assert_eq!(stringify(&number_value(5.0)), "5");
        assert_eq!(number_value(2.5), json!(2.5));
    }
}
