//! Math builtins. `min`/`max`/`sum`/`avg` accept either a single array or
//! variadic numeric arguments.

use rand::Rng;
use serde_json::Value;

use super::{arg, coerce_num, num};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "min" => fold_numbers(args, |acc, n| acc.min(n)),
        "max" => fold_numbers(args, |acc, n| acc.max(n)),
        "sum" => num(numbers_of(args).into_iter().sum()),
        "avg" => {
            let numbers = numbers_of(args);
            if numbers.is_empty() {
                num(0.0)
            } else {
                num(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "round" => {
            let n = coerce_num(arg(args, 0));
            let decimals = coerce_num(arg(args, 1)).max(0.0) as u32;
            let factor = 10f64.powi(decimals as i32);
            num((n * factor).round() / factor)
        }
        "floor" => num(coerce_num(arg(args, 0)).floor()),
        "ceil" => num(coerce_num(arg(args, 0)).ceil()),
        "abs" => num(coerce_num(arg(args, 0)).abs()),
        "pow" => num(coerce_num(arg(args, 0)).powf(coerce_num(arg(args, 1)))),
        "sqrt" => {
            let n = coerce_num(arg(args, 0));
            if n < 0.0 { Value::Null } else { num(n.sqrt()) }
        }
        "random" => num(rand::rng().random::<f64>()),
        "random_int" => {
            let lo = coerce_num(arg(args, 0)) as i64;
            let hi = coerce_num(arg(args, 1)) as i64;
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            num(rand::rng().random_range(lo..=hi) as f64)
        }
        "clamp" => {
            let n = coerce_num(arg(args, 0));
            let lo = coerce_num(arg(args, 1));
            let hi = coerce_num(arg(args, 2));
            num(n.clamp(lo.min(hi), hi.max(lo)))
        }
        "mod" => {
            let b = coerce_num(arg(args, 1));
            if b == 0.0 {
                num(0.0)
            } else {
                // Euclidean-style: result carries the divisor's sign, like
                // the scripting-language `%` most templates expect.
                num(coerce_num(arg(args, 0)).rem_euclid(b))
            }
        }
        "sign" => {
            let n = coerce_num(arg(args, 0));
            num(if n > 0.0 {
                1.0
            } else if n < 0.0 {
                -1.0
            } else {
                0.0
            })
        }
        "trunc" => num(coerce_num(arg(args, 0)).trunc()),
        "percent" => {
            let part = coerce_num(arg(args, 0));
            let total = coerce_num(arg(args, 1));
            if total == 0.0 {
                num(0.0)
            } else {
                num(part / total * 100.0)
            }
        }
        _ => return None,
    };
    Some(Ok(result))
}

/// Flatten variadic-or-array numeric arguments.
fn numbers_of(args: &[Value]) -> Vec<f64> {
    match args {
        [Value::Array(items)] => items.iter().map(coerce_num).collect(),
        [Value::Null] | [] => Vec::new(),
        _ => args.iter().map(coerce_num).collect(),
    }
}

fn fold_numbers(args: &[Value], f: impl Fn(f64, f64) -> f64) -> Value {
    let numbers = numbers_of(args);
    let mut iter = numbers.into_iter();
    match iter.next() {
        None => Value::Null,
        Some(first) => num(iter.fold(first, f)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::call;
    use serde_json::json;

    #[test]
    fn aggregate_forms() {
        assert_eq!(call("min", &[json!([3, 1, 2])]).unwrap(), json!(1));
        assert_eq!(call("max", &[json!(3), json!(7)]).unwrap(), json!(7));
        assert_eq!(call("sum", &[json!([1, 2, 3])]).unwrap(), json!(6));
        assert_eq!(call("avg", &[json!([2, 4])]).unwrap(), json!(3));
        assert_eq!(call("avg", &[json!([])]).unwrap(), json!(0));
        assert_eq!(call("min", &[json!(null)]).unwrap(), json!(null));
    }

    #[test]
    fn rounding() {
        assert_eq!(call("round", &[json!(2.345), json!(2)]).unwrap(), json!(2.35));
        assert_eq!(call("round", &[json!(2.5)]).unwrap(), json!(3));
        assert_eq!(call("trunc", &[json!(2.9)]).unwrap(), json!(2));
    }

    #[test]
    fn random_int_within_bounds() {
        for _ in 0..50 {
            let v = call("random_int", &[json!(1), json!(6)]).unwrap();
            let n = v.as_i64().unwrap();
            assert!((1..=6).contains(&n));
        }
    }

    #[test]
    fn guards() {
        assert_eq!(call("sqrt", &[json!(-1)]).unwrap(), json!(null));
        assert_eq!(call("mod", &[json!(5), json!(0)]).unwrap(), json!(0));
        assert_eq!(call("percent", &[json!(5), json!(0)]).unwrap(), json!(0));
        assert_eq!(call("percent", &[json!(1), json!(4)]).unwrap(), json!(25));
        assert_eq!(call("clamp", &[json!(15), json!(0), json!(10)]).unwrap(), json!(10));
    }
}
