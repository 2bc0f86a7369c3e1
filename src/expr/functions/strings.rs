//! String builtins. All operate on characters, not bytes.

use serde_json::Value;

use super::{arg, coerce_num, coerce_str, opt_str};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "upper" => Value::String(coerce_str(arg(args, 0)).to_uppercase()),
        "lower" => Value::String(coerce_str(arg(args, 0)).to_lowercase()),
        "trim" => Value::String(coerce_str(arg(args, 0)).trim().to_string()),
        "replace" => {
            let s = coerce_str(arg(args, 0));
            let from = coerce_str(arg(args, 1));
            let to = coerce_str(arg(args, 2));
            if from.is_empty() {
                Value::String(s)
            } else {
                Value::String(s.replace(&from, &to))
            }
        }
        "split" => {
            let s = coerce_str(arg(args, 0));
            match opt_str(arg(args, 1)) {
                Some("") => Value::Array(
                    s.chars().map(|c| Value::String(c.to_string())).collect(),
                ),
                Some(sep) => Value::Array(
                    s.split(sep).map(|p| Value::String(p.to_string())).collect(),
                ),
                None => Value::Array(vec![Value::String(s)]),
            }
        }
        "join" => {
            let sep = opt_str(arg(args, 1)).unwrap_or(",");
            let parts: Vec<String> = match arg(args, 0) {
                Value::Array(items) => items.iter().map(coerce_str).collect(),
                Value::Null => Vec::new(),
                other => vec![coerce_str(other)],
            };
            Value::String(parts.join(sep))
        }
        "truncate" => {
            let s = coerce_str(arg(args, 0));
            let limit = coerce_num(arg(args, 1)).max(0.0) as usize;
            let suffix = opt_str(arg(args, 2)).unwrap_or("…");
            if s.chars().count() <= limit {
                Value::String(s)
            } else {
                let cut: String = s.chars().take(limit).collect();
                Value::String(format!("{cut}{suffix}"))
            }
        }
        "includes" => {
            let s = coerce_str(arg(args, 0));
            Value::Bool(s.contains(&coerce_str(arg(args, 1))))
        }
        "starts_with" => {
            let s = coerce_str(arg(args, 0));
            Value::Bool(s.starts_with(&coerce_str(arg(args, 1))))
        }
        "ends_with" => {
            let s = coerce_str(arg(args, 0));
            Value::Bool(s.ends_with(&coerce_str(arg(args, 1))))
        }
        "substring" => {
            let chars: Vec<char> = coerce_str(arg(args, 0)).chars().collect();
            let len = chars.len();
            let start = clamp_index(coerce_num(arg(args, 1)), len);
            let end = match args.get(2) {
                Some(v) if !v.is_null() => clamp_index(coerce_num(v), len),
                _ => len,
            };
            let (start, end) = if start <= end { (start, end) } else { (end, start) };
            Value::String(chars[start..end].iter().collect())
        }
        "pad_start" => pad(args, true),
        "pad_end" => pad(args, false),
        "repeat" => {
            let s = coerce_str(arg(args, 0));
            let n = coerce_num(arg(args, 1)).max(0.0) as usize;
            Value::String(s.repeat(n))
        }
        "char_at" => {
            let s = coerce_str(arg(args, 0));
            let i = coerce_num(arg(args, 1));
            if i < 0.0 {
                Value::String(String::new())
            } else {
                Value::String(
                    s.chars()
                        .nth(i as usize)
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                )
            }
        }
        "len" => {
            let s = coerce_str(arg(args, 0));
            Value::Number(serde_json::Number::from(s.chars().count()))
        }
        _ => return None,
    };
    Some(Ok(result))
}

fn clamp_index(n: f64, len: usize) -> usize {
    if n <= 0.0 { 0 } else { (n as usize).min(len) }
}

fn pad(args: &[Value], at_start: bool) -> Value {
    let s = coerce_str(arg(args, 0));
    let target = coerce_num(arg(args, 1)).max(0.0) as usize;
    let fill = match opt_str(arg(args, 2)) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => " ".to_string(),
    };
    let current = s.chars().count();
    if current >= target {
        return Value::String(s);
    }
    let needed = target - current;
    let padding: String = fill.chars().cycle().take(needed).collect();
    if at_start {
        Value::String(format!("{padding}{s}"))
    } else {
        Value::String(format!("{s}{padding}"))
    }
}

#[cfg(test)]
mod tests {
    use super::super::call;
    use serde_json::json;

    #[test]
    fn null_safety() {
        assert_eq!(call("upper", &[json!(null)]).unwrap(), json!(""));
        assert_eq!(call("len", &[json!(null)]).unwrap(), json!(0));
        assert_eq!(call("split", &[json!(null), json!(",")]).unwrap(), json!([""]));
    }

    #[test]
    fn substring_and_pad() {
        assert_eq!(
            call("substring", &[json!("hello"), json!(1), json!(3)]).unwrap(),
            json!("el")
        );
        assert_eq!(
            call("pad_start", &[json!("7"), json!(3), json!("0")]).unwrap(),
            json!("007")
        );
        assert_eq!(
            call("pad_end", &[json!("ab"), json!(4)]).unwrap(),
            json!("ab  ")
        );
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(
            call("truncate", &[json!("abcdef"), json!(3)]).unwrap(),
            json!("abc…")
        );
        assert_eq!(
            call("truncate", &[json!("ab"), json!(5)]).unwrap(),
            json!("ab")
        );
    }

    #[test]
    fn join_handles_mixed_items() {
        assert_eq!(
            call("join", &[json!([1, "a", null]), json!("-")]).unwrap(),
            json!("1-a-")
        );
    }
}
