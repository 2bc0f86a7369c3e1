//! Encoding, regex, and miscellaneous builtins.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use super::{arg, coerce_str, opt_str};

pub(super) fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "json_encode" => {
            Value::String(serde_json::to_string(arg(args, 0)).unwrap_or_default())
        }
        "json_decode" => match opt_str(arg(args, 0)) {
            Some(s) => serde_json::from_str(s).unwrap_or(Value::Null),
            None => Value::Null,
        },
        "base64_encode" => Value::String(BASE64.encode(coerce_str(arg(args, 0)))),
        "base64_decode" => match opt_str(arg(args, 0)) {
            Some(s) => BASE64
                .decode(s)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .map_or(Value::Null, Value::String),
            None => Value::Null,
        },
        "url_encode" => Value::String(urlencoding::encode(&coerce_str(arg(args, 0))).into_owned()),
        "url_decode" => match opt_str(arg(args, 0)) {
            Some(s) => urlencoding::decode(s)
                .map(|decoded| Value::String(decoded.into_owned()))
                .unwrap_or(Value::Null),
            None => Value::Null,
        },
        "uuid" => Value::String(uuid::Uuid::new_v4().to_string()),
        "match" => with_regex(args, |re, s| {
            re.find(s)
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null)
        }),
        "test" => with_regex(args, |re, s| Value::Bool(re.is_match(s))),
        "match_all" => with_regex(args, |re, s| {
            Value::Array(
                re.find_iter(s)
                    .map(|m| Value::String(m.as_str().to_string()))
                    .collect(),
            )
        }),
        "hash" => {
            // djb2 over the UTF-8 bytes; stable across runs, not
            // cryptographic.
            let s = coerce_str(arg(args, 0));
            let mut hash: u32 = 5381;
            for byte in s.as_bytes() {
                hash = hash.wrapping_mul(33).wrapping_add(u32::from(*byte));
            }
            Value::Number(serde_json::Number::from(hash))
        }
        "pretty" => {
            Value::String(serde_json::to_string_pretty(arg(args, 0)).unwrap_or_default())
        }
        _ => return None,
    };
    Some(Ok(result))
}

/// Compile the pattern argument and apply `f`; invalid patterns and missing
/// subjects yield `null` like every other builtin failure.
fn with_regex(args: &[Value], f: impl FnOnce(&regex::Regex, &str) -> Value) -> Value {
    let subject = coerce_str(arg(args, 0));
    let Some(pattern) = opt_str(arg(args, 1)) else {
        return Value::Null;
    };
    match regex::Regex::new(pattern) {
        Ok(re) => f(&re, &subject),
        Err(_) => Value::Null,
    }
}
