//! Property tests for the §-level laws: location round-trips, the version
//! gate, template idempotence, and built-in null-safety.

mod common;

use flowscript::expr::{EvalContext, render_template};
use flowscript::parser::is_valid_version;
use flowscript::source::SourceMap;
use proptest::prelude::*;
use serde_json::{Value, json};

proptest! {
    // Offset → position → offset recovers the offset for any in-range
    // byte boundary.
    #[test]
    fn location_round_trip(lines in proptest::collection::vec("[a-z ]{0,12}", 0..20), crlf in any::<bool>()) {
        let sep = if crlf { "\r\n" } else { "\n" };
        let source = lines.join(sep);
        let map = SourceMap::new(source.clone(), "prop.flow.md".to_string());
        for offset in 0..=source.len() {
            let pos = map.position_at(offset);
            prop_assert_eq!(map.offset_at(pos.line, pos.column), offset);
        }
    }

    // The version gate accepts exactly ^[0-9]+\.[0-9]+(\.[0-9]+)?$.
    #[test]
    fn version_gate_accepts_two_or_three_numeric_parts(a in 0u32..1000, b in 0u32..1000, c in 0u32..1000) {
        let two_part = format!("{}.{}", a, b);
        let three_part = format!("{}.{}.{}", a, b, c);
        let v_prefixed = format!("v{}.{}", a, b);
        let one_part = format!("{}", a);
        let four_part = format!("{}.{}.{}.{}", a, b, c, c);
        let with_suffix = format!("{}.{}.{}-beta", a, b, c);
        prop_assert!(is_valid_version(&two_part));
        prop_assert!(is_valid_version(&three_part));
        prop_assert!(!is_valid_version(&v_prefixed));
        prop_assert!(!is_valid_version(&one_part));
        prop_assert!(!is_valid_version(&four_part));
        prop_assert!(!is_valid_version(&with_suffix));
    }

    // A template with no expression segments renders unchanged.
    #[test]
    fn template_idempotence(text in "[a-zA-Z0-9 .,!?}]*") {
        prop_assume!(!text.contains("{{"));
        let ctx = EvalContext::new();
        let out = render_template(&text, &ctx).expect("literal template renders");
        prop_assert_eq!(out, Value::String(text));
    }
}

#[test]
fn version_gate_fixed_vectors() {
    for bad in ["v1.0", "1", "1.0.0-beta", "1.2.3.4", "a.b.c", ""] {
        assert!(!is_valid_version(bad), "{bad} must be rejected");
    }
    for good in ["1.0", "1.0.0", "0.1", "12.34.56"] {
        assert!(is_valid_version(good), "{good} must be accepted");
    }
}

/// Every built-in returns its empty value for null arguments instead of
/// raising. Exercised through the public expression surface.
#[test]
fn builtins_are_null_safe() {
    let cases: Vec<(&str, Value)> = vec![
        ("upper(null)", json!("")),
        ("trim(null)", json!("")),
        ("split(null, ',')", json!([""])),
        ("len(null)", json!(0)),
        ("length(null)", json!(0)),
        ("first(null)", Value::Null),
        ("last(null)", Value::Null),
        ("flatten(null)", json!([])),
        ("unique(null)", json!([])),
        ("sort(null)", json!([])),
        ("contains(null, 1)", json!(false)),
        ("sum(null)", json!(0)),
        ("avg(null)", json!(0)),
        ("min(null)", Value::Null),
        ("abs(null)", json!(0)),
        ("keys(null)", json!([])),
        ("values(null)", json!([])),
        ("merge(null)", json!({})),
        ("size(null)", json!(0)),
        ("get(null, 'a.b', 'dflt')", json!("dflt")),
        ("typeof(null)", json!("null")),
        ("to_string(null)", json!("")),
        ("to_number(null)", json!(0)),
        ("to_array(null)", json!([])),
        ("is_empty(null)", json!(true)),
        ("json_decode(null)", Value::Null),
        ("base64_decode(null)", Value::Null),
        ("parse_date(null)", Value::Null),
        ("format_date(null, '%Y')", Value::Null),
        ("is_before(null, null)", json!(false)),
    ];
    let ctx = EvalContext::new();
    for (expr, expected) in cases {
        let out = render_template(&format!("{{{{{expr}}}}}"), &ctx)
            .unwrap_or_else(|e| panic!("`{expr}` raised: {e}"));
        assert_eq!(out, expected, "`{expr}`");
    }
}
