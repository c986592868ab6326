// ABOUTME: Canonical serialization of JSON values for deep-equality checks
// ABOUTME: Deterministic, type-tagged string form - never used for storage

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Serialize a JSON value into its canonical string form.
///
/// Two values are considered equal for diffing purposes iff their canonical
/// forms are identical strings. Properties:
///
/// - Type-tagged: `1` and `"1"` produce different strings, as do `null` and `""`.
/// - Object keys are sorted, so `{a:1,b:2}` equals `{b:2,a:1}`.
/// - Array order is preserved, so `[1,2]` differs from `[2,1]`.
/// - Strings that parse as RFC 3339 timestamps are normalized to UTC with
///   millisecond precision, so `2024-01-05T10:00:00+02:00` equals
///   `2024-01-05T08:00:00.000Z`.
///
/// This function is total: it cannot fail or panic on any `Value`.
pub fn canonical(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Check whether two values are equal under canonical serialization.
pub fn canonically_equal(a: &Value, b: &Value) -> bool {
    canonical(a) == canonical(b)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => match normalize_timestamp(s) {
            Some(ts) => write_string(&ts, out),
            None => write_string(s, out),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort keys so object comparison is insertion-order independent
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

/// Write a JSON-escaped, quoted string. Escaping guarantees the structural
/// delimiters above never collide with serialized content.
fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Normalize an RFC 3339 timestamp string to a single canonical UTC form.
///
/// The source and the sink render the same instant with different offsets and
/// precision; without normalization every timestamp field would report drift.
fn normalize_timestamp(s: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_and_string_differ() {
        assert_ne!(canonical(&json!(1)), canonical(&json!("1")));
        assert_ne!(canonical(&json!(true)), canonical(&json!("true")));
    }

    #[test]
    fn test_null_differs_from_empty_string() {
        assert_ne!(canonical(&json!(null)), canonical(&json!("")));
    }

    #[test]
    fn test_object_key_order_insensitive() {
        let a = serde_json::from_str::<serde_json::Value>(r#"{"a":1,"b":2}"#).unwrap();
        let b = serde_json::from_str::<serde_json::Value>(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(canonical(&a), canonical(&b));
    }

    #[test]
    fn test_array_order_sensitive() {
        assert_ne!(canonical(&json!([1, 2])), canonical(&json!([2, 1])));
        assert_eq!(canonical(&json!([1, 2])), canonical(&json!([1, 2])));
    }

    #[test]
    fn test_nested_structures() {
        let a = json!({"outer": {"b": [1, "1"], "a": null}});
        let b = json!({"outer": {"a": null, "b": [1, "1"]}});
        assert_eq!(canonical(&a), canonical(&b));

        let c = json!({"outer": {"a": null, "b": ["1", 1]}});
        assert_ne!(canonical(&a), canonical(&c));
    }

    #[test]
    fn test_timestamp_normalization() {
        let a = json!("2024-01-05T10:00:00+02:00");
        let b = json!("2024-01-05T08:00:00.000Z");
        assert_eq!(canonical(&a), canonical(&b));

        // Non-timestamp strings are left alone
        let c = json!("2024-01-05");
        let d = json!("2024-01-05T00:00:00Z");
        assert_ne!(canonical(&c), canonical(&d));
    }

    #[test]
    fn test_string_escaping_prevents_delimiter_collision() {
        // A string containing JSON syntax must not compare equal to the
        // structure it mimics
        let tricky = json!(["a,b"]);
        let split = json!(["a", "b"]);
        assert_ne!(canonical(&tricky), canonical(&split));

        let quoted = json!("[1,2]");
        let array = json!([1, 2]);
        assert_ne!(canonical(&quoted), canonical(&array));
    }

    #[test]
    fn test_symmetry_on_equal_values() {
        let v = json!({"k": [1, 2.5, "x", null, {"n": false}]});
        assert!(canonically_equal(&v, &v.clone()));
    }
}
