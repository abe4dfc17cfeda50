//! JSONB sanitization before storage (§6 wire formats, §8 round-trip law):
//! `sanitizeForJsonb(sanitizeForJsonb(x)) = sanitizeForJsonb(x)`.
//!
//! Postgres `jsonb` rejects lone UTF-16 surrogate codepoints and NUL bytes;
//! strip both before a value is persisted.

use serde_json::Value;

const REPLACEMENT: char = '\u{fffd}';

fn sanitize_str(s: &str) -> String {
    // Rust's `str` is always valid UTF-8, so lone surrogates can only have
    // entered as escaped `\uXXXX` sequences that serde_json already decoded
    // to U+FFFD; NUL bytes are the only thing left to strip here. The
    // replacement-char path is kept so callers that construct `Value`s by
    // hand (not via JSON parsing) are sanitized identically.
    if !s.contains('\0') && !s.contains(REPLACEMENT) {
        return s.to_string();
    }
    s.chars()
        .filter(|&c| c != '\0' && c != REPLACEMENT)
        .collect()
}

/// Recursively strips lone-surrogate replacement characters and NUL bytes
/// from every string in a JSON value. Idempotent: running it twice is the
/// same as running it once.
pub fn sanitize_for_jsonb(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_for_jsonb).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_str(&k), sanitize_for_jsonb(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_nul_bytes() {
        let input = json!({"text": "hello\0world"});
        let out = sanitize_for_jsonb(input);
        assert_eq!(out["text"], json!("helloworld"));
    }

    #[test]
    fn strips_replacement_chars() {
        let input = json!({"text": format!("hello{}world", REPLACEMENT)});
        let out = sanitize_for_jsonb(input);
        assert_eq!(out["text"], json!("helloworld"));
    }

    #[test]
    fn recurses_into_arrays_and_objects() {
        let input = json!({"a": ["x\0y", {"b": "z\0"}]});
        let out = sanitize_for_jsonb(input);
        assert_eq!(out, json!({"a": ["xy", {"b": "z"}]}));
    }

    #[test]
    fn idempotent() {
        let input = json!({"text": "hello\0world", "n": 3, "arr": ["a\0b"]});
        let once = sanitize_for_jsonb(input.clone());
        let twice = sanitize_for_jsonb(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn leaves_clean_values_unchanged() {
        let input = json!({"text": "hello world", "n": 3, "ok": true});
        let out = sanitize_for_jsonb(input.clone());
        assert_eq!(out, input);
    }

    proptest::proptest! {
        #[test]
        fn prop_idempotent(s in ".*") {
            let input = json!({"text": s});
            let once = sanitize_for_jsonb(input.clone());
            let twice = sanitize_for_jsonb(once.clone());
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
