//! Step extraction from raw model replies
//!
//! Models rarely answer with a single clean JSON document. Replies arrive
//! wrapped in code fences, padded with prose, or with several steps glued
//! together. `extract_json_values` pulls out every complete JSON object or
//! array in the order it appears and ignores everything else.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```(?:json)?\s*").expect("fence pattern is valid")
});

/// Remove Markdown code fences, keeping their contents
pub fn strip_code_fences(text: &str) -> String {
    FENCE_OPEN.replace_all(text, "").replace("```", "").trim().to_string()
}

/// Position of the next `{` or `[` at or after `from`
fn find_next_start(text: &str, from: usize) -> Option<usize> {
    text[from..]
        .find(['{', '['])
        .map(|offset| from + offset)
}

/// Decode one JSON value starting exactly at `text[0]`.
///
/// Returns the value and the number of bytes it occupied.
fn decode_one(text: &str) -> Option<(Value, usize)> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some((value, stream.byte_offset())),
        _ => None,
    }
}

/// Extract every JSON object or array embedded in `text`, in order.
///
/// Text with no JSON in it yields an empty vector.
pub fn extract_json_values(text: &str) -> Vec<Value> {
    let text = strip_code_fences(text);
    let mut values = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_next_start(&text, pos) {
        match decode_one(&text[start..]) {
            Some((value, consumed)) => {
                values.push(value);
                pos = start + consumed;
            }
            // Candidate start is ASCII, so start + 1 is a char boundary
            None => pos = start + 1,
        }

        if pos >= text.len() {
            break;
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        let values = extract_json_values(r#"{"type": "plan", "plan": "think"}"#);
        assert_eq!(values, vec![json!({"type": "plan", "plan": "think"})]);
    }

    #[test]
    fn test_fenced_object_with_prose() {
        let text = "Sure, here you go:\n```json\n{\"type\": \"output\", \"output\": 5}\n```\nAnything else?";
        let values = extract_json_values(text);
        assert_eq!(values, vec![json!({"type": "output", "output": 5})]);
    }

    #[test]
    fn test_uppercase_fence_tag() {
        let values = extract_json_values("```JSON\n{\"a\": 1}\n```");
        assert_eq!(values, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_multiple_concatenated_objects_in_order() {
        let text = r#"{"type":"plan","plan":"p"}{"type":"action","function":"add","input":{"a":2,"b":3}}
        {"type":"output","output":"5"}"#;
        let values = extract_json_values(text);

        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["type"], "plan");
        assert_eq!(values[1]["type"], "action");
        assert_eq!(values[2]["type"], "output");
    }

    #[test]
    fn test_no_json_is_empty() {
        assert!(extract_json_values("I could not decide what to do.").is_empty());
        assert!(extract_json_values("").is_empty());
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"note {"type":"output","output":"use {braces} and [brackets] }"} done"#;
        let values = extract_json_values(text);
        assert_eq!(
            values,
            vec![json!({"type": "output", "output": "use {braces} and [brackets] }"})]
        );
    }

    #[test]
    fn test_nested_values() {
        let text = r#"{"type":"action","function":"f","input":{"deep":{"list":[1,{"x":[2]}]}}}"#;
        let values = extract_json_values(text);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["input"]["deep"]["list"][1]["x"][0], 2);
    }

    #[test]
    fn test_invalid_candidate_is_skipped() {
        // The first brace opens nothing valid; scanning resumes one char later
        let text = r#"{ not json { "a": 1 } trailing {"#;
        let values = extract_json_values(text);
        assert_eq!(values, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_top_level_array() {
        let values = extract_json_values("result: [1, 2, 3] and {\"b\": true}");
        assert_eq!(values, vec![json!([1, 2, 3]), json!({"b": true})]);
    }

    #[test]
    fn test_trailing_garbage_ignored() {
        let values = extract_json_values(r#"{"a":1} {"b": "#);
        assert_eq!(values, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_multibyte_prose_around_values() {
        let values = extract_json_values("température ≈ {\"t\": \"14°C\"} … fin");
        assert_eq!(values, vec![json!({"t": "14°C"})]);
    }
}
