//! Reply normalization for workflow backend responses.
//!
//! The backend answers in several shapes depending on how the workflow is
//! wired: a bare array of items, an `output` array, a scalar `output`, or
//! legacy `message`/`response`/`text` fields. `normalize_reply` flattens all
//! of them into one displayable string with a fixed precedence.

use serde_json::Value;

/// Shown when a 2xx body yields no usable text. An unrecognized shape is a
/// low-quality turn, not an error.
pub const FALLBACK_REPLY: &str =
    "Lo siento, no he podido generar una respuesta. ¿Puedes reformular tu pregunta?";

/// Extract a single reply string from a backend response body.
///
/// Precedence: array body (join item `output`/`message`/`text` fields),
/// `output` array (join item `output`/`text`/`content`, unescaped + trimmed),
/// scalar `output` (unescaped + trimmed), then `message`/`response`/`text`.
/// Anything else resolves to [`FALLBACK_REPLY`].
pub fn normalize_reply(body: &Value) -> String {
    let text = match body {
        Value::Array(items) => join_items(items, &["output", "message", "text"], false),
        Value::Object(map) => match map.get("output") {
            Some(Value::Array(items)) => join_items(items, &["output", "text", "content"], true),
            Some(Value::String(s)) => unescape_literals(s).trim().to_string(),
            _ => first_text(body, &["message", "response", "text"])
                .unwrap_or_default()
                .to_string(),
        },
        _ => String::new(),
    };
    if text.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        text
    }
}

/// Join each item's first non-empty candidate field with a blank line.
fn join_items(items: &[Value], fields: &[&str], unescape: bool) -> String {
    let parts: Vec<String> = items
        .iter()
        .filter_map(|item| item_text(item, fields, unescape))
        .filter(|s| !s.is_empty())
        .collect();
    parts.join("\n\n")
}

fn item_text(item: &Value, fields: &[&str], unescape: bool) -> Option<String> {
    let raw = match item {
        // Bare string items appear when the workflow returns its node output directly.
        Value::String(s) => Some(s.as_str()),
        _ => first_text(item, fields),
    }?;
    if unescape {
        Some(unescape_literals(raw).trim().to_string())
    } else {
        Some(raw.to_string())
    }
}

fn first_text<'a>(value: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|f| value.get(f).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

/// Convert literal `\n`, `\t`, and `\"` sequences (as emitted by
/// double-encoded workflow nodes) into the characters they stand for.
fn unescape_literals(s: &str) -> String {
    s.replace("\\n", "\n").replace("\\t", "\t").replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_array_joins_with_blank_line() {
        let body = json!({ "output": [{ "output": "a" }, { "output": "b" }] });
        assert_eq!(normalize_reply(&body), "a\n\nb");
    }

    #[test]
    fn scalar_output_is_unescaped() {
        let body = json!({ "output": "hi\\nthere" });
        assert_eq!(normalize_reply(&body), "hi\nthere");
    }

    #[test]
    fn empty_object_falls_back() {
        assert_eq!(normalize_reply(&json!({})), FALLBACK_REPLY);
    }

    #[test]
    fn array_body_uses_item_fields_in_order() {
        let body = json!([{ "message": "hola" }, { "text": "adiós" }]);
        assert_eq!(normalize_reply(&body), "hola\n\nadiós");
    }

    #[test]
    fn output_array_items_prefer_output_then_text_then_content() {
        let body = json!({ "output": [{ "text": "t" }, { "content": "c" }] });
        assert_eq!(normalize_reply(&body), "t\n\nc");
    }

    #[test]
    fn fallback_fields_in_order() {
        assert_eq!(normalize_reply(&json!({ "response": "r", "text": "t" })), "r");
        assert_eq!(normalize_reply(&json!({ "text": "t" })), "t");
        assert_eq!(
            normalize_reply(&json!({ "message": "m", "response": "r" })),
            "m"
        );
    }

    #[test]
    fn escaped_quotes_and_tabs() {
        let body = json!({ "output": "dice \\\"hola\\\"\\tamigo" });
        assert_eq!(normalize_reply(&body), "dice \"hola\"\tamigo");
    }

    #[test]
    fn whitespace_only_output_falls_back() {
        assert_eq!(normalize_reply(&json!({ "output": "   " })), FALLBACK_REPLY);
        assert_eq!(normalize_reply(&json!({ "output": [] })), FALLBACK_REPLY);
    }

    #[test]
    fn non_object_body_falls_back() {
        assert_eq!(normalize_reply(&json!(42)), FALLBACK_REPLY);
        assert_eq!(normalize_reply(&Value::Null), FALLBACK_REPLY);
    }
}
