//! Best-effort JSON recovery from free-form model replies.
//!
//! Models asked for "only JSON" still wrap it in Markdown fences, prepend a
//! sentence of prose, or give up and answer in plain text. [`normalize`]
//! always returns a JSON object:
//!
//! 1. trim the reply;
//! 2. if a ```` ``` ```` fence (optionally tagged `json`) is present, keep only
//!    the body of the first one;
//! 3. try each parser attempt in order, the first success wins:
//!    the whole candidate, then the span from the first `{` to the last `}`;
//! 4. otherwise return `{"llm_output": <reply, untouched>}`.
//!
//! A parsed value that is not an object is wrapped as `{"value": ...}`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// A JSON object with string keys; what every task returns.
pub type NormalizedResult = Map<String, Value>;

/// Key holding the verbatim reply when no JSON could be recovered.
pub const LLM_OUTPUT_KEY: &str = "llm_output";

/// Key wrapping parsed JSON that is not an object.
pub const VALUE_KEY: &str = "value";

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").unwrap());

type ParseAttempt = fn(&str) -> Option<NormalizedResult>;

const ATTEMPTS: &[ParseAttempt] = &[parse_whole, parse_brace_span];

/// Turn a raw model reply into a JSON object. Never fails.
pub fn normalize(reply: &str) -> NormalizedResult {
    let trimmed = reply.trim();
    let candidate = fenced_body(trimmed).unwrap_or(trimmed);

    ATTEMPTS
        .iter()
        .find_map(|attempt| attempt(candidate))
        .unwrap_or_else(|| fallback(reply))
}

/// True when `result` is the `llm_output` fallback rather than parsed JSON.
pub fn is_fallback(result: &NormalizedResult) -> bool {
    result.contains_key(LLM_OUTPUT_KEY)
}

fn fenced_body(text: &str) -> Option<&str> {
    RE_JSON_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn parse_whole(candidate: &str) -> Option<NormalizedResult> {
    serde_json::from_str::<Value>(candidate).ok().map(into_object)
}

fn parse_brace_span(candidate: &str) -> Option<NormalizedResult> {
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_whole(&candidate[start..=end])
}

fn into_object(value: Value) -> NormalizedResult {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert(VALUE_KEY.to_string(), other);
            map
        }
    }
}

fn fallback(reply: &str) -> NormalizedResult {
    let mut map = Map::new();
    map.insert(LLM_OUTPUT_KEY.to_string(), Value::String(reply.to_string()));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> NormalizedResult {
        v.as_object().cloned().expect("object literal")
    }

    #[test]
    fn plain_object_is_returned_as_is() {
        let out = normalize(r#"{"name": "Aksh", "skills": ["rust", "python"]}"#);
        assert_eq!(out, obj(json!({"name": "Aksh", "skills": ["rust", "python"]})));
        assert!(!is_fallback(&out));
    }

    #[test]
    fn non_object_json_is_wrapped() {
        assert_eq!(normalize("[1, 2, 3]"), obj(json!({"value": [1, 2, 3]})));
        assert_eq!(normalize("42"), obj(json!({"value": 42})));
        assert_eq!(normalize("\"hi\""), obj(json!({"value": "hi"})));
        assert_eq!(normalize("null"), obj(json!({"value": null})));
    }

    #[test]
    fn json_fence_is_unwrapped() {
        let reply = "Sure! Here it is:\n```json\n{\"name\": \"Aksh\"}\n```\nAnything else?";
        assert_eq!(normalize(reply), obj(json!({"name": "Aksh"})));
    }

    #[test]
    fn fence_tag_is_case_insensitive_and_optional() {
        assert_eq!(
            normalize("```JSON\n{\"a\": 1}\n```"),
            obj(json!({"a": 1}))
        );
        assert_eq!(normalize("```\n{\"a\": 1}\n```"), obj(json!({"a": 1})));
    }

    #[test]
    fn fenced_list_is_wrapped() {
        assert_eq!(
            normalize("```json\n[\"a\", \"b\"]\n```"),
            obj(json!({"value": ["a", "b"]}))
        );
    }

    #[test]
    fn brace_span_is_recovered_from_prose() {
        let reply = "The candidate scores well: {\"match_score\": 82, \"gaps\": []} — good luck!";
        assert_eq!(
            normalize(reply),
            obj(json!({"match_score": 82, "gaps": []}))
        );
    }

    #[test]
    fn prose_falls_back_verbatim() {
        let reply = "  I cannot process this\n";
        let out = normalize(reply);
        assert_eq!(out, obj(json!({"llm_output": "  I cannot process this\n"})));
        assert!(is_fallback(&out));
    }

    #[test]
    fn reversed_braces_fall_back() {
        let reply = "} nothing here {";
        assert_eq!(normalize(reply), obj(json!({"llm_output": reply})));
    }

    #[test]
    fn broken_json_in_braces_falls_back() {
        let reply = "result: {name: Aksh, skills: [rust}";
        assert_eq!(normalize(reply), obj(json!({"llm_output": reply})));
    }

    #[test]
    fn empty_reply_falls_back() {
        assert_eq!(normalize(""), obj(json!({"llm_output": ""})));
    }

    #[test]
    fn unterminated_fence_uses_whole_text() {
        // No closing fence: the regex does not match, the brace span does.
        let reply = "```json\n{\"a\": true}";
        assert_eq!(normalize(reply), obj(json!({"a": true})));
    }

    #[test]
    fn arbitrary_text_never_panics() {
        for s in ["{", "}", "```", "``````", "{\"a\":", "ü{ß}", "\u{0}"] {
            let out = normalize(s);
            assert_eq!(out, obj(json!({"llm_output": s})), "input {s:?}");
        }
        assert!(normalize("{}").is_empty());
    }
}
