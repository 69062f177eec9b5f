//! Text processing utilities.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Replace consecutive whitespace (spaces, tabs, newlines) with a single space
/// and trim leading/trailing whitespace.
///
/// Returns an empty string for inputs that are entirely whitespace.
pub fn normalize_whitespace(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    whitespace_re().replace_all(s, " ").trim().to_string()
}

/// Normalize an optional free-text field: collapse whitespace, and map
/// empty or whitespace-only values to `None`.
pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(normalize_whitespace).filter(|s| !s.is_empty())
}

/// Extract the first JSON object or array from a potentially markdown-wrapped
/// LLM response.
///
/// Tries, in order:
/// 1. ` ```json ... ``` ` fenced code block
/// 2. ` ``` ... ``` ` fenced code block
/// 3. Bare `{...}` or `[...]`, whichever opens first, up to the last matching
///    closing delimiter
///
/// Returns `None` if no JSON-like content is found.
pub fn extract_json_from_response(s: &str) -> Option<&str> {
    if let Some(inner) = extract_fenced_block(s, "```json") {
        return Some(inner);
    }

    if let Some(inner) = extract_fenced_block(s, "```") {
        return Some(inner);
    }

    let object = bare_span(s, '{', '}');
    let array = bare_span(s, '[', ']');
    match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { &s[a.0..=a.1] } else { &s[o.0..=o.1] }),
        (Some(o), None) => Some(&s[o.0..=o.1]),
        (None, Some(a)) => Some(&s[a.0..=a.1]),
        (None, None) => None,
    }
}

/// Byte span from the first `open` to the last `close`, if well ordered.
fn bare_span(s: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    (end > start).then_some((start, end))
}

/// Extract content inside a fenced code block starting with `fence`.
fn extract_fenced_block<'a>(s: &'a str, fence: &str) -> Option<&'a str> {
    let start = s.find(fence)?;
    let after_fence = start + fence.len();

    // Skip to end of the opening fence line.
    let newline = s[after_fence..].find('\n')?;
    let content_start = after_fence + newline + 1;

    let close = s[content_start..].find("```")?;
    let content = s[content_start..content_start + close].trim();

    if content.is_empty() {
        return None;
    }

    Some(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- normalize_whitespace ---

    #[test]
    fn test_normalize_whitespace_basic() {
        assert_eq!(normalize_whitespace("hello   world"), "hello world");
        assert_eq!(normalize_whitespace("hello\t\tworld"), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
        assert_eq!(normalize_whitespace("  hello  world  "), "hello world");
    }

    #[test]
    fn test_normalize_whitespace_empty() {
        assert_eq!(normalize_whitespace(""), "");
        assert_eq!(normalize_whitespace("   \t\n  "), "");
    }

    #[test]
    fn test_normalize_whitespace_unicode() {
        // Non-breaking space U+00A0; \s matches Unicode whitespace in Rust regex.
        assert_eq!(normalize_whitespace("hello\u{00A0}world"), "hello world");
    }

    // --- non_blank ---

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("")), None);
        assert_eq!(non_blank(Some("  \n ")), None);
        assert_eq!(non_blank(Some(" A  tiger ")), Some("A tiger".to_string()));
    }

    // --- extract_json_from_response ---

    #[test]
    fn test_extract_json_fenced_json() {
        let s = "Here is the result:\n```json\n{\"key\": \"value\"}\n```\nDone.";
        assert_eq!(extract_json_from_response(s), Some("{\"key\": \"value\"}"));
    }

    #[test]
    fn test_extract_json_fenced_plain() {
        let s = "Result:\n```\n[1, 2, 3]\n```";
        assert_eq!(extract_json_from_response(s), Some("[1, 2, 3]"));
    }

    #[test]
    fn test_extract_json_bare_object() {
        let s = "The answer is {\"foo\": 42} as shown.";
        assert_eq!(extract_json_from_response(s), Some("{\"foo\": 42}"));
    }

    #[test]
    fn test_extract_json_bare_array_of_objects() {
        let s = r#"[{"a": 1}, {"b": 2}]"#;
        assert_eq!(extract_json_from_response(s), Some(s));
    }

    #[test]
    fn test_extract_json_object_containing_array() {
        let s = r#"{"entities": [1, 2]}"#;
        assert_eq!(extract_json_from_response(s), Some(s));
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json_from_response("No JSON here, just plain text."), None);
        assert_eq!(extract_json_from_response(""), None);
    }

    #[test]
    fn test_extract_json_empty_fenced_block() {
        assert_eq!(extract_json_from_response("```json\n\n```"), None);
    }
}
