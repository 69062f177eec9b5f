//! Graph label sanitization.

use regex::Regex;
use std::sync::OnceLock;

/// Prefix used when a sanitized label would not start with a letter.
pub const LABEL_PREFIX: &str = "Entity";

static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();

fn separator_re() -> &'static Regex {
    SEPARATOR_RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex is valid"))
}

/// Map an arbitrary string to a valid graph label.
///
/// Splits on runs of non-alphanumeric characters, upper-cases the first
/// character of each token and concatenates. The result always matches
/// `^[A-Za-z][A-Za-z0-9]*$`; if it would be empty or start with a digit it is
/// prefixed with [`LABEL_PREFIX`].
///
/// ```
/// use mythograph_rs::schema::sanitize_label;
///
/// assert_eq!(sanitize_label("generates myth"), "GeneratesMyth");
/// assert_eq!(sanitize_label("3d form"), "Entity3dForm");
/// assert_eq!(sanitize_label(""), "Entity");
/// ```
pub fn sanitize_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    for token in separator_re().split(raw).filter(|t| !t.is_empty()) {
        let mut chars = token.chars();
        if let Some(first) = chars.next() {
            label.push(first.to_ascii_uppercase());
            label.push_str(chars.as_str());
        }
    }

    if !label.starts_with(|c: char| c.is_ascii_alphabetic()) {
        label.insert_str(0, LABEL_PREFIX);
    }
    label
}
