//! URL quoting helpers.

/// Characters never percent-encoded.
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-' | b'~')
}

/// Percent-encodes `text`, leaving ASCII letters, digits, `_.-~` and any
/// byte in `safe` untouched.
///
/// ```
/// use gitdex_http::quote;
///
/// assert_eq!(quote("my index", "/"), "my%20index");
/// assert_eq!(quote("feature/x", "/"), "feature/x");
/// assert_eq!(quote("feature/x", ""), "feature%2Fx");
/// ```
pub fn quote(text: &str, safe: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if is_unreserved(byte) || safe.as_bytes().contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Encodes key/value pairs as an `application/x-www-form-urlencoded`
/// query string (without the leading `?`).
pub fn encode_query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", quote(key, ""), quote(value, "")))
        .collect::<Vec<_>>()
        .join("&")
}
