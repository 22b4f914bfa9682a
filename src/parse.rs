use crate::error::AuditError;
use regex::Regex;
use std::sync::LazyLock;

static FENCED_HTML: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```html\s*(<!DOCTYPE html.*?>.*?</html>)\s*```").expect("static regex")
});

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title>(.*?)</title>").expect("static regex"));

const DOCTYPE: &str = "<!doctype html";

/// Pull the HTML document out of a raw completion.
///
/// Prefers a ```html fenced block holding a full document; otherwise accepts
/// the whole reply if it already is a document.
pub fn extract_payload(raw: &str) -> Result<String, AuditError> {
    if let Some(caps) = FENCED_HTML.captures(raw) {
        return Ok(caps[1].trim().to_string());
    }

    let trimmed = raw.trim();
    let starts_with_doctype = trimmed
        .get(..DOCTYPE.len())
        .map(|head| head.eq_ignore_ascii_case(DOCTYPE))
        .unwrap_or(false);
    if starts_with_doctype {
        return Ok(trimmed.to_string());
    }

    Err(AuditError::NoStructuredPayload)
}

/// Inner text of `<title>`, trimmed. `None` if missing or blank.
pub fn extract_title(payload: &str) -> Option<String> {
    let caps = TITLE.captures(payload)?;
    let t = caps[1].trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}
