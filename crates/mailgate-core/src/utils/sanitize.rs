/// HTML sanitization: part of the ingestion contract
///
/// The sanitized output is what gets persisted and sent. Allow-list
/// based: dangerous containers and event handlers are stripped, URL
/// schemes are restricted to http/https/mailto, anchors are rewritten to
/// open in a new tab with `rel="noopener noreferrer"`, and inline styles
/// are filtered down to an allow-listed set of CSS properties with
/// pattern-checked values.
use ammonia::Builder;
use md5::{Digest, Md5};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

/// Tags that never survive sanitization, regardless of defaults
const FORBIDDEN_TAGS: &[&str] = &[
    "script", "iframe", "object", "embed", "form", "style", "link", "meta", "base",
];

/// Inline-style properties that may pass through
const ALLOWED_CSS_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "font-size",
    "font-family",
    "font-weight",
    "font-style",
    "text-align",
    "text-decoration",
    "line-height",
    "letter-spacing",
    "margin",
    "margin-top",
    "margin-bottom",
    "margin-left",
    "margin-right",
    "padding",
    "padding-top",
    "padding-bottom",
    "padding-left",
    "padding-right",
    "border",
    "border-radius",
    "border-color",
    "border-width",
    "border-style",
    "width",
    "max-width",
    "height",
    "display",
    "vertical-align",
];

lazy_static::lazy_static! {
    /// Conservative value shape: words, numbers, units, colors, simple
    /// punctuation. No url(), no expression(), no escapes.
    static ref CSS_VALUE_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9#%.,\s_'\-]+$").unwrap();
}

/// Filters a `style` attribute down to the allow-listed declarations.
/// Returns None when nothing safe remains.
fn sanitize_style(value: &str) -> Option<String> {
    let kept: Vec<String> = value
        .split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim();
            if ALLOWED_CSS_PROPERTIES.contains(&prop.as_str())
                && !val.is_empty()
                && CSS_VALUE_RE.is_match(val)
            {
                Some(format!("{}: {}", prop, val))
            } else {
                None
            }
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}

/// Sanitizes rendered HTML per the ingestion contract.
pub fn sanitize_html(html: &str) -> String {
    let mut builder = Builder::default();
    builder
        .rm_tags(FORBIDDEN_TAGS.iter().copied())
        .url_schemes(HashSet::from(["http", "https", "mailto"]))
        .link_rel(Some("noopener noreferrer"))
        .set_tag_attribute_value("a", "target", "_blank")
        .add_generic_attributes(["style"])
        .attribute_filter(|_element, attribute, value| {
            if attribute == "style" {
                sanitize_style(value).map(Cow::Owned)
            } else {
                Some(Cow::Borrowed(value))
            }
        });

    builder.clean(html).to_string()
}

/// MD5 digest (hex) of attachment content, recorded with the outbox row
pub fn attachment_digest(content: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_script_and_iframe() {
        let dirty = r#"<p>hi</p><script>alert('x')</script><iframe src="https://e.com"></iframe>"#;
        let clean = sanitize_html(dirty);
        assert!(clean.contains("<p>hi</p>"));
        assert!(!clean.contains("script"));
        assert!(!clean.contains("iframe"));
    }

    #[test]
    fn test_strips_forms_and_meta() {
        let dirty = r#"<form action="/steal"><input name="a"></form><meta http-equiv="refresh"><base href="https://evil.com">ok"#;
        let clean = sanitize_html(dirty);
        assert!(!clean.contains("<form"));
        assert!(!clean.contains("<meta"));
        assert!(!clean.contains("<base"));
        assert!(clean.contains("ok"));
    }

    #[test]
    fn test_strips_event_handlers() {
        let dirty = r#"<img src="https://e.com/a.png" onerror="alert(1)"><div onclick="x()">c</div>"#;
        let clean = sanitize_html(dirty);
        assert!(!clean.contains("onerror"));
        assert!(!clean.contains("onclick"));
    }

    #[test]
    fn test_rejects_javascript_scheme() {
        let dirty = r#"<a href="javascript:alert(1)">x</a><a href="https://ok.com">y</a>"#;
        let clean = sanitize_html(dirty);
        assert!(!clean.contains("javascript:"));
        assert!(clean.contains("https://ok.com"));
    }

    #[test]
    fn test_anchors_rewritten() {
        let clean = sanitize_html(r#"<a href="https://example.com">go</a>"#);
        assert!(clean.contains(r#"target="_blank""#));
        assert!(clean.contains("noopener"));
        assert!(clean.contains("noreferrer"));
    }

    #[test]
    fn test_mailto_allowed() {
        let clean = sanitize_html(r#"<a href="mailto:a@b.com">mail</a>"#);
        assert!(clean.contains("mailto:a@b.com"));
    }

    #[test]
    fn test_style_allow_list() {
        let clean = sanitize_html(
            r#"<p style="color: #333; position: fixed; background-image: url(x)">t</p>"#,
        );
        assert!(clean.contains("color: #333"));
        assert!(!clean.contains("position"));
        assert!(!clean.contains("url("));
    }

    #[test]
    fn test_style_dropped_when_nothing_safe() {
        let clean = sanitize_html(r#"<p style="position: absolute">t</p>"#);
        assert!(!clean.contains("style="));
        assert!(clean.contains("<p>t</p>"));
    }

    #[test]
    fn test_sanitize_style_unit() {
        assert_eq!(
            sanitize_style("color: red; font-size: 12px").as_deref(),
            Some("color: red; font-size: 12px")
        );
        assert_eq!(sanitize_style("behavior: url(#x)"), None);
        assert_eq!(sanitize_style(""), None);
    }

    #[test]
    fn test_attachment_digest_stable() {
        let d1 = attachment_digest(b"hello");
        let d2 = attachment_digest(b"hello");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 32);
        assert_ne!(attachment_digest(b"other"), d1);
    }
}
