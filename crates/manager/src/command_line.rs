//! `%name%` placeholder substitution for task command lines.

use jobman_queue::{value_as_text, MessageParams};

/// Substitute every `%name%` in `template` with the matching message
/// parameter.
///
/// A name is one or more ASCII letters, digits or underscores. Placeholders
/// without a matching parameter render as empty. A `%` that does not open a
/// well-formed placeholder is kept as-is.
pub fn render(template: &str, params: &MessageParams) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match placeholder_name(after) {
            Some(name) => {
                if let Some(value) = params.get(name) {
                    out.push_str(&value_as_text(value));
                }
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Name of a placeholder whose opening `%` was just consumed, if `s`
/// continues with `name%`.
fn placeholder_name(s: &str) -> Option<&str> {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    if end == 0 || !s[end..].starts_with('%') {
        return None;
    }
    Some(&s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: serde_json::Value) -> MessageParams {
        match v {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn substitutes_known_names() {
        let p = params(json!({"url": "https://a.test", "depth": 3}));
        assert_eq!(
            render("crawl --url %url% --depth %depth%", &p),
            "crawl --url https://a.test --depth 3"
        );
    }

    #[test]
    fn unmatched_names_render_empty() {
        let p = params(json!({"url": "u"}));
        assert_eq!(render("run %url% %missing%!", &p), "run u !");
    }

    #[test]
    fn stray_percent_is_literal() {
        let p = params(json!({"a": "x"}));
        assert_eq!(render("100% done", &p), "100% done");
        assert_eq!(render("%%a%", &p), "%x");
        assert_eq!(render("50 %a b%", &p), "50 %a b%");
        assert_eq!(render("tail %", &p), "tail %");
    }

    #[test]
    fn adjacent_placeholders() {
        let p = params(json!({"a": "1", "b": "2"}));
        assert_eq!(render("%a%%b%", &p), "12");
    }

    #[test]
    fn non_string_values_use_json_text() {
        let p = params(json!({"flag": true, "tags": ["x", "y"], "none": null}));
        assert_eq!(render("%flag% %tags% [%none%]", &p), r#"true ["x","y"] []"#);
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        assert_eq!(render("echo hello", &MessageParams::new()), "echo hello");
    }
}
