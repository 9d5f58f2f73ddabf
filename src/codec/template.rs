use crate::config::{CONTENT_PLACEHOLDER, STYLE_PLACEHOLDER};

const DOCUMENT_OPEN: &str = "<html><head></head><body>";
const DOCUMENT_CLOSE: &str = "</body></html>";

/// Drop a synthesized `<html><head></head><body>` ... `</body></html>` wrapper, keeping
/// only the body fragment.
pub fn strip_document_wrapper(html: &str) -> &str {
    let html = html.strip_prefix(DOCUMENT_OPEN).unwrap_or(html);
    match html.trim_end().strip_suffix(DOCUMENT_CLOSE) {
        Some(body) => body,
        None => html,
    }
}

/// Substitute every placeholder occurrence in `template`.
///
/// Placeholders are only recognised in the template itself, so a document that happens to
/// contain `{{{style}}}` is emitted verbatim.
pub fn splice(template: &str, content: &str, style: &str) -> String {
    let mut out = String::with_capacity(template.len() + content.len() + style.len());
    let mut rest = template;
    loop {
        let next = [(CONTENT_PLACEHOLDER, content), (STYLE_PLACEHOLDER, style)]
            .into_iter()
            .filter_map(|(marker, value)| rest.find(marker).map(|idx| (idx, marker, value)))
            .min_by_key(|(idx, _, _)| *idx);
        match next {
            Some((idx, marker, value)) => {
                out.push_str(&rest[..idx]);
                out.push_str(value);
                rest = &rest[idx + marker.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
