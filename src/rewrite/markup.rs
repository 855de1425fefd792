//! Helpers over lol_html elements shared by both passes.

use lol_html::html_content::{Element, EndTag};
use lol_html::HandlerResult;

/// True when the whitespace-separated `rel` tokens include `token`.
pub fn rel_contains(el: &Element<'_, '_>, token: &str) -> bool {
    el.get_attribute("rel")
        .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case(token)))
}

/// Run `handler` when `el` closes.
///
/// Returns false for elements that have no end tag (void or self-closing);
/// the handler is dropped in that case.
pub fn on_end_tag<F>(el: &mut Element<'_, '_>, handler: F) -> bool
where
    F: FnOnce(&mut EndTag<'_>) -> HandlerResult + 'static,
{
    match el.end_tag_handlers() {
        Some(handlers) => {
            handlers.push(Box::new(handler));
            true
        }
        None => false,
    }
}

/// Escape plain text for a double-quoted attribute value.
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Requote an attribute value copied from the source document.
///
/// Source values are already entity-encoded; only a literal `"` from a
/// single-quoted original needs escaping.
pub fn requote(raw: &str) -> String {
    raw.replace('"', "&quot;")
}
