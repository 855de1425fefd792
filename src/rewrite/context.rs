//! Per-request rewrite state.

use crate::rewrite::hints::{HintList, ResourceHint};

/// Id of the merged style block emitted at the end of the head.
pub const MERGED_STYLE_ID: &str = "edge-merged-styles";

/// Inline style text captured from one `<style>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CapturedStyle {
    css: String,
    media: Option<String>,
}

/// Transient state for one request's transformation.
///
/// Owned by a single request and discarded with its response.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    authenticated: bool,
    styles: Vec<CapturedStyle>,
    hints: HintList,
}

impl RewriteContext {
    pub fn new(authenticated: bool) -> Self {
        Self {
            authenticated,
            ..Self::default()
        }
    }

    /// Whether the visitor carries a session cookie.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Start a captured style block. Media-scoped blocks keep their scope.
    pub fn open_style(&mut self, media: Option<String>) {
        let media = media.filter(|m| {
            let m = m.trim();
            !m.is_empty() && !m.eq_ignore_ascii_case("all")
        });
        self.styles.push(CapturedStyle {
            css: String::new(),
            media,
        });
    }

    /// Append text to the block opened last.
    pub fn push_style_text(&mut self, text: &str) {
        if let Some(style) = self.styles.last_mut() {
            style.css.push_str(text);
        }
    }

    /// Queue a hint; duplicates by href are ignored.
    pub fn add_hint(&mut self, hint: ResourceHint) -> bool {
        self.hints.push(hint)
    }

    /// The document already declares a hint for `href`.
    pub fn hint_present(&mut self, href: &str) {
        self.hints.mark_present(href);
    }

    /// Render and clear everything pending: one merged `<style>`, then the hints.
    pub fn flush(&mut self) -> String {
        let mut out = String::new();

        if !self.styles.is_empty() {
            let css = self
                .styles
                .drain(..)
                .map(|s| match s.media {
                    Some(media) => format!("@media {media} {{\n{}\n}}", s.css),
                    None => s.css,
                })
                .collect::<Vec<_>>()
                .join("\n");
            out.push_str(&format!(r#"<style id="{MERGED_STYLE_ID}">{css}</style>"#));
        }

        for hint in self.hints.drain() {
            out.push_str(&hint.to_string());
        }
        out
    }
}
