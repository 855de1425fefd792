//! Whole-document rewrite pass.
//!
//! # Responsibilities
//! - Inject connection hints right after the opening head tag
//! - Load font and heavy stylesheets asynchronously (preload + noscript fallback)
//! - Prioritize likely LCP images and lazy-load the rest
//! - Defer known non-critical third-party scripts
//! - Preload fonts right after the connection hints
//! - Drop the admin toolbar stylesheet for anonymous visitors
//!
//! # Design Decisions
//! - Every step leaves a marker (comment or `data-edge-*` attribute) and
//!   checks for it, so running the pass on its own output changes nothing
//! - The font preloads anchor on the hints block, so hints go in first
//! - A step that finds nothing to do is a no-op, never an error
//! - Only real elements are rewritten; markup quoted inside scripts, styles
//!   and comments is text to lol_html and is left alone

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use lol_html::errors::RewritingError;
use lol_html::html_content::{Comment, ContentType, Element, TextChunk};
use lol_html::{doc_comments, element, rewrite_str, text, HandlerResult, HtmlRewriter, RewriteStrSettings, Settings};
use regex::Regex;

use crate::config::RewriteConfig;
use crate::rewrite::context::RewriteContext;
use crate::rewrite::hints::{HintKind, ResourceHint};
use crate::rewrite::lcp::{self, LcpHeuristic};
use crate::rewrite::markup::{escape_attr, rel_contains, requote};

pub const HINTS_START: &str = "<!-- edge:resource-hints -->";
pub const HINTS_END: &str = "<!-- /edge:resource-hints -->";
pub const FONTS_START: &str = "<!-- edge:font-preloads -->";
pub const FONTS_END: &str = "<!-- /edge:font-preloads -->";
pub const ADMIN_BAR_REMOVED: &str = "<!-- edge:admin-bar-css removed -->";
const FONT_IMPORT_REMOVED: &str = "/* edge:font-import moved to preload */";

const ADMIN_BAR_ID: &str = "admin-bar-css";

/// Attribute marking links this pass produced.
const ASYNC_MARKER: &str = "data-edge-async";
const FALLBACK_MARKER: &str = "data-edge-fallback";

/// Blocks an earlier run already injected.
#[derive(Debug, Default, Clone, Copy)]
struct Markers {
    hints: bool,
    fonts: bool,
}

fn is_marker(comment: &Comment<'_>, marker: &str) -> bool {
    format!("<!--{}-->", comment.text()) == marker
}

/// Compiled whole-body rules.
#[derive(Debug, Clone)]
pub struct BodyRewriter {
    hints_block: Option<String>,
    fonts_block: Option<String>,
    font_host: String,
    font_import: Regex,
    deferred_stylesheets: Vec<Regex>,
    deferred_scripts: Vec<String>,
    lcp: LcpHeuristic,
}

impl BodyRewriter {
    pub fn from_config(config: &RewriteConfig) -> Result<Self, regex::Error> {
        let hints_block = (!config.resource_hints.is_empty()).then(|| {
            let hints: String = config
                .resource_hints
                .iter()
                .filter_map(|h| {
                    let kind = h.rel.parse::<HintKind>().ok()?;
                    Some(
                        ResourceHint {
                            kind,
                            href: h.href.clone(),
                            as_type: h.as_type.clone(),
                        }
                        .to_string(),
                    )
                })
                .collect();
            format!("{HINTS_START}{hints}{HINTS_END}")
        });

        let fonts_block = (!config.font_preloads.is_empty()).then(|| {
            let links: String = config
                .font_preloads
                .iter()
                .map(|href| {
                    format!(
                        r#"<link rel="preload" href="{}" as="font" type="font/woff2" crossorigin>"#,
                        escape_attr(href)
                    )
                })
                .collect();
            format!("{FONTS_START}{links}{FONTS_END}")
        });

        let font_import = Regex::new(&format!(
            r#"(?i)@import\s+(?:url\(\s*)?["']?(?:https?:)?//{}[^;]*;"#,
            regex::escape(&config.font_stylesheet_host)
        ))?;

        let deferred_stylesheets = config
            .deferred_stylesheets
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hints_block,
            fonts_block,
            font_host: config.font_stylesheet_host.clone(),
            font_import,
            deferred_stylesheets,
            deferred_scripts: config.deferred_scripts.clone(),
            lcp: LcpHeuristic::from_config(config),
        })
    }

    /// Apply every step in one pass over the document.
    pub fn rewrite(&self, html: &str, ctx: &RewriteContext) -> Result<String, RewritingError> {
        let markers = scan_markers(html)?;
        let images = self.lcp.scan(html)?;
        let pending: RefCell<HashSet<String>> =
            RefCell::new(self.lcp.candidates(&images).into_iter().collect());

        let head_block = self.head_block(markers);
        let fonts_after_hints = self.fonts_block.as_deref().filter(|_| markers.hints && !markers.fonts);
        let head_done = Cell::new(false);
        let fonts_done = Cell::new(false);
        let css = RefCell::new(String::new());
        let anonymous = !ctx.is_authenticated();

        rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("head", |el| {
                        if !head_done.replace(true) && !head_block.is_empty() {
                            el.prepend(&head_block, ContentType::Html);
                        }
                        Ok(())
                    }),
                    element!("link", |el| self.rewrite_link(el, anonymous)),
                    element!("script[src]", |el| self.defer_script(el)),
                    element!("img", |el| lcp::annotate(el, &mut pending.borrow_mut())),
                    text!("style", |chunk| self.strip_font_imports(chunk, &css)),
                ],
                document_content_handlers: vec![doc_comments!(|comment| {
                    if let Some(fonts) = fonts_after_hints {
                        if is_marker(comment, HINTS_END) && !fonts_done.replace(true) {
                            comment.after(fonts, ContentType::Html);
                        }
                    }
                    Ok(())
                })],
                strict: false,
                ..RewriteStrSettings::new()
            },
        )
    }

    /// What goes right after the opening head tag: the hints, then the font
    /// preloads, each only when the document lacks it.
    fn head_block(&self, markers: Markers) -> String {
        let mut block = String::new();
        if !markers.hints {
            block.push_str(self.hints_block.as_deref().unwrap_or_default());
        }
        if !markers.fonts && !markers.hints {
            block.push_str(self.fonts_block.as_deref().unwrap_or_default());
        }
        block
    }

    fn is_deferred_stylesheet(&self, href: &str) -> bool {
        href.contains(self.font_host.as_str())
            || self.deferred_stylesheets.iter().any(|re| re.is_match(href))
    }

    /// Font and heavy stylesheets become preload-then-activate links; the
    /// admin toolbar stylesheet becomes a marker comment for anonymous visitors.
    fn rewrite_link(&self, el: &mut Element<'_, '_>, anonymous: bool) -> HandlerResult {
        if el.has_attribute(ASYNC_MARKER) || el.has_attribute(FALLBACK_MARKER) {
            return Ok(());
        }
        if anonymous && el.get_attribute("id").as_deref() == Some(ADMIN_BAR_ID) {
            el.replace(ADMIN_BAR_REMOVED, ContentType::Html);
            return Ok(());
        }
        if !rel_contains(el, "stylesheet") {
            return Ok(());
        }
        if let Some(href) = el.get_attribute("href").filter(|h| self.is_deferred_stylesheet(h)) {
            let markup = async_stylesheet(el, &href);
            el.replace(&markup, ContentType::Html);
        }
        Ok(())
    }

    /// `@import`s of the font host inside style blocks become a comment.
    ///
    /// Style text may arrive in several chunks; it is held back until the
    /// block is complete so an import split across chunks is still found.
    fn strip_font_imports(&self, chunk: &mut TextChunk<'_>, css: &RefCell<String>) -> HandlerResult {
        let mut buffer = css.borrow_mut();
        buffer.push_str(chunk.as_str());
        if !chunk.last_in_text_node() {
            chunk.remove();
            return Ok(());
        }

        let text = std::mem::take(&mut *buffer);
        let stripped = self.font_import.replace_all(&text, FONT_IMPORT_REMOVED);
        chunk.replace(&stripped, ContentType::Html);
        Ok(())
    }

    /// Scripts of a known non-critical family get `defer`.
    fn defer_script(&self, el: &mut Element<'_, '_>) -> HandlerResult {
        let deferrable = el
            .get_attribute("src")
            .is_some_and(|src| self.deferred_scripts.iter().any(|f| src.contains(f.as_str())));
        if deferrable && !el.has_attribute("defer") && !el.has_attribute("async") {
            el.set_attribute("defer", "")?;
        }
        Ok(())
    }
}

/// Which injected blocks the document already carries.
fn scan_markers(html: &str) -> Result<Markers, RewritingError> {
    let markers = Cell::new(Markers::default());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            document_content_handlers: vec![doc_comments!(|comment| {
                let mut seen = markers.get();
                seen.hints |= is_marker(comment, HINTS_START);
                seen.fonts |= is_marker(comment, FONTS_START);
                markers.set(seen);
                Ok(())
            })],
            strict: false,
            ..Settings::new()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    Ok(markers.get())
}

/// Preload-then-activate link plus a `<noscript>` fallback.
fn async_stylesheet(el: &Element<'_, '_>, href: &str) -> String {
    let href = requote(href);
    let mut link = format!(r#"<link rel="preload" as="style" href="{href}""#);
    for name in ["id", "media"] {
        if let Some(value) = el.get_attribute(name) {
            link.push_str(&format!(r#" {name}="{}""#, requote(&value)));
        }
    }
    link.push_str(&format!(
        r#" onload="this.onload=null;this.rel='stylesheet'" {ASYNC_MARKER}>"#
    ));
    format!(r#"{link}<noscript><link rel="stylesheet" href="{href}" {FALLBACK_MARKER}></noscript>"#)
}
