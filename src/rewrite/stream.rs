//! Streaming rewriter for the document head.
//!
//! # Responsibilities
//! - Visit every direct child of `<head>` exactly once, in document order
//! - Remove, keep, annotate or capture each element as it is seen
//! - Emit captured styles and preload hints once, where the head closes
//!
//! # Design Decisions
//! - Built on lol_html, so script, style and comment text is never read as markup
//! - Only direct children of the head are optimized; `<noscript>` and
//!   `<template>` content passes through as written
//! - A removal never reaches past the end of the head, even when the removed
//!   element is never closed
//! - A merged style block from an earlier run stays where it is

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element, TextChunk};
use lol_html::{comments, element, end, rewrite_str, text, HandlerResult, HtmlRewriter, RewriteStrSettings, Settings};

use crate::config::RewriteConfig;
use crate::rewrite::context::{RewriteContext, MERGED_STYLE_ID};
use crate::rewrite::hints::ResourceHint;
use crate::rewrite::markup::{on_end_tag, rel_contains};
use crate::rewrite::rules::{parse_rules, ElementRule, ElementSignature, RemovalSet, SelectorError};

/// Compiled rules for the head pass.
#[derive(Debug, Clone)]
pub struct StreamRules {
    remove: Vec<ElementRule>,
    remove_anonymous: Vec<ElementRule>,
    protected_style_ids: Vec<String>,
    eager_script_markers: Vec<String>,
    critical_prefixes: Vec<String>,
}

impl StreamRules {
    pub fn from_config(config: &RewriteConfig) -> Result<Self, SelectorError> {
        Ok(Self {
            remove: parse_rules(&config.remove)?,
            remove_anonymous: parse_rules(&config.remove_anonymous)?,
            protected_style_ids: config.protected_style_ids.clone(),
            eager_script_markers: config.eager_script_markers.clone(),
            critical_prefixes: config.critical_prefixes.clone(),
        })
    }

    /// Removal rules for one visitor.
    pub fn removal_set(&self, authenticated: bool) -> RemovalSet {
        RemovalSet::build(&self.remove, &self.remove_anonymous, authenticated)
    }

    fn is_critical(&self, url: &str) -> bool {
        self.critical_prefixes.iter().any(|p| url.contains(p.as_str()))
    }

    /// Font-face blocks and our own merged block stay in place.
    fn keeps_style(&self, id: Option<&str>) -> bool {
        id.is_some_and(|id| {
            id == MERGED_STYLE_ID || self.protected_style_ids.iter().any(|m| id.contains(m.as_str()))
        })
    }

    fn runs_eagerly(&self, script: &str) -> bool {
        self.eager_script_markers.iter().any(|m| script.contains(m.as_str()))
    }
}

/// State shared by the handlers of one run.
#[derive(Debug, Default)]
struct HeadState {
    ctx: RewriteContext,
    removal: RemovalSet,
    /// Inline head script bodies, read ahead in document order.
    scripts: VecDeque<String>,
    in_head: bool,
    flushed: bool,
    /// Inside a removed element; cleared when it or the head closes.
    removing: bool,
    /// Text of the current `<style>` goes to the merged block.
    capturing: bool,
}

type Shared = Rc<RefCell<HeadState>>;

impl HeadState {
    /// Everything captured, exactly once per document.
    fn close_head(&mut self) -> Option<String> {
        self.removing = false;
        self.capturing = false;
        if !self.in_head || self.flushed {
            return None;
        }
        self.in_head = false;
        self.flushed = true;
        Some(self.ctx.flush())
    }
}

/// Run the head pass with `rules` for the visitor described by `ctx`.
pub fn optimize_head(
    html: &str,
    rules: &StreamRules,
    ctx: &mut RewriteContext,
) -> Result<String, RewritingError> {
    let state: Shared = Rc::new(RefCell::new(HeadState {
        removal: rules.removal_set(ctx.is_authenticated()),
        scripts: inline_scripts(html)?.into(),
        ctx: std::mem::take(ctx),
        ..HeadState::default()
    }));

    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("head", |el| open_head(&state, el)),
                element!("body", |el| {
                    if let Some(out) = state.borrow_mut().close_head() {
                        el.before(&out, ContentType::Html);
                    }
                    Ok(())
                }),
                element!("head *", |el| {
                    if state.borrow().removing {
                        el.remove_and_keep_content();
                    }
                    Ok(())
                }),
                element!("head > *", |el| visit_child(&state, rules, el)),
                text!("head > style", |chunk| capture_text(&state, chunk)),
                text!("head *", |chunk| {
                    if state.borrow().removing {
                        chunk.remove();
                    }
                    Ok(())
                }),
                comments!("head *", |comment| {
                    if state.borrow().removing {
                        comment.remove();
                    }
                    Ok(())
                }),
            ],
            document_content_handlers: vec![end!(|end| {
                // Head never closed.
                if let Some(out) = state.borrow_mut().close_head() {
                    end.append(&out, ContentType::Html);
                }
                Ok(())
            })],
            strict: false,
            ..RewriteStrSettings::new()
        },
    );

    *ctx = std::mem::take(&mut state.borrow_mut().ctx);
    result
}

fn open_head(state: &Shared, el: &mut Element<'_, '_>) -> HandlerResult {
    let mut s = state.borrow_mut();
    if s.in_head || s.flushed {
        return Ok(());
    }
    s.in_head = true;

    let closing = Rc::clone(state);
    on_end_tag(el, move |end| {
        if let Some(out) = closing.borrow_mut().close_head() {
            end.before(&out, ContentType::Html);
        }
        Ok(())
    });
    Ok(())
}

fn visit_child(state: &Shared, rules: &StreamRules, el: &mut Element<'_, '_>) -> HandlerResult {
    let mut s = state.borrow_mut();
    let signature = ElementSignature::of(el);
    let inline_script = if signature.tag == "script" && signature.src.is_none() {
        s.scripts.pop_front()
    } else {
        None
    };
    s.capturing = false;

    if !s.in_head || s.removing {
        return Ok(());
    }

    if s.removal.matches(&signature) {
        tracing::trace!(tag = %signature.tag, id = ?signature.id, "Removing element");
        el.remove_and_keep_content();
        let closing = Rc::clone(state);
        s.removing = on_end_tag(el, move |_| {
            closing.borrow_mut().removing = false;
            Ok(())
        });
        return Ok(());
    }

    match signature.tag.as_str() {
        "style" if !rules.keeps_style(signature.id.as_deref()) => {
            s.ctx.open_style(el.get_attribute("media"));
            s.capturing = true;
            el.remove_and_keep_content();
        }
        "link" => {
            let Some(href) = signature.href.as_deref() else {
                return Ok(());
            };
            if rel_contains(el, "preload") {
                s.ctx.hint_present(href);
            } else if rel_contains(el, "stylesheet") && rules.is_critical(href) {
                s.ctx.add_hint(ResourceHint::preload(href, "style"));
            }
        }
        "script" => match signature.src.as_deref() {
            Some(src) => {
                if rules.is_critical(src) {
                    s.ctx.add_hint(ResourceHint::preload(src, "script"));
                }
            }
            None => {
                let body = inline_script.unwrap_or_default();
                if !el.has_attribute("defer") && !rules.runs_eagerly(&body) {
                    el.set_attribute("defer", "")?;
                }
            }
        },
        _ => {}
    }
    Ok(())
}

fn capture_text(state: &Shared, chunk: &mut TextChunk<'_>) -> HandlerResult {
    let mut s = state.borrow_mut();
    if s.capturing {
        s.ctx.push_style_text(chunk.as_str());
        chunk.remove();
    }
    Ok(())
}

/// Bodies of the head's inline scripts, in document order.
///
/// A start tag is written out before its text is parsed, so the text is
/// read in a separate pass first.
fn inline_scripts(html: &str) -> Result<Vec<String>, RewritingError> {
    #[derive(Default)]
    struct Scan {
        bodies: Vec<String>,
        inline: bool,
    }
    let scan = RefCell::new(Scan::default());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("head > script", |el| {
                    let mut scan = scan.borrow_mut();
                    scan.inline = !el.has_attribute("src");
                    if scan.inline {
                        scan.bodies.push(String::new());
                    }
                    Ok(())
                }),
                text!("head > script", |chunk| {
                    let mut scan = scan.borrow_mut();
                    if scan.inline {
                        if let Some(body) = scan.bodies.last_mut() {
                            body.push_str(chunk.as_str());
                        }
                    }
                    Ok(())
                }),
            ],
            strict: false,
            ..Settings::new()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    Ok(scan.into_inner().bodies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> StreamRules {
        StreamRules::from_config(&RewriteConfig::default()).unwrap()
    }

    fn run_with(html: &str, rules: &StreamRules, authenticated: bool) -> String {
        let mut ctx = RewriteContext::new(authenticated);
        optimize_head(html, rules, &mut ctx).unwrap()
    }

    fn run(html: &str, authenticated: bool) -> String {
        run_with(html, &rules(), authenticated)
    }

    #[test]
    fn test_admin_bar_removed_for_anonymous_only() {
        let html = r#"<html><head><link id="admin-bar-css"></head><body></body></html>"#;

        let anonymous = run(html, false);
        assert!(!anonymous.contains("admin-bar-css"));
        assert_eq!(anonymous, "<html><head></head><body></body></html>");

        let logged_in = run(html, true);
        assert!(logged_in.contains(r#"<link id="admin-bar-css">"#));
    }

    #[test]
    fn test_styles_are_merged_in_order() {
        let html = "<head><style>A{}</style><meta charset=utf-8><style>B{}</style></head>";
        let out = run(html, false);

        assert_eq!(
            out,
            "<head><meta charset=utf-8><style id=\"edge-merged-styles\">A{}\nB{}</style></head>"
        );
        assert_eq!(out.matches("<style").count(), 1);
    }

    #[test]
    fn test_protected_font_styles_stay_in_place() {
        let html = r#"<head><style id="wp-fonts-local">@font-face{}</style><style>A{}</style></head>"#;
        let out = run(html, false);

        assert!(out.starts_with(r#"<head><style id="wp-fonts-local">@font-face{}</style>"#));
        assert!(out.contains(r#"<style id="edge-merged-styles">A{}</style>"#));
    }

    #[test]
    fn test_noscript_styles_pass_through() {
        let html = concat!(
            "<head><style>A{}</style>",
            "<noscript><style>.woocommerce-product-gallery{opacity:1!important}</style></noscript>",
            "</head>"
        );
        let out = run(html, false);

        assert_eq!(
            out,
            concat!(
                "<head><noscript><style>.woocommerce-product-gallery{opacity:1!important}</style></noscript>",
                "<style id=\"edge-merged-styles\">A{}</style></head>"
            )
        );
    }

    #[test]
    fn test_inline_scripts_deferred_except_tag_manager() {
        let html = concat!(
            "<head>",
            "<script>var a = 1;</script>",
            "<script>(function(w,d,s,l,i){j.src='https://www.googletagmanager.com/gtm.js?id='+i;})</script>",
            "<script defer>var b = 2;</script>",
            "</head>"
        );
        let out = run(html, false);

        assert!(out.contains(r#"<script defer="">var a = 1;</script>"#));
        assert!(out.contains("<script>(function(w,d,s,l,i)"));
        assert!(out.contains("<script defer>var b = 2;</script>"));
        assert_eq!(out.matches("defer").count(), 2);
    }

    #[test]
    fn test_script_text_is_not_markup() {
        let html = concat!(
            "<head>",
            "<script>document.write('<style>X{}</style><link rel=\"stylesheet\" href=\"/wp-content/themes/t.css\">');</script>",
            "</head>"
        );
        let out = run(html, false);

        assert!(out.contains("document.write('<style>X{}</style><link rel=\"stylesheet\" href=\"/wp-content/themes/t.css\">');"));
        assert!(!out.contains(MERGED_STYLE_ID));
        assert!(!out.contains(r#"rel="preload""#));
    }

    #[test]
    fn test_critical_resources_get_one_preload_each() {
        let html = concat!(
            "<head>",
            r#"<link rel="stylesheet" href="/wp-content/themes/site/style.css">"#,
            r#"<script src="/wp-content/plugins/elementor/frontend.js"></script>"#,
            r#"<link rel="stylesheet" href="/wp-content/themes/site/style.css">"#,
            r#"<link rel="stylesheet" href="/other/plugin.css">"#,
            "</head>"
        );
        let out = run(html, false);

        let preloads: Vec<_> = out.match_indices(r#"rel="preload""#).collect();
        assert_eq!(preloads.len(), 2);
        assert!(out.contains(
            r#"<link rel="preload" href="/wp-content/themes/site/style.css" as="style" crossorigin><link rel="preload" href="/wp-content/plugins/elementor/frontend.js" as="script" crossorigin></head>"#
        ));
    }

    #[test]
    fn test_fixed_removals() {
        let html = concat!(
            "<head>",
            r#"<script type="text/template" id="freeze-table-template"><div class="x"></div></script>"#,
            r#"<link rel="dns-prefetch" href="//code.jquery.com">"#,
            r#"<link rel="dns-prefetch" href="//s.w.org">"#,
            "</head>"
        );
        let out = run(html, true);
        assert_eq!(out, r#"<head><link rel="dns-prefetch" href="//s.w.org"></head>"#);
    }

    #[test]
    fn test_removing_a_container_drops_its_children() {
        let config = RewriteConfig {
            remove: vec![r#"div[id="promo"]"#.to_string()],
            ..RewriteConfig::default()
        };
        let rules = StreamRules::from_config(&config).unwrap();
        let html = r#"<head><div id="promo"><link rel="stylesheet" href="a.css"><!-- x --></div><meta name="x"></head>"#;

        assert_eq!(run_with(html, &rules, false), r#"<head><meta name="x"></head>"#);
    }

    #[test]
    fn test_unclosed_removal_stops_at_end_of_head() {
        let config = RewriteConfig {
            remove: vec![r#"div[id="promo"]"#.to_string()],
            ..RewriteConfig::default()
        };
        let rules = StreamRules::from_config(&config).unwrap();
        let html = r#"<head><div id="promo"><meta name="x"></head><body><p>kept</p></body>"#;

        assert_eq!(run_with(html, &rules, false), "<head></head><body><p>kept</p></body>");
    }

    #[test]
    fn test_body_is_untouched() {
        let html = "<head></head><body><style>X{}</style><script>go()</script></body>";
        assert_eq!(run(html, false), html);
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let html = concat!(
            "<head>",
            "<style>A{}</style><style>B{}</style>",
            r#"<link rel="stylesheet" href="/wp-content/themes/site/style.css">"#,
            "<script>init()</script>",
            "</head><body></body>"
        );
        let once = run(html, false);
        let twice = run(&once, false);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(MERGED_STYLE_ID).count(), 1);
    }

    #[test]
    fn test_unclosed_head_still_flushes() {
        let out = run("<head><style>A{}</style><title>t</title>", false);
        assert_eq!(out, "<head><title>t</title><style id=\"edge-merged-styles\">A{}</style>");
    }

    #[test]
    fn test_body_start_closes_an_open_head() {
        let out = run("<head><style>A{}</style><body><p>x</p></body>", false);
        assert_eq!(
            out,
            "<head><style id=\"edge-merged-styles\">A{}</style><body><p>x</p></body>"
        );
    }
}
