//! Largest-contentful-paint image heuristic.
//!
//! Picks the images most likely to be the page's main visual and loads them
//! eagerly at high priority; every other image is lazy-loaded.
//! Candidate order: first image inside the first hero container (or, when the
//! page has none, inside `<main>`), then images whose filename is on the hero
//! allowlist, then the first two images of the document.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use lol_html::errors::RewritingError;
use lol_html::html_content::Element;
use lol_html::{element, HandlerResult, HtmlRewriter, Settings};

use crate::config::RewriteConfig;
use crate::rewrite::markup::on_end_tag;

/// Elements that may mark a hero region through their class or id.
const CONTAINER_TAGS: [&str; 6] = ["div", "section", "header", "main", "figure", "article"];

/// How many leading images are always candidates.
const POSITIONAL_CANDIDATES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    Hero,
    Main,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum RegionState {
    #[default]
    Unseen,
    Open,
    Closed,
}

/// The first container of one kind and the first image inside it.
#[derive(Debug, Default)]
struct Region {
    state: RegionState,
    first_image: Option<String>,
}

impl Region {
    /// True only for the first container of this kind.
    fn open(&mut self) -> bool {
        if self.state != RegionState::Unseen {
            return false;
        }
        self.state = RegionState::Open;
        true
    }

    fn close(&mut self) {
        self.state = RegionState::Closed;
    }

    fn offer(&mut self, src: &str) {
        if self.state == RegionState::Open && self.first_image.is_none() {
            self.first_image = Some(src.to_string());
        }
    }
}

/// Images of one document, in order, and where the containers hold theirs.
#[derive(Debug, Default)]
pub struct ImageScan {
    images: Vec<String>,
    hero: Region,
    main: Region,
}

impl ImageScan {
    fn region(&mut self, kind: RegionKind) -> &mut Region {
        match kind {
            RegionKind::Hero => &mut self.hero,
            RegionKind::Main => &mut self.main,
        }
    }

    fn record(&mut self, src: String) {
        self.hero.offer(&src);
        self.main.offer(&src);
        self.images.push(src);
    }
}

/// Compiled heuristic.
#[derive(Debug, Clone)]
pub struct LcpHeuristic {
    container_markers: Vec<String>,
    hero_images: Vec<String>,
    max_candidates: usize,
}

impl LcpHeuristic {
    pub fn from_config(config: &RewriteConfig) -> Self {
        Self {
            container_markers: config.hero_containers.clone(),
            hero_images: config.hero_images.clone(),
            max_candidates: config.max_priority_images,
        }
    }

    fn region_kinds(&self, el: &Element<'_, '_>) -> Vec<RegionKind> {
        let tag = el.tag_name();
        let mut kinds = Vec::new();
        if CONTAINER_TAGS.contains(&tag.as_str()) {
            let marked = ["class", "id"].iter().filter_map(|a| el.get_attribute(a)).any(|value| {
                self.container_markers
                    .iter()
                    .any(|m| value.contains(m.as_str()))
            });
            if marked {
                kinds.push(RegionKind::Hero);
            }
        }
        if tag == "main" {
            kinds.push(RegionKind::Main);
        }
        kinds
    }

    /// Collect image sources and container extents.
    ///
    /// Only real `<img>` elements count: markup inside scripts, styles and
    /// comments is never seen.
    pub fn scan(&self, html: &str) -> Result<ImageScan, RewritingError> {
        let scan = Rc::new(RefCell::new(ImageScan::default()));

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("*", |el| {
                        for kind in self.region_kinds(el) {
                            if !scan.borrow_mut().region(kind).open() {
                                continue;
                            }
                            let closing = Rc::clone(&scan);
                            let closes = on_end_tag(el, move |_| {
                                closing.borrow_mut().region(kind).close();
                                Ok(())
                            });
                            if !closes {
                                scan.borrow_mut().region(kind).close();
                            }
                        }
                        Ok(())
                    }),
                    element!("img", |el| {
                        if let Some(src) = image_source(el) {
                            scan.borrow_mut().record(src);
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

        Ok(scan.take())
    }

    /// Image sources in priority order, deduplicated, at most `max_candidates`.
    pub fn candidates(&self, scan: &ImageScan) -> Vec<String> {
        let mut ordered = Vec::new();

        // 1. Container image.
        ordered.extend(
            scan.hero
                .first_image
                .clone()
                .or_else(|| scan.main.first_image.clone()),
        );

        // 2. Allowlisted hero filenames.
        for src in &scan.images {
            if self.hero_images.iter().any(|h| src.contains(h.as_str())) {
                ordered.push(src.clone());
            }
        }

        // 3. Leading images.
        ordered.extend(scan.images.iter().take(POSITIONAL_CANDIDATES).cloned());

        let mut seen = HashSet::new();
        ordered.retain(|src| seen.insert(src.clone()));
        ordered.truncate(self.max_candidates);
        ordered
    }
}

/// Annotate one `<img>`: the first occurrence of a pending candidate is made
/// eager and high priority, the rest lazy unless they declare a strategy.
pub fn annotate(el: &mut Element<'_, '_>, pending: &mut HashSet<String>) -> HandlerResult {
    match image_source(el) {
        Some(src) if pending.remove(&src) => prioritize(el)?,
        _ if el.has_attribute("loading") => {}
        _ => el.set_attribute("loading", "lazy")?,
    }
    Ok(())
}

/// `src` of an image, ignoring inline placeholders.
fn image_source(el: &Element<'_, '_>) -> Option<String> {
    el.get_attribute("src")
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
}

fn prioritize(el: &mut Element<'_, '_>) -> HandlerResult {
    if !el.has_attribute("fetchpriority") {
        el.set_attribute("fetchpriority", "high")?;
    }
    let eager = el
        .get_attribute("loading")
        .map_or(true, |v| v.eq_ignore_ascii_case("lazy"));
    if eager {
        el.set_attribute("loading", "eager")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristic(hero_images: &[&str]) -> LcpHeuristic {
        let config = RewriteConfig {
            hero_images: hero_images.iter().map(|s| s.to_string()).collect(),
            ..RewriteConfig::default()
        };
        LcpHeuristic::from_config(&config)
    }

    fn candidates(lcp: &LcpHeuristic, html: &str) -> Vec<String> {
        lcp.candidates(&lcp.scan(html).unwrap())
    }

    const PAGE: &str = concat!(
        r#"<body><header><img src="/a.jpg"><img src="/b.jpg"></header>"#,
        r#"<section class="elementor-section hero-banner"><img src="/hero.jpg" loading="lazy"></section>"#,
        r#"<img src="/c.jpg"><img src="/d.jpg" loading="eager"></body>"#
    );

    #[test]
    fn test_container_image_comes_first() {
        assert_eq!(candidates(&heuristic(&[]), PAGE), ["/hero.jpg", "/a.jpg", "/b.jpg"]);
    }

    #[test]
    fn test_container_search_ends_with_the_container() {
        let html = concat!(
            r#"<header><img src="/logo.png"></header>"#,
            r#"<div class="hero"><div><h1>Welcome</h1></div></div>"#,
            r#"<img src="/x.jpg"><img src="/y.jpg">"#
        );
        let lcp = LcpHeuristic {
            max_candidates: 1,
            ..heuristic(&[])
        };
        assert_eq!(candidates(&lcp, html), ["/logo.png"]);
    }

    #[test]
    fn test_main_is_the_fallback_container() {
        let html = r#"<img src="/logo.png"><img src="/icon.png"><main><p>x</p><img src="/post.jpg"></main>"#;
        assert_eq!(
            candidates(&heuristic(&[]), html),
            ["/post.jpg", "/logo.png", "/icon.png"]
        );
    }

    #[test]
    fn test_only_the_first_hero_container_counts() {
        let html = concat!(
            r#"<div class="hero"></div>"#,
            r#"<img src="/1.jpg"><img src="/2.jpg">"#,
            r#"<div class="hero"><img src="/late.jpg"></div>"#
        );
        assert_eq!(candidates(&heuristic(&[]), html), ["/1.jpg", "/2.jpg"]);
    }

    #[test]
    fn test_allowlist_and_limit() {
        let html = r#"<img src="/1.jpg"><img src="/2.jpg"><img src="/banner-home.jpg"><img src="/banner-about.jpg">"#;
        let lcp = LcpHeuristic {
            max_candidates: 3,
            ..heuristic(&["banner-"])
        };
        assert_eq!(candidates(&lcp, html), ["/banner-home.jpg", "/banner-about.jpg", "/1.jpg"]);
    }

    #[test]
    fn test_placeholders_are_not_candidates() {
        let html = r#"<img src="data:image/gif;base64,R0lGOD"><img src="/real.jpg">"#;
        assert_eq!(candidates(&heuristic(&[]), html), ["/real.jpg"]);
    }

    #[test]
    fn test_markup_in_scripts_and_comments_is_not_an_image() {
        let html = concat!(
            r#"<script>var tpl = "<img src='/tpl.jpg'>";</script>"#,
            r#"<!-- <img src="/old.jpg"> -->"#,
            r#"<style>.x{background:url("<img src='/css.jpg'>")}</style>"#,
            r#"<img src="/a.jpg"><img src="/b.jpg">"#
        );
        assert_eq!(candidates(&heuristic(&[]), html), ["/a.jpg", "/b.jpg"]);
    }
}
