//! Resource hints: early connection and preload declarations.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::rewrite::markup::escape_attr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintKind {
    Preconnect,
    DnsPrefetch,
    Preload,
}

impl HintKind {
    pub fn rel(self) -> &'static str {
        match self {
            Self::Preconnect => "preconnect",
            Self::DnsPrefetch => "dns-prefetch",
            Self::Preload => "preload",
        }
    }
}

impl FromStr for HintKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preconnect" => Ok(Self::Preconnect),
            "dns-prefetch" => Ok(Self::DnsPrefetch),
            "preload" => Ok(Self::Preload),
            other => Err(format!("unsupported resource hint '{other}'")),
        }
    }
}

/// A `<link>` telling the browser to start a network action early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHint {
    pub kind: HintKind,
    pub href: String,
    /// The `as` destination of a preload.
    pub as_type: Option<String>,
}

impl ResourceHint {
    pub fn new(kind: HintKind, href: impl Into<String>) -> Self {
        Self {
            kind,
            href: href.into(),
            as_type: None,
        }
    }

    pub fn preload(href: impl Into<String>, as_type: impl Into<String>) -> Self {
        Self {
            kind: HintKind::Preload,
            href: href.into(),
            as_type: Some(as_type.into()),
        }
    }
}

impl fmt::Display for ResourceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#"<link rel="{}" href="{}""#, self.kind.rel(), escape_attr(&self.href))?;
        if let Some(as_type) = &self.as_type {
            write!(f, r#" as="{}""#, escape_attr(as_type))?;
        }
        // Only fetches need a CORS mode; connection hints do not.
        if self.kind == HintKind::Preload {
            f.write_str(" crossorigin")?;
        }
        f.write_str(">")
    }
}

/// Ordered hints, unique by href.
#[derive(Debug, Clone, Default)]
pub struct HintList {
    hints: Vec<ResourceHint>,
    seen: HashSet<String>,
    /// Hrefs the document already declares, wherever they appear.
    present: HashSet<String>,
}

impl HintList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hint. Returns false when its href was already seen.
    pub fn push(&mut self, hint: ResourceHint) -> bool {
        if self.present.contains(&hint.href) || !self.seen.insert(hint.href.clone()) {
            return false;
        }
        self.hints.push(hint);
        true
    }

    /// Mark an href as already declared by the document itself.
    /// Hints already queued for it are dropped when drained.
    pub fn mark_present(&mut self, href: impl Into<String>) {
        self.present.insert(href.into());
    }

    /// Pending hints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceHint> {
        self.hints.iter().filter(|h| !self.present.contains(&h.href))
    }

    /// Remove and return pending hints in insertion order.
    pub fn drain(&mut self) -> Vec<ResourceHint> {
        let present = &self.present;
        let mut hints = std::mem::take(&mut self.hints);
        hints.retain(|h| !present.contains(&h.href));
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(
            ResourceHint::preload("/t/style.css", "style").to_string(),
            r#"<link rel="preload" href="/t/style.css" as="style" crossorigin>"#
        );
        assert_eq!(
            ResourceHint::new(HintKind::Preconnect, "https://fonts.gstatic.com").to_string(),
            r#"<link rel="preconnect" href="https://fonts.gstatic.com">"#
        );
    }

    #[test]
    fn test_dedup_by_href_keeps_order() {
        let mut list = HintList::new();
        assert!(list.push(ResourceHint::preload("/b.css", "style")));
        assert!(list.push(ResourceHint::preload("/a.js", "script")));
        assert!(!list.push(ResourceHint::preload("/b.css", "style")));

        list.mark_present("/c.css");
        assert!(!list.push(ResourceHint::preload("/c.css", "style")));

        // Declared by the document after the hint was queued.
        assert!(list.push(ResourceHint::preload("/d.css", "style")));
        list.mark_present("/d.css");

        let hrefs: Vec<_> = list.iter().map(|h| h.href.as_str()).collect();
        assert_eq!(hrefs, ["/b.css", "/a.js"]);
        assert_eq!(list.drain().len(), 2);
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("DNS-Prefetch".parse::<HintKind>(), Ok(HintKind::DnsPrefetch));
        assert!("prerender".parse::<HintKind>().is_err());
    }
}
