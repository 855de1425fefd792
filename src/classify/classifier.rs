//! Request classifier.
//!
//! Decides, per request, which processing path applies. Rules in priority
//! order: static extension → asset; admin prefix → excluded; HTML under a
//! plugin/theme directory → excluded; HTML with a 200 status → rewrite
//! candidate; everything else → passthrough.

use axum::http::StatusCode;
use std::fmt;
use url::Url;

use crate::classify::matcher::{path_extension, AnyMatcher, Matcher};
use crate::config::ClassifyConfig;

/// Family of a static file, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Font,
    Style,
    Script,
    Video,
    Document,
}

impl AssetKind {
    /// Map a lowercase extension to its asset family.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let kind = match ext {
            "png" | "jpg" | "jpeg" | "gif" | "ico" | "svg" | "webp" | "avif" | "bmp" => Self::Image,
            "woff" | "woff2" | "ttf" | "eot" | "otf" => Self::Font,
            "css" => Self::Style,
            "js" | "mjs" => Self::Script,
            "mp4" | "webm" | "ogv" | "mov" | "m4v" => Self::Video,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => Self::Document,
            _ => return None,
        };
        Some(kind)
    }

    /// Binary assets whose URL changes when their content does.
    pub fn is_immutable(self) -> bool {
        matches!(self, Self::Image | Self::Font)
    }
}

/// The routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Long-lived binary asset, carrying its extension.
    ImmutableAsset(String),
    /// Text or other asset with a shorter lifetime, carrying its extension.
    MutableAsset(String),
    /// HTML document eligible for rewriting and caching.
    HtmlCandidate,
    /// Administrative surface; never cached, never rewritten.
    AdminExcluded,
    /// Anything else; relayed unchanged.
    NonHtmlPassthrough,
}

impl Classification {
    pub fn is_asset(&self) -> bool {
        matches!(self, Self::ImmutableAsset(_) | Self::MutableAsset(_))
    }

    /// Extension of an asset classification.
    pub fn extension(&self) -> Option<&str> {
        match self {
            Self::ImmutableAsset(ext) | Self::MutableAsset(ext) => Some(ext),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ImmutableAsset(_) => "immutable_asset",
            Self::MutableAsset(_) => "mutable_asset",
            Self::HtmlCandidate => "html",
            Self::AdminExcluded => "admin",
            Self::NonHtmlPassthrough => "passthrough",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.extension() {
            Some(ext) => write!(f, "{}({})", self.label(), ext),
            None => f.write_str(self.label()),
        }
    }
}

/// What the URL alone reveals, before the origin has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
    /// Decided: a static asset.
    Asset(Classification),
    /// Decided: an administrative path.
    Admin,
    /// Pending: depends on the origin's content-type and status.
    Document,
}

/// Compiled classification rules.
#[derive(Debug)]
pub struct Classifier {
    admin: AnyMatcher,
    extension_dirs: AnyMatcher,
}

impl Classifier {
    pub fn from_config(config: &ClassifyConfig) -> Self {
        Self {
            admin: AnyMatcher::prefixes(config.admin_prefixes.iter().cloned()),
            extension_dirs: AnyMatcher::prefixes(config.extension_dirs.iter().cloned()),
        }
    }

    /// Classify by path only (rules a and b).
    pub fn classify_request(&self, path: &str) -> PathClass {
        if let Some(ext) = path_extension(path) {
            if let Some(kind) = AssetKind::from_extension(&ext) {
                let class = if kind.is_immutable() {
                    Classification::ImmutableAsset(ext)
                } else {
                    Classification::MutableAsset(ext)
                };
                return PathClass::Asset(class);
            }
        }

        if self.admin.matches(path) {
            return PathClass::Admin;
        }

        PathClass::Document
    }

    /// Full classification once the origin response is known.
    pub fn classify_response(
        &self,
        path: &str,
        content_type: Option<&str>,
        status: StatusCode,
    ) -> Classification {
        match self.classify_request(path) {
            PathClass::Asset(class) => class,
            PathClass::Admin => Classification::AdminExcluded,
            PathClass::Document => {
                if !content_type.is_some_and(is_html) {
                    Classification::NonHtmlPassthrough
                } else if self.extension_dirs.matches(path) {
                    Classification::AdminExcluded
                } else if status == StatusCode::OK {
                    Classification::HtmlCandidate
                } else {
                    Classification::NonHtmlPassthrough
                }
            }
        }
    }

    /// Classify an absolute URL. Unparseable URLs pass through.
    pub fn classify_url(
        &self,
        url: &str,
        content_type: Option<&str>,
        status: StatusCode,
    ) -> Classification {
        match Url::parse(url) {
            Ok(parsed) => self.classify_response(parsed.path(), content_type, status),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Unparseable URL, passing through");
                Classification::NonHtmlPassthrough
            }
        }
    }
}

/// True when a Content-Type value declares an HTML media type.
pub fn is_html(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "text/html" || media == "application/xhtml+xml"
}
