//! Header policy table.
//!
//! Maps a resource to the lifetimes written into its response headers.
//! Browsers revalidate HTML often; the edge may hold it longer through
//! `s-maxage` and `CDN-Cache-Control`.

use std::time::{Duration, SystemTime};

use crate::classify::{AssetKind, Classification};
use crate::config::PolicyConfig;

/// Cache lifetimes and headers for one class of response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Browser lifetime in seconds. `None` means the response must not be stored.
    pub max_age: Option<u64>,
    /// Shared-cache lifetime, when it differs from `max_age`.
    pub shared_max_age: Option<u64>,
    pub immutable: bool,
    /// Request header downstream caches must vary on.
    pub vary: &'static str,
}

impl CachePolicy {
    /// Logged-in visitors: nothing is stored anywhere.
    pub fn private() -> Self {
        Self {
            max_age: None,
            shared_max_age: None,
            immutable: false,
            vary: "Cookie",
        }
    }

    /// Value of `Cache-Control`.
    pub fn cache_control(&self) -> String {
        let Some(max_age) = self.max_age else {
            return "private, no-store".to_string();
        };
        let mut value = format!("public, max-age={max_age}");
        if let Some(shared) = self.shared_max_age {
            value.push_str(&format!(", s-maxage={shared}"));
        }
        if self.immutable {
            value.push_str(", immutable");
        }
        value
    }

    /// Value of `CDN-Cache-Control`: the edge horizon alone.
    pub fn cdn_cache_control(&self) -> String {
        match self.shared_max_age.or(self.max_age) {
            Some(age) => format!("public, max-age={age}"),
            None => "no-store".to_string(),
        }
    }

    /// Value of `Expires`, aligned with the browser lifetime.
    pub fn expires(&self, now: SystemTime) -> Option<String> {
        let max_age = self.max_age?;
        Some(httpdate::fmt_http_date(now + Duration::from_secs(max_age)))
    }
}

/// Lifetimes per resource tier.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    config: PolicyConfig,
}

impl PolicyTable {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Policy for a static asset extension.
    pub fn for_extension(&self, ext: &str) -> CachePolicy {
        let (max_age, immutable) = match AssetKind::from_extension(ext) {
            Some(kind) if kind.is_immutable() => (self.config.immutable_max_age, true),
            Some(AssetKind::Style | AssetKind::Script) => (self.config.text_asset_max_age, false),
            _ => (self.config.default_asset_max_age, false),
        };
        CachePolicy {
            max_age: Some(max_age),
            shared_max_age: None,
            immutable,
            vary: "Accept-Encoding",
        }
    }

    /// Policy for rewritten HTML documents served to anonymous visitors.
    pub fn for_html(&self) -> CachePolicy {
        CachePolicy {
            max_age: Some(self.config.html_max_age),
            shared_max_age: Some(self.config.html_shared_max_age),
            immutable: false,
            vary: "Cookie",
        }
    }

    /// Policy for a classification; passthrough classes have none.
    pub fn for_class(&self, class: &Classification) -> Option<CachePolicy> {
        match class {
            Classification::ImmutableAsset(ext) | Classification::MutableAsset(ext) => {
                Some(self.for_extension(ext))
            }
            Classification::HtmlCandidate => Some(self.for_html()),
            Classification::AdminExcluded | Classification::NonHtmlPassthrough => None,
        }
    }
}
