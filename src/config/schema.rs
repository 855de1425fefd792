//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge optimizer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Origin server the edge sits in front of.
    pub origin: OriginConfig,

    /// Edge cache store settings.
    pub cache: CacheConfig,

    /// Cache lifetimes per resource tier.
    pub policy: PolicyConfig,

    /// Request classification rules.
    pub classify: ClassifyConfig,

    /// HTML rewrite rules.
    pub rewrite: RewriteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Scheme visitors use to reach the site; part of every cache key.
    pub public_scheme: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            public_scheme: "https".to_string(),
        }
    }
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the edge cache. When disabled every request misses.
    pub enabled: bool,

    /// Maximum number of stored responses.
    pub max_entries: usize,

    /// Largest body (in bytes) that will be buffered and stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_body_bytes: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Cache lifetimes, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Images and fonts (immutable tier).
    pub immutable_max_age: u64,

    /// Stylesheets and scripts.
    pub text_asset_max_age: u64,

    /// Any other static extension.
    pub default_asset_max_age: u64,

    /// Browser lifetime of HTML documents.
    pub html_max_age: u64,

    /// Shared-cache lifetime of HTML documents (`s-maxage` / CDN).
    pub html_shared_max_age: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            immutable_max_age: 31_536_000, // 1 year
            text_asset_max_age: 2_592_000, // 30 days
            default_asset_max_age: 86_400,
            html_max_age: 3_600,
            html_shared_max_age: 86_400,
        }
    }
}

/// Request classification rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Path prefixes that are never cached nor rewritten.
    pub admin_prefixes: Vec<String>,

    /// Plugin/theme directories whose HTML fragments are left untouched.
    pub extension_dirs: Vec<String>,

    /// Cookie name prefix that marks a logged-in visitor.
    pub session_cookie: String,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            admin_prefixes: strings(&[
                "/wp-admin",
                "/wp-login.php",
                "/wp-cron.php",
                "/xmlrpc.php",
                "/wp-json",
                "/wp-includes",
            ]),
            extension_dirs: strings(&["/wp-content/plugins/", "/wp-content/themes/"]),
            session_cookie: "wordpress_logged_in".to_string(),
        }
    }
}

/// Which rewrite passes run over HTML candidates.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Streaming tag pass only.
    Stream,
    /// Whole-body pass only.
    Body,
    /// Streaming pass followed by the whole-body pass.
    #[default]
    Both,
}

/// A resource hint injected after the opening head tag.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HintConfig {
    /// `preconnect`, `dns-prefetch` or `preload`.
    pub rel: String,
    pub href: String,
    /// `as` attribute, only meaningful for preloads.
    #[serde(default)]
    pub as_type: Option<String>,
}

/// HTML rewrite rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub mode: RewriteMode,

    /// Elements removed for every visitor.
    pub remove: Vec<String>,

    /// Elements removed only for anonymous visitors (admin decoration).
    pub remove_anonymous: Vec<String>,

    /// Style ids containing any of these are never merged.
    pub protected_style_ids: Vec<String>,

    /// Inline scripts containing any of these run eagerly (no `defer`).
    pub eager_script_markers: Vec<String>,

    /// Stylesheet/script URL fragments worth a preload hint.
    pub critical_prefixes: Vec<String>,

    /// Connection hints injected after `<head>`.
    pub resource_hints: Vec<HintConfig>,

    /// Font files preloaded right after the resource hints.
    pub font_preloads: Vec<String>,

    /// Host serving font stylesheets.
    pub font_stylesheet_host: String,

    /// Regex fragments of heavy stylesheets loaded asynchronously.
    pub deferred_stylesheets: Vec<String>,

    /// Script URL fragments that receive `defer`.
    pub deferred_scripts: Vec<String>,

    /// Class/id fragments identifying hero or main-content containers.
    pub hero_containers: Vec<String>,

    /// Image filename fragments known to be hero images.
    pub hero_images: Vec<String>,

    /// Upper bound on high-priority images per document.
    pub max_priority_images: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            mode: RewriteMode::Both,
            remove: strings(&[
                r#"script[id="freeze-table-template"]"#,
                r#"script[id="tmpl-wcpt-product-form-loading-modal"]"#,
                r#"script[id="tmpl-wcpt-cart-checkbox-trigger"]"#,
                r#"link[href*="//code.jquery.com"][rel="dns-prefetch"]"#,
            ]),
            remove_anonymous: strings(&[
                r#"link[id="wpcode-admin-bar-css-css"]"#,
                r#"link[id="dashicons-css"]"#,
                r#"link[id="admin-bar-css"]"#,
            ]),
            protected_style_ids: strings(&["wp-fonts"]),
            eager_script_markers: strings(&["gtm.js"]),
            critical_prefixes: strings(&[
                "/wp-content/themes/",
                "/wp-content/plugins/elementor/",
            ]),
            resource_hints: vec![
                hint("preconnect", "https://fonts.googleapis.com"),
                hint("preconnect", "https://fonts.gstatic.com"),
                hint("dns-prefetch", "https://www.googletagmanager.com"),
                hint("dns-prefetch", "https://www.google-analytics.com"),
            ],
            font_preloads: strings(&[
                "/wp-content/themes/hello-elementor/assets/fonts/roboto-v30-latin-regular.woff2",
                "/wp-content/themes/hello-elementor/assets/fonts/roboto-v30-latin-700.woff2",
            ]),
            font_stylesheet_host: "fonts.googleapis.com".to_string(),
            deferred_stylesheets: strings(&[
                r"/wp-content/uploads/elementor/css/post-\d+\.css",
                r"/wp-content/plugins/woocommerce/[^'\x22]*wc-blocks[^'\x22]*\.css",
            ]),
            deferred_scripts: strings(&["jquery-migrate", "jquery/ui/"]),
            hero_containers: strings(&["hero", "elementor-widget-image", "wp-block-cover", "site-main"]),
            hero_images: Vec::new(),
            max_priority_images: 5,
        }
    }
}

/// Timeout configuration for the host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for pending cache writes on shutdown, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            drain_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn hint(rel: &str, href: &str) -> HintConfig {
    HintConfig {
        rel: rel.to_string(),
        href: href.to_string(),
        as_type: None,
    }
}
