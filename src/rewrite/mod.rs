//! HTML rewrite pipeline.
//!
//! # Responsibilities
//! - Run the streaming head pass and/or the whole-body pass over an HTML document
//! - Keep per-request state in a [`RewriteContext`] discarded with the response
//!
//! # Design Decisions
//! - Both passes run on lol_html; rules are compiled once per configuration
//!   and shared by all requests
//! - Malformed markup is copied through rather than rejected
//! - Both passes are idempotent, so rewriting already-rewritten output is safe

pub mod body;
pub mod context;
pub mod hints;
pub mod lcp;
pub mod markup;
pub mod rules;
pub mod stream;

use std::time::Instant;

use thiserror::Error;

use crate::config::{RewriteConfig, RewriteMode};
use crate::observability::metrics;

pub use body::BodyRewriter;
pub use context::RewriteContext;
pub use rules::SelectorError;
pub use stream::StreamRules;

/// Errors compiling rewrite rules from configuration.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("rewrite failed: {0}")]
    Html(#[from] lol_html::errors::RewritingError),
}

/// Compiled rewrite rules for one configuration generation.
#[derive(Debug, Clone)]
pub struct HtmlRewriter {
    mode: RewriteMode,
    stream: StreamRules,
    body: BodyRewriter,
}

impl HtmlRewriter {
    pub fn from_config(config: &RewriteConfig) -> Result<Self, RewriteError> {
        Ok(Self {
            mode: config.mode,
            stream: StreamRules::from_config(config)?,
            body: BodyRewriter::from_config(config)?,
        })
    }

    /// Rewrite one document for a visitor.
    pub fn rewrite(&self, html: &str, authenticated: bool) -> Result<String, RewriteError> {
        let start = Instant::now();
        let mut ctx = RewriteContext::new(authenticated);

        let out = match self.mode {
            RewriteMode::Stream => stream::optimize_head(html, &self.stream, &mut ctx)?,
            RewriteMode::Body => self.body.rewrite(html, &ctx)?,
            RewriteMode::Both => {
                let head = stream::optimize_head(html, &self.stream, &mut ctx)?;
                self.body.rewrite(&head, &ctx)?
            }
        };

        metrics::record_rewrite(mode_label(self.mode), start);
        tracing::trace!(
            mode = mode_label(self.mode),
            input_bytes = html.len(),
            output_bytes = out.len(),
            "Rewrote document"
        );
        Ok(out)
    }
}

fn mode_label(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::Stream => "stream",
        RewriteMode::Body => "body",
        RewriteMode::Both => "both",
    }
}
