//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (lifetimes > 0, addresses parse)
//! - Check that rewrite selectors and patterns compile
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::EdgeConfig;
use crate::rewrite::hints::HintKind;
use crate::rewrite::rules::ElementRule;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("origin.public_scheme: expected http or https, got '{0}'")]
    InvalidScheme(String),

    #[error("policy.html_shared_max_age must not be shorter than policy.html_max_age")]
    SharedLifetimeTooShort,

    #[error("{field}: {message}")]
    InvalidSelector { field: &'static str, message: String },

    #[error("rewrite.deferred_stylesheets: invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("rewrite.resource_hints: unsupported rel '{0}'")]
    InvalidHint(String),
}

/// Validate an [`EdgeConfig`], collecting every problem found.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "origin.address", &config.origin.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let scheme = config.origin.public_scheme.as_str();
    if scheme != "http" && scheme != "https" {
        errors.push(ValidationError::InvalidScheme(scheme.to_string()));
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::Zero { field: "cache.max_entries" });
    }
    if config.cache.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "cache.max_body_bytes" });
    }

    let policy = &config.policy;
    for (field, value) in [
        ("policy.immutable_max_age", policy.immutable_max_age),
        ("policy.text_asset_max_age", policy.text_asset_max_age),
        ("policy.default_asset_max_age", policy.default_asset_max_age),
        ("policy.html_max_age", policy.html_max_age),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if policy.html_shared_max_age < policy.html_max_age {
        errors.push(ValidationError::SharedLifetimeTooShort);
    }

    let rewrite = &config.rewrite;
    for (field, selectors) in [
        ("rewrite.remove", &rewrite.remove),
        ("rewrite.remove_anonymous", &rewrite.remove_anonymous),
    ] {
        for selector in selectors {
            if let Err(e) = ElementRule::parse(selector) {
                errors.push(ValidationError::InvalidSelector {
                    field,
                    message: e.to_string(),
                });
            }
        }
    }

    for pattern in &rewrite.deferred_stylesheets {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            });
        }
    }

    for hint in &rewrite.resource_hints {
        if hint.rel.parse::<HintKind>().is_err() {
            errors.push(ValidationError::InvalidHint(hint.rel.clone()));
        }
    }

    if rewrite.max_priority_images == 0 {
        errors.push(ValidationError::Zero { field: "rewrite.max_priority_images" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
