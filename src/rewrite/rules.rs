//! Element removal rules.
//!
//! Rules use a small selector syntax: a tag name followed by attribute
//! conditions, `[attr="value"]` for equality and `[attr*="value"]` for
//! substring, e.g. `link[href*="//code.jquery.com"][rel="dns-prefetch"]`.
//! All conditions of a rule must hold.

use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

use lol_html::html_content::Element;

static SELECTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([a-zA-Z][a-zA-Z0-9-]*)((?:\[[a-zA-Z-]+\*?="[^"]*"\])*)$"#).expect("Invalid regex")
});

static CONDITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[([a-zA-Z-]+)(\*?)="([^"]*)"\]"#).expect("Invalid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid selector '{0}'")]
    Syntax(String),

    #[error("selector '{selector}' uses unsupported attribute '{attribute}'")]
    UnsupportedAttribute { selector: String, attribute: String },
}

/// Attributes a rule may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureField {
    Id,
    Src,
    Href,
    Rel,
}

impl FromStr for SignatureField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "src" => Ok(Self::Src),
            "href" => Ok(Self::Href),
            "rel" => Ok(Self::Rel),
            _ => Err(()),
        }
    }
}

/// Identity of an element: tag name plus the attributes rules can test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSignature {
    pub tag: String,
    pub id: Option<String>,
    pub src: Option<String>,
    pub href: Option<String>,
    pub rel: Option<String>,
}

impl ElementSignature {
    pub fn of(el: &Element<'_, '_>) -> Self {
        Self {
            tag: el.tag_name(),
            id: el.get_attribute("id"),
            src: el.get_attribute("src"),
            href: el.get_attribute("href"),
            rel: el.get_attribute("rel"),
        }
    }

    fn field(&self, field: SignatureField) -> Option<&str> {
        match field {
            SignatureField::Id => self.id.as_deref(),
            SignatureField::Src => self.src.as_deref(),
            SignatureField::Href => self.href.as_deref(),
            SignatureField::Rel => self.rel.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Condition {
    field: SignatureField,
    contains: bool,
    value: String,
}

impl Condition {
    fn holds(&self, signature: &ElementSignature) -> bool {
        match signature.field(self.field) {
            Some(actual) if self.contains => actual.contains(&self.value),
            Some(actual) if self.field == SignatureField::Rel => actual.eq_ignore_ascii_case(&self.value),
            Some(actual) => actual == self.value,
            None => false,
        }
    }
}

/// One parsed removal selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRule {
    tag: String,
    conditions: Vec<Condition>,
}

impl ElementRule {
    pub fn parse(selector: &str) -> Result<Self, SelectorError> {
        let selector = selector.trim();
        let caps = SELECTOR
            .captures(selector)
            .ok_or_else(|| SelectorError::Syntax(selector.to_string()))?;

        let conditions = CONDITION
            .captures_iter(&caps[2])
            .map(|c| {
                let field = c[1].parse::<SignatureField>().map_err(|_| {
                    SelectorError::UnsupportedAttribute {
                        selector: selector.to_string(),
                        attribute: c[1].to_string(),
                    }
                })?;
                Ok(Condition {
                    field,
                    contains: &c[2] == "*",
                    value: c[3].to_string(),
                })
            })
            .collect::<Result<Vec<_>, SelectorError>>()?;

        Ok(Self {
            tag: caps[1].to_ascii_lowercase(),
            conditions,
        })
    }

    pub fn matches(&self, signature: &ElementSignature) -> bool {
        self.tag == signature.tag && self.conditions.iter().all(|c| c.holds(signature))
    }
}

/// Parse a list of selectors, stopping at the first invalid one.
pub fn parse_rules(selectors: &[String]) -> Result<Vec<ElementRule>, SelectorError> {
    selectors.iter().map(|s| ElementRule::parse(s)).collect()
}

/// The rules in force for one request. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RemovalSet {
    rules: Vec<ElementRule>,
}

impl RemovalSet {
    /// Base rules always apply; admin decoration rules only for anonymous visitors.
    pub fn build(always: &[ElementRule], anonymous_only: &[ElementRule], authenticated: bool) -> Self {
        let mut rules = always.to_vec();
        if !authenticated {
            rules.extend_from_slice(anonymous_only);
        }
        Self { rules }
    }

    pub fn matches(&self, signature: &ElementSignature) -> bool {
        self.rules.iter().any(|r| r.matches(signature))
    }
}
