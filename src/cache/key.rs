//! Cache key derivation.

use std::fmt;
use url::Url;

/// A normalized URL identifying one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Assets keep their query string, which carries cache-busting versions.
    pub fn for_asset(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    /// Documents drop the query string: `/page?a=1` and `/page?b=2` share an entry.
    pub fn for_document(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_query(None);
        url.set_fragment(None);
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The URL a visitor requested, as seen from the public side of the edge.
pub fn public_url(scheme: &str, host: &str, path_and_query: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{scheme}://{host}{path_and_query}"))
}
