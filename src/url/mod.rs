//! URL handling module for Sumi-Frontier
//!
//! This module provides URL canonicalization for fingerprints, tracking
//! parameter removal, host extraction and wildcard domain matching.

mod canonicalize;
mod matcher;

use url::Url;

pub use canonicalize::{canonicalize, parse_absolute, strip_tracking_params};
pub use matcher::{matches_any, matches_wildcard};

/// Extracts the lowercase host from a URL
///
/// ```
/// use url::Url;
/// use sumi_frontier::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
