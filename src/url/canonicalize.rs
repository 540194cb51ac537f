use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking data
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_eid", "mc_cid", "_ga", "yclid",
];

/// Parses an absolute URL with a host
///
/// Relative references and URLs without a host are rejected. The scheme is
/// not checked here; the scheme filter and the transport handle that.
pub fn parse_absolute(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.cannot_be_a_base() {
        return Err(UrlError::Malformed(format!("Not a hierarchical URL: {}", url)));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}

/// Produces the canonical form of a URL used for deduplication
///
/// # Canonicalization Steps
///
/// 1. Scheme and host are lowercased, default ports dropped (done by the parser)
/// 2. Path dot segments and repeated slashes are removed
/// 3. Trailing slash is removed (except for the root path)
/// 4. Fragment is removed
/// 5. Query parameters are sorted by key, then value
/// 6. An empty query string is removed
///
/// # Examples
///
/// ```
/// use sumi_frontier::url::canonicalize;
/// use url::Url;
///
/// let url = Url::parse("HTTP://Example.COM/a/b/?z=1&a=2#top").unwrap();
/// assert_eq!(canonicalize(&url).as_str(), "http://example.com/a/b?a=2&z=1");
/// ```
pub fn canonicalize(url: &Url) -> Url {
    let mut canonical = url.clone();

    let path = normalize_path(canonical.path());
    canonical.set_path(&path);
    canonical.set_fragment(None);

    if canonical.query().is_some() {
        let mut params: Vec<(String, String)> = canonical
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();
        set_query_pairs(&mut canonical, &params);
    }

    canonical
}

/// Removes tracking query parameters in place
///
/// Returns true if anything was removed.
pub fn strip_tracking_params(url: &mut Url) -> bool {
    if url.query().is_none() {
        return false;
    }

    let original: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<(String, String)> = original
        .iter()
        .filter(|(key, _)| !is_tracking_param(key))
        .cloned()
        .collect();

    if kept.len() == original.len() {
        return false;
    }

    set_query_pairs(url, &kept);
    true
}

fn set_query_pairs(url: &mut Url, params: &[(String, String)]) {
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }
}

/// Removes dot segments, empty segments and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
