/// Checks if a host matches a domain pattern
///
/// `"example.com"` matches only that host. `"*.example.com"` matches the
/// bare domain and any subdomain at any depth. Comparison ignores ASCII case.
///
/// # Examples
///
/// ```
/// use sumi_frontier::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "Example.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{}", base)),
        None => host == pattern,
    }
}

/// Returns true if any pattern matches the host
pub fn matches_any(patterns: &[String], host: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p, host))
}
