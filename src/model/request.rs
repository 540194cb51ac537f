use crate::model::Fingerprint;
use crate::url::parse_absolute;
use crate::UrlError;
use reqwest::Method;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// Retries allowed when neither the request nor the config says otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-attempt timeout when neither the request nor the config says otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique request identifier
///
/// Retries of a request keep its id, so log lines for every attempt of
/// one resource share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a request remembers about the request that discovered it
///
/// A plain copy taken when the child is created. Holding it never keeps
/// the parent request alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub id: RequestId,
    pub url: Url,
    pub priority: i32,
}

/// Header list that keeps insertion order and compares names case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a header, replacing any existing value in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Sets a header only if it is not present yet; returns true if it was added
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.0.push((name, value.into()));
        true
    }

    /// Appends without replacing, for multi-valued response headers
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A candidate or admitted fetch
///
/// Public fields are what handlers are allowed to rewrite. Lower
/// `priority` values are served earlier.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: Headers,
    pub priority: i32,
    pub referer: Option<Lineage>,
    /// Participates in deduplication when true
    pub unique: bool,
    pub retries_attempted: u32,
    max_retries: Option<u32>,
    timeout: Option<Duration>,
}

impl Request {
    /// Creates a GET request for an absolute URL
    ///
    /// ```
    /// use sumi_frontier::Request;
    ///
    /// let request = Request::new("https://example.com/").unwrap();
    /// assert_eq!(request.priority, 0);
    /// assert!(request.unique);
    /// assert!(Request::new("/relative").is_err());
    /// ```
    pub fn new(url: &str) -> Result<Self, UrlError> {
        Ok(Self::from_url(parse_absolute(url)?))
    }

    pub fn from_url(url: Url) -> Self {
        Self {
            id: RequestId::next(),
            url,
            method: Method::GET,
            headers: Headers::new(),
            priority: 0,
            referer: None,
            unique: true,
            retries_attempted: 0,
            max_retries: None,
            timeout: None,
        }
    }

    /// Creates a request for a link found on this request's page
    ///
    /// Relative links resolve against this request's URL. The child records
    /// this request as its referer and sits one priority level deeper.
    pub fn follow(&self, link: &str) -> Result<Self, UrlError> {
        let url = self
            .url
            .join(link)
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        let url = parse_absolute(url.as_str())?;

        let mut child = Self::from_url(url);
        child.priority = self.priority.saturating_add(1);
        child.referer = Some(self.lineage());
        Ok(child)
    }

    pub fn lineage(&self) -> Lineage {
        Lineage {
            id: self.id,
            url: self.url.clone(),
            priority: self.priority,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_referer(mut self, referer: Lineage) -> Self {
        self.referer = Some(referer);
        self
    }

    /// Opts out of deduplication (polling and pagination requests)
    pub fn non_unique(mut self) -> Self {
        self.unique = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Fills retry and timeout settings the request did not set itself
    pub fn apply_defaults(&mut self, max_retries: u32, timeout: Duration) {
        self.max_retries.get_or_insert(max_retries);
        self.timeout.get_or_insert(timeout);
    }

    /// 1-based number of the attempt this request value represents
    pub fn attempt(&self) -> u32 {
        self.retries_attempted + 1
    }

    pub fn can_retry(&self) -> bool {
        self.retries_attempted < self.max_retries()
    }

    /// Builds the request for the next attempt
    ///
    /// Everything that feeds the fingerprint stays the same.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.retries_attempted += 1;
        next
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.method, &self.url)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
