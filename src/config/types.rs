use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Sumi-Frontier
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    /// URLs handed to the scheduler when a crawl starts
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Scheduler behavior: what the built-in handler pipeline lets through
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// URL schemes that may be admitted
    #[serde(rename = "allowed-schemes", default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Domain patterns that may be admitted (empty means any domain)
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Domain patterns that are always dropped
    #[serde(rename = "denied-domains", default)]
    pub denied_domains: Vec<String>,

    /// Remove utm_* and similar tracking parameters before admission
    #[serde(rename = "strip-tracking-params", default = "default_true")]
    pub strip_tracking_params: bool,

    /// Headers added to every request that does not already carry them
    #[serde(rename = "default-headers", default)]
    pub default_headers: BTreeMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            allowed_domains: Vec::new(),
            denied_domains: Vec::new(),
            strip_tracking_params: true,
            default_headers: BTreeMap::new(),
        }
    }
}

/// Fetcher behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Number of concurrent fetch workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause each worker takes before dispatching a request (milliseconds)
    #[serde(rename = "delay-ms", default)]
    pub delay_ms: u64,

    /// Retries allowed per request after the first attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout for requests that do not set one (milliseconds)
    #[serde(rename = "default-timeout-ms", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Backoff before the first retry (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on any single backoff (milliseconds)
    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl FetcherConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            delay_ms: 0,
            max_retries: default_max_retries(),
            default_timeout_ms: default_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}
