//! Sumi-Frontier: the scheduling and concurrent-fetch core of a crawler
//!
//! This crate accepts a stream of freshly discovered requests, filters,
//! deduplicates and prioritizes them, then fetches the admitted requests
//! with a bounded pool of workers that retry transient failures with
//! exponential backoff.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Sumi-Frontier operations
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler is closed, request for {url} rejected")]
    SchedulerClosed { url: String },

    #[error("Concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Failure of a single fetch attempt
///
/// The variants split into two classes. Retryable failures (timeouts,
/// connection and transfer errors, 5xx and 429 statuses) put the request
/// back in the ready queue while retries remain. Everything else is
/// terminal and is reported to the consumer as a failed response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("Redirect error: {0}")]
    Redirect(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Network(_) | Self::Body(_) => true,
            Self::HttpStatus { status } => is_retryable_status(*status),
            Self::Redirect(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedScheme(_)
            | Self::RetriesExhausted { .. } => false,
        }
    }
}

/// 429 and every 5xx status may clear up on its own
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Result type alias for Sumi-Frontier operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, Fetcher, Scheduler, SchedulerHandle};
pub use model::{Fingerprint, Request, Response};
