use crate::config::types::{Config, FetcherConfig, SchedulerConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

const MAX_CONCURRENCY: usize = 100;
const MAX_RETRIES: u32 = 10;
const SUPPORTED_SCHEMES: &[&str] = &["http", "https"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates scheduler configuration
fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.allowed_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "allowed_schemes cannot be empty".to_string(),
        ));
    }

    for scheme in &config.allowed_schemes {
        if !SUPPORTED_SCHEMES.contains(&scheme.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "allowed_schemes may only contain http and https, got '{}'",
                scheme
            )));
        }
    }

    for pattern in config.allowed_domains.iter().chain(&config.denied_domains) {
        validate_domain_pattern(pattern)?;
    }

    for name in config.default_headers.keys() {
        if name.is_empty() || !name.chars().all(is_header_name_char) {
            return Err(ConfigError::Validation(format!(
                "Invalid header name in default_headers: '{}'",
                name
            )));
        }
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if config.default_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "default_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.backoff_base_ms == 0 {
        return Err(ConfigError::Validation(
            "backoff_base_ms must be > 0".to_string(),
        ));
    }

    if config.backoff_cap_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_cap_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_cap_ms, config.backoff_base_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Seeds must be absolute http(s) URLs
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    validate_domain_string(pattern.strip_prefix("*.").unwrap_or(pattern))
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::Validation(format!("Invalid email format: '{}'", email));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

/// RFC 7230 token characters
fn is_header_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}
