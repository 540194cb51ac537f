//! HTTP transport
//!
//! The fetcher talks to the network through the `Transport` trait. The
//! production implementation wraps a shared reqwest `Client`.

use crate::config::UserAgentConfig;
use crate::model::{Headers, RawResponse, Request};
use crate::FetchError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Redirect hops followed before the attempt fails
const MAX_REDIRECTS: usize = 10;

/// Performs one HTTP exchange for a request
///
/// Implementations return `Ok` for any completed exchange, whatever the
/// status. Only failures to obtain a response are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<RawResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_frontier::config::UserAgentConfig;
/// use sumi_frontier::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiFrontier".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Per-attempt timeouts are set on each request
    Client::builder()
        .user_agent(config.user_agent_string())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Transport backed by reqwest
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, FetchError> {
        let scheme = request.url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(FetchError::UnsupportedScheme(scheme.to_string()));
        }

        let timeout = request.timeout();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(timeout);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
            final_url,
        })
    }
}

/// Maps a reqwest failure onto the fetch error taxonomy
fn classify_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else if error.is_builder() {
        FetchError::InvalidRequest(error.to_string())
    } else if error.is_redirect() {
        FetchError::Redirect(error.to_string())
    } else if error.is_connect() {
        FetchError::Connect(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}
