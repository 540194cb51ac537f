use crate::model::{Headers, Request};
use crate::FetchError;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::Duration;
use url::Url;

/// What a transport hands back for one HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// URL after redirects
    pub final_url: Url,
}

/// Terminal outcome of a request, delivered once to the response sink
#[derive(Debug, Clone)]
pub struct Response {
    /// The attempt that produced this response
    pub request: Request,
    /// HTTP status, or 0 when no response was received
    pub status_code: u16,
    pub ok: bool,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub final_url: Url,
    /// Duration of the final attempt
    pub elapsed: Duration,
    pub error: Option<FetchError>,
}

impl Response {
    /// Builds a response from a completed exchange
    ///
    /// Statuses of 400 and above carry an `HttpStatus` error.
    pub fn from_raw(request: Request, raw: RawResponse, elapsed: Duration) -> Self {
        let error = (raw.status >= 400).then_some(FetchError::HttpStatus { status: raw.status });
        Self {
            request,
            status_code: raw.status,
            ok: (200..300).contains(&raw.status),
            headers: raw.headers,
            body: raw.body,
            final_url: raw.final_url,
            elapsed,
            error,
        }
    }

    /// Builds a failed response, keeping the last exchange if there was one
    pub fn failure(
        request: Request,
        error: FetchError,
        raw: Option<RawResponse>,
        elapsed: Duration,
    ) -> Self {
        let (status_code, headers, body, final_url) = match raw {
            Some(raw) => (raw.status, raw.headers, raw.body, raw.final_url),
            None => (0, Headers::new(), Vec::new(), request.url.clone()),
        };

        Self {
            request,
            status_code,
            ok: false,
            headers,
            body,
            final_url,
            elapsed,
            error: Some(error),
        }
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Total number of attempts made for the request
    pub fn attempts(&self) -> u32 {
        self.request.attempt()
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }
}
