//! Request handler pipeline
//!
//! Each candidate request passes through an ordered list of handlers before
//! it is scheduled. A handler may rewrite the request (normalize the URL,
//! add headers) or veto it. Handlers never touch the queues.

use crate::config::SchedulerConfig;
use crate::model::Request;
use crate::url::{extract_domain, matches_any, strip_tracking_params};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Decision of a handler about one request
#[derive(Debug)]
pub enum Verdict {
    /// Pass the (possibly rewritten) request on
    Keep(Request),
    /// Discard the request, with a reason for the log
    Drop(String),
}

/// A handler failed to process a request
///
/// Only the request being processed is affected.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One stage of the pipeline
///
/// Any `Fn(Request) -> Result<Verdict, HandlerError>` closure is a handler.
pub trait Handler: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle(&self, request: Request) -> Result<Verdict, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Result<Verdict, HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn handle(&self, request: Request) -> Result<Verdict, HandlerError> {
        self(request)
    }
}

/// Result of running the whole pipeline on a request
#[derive(Debug)]
pub enum PipelineOutcome {
    Keep(Request),
    Dropped { handler: String, reason: String },
    Failed { handler: String, error: String },
}

/// Ordered sequence of handlers, applied as a fold
#[derive(Default)]
pub struct HandlerPipeline {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the built-in pipeline described by the scheduler config
    ///
    /// Order: scheme filter, domain filter, tracking parameter stripper,
    /// default headers. Stages with nothing to do are left out.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let mut pipeline = Self::new().with(SchemeFilter::new(config.allowed_schemes.clone()));

        if !config.allowed_domains.is_empty() || !config.denied_domains.is_empty() {
            pipeline.push(DomainFilter::new(
                config.allowed_domains.clone(),
                config.denied_domains.clone(),
            ));
        }

        if config.strip_tracking_params {
            pipeline.push(TrackingParamStripper);
        }

        if !config.default_headers.is_empty() {
            pipeline.push(DefaultHeaders::new(
                config
                    .default_headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ));
        }

        pipeline
    }

    pub fn push(&mut self, handler: impl Handler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Runs the request through every handler, stopping at the first veto
    ///
    /// A handler that returns an error or panics fails this request only.
    pub fn apply(&self, request: Request) -> PipelineOutcome {
        let mut current = request;

        for handler in &self.handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler.handle(current)));
            current = match result {
                Ok(Ok(Verdict::Keep(request))) => request,
                Ok(Ok(Verdict::Drop(reason))) => {
                    return PipelineOutcome::Dropped {
                        handler: handler.name().to_string(),
                        reason,
                    }
                }
                Ok(Err(e)) => {
                    return PipelineOutcome::Failed {
                        handler: handler.name().to_string(),
                        error: e.to_string(),
                    }
                }
                Err(panic) => {
                    return PipelineOutcome::Failed {
                        handler: handler.name().to_string(),
                        error: format!("handler panicked: {}", panic_message(panic.as_ref())),
                    }
                }
            };
        }

        PipelineOutcome::Keep(current)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Drops requests whose scheme is not allowed
#[derive(Debug, Clone)]
pub struct SchemeFilter {
    allowed: Vec<String>,
}

impl SchemeFilter {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }
}

impl Handler for SchemeFilter {
    fn name(&self) -> &str {
        "scheme-filter"
    }

    fn handle(&self, request: Request) -> Result<Verdict, HandlerError> {
        let scheme = request.url.scheme();
        if self.allowed.iter().any(|s| s == scheme) {
            Ok(Verdict::Keep(request))
        } else {
            Ok(Verdict::Drop(format!("scheme '{}' not allowed", scheme)))
        }
    }
}

/// Drops requests to denied domains, or outside the allowed ones
///
/// Denied patterns win over allowed patterns. An empty allow list admits
/// every domain that is not denied.
#[derive(Debug, Clone)]
pub struct DomainFilter {
    allowed: Vec<String>,
    denied: Vec<String>,
}

impl DomainFilter {
    pub fn new(allowed: Vec<String>, denied: Vec<String>) -> Self {
        Self { allowed, denied }
    }
}

impl Handler for DomainFilter {
    fn name(&self) -> &str {
        "domain-filter"
    }

    fn handle(&self, request: Request) -> Result<Verdict, HandlerError> {
        let Some(domain) = extract_domain(&request.url) else {
            return Ok(Verdict::Drop("URL has no host".to_string()));
        };

        if matches_any(&self.denied, &domain) {
            return Ok(Verdict::Drop(format!("domain '{}' is denied", domain)));
        }

        if !self.allowed.is_empty() && !matches_any(&self.allowed, &domain) {
            return Ok(Verdict::Drop(format!("domain '{}' is not allowed", domain)));
        }

        Ok(Verdict::Keep(request))
    }
}

/// Removes tracking query parameters from the URL
#[derive(Debug, Clone, Copy)]
pub struct TrackingParamStripper;

impl Handler for TrackingParamStripper {
    fn name(&self) -> &str {
        "tracking-param-stripper"
    }

    fn handle(&self, mut request: Request) -> Result<Verdict, HandlerError> {
        strip_tracking_params(&mut request.url);
        Ok(Verdict::Keep(request))
    }
}

/// Adds headers the request does not already carry
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    headers: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }
}

impl Handler for DefaultHeaders {
    fn name(&self) -> &str {
        "default-headers"
    }

    fn handle(&self, mut request: Request) -> Result<Verdict, HandlerError> {
        for (name, value) in &self.headers {
            request.headers.insert_if_absent(name.as_str(), value.as_str());
        }
        Ok(Verdict::Keep(request))
    }
}
