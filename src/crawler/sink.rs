//! Response sinks
//!
//! The fetch workers hand every terminal response to a `ResponseSink`.
//! All workers share one sink, so implementations must accept concurrent
//! calls.

use crate::model::Response;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Consumer of terminal responses
///
/// `on_response` is called exactly once per resolved request. A sink that
/// discovers follow-up links should enqueue them from inside this call so
/// the crawl does not finish underneath it.
pub trait ResponseSink: Send + Sync {
    fn on_response(&self, response: Response);
}

impl<F> ResponseSink for F
where
    F: Fn(Response) + Send + Sync,
{
    fn on_response(&self, response: Response) {
        self(response)
    }
}

/// Forwards responses into an unbounded channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Response>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Response>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResponseSink for ChannelSink {
    fn on_response(&self, response: Response) {
        if let Err(e) = self.tx.send(response) {
            tracing::warn!("Response receiver dropped, discarding response for {}", e.0.url());
        }
    }
}

/// Keeps every response in memory, in delivery order
#[derive(Default)]
pub struct CollectingSink {
    responses: Mutex<Vec<Response>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the responses received so far
    pub fn responses(&self) -> Vec<Response> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns the responses received so far
    pub fn take(&self) -> Vec<Response> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Response>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResponseSink for CollectingSink {
    fn on_response(&self, response: Response) {
        self.lock().push(response);
    }
}
