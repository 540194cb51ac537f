//! Request and response model
//!
//! # Components
//!
//! - `Request`: a candidate fetch with priority, lineage and retry settings
//! - `Response`: the terminal outcome delivered to the consumer
//! - `Fingerprint`: the deduplication key of a request
//! - `AttemptState`: the per-attempt state machine

mod fingerprint;
mod request;
mod response;
mod state;

pub use fingerprint::Fingerprint;
pub use request::{Headers, Lineage, Request, RequestId, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
pub use response::{RawResponse, Response};
pub use state::AttemptState;
