//! Crawler module: scheduling and concurrent fetching
//!
//! This module contains the core crawling logic, including:
//! - The handler pipeline that filters and rewrites candidate requests
//! - The scheduler that deduplicates and prioritizes admitted requests
//! - The fetcher worker pool with timeouts, retries and backoff
//! - The coordinator that runs a crawl until it is quiescent
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sumi_frontier::config::load_config;
//! use sumi_frontier::crawler::{ChannelSink, Crawler};
//! use sumi_frontier::Request;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(std::path::Path::new("config.toml"))?;
//! let (sink, mut responses) = ChannelSink::new();
//! let crawler = Crawler::new(&config, Arc::new(sink))?;
//!
//! crawler.enqueue_raw(Request::new("https://example.com/")?)?;
//! let stats = crawler.run().await?;
//!
//! while let Ok(response) = responses.try_recv() {
//!     println!("{} -> {}", response.url(), response.status_code);
//! }
//! println!("{} responses", stats.responses());
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod fetcher;
mod handler;
mod queue;
mod scheduler;
mod sink;
mod transport;

pub use coordinator::{Crawler, ShutdownHandle};
pub use fetcher::{Backoff, Fetcher, WorkerPool};
pub use handler::{
    DefaultHeaders, DomainFilter, Handler, HandlerError, HandlerPipeline, PipelineOutcome,
    SchemeFilter, TrackingParamStripper, Verdict,
};
pub use queue::{QueuedRequest, ReadyQueue, WorkTracker};
pub use scheduler::{Admission, Scheduler, SchedulerHandle};
pub use sink::{ChannelSink, CollectingSink, ResponseSink};
pub use transport::{build_http_client, ReqwestTransport, Transport};
