//! Crawler coordinator - wires the scheduler and the fetcher together
//!
//! The data flow is
//! `enqueue_raw -> raw queue -> Scheduler -> ReadyQueue -> Fetcher -> ResponseSink`.
//! A crawl ends when no request is outstanding anywhere in that chain,
//! or when it is stopped from outside.

use crate::config::{Config, FetcherConfig};
use crate::crawler::fetcher::{Backoff, Fetcher};
use crate::crawler::handler::HandlerPipeline;
use crate::crawler::queue::{ReadyQueue, WorkTracker};
use crate::crawler::scheduler::{Scheduler, SchedulerHandle};
use crate::crawler::sink::ResponseSink;
use crate::crawler::transport::{ReqwestTransport, Transport};
use crate::model::Request;
use crate::output::{CrawlStatistics, CrawlStats};
use crate::SumiError;
use std::sync::Arc;
use std::time::Instant;

/// Main crawler structure
pub struct Crawler {
    scheduler: Scheduler,
    fetcher: Fetcher,
    handle: SchedulerHandle,
    tracker: WorkTracker,
    stats: Arc<CrawlStats>,
}

impl Crawler {
    /// Creates a crawler that fetches over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `sink` - Receives one terminal response per admitted request
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to accept requests
    /// * `Err(SumiError)` - The HTTP client could not be built
    pub fn new(config: &Config, sink: Arc<dyn ResponseSink>) -> Result<Self, SumiError> {
        let transport = ReqwestTransport::from_config(&config.user_agent)?;
        Ok(Self::with_transport(config, Arc::new(transport), sink))
    }

    /// Creates a crawler with the built-in handler pipeline and a custom transport
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self::from_parts(
            HandlerPipeline::from_config(&config.scheduler),
            &config.fetcher,
            transport,
            sink,
        )
    }

    /// Creates a crawler from explicit parts
    pub fn from_parts(
        pipeline: HandlerPipeline,
        fetcher_config: &FetcherConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        let ready = ReadyQueue::new();
        let tracker = WorkTracker::new();
        let stats = Arc::new(CrawlStats::new());

        let scheduler = Scheduler::new(pipeline, ready.clone(), tracker.clone(), stats.clone())
            .with_defaults(fetcher_config.max_retries, fetcher_config.default_timeout());

        let mut fetcher = Fetcher::new(transport, ready, sink, tracker.clone(), stats.clone())
            .with_backoff(Backoff::from_config(fetcher_config));
        fetcher.configure(fetcher_config.concurrency, fetcher_config.delay());

        let handle = scheduler.handle();

        Self {
            scheduler,
            fetcher,
            handle,
            tracker,
            stats,
        }
    }

    /// Handle for enqueuing requests, also from inside a response sink
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn enqueue_raw(&self, request: Request) -> Result<(), SumiError> {
        self.handle.enqueue_raw(request)
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        self.stats.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            fetcher: self.fetcher.clone(),
            scheduler: self.handle.clone(),
        }
    }

    /// Runs the crawl to completion
    ///
    /// Starts the fetch workers and the scheduling loop, then waits until
    /// the raw queue and the ready queue are empty, no fetch is in flight
    /// and no retry is pending. Enqueue the seeds before calling this; a
    /// crawl with no work completes immediately.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - Final counters
    /// * `Err(SumiError)` - Invalid fetcher settings, or a worker panicked
    pub async fn run(self) -> Result<CrawlStatistics, SumiError> {
        let Self {
            scheduler,
            fetcher,
            handle,
            tracker,
            stats,
        } = self;

        let started = Instant::now();
        let workers = match fetcher.run() {
            Ok(workers) => workers,
            Err(e) => {
                handle.close();
                return Err(e);
            }
        };
        let scheduler_task = tokio::spawn(scheduler.run());

        tracing::info!(
            "Crawl started with {} request(s) outstanding",
            tracker.outstanding()
        );

        tokio::select! {
            _ = tracker.wait_idle() => tracing::info!("No outstanding requests, finishing crawl"),
            _ = fetcher.stopped() => tracing::info!("Crawl stopped with {} request(s) outstanding", tracker.outstanding()),
        }

        handle.close();
        fetcher.stop();

        let scheduler_result = scheduler_task
            .await
            .map_err(|e| SumiError::Worker(format!("scheduler task failed: {}", e)));
        workers.join().await?;
        scheduler_result?;

        let snapshot = stats.snapshot();
        tracing::info!(
            "Crawl completed: {} responses ({} ok, {} failed) in {:?}",
            snapshot.responses(),
            snapshot.succeeded,
            snapshot.failed,
            started.elapsed()
        );

        Ok(snapshot)
    }
}

/// Stops a running crawl from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    fetcher: Fetcher,
    scheduler: SchedulerHandle,
}

impl ShutdownHandle {
    /// Stops accepting new requests but lets admitted ones finish
    ///
    /// Candidates that `enqueue_raw` accepted but the scheduler has not yet
    /// processed are discarded and counted as rejected. Only requests already
    /// in the ready queue, in flight, or waiting for a retry are fetched.
    pub fn close(&self) {
        self.scheduler.close();
    }

    /// Hard stop: workers exit after their current attempt
    pub fn stop(&self) {
        self.scheduler.close();
        self.fetcher.stop();
    }
}
