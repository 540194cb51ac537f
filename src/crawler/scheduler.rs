//! Scheduler for admitting candidate requests into the ready queue
//!
//! This module handles:
//! - The raw inbound queue fed by `enqueue_raw`
//! - Running every candidate through the handler pipeline
//! - Lineage-derived priority and request defaults
//! - Deduplication by fingerprint
//! - Admission into the priority-ordered ready queue

use crate::crawler::handler::{HandlerPipeline, PipelineOutcome};
use crate::crawler::queue::{ReadyQueue, WorkTracker};
use crate::model::{Fingerprint, Request, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
use crate::output::CrawlStats;
use crate::SumiError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outcome of `Scheduler::admit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Pushed onto the ready queue with this sequence number
    Admitted { sequence: u64 },
    /// Same fingerprint already seen; nothing happened
    Duplicate,
}

/// Cloneable handle for feeding and closing a scheduler
///
/// External discovery logic and response sinks hold one of these.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Request>,
    shared: Arc<HandleShared>,
}

struct HandleShared {
    closed: AtomicBool,
    close_signal: CancellationToken,
    tracker: WorkTracker,
    stats: Arc<CrawlStats>,
}

impl SchedulerHandle {
    /// Places a candidate on the raw queue
    ///
    /// Never blocks. Fails with `SchedulerClosed` once the scheduler has
    /// been closed. A request accepted while `close` is racing with it is
    /// discarded by the closing scheduler and counted as rejected.
    pub fn enqueue_raw(&self, request: Request) -> Result<(), SumiError> {
        if self.is_closed() {
            self.shared.stats.request_rejected();
            return Err(SumiError::SchedulerClosed {
                url: request.url.to_string(),
            });
        }

        self.shared.tracker.begin();
        if let Err(e) = self.tx.send(request) {
            self.shared.tracker.finish();
            self.shared.stats.request_rejected();
            return Err(SumiError::SchedulerClosed {
                url: e.0.url.to_string(),
            });
        }

        self.shared.stats.request_enqueued();
        Ok(())
    }

    /// Marks the scheduler stopped; calling it again has no effect
    ///
    /// Candidates still waiting in the raw queue are discarded by the run
    /// loop and counted as rejected.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Scheduler closing");
            self.shared.close_signal.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Scheduler turns the raw candidate stream into admitted ready requests
///
/// The `seen_urls` set lives inside the scheduler and is dropped with it,
/// so two schedulers never share deduplication state.
pub struct Scheduler {
    raw_rx: mpsc::UnboundedReceiver<Request>,
    handle: SchedulerHandle,
    pipeline: HandlerPipeline,
    ready: ReadyQueue,
    seen_urls: HashSet<Fingerprint>,
    default_max_retries: u32,
    default_timeout: Duration,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Handlers every candidate passes through
    /// * `ready` - The queue admitted requests are pushed onto
    /// * `tracker` - Outstanding work counter shared with the fetcher
    /// * `stats` - Crawl counters
    pub fn new(
        pipeline: HandlerPipeline,
        ready: ReadyQueue,
        tracker: WorkTracker,
        stats: Arc<CrawlStats>,
    ) -> Self {
        let (tx, raw_rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle {
            tx,
            shared: Arc::new(HandleShared {
                closed: AtomicBool::new(false),
                close_signal: CancellationToken::new(),
                tracker,
                stats,
            }),
        };

        Self {
            raw_rx,
            handle,
            pipeline,
            ready,
            seen_urls: HashSet::new(),
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the retry limit and timeout given to requests that carry none
    pub fn with_defaults(mut self, max_retries: u32, timeout: Duration) -> Self {
        self.default_max_retries = max_retries;
        self.default_timeout = timeout;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn enqueue_raw(&self, request: Request) -> Result<(), SumiError> {
        self.handle.enqueue_raw(request)
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// Number of distinct fingerprints admitted so far
    pub fn seen_count(&self) -> usize {
        self.seen_urls.len()
    }

    /// Runs the scheduling loop until the scheduler is closed
    ///
    /// Candidates still in the raw queue at close are discarded and
    /// counted as rejected. A failing handler only loses its own request.
    pub async fn run(mut self) {
        tracing::info!(
            "Scheduler started with {} handler(s): {}",
            self.pipeline.len(),
            self.pipeline.names().join(", ")
        );

        let close_signal = self.handle.shared.close_signal.clone();
        loop {
            let request = tokio::select! {
                biased;
                _ = close_signal.cancelled() => break,
                request = self.raw_rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.process(request);
        }

        self.raw_rx.close();
        let mut discarded = 0usize;
        while let Ok(request) = self.raw_rx.try_recv() {
            tracing::debug!("Discarding {} after close", request.url);
            self.handle.shared.stats.request_rejected();
            self.handle.shared.tracker.finish();
            discarded += 1;
        }

        tracing::info!(
            "Scheduler stopped ({} fingerprints seen, {} pending candidates discarded)",
            self.seen_urls.len(),
            discarded
        );
    }

    /// Handles one raw candidate and resolves its raw-queue slot
    fn process(&mut self, request: Request) {
        let url = request.url.clone();

        match self.pipeline.apply(request) {
            PipelineOutcome::Keep(request) => {
                let request = self.schedule_request(request);
                self.admit(request);
            }
            PipelineOutcome::Dropped { handler, reason } => {
                tracing::debug!("Dropped {} ({}: {})", url, handler, reason);
                self.handle.shared.stats.request_dropped();
            }
            PipelineOutcome::Failed { handler, error } => {
                tracing::error!("Handler {} failed on {}: {}", handler, url, error);
                self.handle.shared.stats.handler_failed();
            }
        }

        self.handle.shared.tracker.finish();
    }

    /// Assigns lineage-derived priority and fills in defaults
    ///
    /// A request with a referer sits one level below it and carries a
    /// `Referer` header unless it already has one.
    pub fn schedule_request(&self, mut request: Request) -> Request {
        if let Some(referer) = &request.referer {
            request.priority = referer.priority.saturating_add(1);
            request
                .headers
                .insert_if_absent("Referer", referer.url.as_str());
        }

        request.apply_defaults(self.default_max_retries, self.default_timeout);
        request
    }

    /// Pushes a request onto the ready queue unless its fingerprint was seen
    ///
    /// Non-unique requests are always admitted and never recorded.
    pub fn admit(&mut self, request: Request) -> Admission {
        if request.unique && !self.seen_urls.insert(request.fingerprint()) {
            tracing::debug!("Duplicate {} discarded", request);
            self.handle.shared.stats.duplicate_discarded();
            return Admission::Duplicate;
        }

        tracing::trace!("Admitting {} at priority {}", request, request.priority);
        self.handle.shared.tracker.begin();
        self.handle.shared.stats.request_admitted();
        let sequence = self.ready.push(request);
        Admission::Admitted { sequence }
    }
}
