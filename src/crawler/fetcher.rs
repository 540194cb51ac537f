//! Fetcher: bounded pool of workers draining the ready queue
//!
//! This module handles:
//! - Spawning `concurrency` worker tasks
//! - The per-worker politeness delay
//! - Per-attempt timeouts
//! - Retry classification and exponential backoff
//! - Delivering terminal responses to the sink

use crate::config::FetcherConfig;
use crate::crawler::handler::panic_message;
use crate::crawler::queue::{ReadyQueue, WorkTracker};
use crate::crawler::sink::ResponseSink;
use crate::crawler::transport::Transport;
use crate::model::{AttemptState, RawResponse, Request, Response};
use crate::output::CrawlStats;
use crate::{is_retryable_status, FetchError, SumiError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Exponential backoff between attempts of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    /// A cap below `base` is raised to `base`
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
        }
    }

    pub fn from_config(config: &FetcherConfig) -> Self {
        Self::new(config.backoff_base(), config.backoff_cap())
    }

    /// Delay before the given retry (1 for the first retry)
    ///
    /// `base * 2^(retry - 1)`, never more than the cap.
    ///
    /// ```
    /// use std::time::Duration;
    /// use sumi_frontier::crawler::Backoff;
    ///
    /// let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
    /// assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
    /// assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
    /// assert_eq!(backoff.delay_for(10), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Drains the ready queue with a bounded pool of workers
///
/// Clones share the same queue, sink and stop signal.
#[derive(Clone)]
pub struct Fetcher {
    shared: Arc<FetcherShared>,
    backoff: Backoff,
    concurrency: usize,
    delay: Duration,
}

struct FetcherShared {
    transport: Arc<dyn Transport>,
    ready: ReadyQueue,
    sink: Arc<dyn ResponseSink>,
    tracker: WorkTracker,
    stats: Arc<CrawlStats>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl Fetcher {
    /// Creates a fetcher with one worker and no politeness delay
    pub fn new(
        transport: Arc<dyn Transport>,
        ready: ReadyQueue,
        sink: Arc<dyn ResponseSink>,
        tracker: WorkTracker,
        stats: Arc<CrawlStats>,
    ) -> Self {
        Self {
            shared: Arc::new(FetcherShared {
                transport,
                ready,
                sink,
                tracker,
                stats,
                cancel: CancellationToken::new(),
                running: AtomicBool::new(false),
            }),
            backoff: Backoff::default(),
            concurrency: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the worker pool size and the per-worker delay between dispatches
    ///
    /// The total issue rate is bounded by `concurrency / delay`.
    pub fn configure(&mut self, concurrency: usize, delay: Duration) {
        self.concurrency = concurrency;
        self.delay = delay;
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Spawns the worker tasks
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerPool)` - Workers are running; join the pool after `stop`
    /// * `Err(SumiError)` - Concurrency is zero or the fetcher already runs
    pub fn run(&self) -> Result<WorkerPool, SumiError> {
        if self.concurrency == 0 {
            return Err(SumiError::InvalidConcurrency(self.concurrency));
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SumiError::AlreadyRunning("fetcher"));
        }

        tracing::info!(
            "Starting {} fetch worker(s), delay {:?}",
            self.concurrency,
            self.delay
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            let fetcher = self.clone();
            workers.spawn(async move { fetcher.worker(worker_id).await });
        }

        Ok(WorkerPool { workers })
    }

    /// Signals every worker to finish its current attempt and exit
    ///
    /// Requests still in the ready queue stay there. Pending retries are
    /// abandoned.
    pub fn stop(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::info!("Stopping fetcher");
            self.shared.cancel.cancel();
        }
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        self.shared.cancel.cancelled().await
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    async fn worker(self, worker_id: usize) {
        tracing::debug!("Worker {} started", worker_id);
        let cancel = self.shared.cancel.clone();

        loop {
            let entry = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                entry = self.shared.ready.pop() => entry,
            };

            if !self.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.shared.ready.requeue(entry);
                        break;
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }

            tracing::debug!("Worker {} dispatching {}", worker_id, entry.request);
            if let Some(response) = self.fetch(entry.request).await {
                self.deliver(response);
            }
        }

        tracing::debug!("Worker {} stopped", worker_id);
    }

    /// Performs one attempt for the request
    ///
    /// Returns the terminal response, or `None` when a retry has been
    /// scheduled in its place. The attempt is bounded by the request's
    /// timeout; a timed out attempt is aborted along with its connection.
    /// A transport that panics yields a terminal `InvalidRequest` failure.
    pub async fn fetch(&self, request: Request) -> Option<Response> {
        self.shared.stats.attempt_dispatched();
        log_transition(&request, AttemptState::Pending, AttemptState::InFlight);

        let timeout = request.timeout();
        let started = Instant::now();
        let result = self.send_attempt(&request, timeout).await;
        let elapsed = started.elapsed();

        match result {
            Ok(raw) if is_retryable_status(raw.status) => {
                let error = FetchError::HttpStatus { status: raw.status };
                self.retry_or_fail(request, error, Some(raw), elapsed)
            }
            Ok(raw) => {
                let response = Response::from_raw(request, raw, elapsed);
                let state = if response.error.is_some() {
                    AttemptState::TerminalFailure
                } else {
                    AttemptState::Succeeded
                };
                log_transition(&response.request, AttemptState::InFlight, state);
                Some(response)
            }
            Err(error) if error.is_retryable() => self.retry_or_fail(request, error, None, elapsed),
            Err(error) => {
                log_transition(&request, AttemptState::InFlight, AttemptState::TerminalFailure);
                tracing::warn!("{} failed: {}", request, error);
                Some(Response::failure(request, error, None, elapsed))
            }
        }
    }

    /// Runs the transport call in its own task so a panic fails only this attempt
    async fn send_attempt(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<RawResponse, FetchError> {
        let transport = Arc::clone(&self.shared.transport);
        let attempt = request.clone();
        let mut task = tokio::spawn(async move { transport.send(&attempt).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => {
                let payload = e.into_panic();
                let message = panic_message(payload.as_ref());
                tracing::error!("Transport panicked while fetching {}: {}", request, message);
                Err(FetchError::InvalidRequest(format!(
                    "transport panicked: {}",
                    message
                )))
            }
            Ok(Err(e)) => Err(FetchError::Network(e.to_string())),
            Err(_) => {
                task.abort();
                Err(FetchError::Timeout(timeout))
            }
        }
    }

    fn retry_or_fail(
        &self,
        request: Request,
        error: FetchError,
        raw: Option<RawResponse>,
        elapsed: Duration,
    ) -> Option<Response> {
        if !request.can_retry() {
            let attempts = request.attempt();
            log_transition(&request, AttemptState::InFlight, AttemptState::TerminalFailure);
            tracing::warn!("{} failed after {} attempt(s): {}", request, attempts, error);
            let error = FetchError::RetriesExhausted {
                attempts,
                last: Box::new(error),
            };
            return Some(Response::failure(request, error, raw, elapsed));
        }

        log_transition(&request, AttemptState::InFlight, AttemptState::RetryableFailure);
        let successor = request.next_attempt();
        let delay = self.backoff.delay_for(successor.retries_attempted);
        tracing::warn!(
            "{} failed ({}), retry {}/{} in {:?}",
            request,
            error,
            successor.retries_attempted,
            successor.max_retries(),
            delay
        );

        self.shared.stats.retry_scheduled();
        self.schedule_retry(successor, delay);
        None
    }

    /// Re-admits the successor after its backoff unless the fetcher stops first
    fn schedule_retry(&self, successor: Request, delay: Duration) {
        let ready = self.shared.ready.clone();
        let tracker = self.shared.tracker.clone();
        let cancel = self.shared.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Retry of {} abandoned, fetcher stopped", successor);
                    tracker.finish();
                }
                _ = tokio::time::sleep(delay) => {
                    log_transition(&successor, AttemptState::RetryableFailure, AttemptState::Pending);
                    ready.push(successor);
                }
            }
        });
    }

    /// Hands a terminal response to the sink and resolves its request
    fn deliver(&self, response: Response) {
        self.shared.stats.response_delivered(response.ok);
        let url = response.request.url.clone();

        let sink = &self.shared.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.on_response(response))).is_err() {
            tracing::error!("Response sink panicked while handling {}", url);
        }

        self.shared.tracker.finish();
    }
}

fn log_transition(request: &Request, from: AttemptState, to: AttemptState) {
    debug_assert!(from.can_transition_to(to), "illegal transition {} -> {}", from, to);
    tracing::trace!(
        "{} {} attempt {}: {} -> {}",
        request.id(),
        request.url,
        request.attempt(),
        from,
        to
    );
}

/// Handle to the spawned worker tasks
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to exit
    ///
    /// Reports the first worker that panicked, after all have finished.
    pub async fn join(mut self) -> Result<(), SumiError> {
        let mut failure = None;
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Fetch worker failed: {}", e);
                failure.get_or_insert(e.to_string());
            }
        }

        match failure {
            Some(message) => Err(SumiError::Worker(message)),
            None => Ok(()),
        }
    }
}
