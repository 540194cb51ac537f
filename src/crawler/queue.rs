//! Hand-off structures shared between the scheduler and the fetch workers
//!
//! - `ReadyQueue`: admitted requests ordered by `(priority, sequence)`
//! - `WorkTracker`: count of requests that still owe the consumer an outcome

use crate::model::Request;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};

/// An admitted request with its ordering key
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    /// Priority value (lower is served first)
    pub priority: i32,

    /// Admission order, breaks ties between equal priorities
    pub sequence: u64,

    pub request: Request,
}

// Lower (priority, sequence) keys must pop first from the max-heap
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedRequest {}

/// Priority queue of admitted requests
///
/// Cloning yields another handle to the same queue. The semaphore holds
/// exactly one permit per queued entry, so a waiter that obtains a permit
/// is guaranteed an entry.
#[derive(Clone)]
pub struct ReadyQueue {
    inner: Arc<ReadyInner>,
}

struct ReadyInner {
    heap: Mutex<BinaryHeap<QueuedRequest>>,
    next_sequence: AtomicU64,
    available: Semaphore,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReadyInner {
                heap: Mutex::new(BinaryHeap::new()),
                next_sequence: AtomicU64::new(0),
                available: Semaphore::new(0),
            }),
        }
    }

    /// Adds a request keyed by its priority; returns its sequence number
    pub fn push(&self, request: Request) -> u64 {
        let sequence = self.inner.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.requeue(QueuedRequest {
            priority: request.priority,
            sequence,
            request,
        });
        sequence
    }

    /// Puts a popped entry back with its original key
    pub fn requeue(&self, entry: QueuedRequest) {
        self.heap().push(entry);
        self.inner.available.add_permits(1);
    }

    /// Waits for the highest-priority entry
    ///
    /// Dropping the future before it completes removes nothing from the
    /// queue. Workers stop waiting through their own cancellation signal.
    pub async fn pop(&self) -> QueuedRequest {
        loop {
            match self.inner.available.acquire().await {
                Ok(permit) => permit.forget(),
                // The semaphore is never closed
                Err(_) => std::future::pending::<()>().await,
            }
            if let Some(entry) = self.heap().pop() {
                return entry;
            }
        }
    }

    /// Takes the highest-priority entry if one is queued right now
    pub fn try_pop(&self) -> Option<QueuedRequest> {
        let permit = self.inner.available.try_acquire().ok()?;
        permit.forget();
        self.heap().pop()
    }

    pub fn len(&self) -> usize {
        self.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap().is_empty()
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<QueuedRequest>> {
        self.inner.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts requests that have been accepted but not yet resolved
///
/// A request is resolved when it is dropped by a handler, discarded as a
/// duplicate, or its terminal response has been delivered. Retries do not
/// change the count.
#[derive(Clone)]
pub struct WorkTracker {
    outstanding: Arc<watch::Sender<usize>>,
}

impl WorkTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            outstanding: Arc::new(tx),
        }
    }

    pub fn begin(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    pub fn finish(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolves once no request is outstanding
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}
