//! Crawl statistics
//!
//! Counters shared by the scheduler and the fetch workers, plus a plain
//! snapshot type for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated while a crawl runs
#[derive(Debug, Default)]
pub struct CrawlStats {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    handler_errors: AtomicU64,
    duplicates: AtomicU64,
    admitted: AtomicU64,
    dispatched: AtomicU64,
    retries: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A candidate entered the raw queue
    pub fn request_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A candidate arrived after the scheduler closed
    pub fn request_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A handler vetoed a candidate
    pub fn request_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A handler failed while processing a candidate
    pub fn handler_failed(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_discarded(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker started an attempt
    pub fn attempt_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_delivered(&self, ok: bool) {
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CrawlStatistics {
        CrawlStatistics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the crawl counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    pub enqueued: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub handler_errors: u64,
    pub duplicates: u64,
    pub admitted: u64,
    pub dispatched: u64,
    pub retries: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl CrawlStatistics {
    /// Responses delivered to the consumer
    pub fn responses(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Share of delivered responses that were successful, in percent
    pub fn success_rate(&self) -> f64 {
        let responses = self.responses();
        if responses == 0 {
            0.0
        } else {
            (self.succeeded as f64 / responses as f64) * 100.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Scheduling:");
    println!("  Enqueued: {}", stats.enqueued);
    println!("  Rejected after close: {}", stats.rejected);
    println!("  Dropped by handlers: {}", stats.dropped);
    println!("  Handler errors: {}", stats.handler_errors);
    println!("  Duplicates discarded: {}", stats.duplicates);
    println!("  Admitted: {}", stats.admitted);
    println!();

    println!("Fetching:");
    println!("  Attempts: {}", stats.dispatched);
    println!("  Retries: {}", stats.retries);
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Failed: {}", stats.failed);
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} responses)",
        stats.success_rate(),
        stats.succeeded,
        stats.responses()
    );
}
