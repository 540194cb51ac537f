//! Shared fixtures for the integration tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sumi_frontier::config::{Config, FetcherConfig, SchedulerConfig, UserAgentConfig};
use sumi_frontier::crawler::Transport;
use sumi_frontier::model::{Headers, RawResponse};
use sumi_frontier::{FetchError, Request};

/// Creates a test configuration with fast retries
pub fn create_test_config() -> Config {
    Config {
        scheduler: SchedulerConfig::default(),
        fetcher: FetcherConfig {
            concurrency: 2,
            delay_ms: 0,
            max_retries: 2,
            default_timeout_ms: 2_000,
            backoff_base_ms: 10,
            backoff_cap_ms: 50,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        seeds: vec![],
    }
}

/// In-memory transport with per-path status scripts
///
/// Each path plays back its scripted statuses in order and then repeats
/// the last one. Unscripted paths answer 200. Every call is logged with
/// the instant it started.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<u16>>>,
    latency: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(latency: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            latency,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(self, path: &str, statuses: &[u16]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), statuses.iter().copied().collect());
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|(path, _)| path).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_status(&self, path: &str) -> u16 {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(path) {
            Some(statuses) if statuses.len() > 1 => statuses.pop_front().unwrap(),
            Some(statuses) => statuses.front().copied().unwrap_or(200),
            None => 200,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<RawResponse, FetchError> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push((path.clone(), Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(RawResponse {
            status: self.next_status(&path),
            headers: Headers::new(),
            body: path.into_bytes(),
            final_url: request.url.clone(),
        })
    }
}
