//! Timing-sensitive fetcher tests over an in-memory transport

use crate::common::{create_test_config, ScriptedTransport};
use std::sync::Arc;
use std::time::Duration;
use sumi_frontier::crawler::{
    Backoff, CollectingSink, Fetcher, HandlerPipeline, ReadyQueue, WorkTracker,
};
use sumi_frontier::output::CrawlStats;
use sumi_frontier::{Crawler, Request};

struct Pool {
    fetcher: Fetcher,
    ready: ReadyQueue,
    tracker: WorkTracker,
    sink: Arc<CollectingSink>,
}

fn pool(transport: Arc<ScriptedTransport>, concurrency: usize) -> Pool {
    let ready = ReadyQueue::new();
    let tracker = WorkTracker::new();
    let sink = Arc::new(CollectingSink::new());
    let mut fetcher = Fetcher::new(
        transport,
        ready.clone(),
        sink.clone(),
        tracker.clone(),
        Arc::new(CrawlStats::new()),
    );
    fetcher.configure(concurrency, Duration::ZERO);

    Pool {
        fetcher,
        ready,
        tracker,
        sink,
    }
}

fn request(path: &str) -> Request {
    Request::new(&format!("http://x{}", path)).unwrap()
}

async fn wait_idle(tracker: &WorkTracker) {
    tokio::time::timeout(Duration::from_secs(10), tracker.wait_idle())
        .await
        .expect("work never finished");
}

#[tokio::test]
async fn test_concurrency_ceiling() {
    let transport = Arc::new(ScriptedTransport::new(Duration::from_millis(30)));
    let mut config = create_test_config();
    config.fetcher.concurrency = 2;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::from_parts(
        HandlerPipeline::new(),
        &config.fetcher,
        transport.clone(),
        sink.clone(),
    );
    for n in 0..10 {
        crawler.enqueue_raw(request(&format!("/{}", n))).unwrap();
    }

    tokio::time::timeout(Duration::from_secs(10), crawler.run())
        .await
        .expect("crawl did not finish")
        .unwrap();

    assert_eq!(sink.len(), 10);
    assert_eq!(transport.calls().len(), 10);
    assert!(transport.max_in_flight() <= 2);
    assert!(transport.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_priority_dispatch_order() {
    let transport = Arc::new(ScriptedTransport::new(Duration::from_millis(1)));
    let p = pool(transport.clone(), 1);

    // All three are ready before any worker runs
    for request in [
        request("/b").with_priority(1),
        request("/c").with_priority(1),
        request("/a").with_priority(0),
    ] {
        p.tracker.begin();
        p.ready.push(request);
    }

    let workers = p.fetcher.run().unwrap();
    wait_idle(&p.tracker).await;
    p.fetcher.stop();
    workers.join().await.unwrap();

    assert_eq!(transport.paths(), vec!["/a", "/b", "/c"]);
}

#[tokio::test]
async fn test_backoff_between_attempts() {
    let transport = Arc::new(ScriptedTransport::new(Duration::ZERO).script("/down", &[503]));
    let mut p = pool(transport.clone(), 1);
    let base = Duration::from_millis(40);
    p.fetcher = p.fetcher.with_backoff(Backoff::new(base, Duration::from_secs(1)));

    p.tracker.begin();
    p.ready.push(request("/down").with_max_retries(3));

    let workers = p.fetcher.run().unwrap();
    wait_idle(&p.tracker).await;
    p.fetcher.stop();
    workers.join().await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 4);

    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].1 - w[0].1).collect();
    for (retry, gap) in gaps.iter().enumerate() {
        let expected = base * 2u32.pow(retry as u32);
        assert!(
            *gap >= expected,
            "gap before retry {} was {:?}, expected at least {:?}",
            retry + 1,
            gap,
            expected
        );
    }

    let responses = p.sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].ok);
    assert_eq!(responses[0].attempts(), 4);
}

#[tokio::test]
async fn test_stop_is_a_hard_stop() {
    let transport = Arc::new(ScriptedTransport::new(Duration::from_millis(200)));
    let p = pool(transport.clone(), 1);

    for path in ["/1", "/2", "/3"] {
        p.tracker.begin();
        p.ready.push(request(path));
    }

    let workers = p.fetcher.run().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    p.fetcher.stop();
    workers.join().await.unwrap();

    // The attempt in flight completes; nothing else is started
    assert_eq!(transport.paths(), vec!["/1"]);
    assert_eq!(p.sink.len(), 1);
    assert_eq!(p.ready.len(), 2);
    assert_eq!(p.tracker.outstanding(), 2);
}

#[tokio::test]
async fn test_retry_keeps_identity() {
    let transport = Arc::new(ScriptedTransport::new(Duration::ZERO).script("/again", &[500, 502, 200]));
    let mut p = pool(transport.clone(), 2);
    p.fetcher = p
        .fetcher
        .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(5)));

    let original = request("/again");
    let id = original.id();
    let fingerprint = original.fingerprint();
    p.tracker.begin();
    p.ready.push(original);

    let workers = p.fetcher.run().unwrap();
    wait_idle(&p.tracker).await;
    p.fetcher.stop();
    workers.join().await.unwrap();

    let responses = p.sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].ok);
    assert_eq!(responses[0].request.id(), id);
    assert_eq!(responses[0].request.fingerprint(), fingerprint);
    assert_eq!(responses[0].request.retries_attempted, 2);
}
