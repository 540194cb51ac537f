//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! enqueue, schedule, fetch and deliver cycle end-to-end.

use crate::common::create_test_config;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use sumi_frontier::crawler::{CollectingSink, ResponseSink, SchedulerHandle};
use sumi_frontier::{Crawler, FetchError, Request, Response};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run_to_completion(crawler: Crawler) -> sumi_frontier::output::CrawlStatistics {
    tokio::time::timeout(Duration::from_secs(10), crawler.run())
        .await
        .expect("crawl did not finish")
        .expect("crawl failed")
}

#[tokio::test]
async fn test_referer_chain_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("one"))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The second request must carry its parent as Referer
    Mock::given(method("GET"))
        .and(path("/2"))
        .and(header("referer", format!("{}/1", base_url).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("two"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.fetcher.concurrency = 1;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&config, sink.clone()).expect("Failed to create crawler");

    let first = Request::new(&format!("{}/1", base_url)).unwrap();
    let second = Request::new(&format!("{}/2", base_url))
        .unwrap()
        .with_referer(first.lineage());
    crawler.enqueue_raw(first).unwrap();
    crawler.enqueue_raw(second).unwrap();

    let stats = run_to_completion(crawler).await;

    let responses = sink.responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].url().path(), "/1");
    assert_eq!(responses[1].url().path(), "/2");
    assert_eq!(responses[1].request.priority, 1);
    assert!(responses.iter().all(|r| r.ok));
    assert_eq!(responses[0].text(), "one");
    assert_eq!(stats.succeeded, 2);
}

#[tokio::test]
async fn test_duplicate_requests_fetched_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&create_test_config(), sink.clone()).unwrap();

    for suffix in ["/page", "/page", "/page/", "/page#section", "/page"] {
        let url = format!("{}{}", mock_server.uri(), suffix);
        crawler.enqueue_raw(Request::new(&url).unwrap()).unwrap();
    }

    let stats = run_to_completion(crawler).await;

    assert_eq!(sink.len(), 1);
    assert_eq!(stats.admitted, 1);
    assert_eq!(stats.duplicates, 4);
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&create_test_config(), sink.clone()).unwrap();
    crawler
        .enqueue_raw(Request::new(&format!("{}/missing", mock_server.uri())).unwrap())
        .unwrap();

    let stats = run_to_completion(crawler).await;

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].ok);
    assert_eq!(responses[0].status_code, 404);
    assert_eq!(responses[0].error, Some(FetchError::HttpStatus { status: 404 }));
    assert_eq!(responses[0].attempts(), 1);
    assert_eq!(stats.retries, 0);
}

#[tokio::test]
async fn test_server_error_retried_until_exhausted() {
    let mock_server = MockServer::start().await;
    let config = create_test_config();
    let max_retries = config.fetcher.max_retries;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(u64::from(max_retries) + 1)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&config, sink.clone()).unwrap();
    crawler
        .enqueue_raw(Request::new(&format!("{}/flaky", mock_server.uri())).unwrap())
        .unwrap();

    let stats = run_to_completion(crawler).await;

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].ok);
    assert_eq!(responses[0].status_code, 503);
    assert_eq!(
        responses[0].error,
        Some(FetchError::RetriesExhausted {
            attempts: max_retries + 1,
            last: Box::new(FetchError::HttpStatus { status: 503 }),
        })
    );
    assert_eq!(stats.retries, u64::from(max_retries));
    assert_eq!(stats.dispatched, u64::from(max_retries) + 1);
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&create_test_config(), sink.clone()).unwrap();
    crawler
        .enqueue_raw(Request::new(&format!("{}/limited", mock_server.uri())).unwrap())
        .unwrap();

    let stats = run_to_completion(crawler).await;

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].ok);
    assert_eq!(responses[0].text(), "finally");
    assert_eq!(responses[0].attempts(), 2);
    assert_eq!(stats.retries, 1);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.fetcher.max_retries = 1;
    config.fetcher.default_timeout_ms = 100;

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&config, sink.clone()).unwrap();
    crawler
        .enqueue_raw(Request::new(&format!("{}/slow", mock_server.uri())).unwrap())
        .unwrap();

    run_to_completion(crawler).await;

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status_code, 0);
    match &responses[0].error {
        Some(FetchError::RetriesExhausted { attempts, last }) => {
            assert_eq!(*attempts, 2);
            assert_eq!(**last, FetchError::Timeout(Duration::from_millis(100)));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_denied_domain_is_never_fetched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config.scheduler.denied_domains = vec!["127.0.0.1".to_string()];

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&config, sink.clone()).unwrap();
    crawler
        .enqueue_raw(Request::new(&format!("{}/private", mock_server.uri())).unwrap())
        .unwrap();

    let stats = run_to_completion(crawler).await;

    assert!(sink.is_empty());
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.admitted, 0);
}

#[tokio::test]
async fn test_default_headers_and_tracking_params() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .and(header("accept", "text/html"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config();
    config
        .scheduler
        .default_headers
        .insert("Accept".to_string(), "text/html".to_string());

    let sink = Arc::new(CollectingSink::new());
    let crawler = Crawler::new(&config, sink.clone()).unwrap();
    for query in ["?utm_source=feed", "?utm_campaign=x&fbclid=abc", ""] {
        let url = format!("{}/article{}", mock_server.uri(), query);
        crawler.enqueue_raw(Request::new(&url).unwrap()).unwrap();
    }

    run_to_completion(crawler).await;

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].url().query(), None);
}

/// Follows every line of the body as a link, like a page parser would
struct FollowLinks {
    handle: OnceLock<SchedulerHandle>,
    seen: CollectingSink,
}

impl ResponseSink for FollowLinks {
    fn on_response(&self, response: Response) {
        if let Some(handle) = self.handle.get() {
            for link in response.text().lines().filter(|l| !l.is_empty()) {
                let child = response.request.follow(link).unwrap();
                handle.enqueue_raw(child).unwrap();
            }
        }
        self.seen.on_response(response);
    }
}

#[tokio::test]
async fn test_sink_discovered_links_are_crawled() {
    let mock_server = MockServer::start().await;

    for (page, body) in [("/", "/a\n/b"), ("/a", "/b\n/"), ("/b", "/a\n/c"), ("/c", "")] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let sink = Arc::new(FollowLinks {
        handle: OnceLock::new(),
        seen: CollectingSink::new(),
    });
    let crawler = Crawler::new(&create_test_config(), sink.clone()).unwrap();
    let _ = sink.handle.set(crawler.handle());

    crawler
        .enqueue_raw(Request::new(&format!("{}/", mock_server.uri())).unwrap())
        .unwrap();

    let stats = run_to_completion(crawler).await;

    let responses = sink.seen.responses();
    assert_eq!(responses.len(), 4);

    let priority_of = |p: &str| {
        responses
            .iter()
            .find(|r| r.url().path() == p)
            .map(|r| r.request.priority)
            .unwrap()
    };
    assert_eq!(priority_of("/"), 0);
    assert_eq!(priority_of("/a"), 1);
    assert_eq!(priority_of("/b"), 1);
    assert_eq!(priority_of("/c"), 2);
    assert_eq!(stats.duplicates, 3);
}
