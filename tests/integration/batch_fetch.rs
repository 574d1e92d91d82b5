//! Integration tests for parallel batch fetching

use kalshi_collector::fetcher::{BatchFetcher, FailureKind, FetcherError, RequestDescriptor};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::support::client_for;

/// Echo the ticker from `/trade-api/v2/markets/{ticker}`
fn market_echo(request: &Request) -> ResponseTemplate {
    let ticker = request.url.path().rsplit('/').next().unwrap_or_default().to_string();
    ResponseTemplate::new(200).set_body_json(json!({"market": {"ticker": ticker}}))
}

async fn market_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/markets/MISSING"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/trade-api/v2/markets/[^/]+$"))
        .respond_with(market_echo)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_batch_preserves_length_and_order_with_failures() {
    let server = market_server().await;
    let fetcher = BatchFetcher::new(client_for(&server.uri())).with_concurrency(4);

    let tickers: Vec<String> = (0..30)
        .map(|i| if i % 7 == 3 { "MISSING".to_string() } else { format!("T{i:02}") })
        .collect();
    let requests = tickers
        .iter()
        .map(|t| RequestDescriptor::get(format!("/trade-api/v2/markets/{t}")))
        .collect();

    let results = fetcher.batch(requests).await;
    assert_eq!(results.len(), tickers.len());

    for (i, (ticker, result)) in tickers.iter().zip(&results).enumerate() {
        match result {
            Ok(value) => assert_eq!(value["market"]["ticker"], ticker.as_str()),
            Err(e) => {
                assert_eq!(ticker, "MISSING");
                assert_eq!(e.index, i);
                assert_eq!(e.kind(), FailureKind::Fatal);
            }
        }
    }
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 4);
}

#[tokio::test]
async fn test_get_markets_unwraps_and_rejects_bad_tickers() {
    let server = market_server().await;
    let fetcher = BatchFetcher::new(client_for(&server.uri()));

    let tickers = vec![
        "KXA".to_string(),
        "bad/ticker".to_string(),
        "KXB".to_string(),
        "MISSING".to_string(),
    ];
    let results = fetcher.get_markets(&tickers).await;
    assert_eq!(results.len(), 4);

    assert_eq!(results[0].as_ref().unwrap(), &json!({"ticker": "KXA"}));
    let invalid = results[1].as_ref().unwrap_err();
    assert_eq!(invalid.index, 1);
    assert!(matches!(invalid.source, FetcherError::InvalidRequest(_)));
    assert_eq!(results[2].as_ref().unwrap(), &json!({"ticker": "KXB"}));
    let missing = results[3].as_ref().unwrap_err();
    assert_eq!(missing.index, 3);
    assert_eq!(missing.source.status(), Some(404));

    // the invalid ticker never reached the server
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_empty_batch() {
    let server = MockServer::start().await;
    let fetcher = BatchFetcher::new(client_for(&server.uri()));
    assert!(fetcher.batch(Vec::new()).await.is_empty());
}

#[tokio::test]
async fn test_concurrency_is_capped() {
    let server = MockServer::start().await;
    let client = client_for(&server.uri());
    assert_eq!(BatchFetcher::new(client.clone()).concurrency(), 10);
    assert_eq!(BatchFetcher::new(client.clone()).with_concurrency(50).concurrency(), 10);
    assert_eq!(BatchFetcher::new(client).with_concurrency(0).concurrency(), 1);
}

#[tokio::test]
async fn test_inflight_requests_bounded_by_concurrency() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/trade-api/v2/markets/[^/]+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"market": {}}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let fetcher = BatchFetcher::new(client_for(&server.uri())).with_concurrency(4);
    let requests = (0..20)
        .map(|i| RequestDescriptor::get(format!("/trade-api/v2/markets/T{i:02}")))
        .collect();

    let started = Instant::now();
    let results = fetcher.batch(requests).await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(|r| r.is_ok()));
    // 20 requests in waves of 4 take five delays; unbounded would take one
    assert!(elapsed >= Duration::from_millis(950), "finished in {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "finished in {elapsed:?}");
}
