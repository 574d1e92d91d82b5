//! Integration tests for the HTTP transport and its retry path

use kalshi_collector::fetcher::{
    EventsFilter, FailureKind, FetcherError, MarketsFilter, RequestDescriptor,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::client_for;

#[tokio::test]
async fn test_non_success_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/markets/NOPE"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{\"error\":\"not found\"}"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let err = client.get_market("NOPE").await.unwrap_err();
    match &err {
        FetcherError::HttpStatus { status, body } => {
            assert_eq!(*status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Fatal);
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/trade-api/v2/portfolio/orders/o1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let value = client
        .delete("/trade-api/v2/portfolio/orders/o1", &[])
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/exchange/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let err = client.get_exchange_status().await.unwrap_err();
    assert!(matches!(err, FetcherError::Parse(_)));
}

#[tokio::test]
async fn test_retry_recovers_from_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/portfolio/balance"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/portfolio/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balance": 1000})))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let value = client
        .get_with_retry("/trade-api/v2/portfolio/balance", &[], 3)
        .await
        .unwrap();
    assert_eq!(value["balance"], 1000);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_reports_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/exchange/status"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let request = RequestDescriptor::get("/trade-api/v2/exchange/status");
    let err = client.execute_with_retry(&request, 2).await.unwrap_err();

    match &err {
        FetcherError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 2);
            assert_eq!(last.status(), Some(429));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Exhausted);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/markets/BAD"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let err = client
        .get_with_retry("/trade-api/v2/markets/BAD", &[], 5)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_post_is_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trade-api/v2/portfolio/orders"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let request = RequestDescriptor::post("/trade-api/v2/portfolio/orders", json!({"count": 1}));
    let err = client.execute_with_retry(&request, 3).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_markets_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/markets"))
        .and(query_param("status", "open"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "markets": [{"ticker": "A"}, {"ticker": "B"}],
            "cursor": "next-page"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let page = client
        .list_markets(&MarketsFilter::default().with_status("open").with_limit(2))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.cursor.as_deref(), Some("next-page"));
    assert!(!page.is_last());
}

#[tokio::test]
async fn test_get_events_normalizes_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"event_ticker": "EV1"}],
            "next_cursor": "abc"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let response = client.get_events(&EventsFilter::default()).await.unwrap();
    assert_eq!(response["cursor"], "abc");
    assert_eq!(response["events"][0]["event_ticker"], "EV1");
}
