//! Integration tests for request signing on the wire

use base64::prelude::*;
use ring::signature::{UnparsedPublicKey, RSA_PSS_2048_8192_SHA256};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{client_for, credentials, TEST_KEY_ID};

fn header_str<'a>(request: &'a wiremock::Request, name: &str) -> &'a str {
    request.headers.get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_signed_headers_verify_against_path_without_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trade-api/v2/markets"))
        .and(query_param("status", "open"))
        .and(header("kalshi-access-key", TEST_KEY_ID))
        .and(header("content-type", "application/json"))
        .and(header_exists("kalshi-access-signature"))
        .and(header_exists("kalshi-access-timestamp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"markets": [], "cursor": ""})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    client
        .get("/trade-api/v2/markets", &[("status", "open".to_string())])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let timestamp = header_str(request, "kalshi-access-timestamp");
    assert!(timestamp.parse::<i64>().is_ok());

    let signature = BASE64_STANDARD
        .decode(header_str(request, "kalshi-access-signature"))
        .unwrap();
    let credentials = credentials();
    let key = UnparsedPublicKey::new(&RSA_PSS_2048_8192_SHA256, credentials.public_key_der());

    let message = format!("{timestamp}GET/trade-api/v2/markets");
    assert!(key.verify(message.as_bytes(), &signature).is_ok());

    let with_query = format!("{timestamp}GET/trade-api/v2/markets?status=open");
    assert!(key.verify(with_query.as_bytes(), &signature).is_err());
}

#[tokio::test]
async fn test_post_signs_method_and_sends_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trade-api/v2/portfolio/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"order": {"order_id": "o1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let response = client
        .post("/trade-api/v2/portfolio/orders", json!({"ticker": "KXA", "count": 1}))
        .await
        .unwrap();
    assert_eq!(response["order"]["order_id"], "o1");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, json!({"ticker": "KXA", "count": 1}));

    let timestamp = header_str(request, "kalshi-access-timestamp");
    let signature = BASE64_STANDARD
        .decode(header_str(request, "kalshi-access-signature"))
        .unwrap();
    let credentials = credentials();
    let message = format!("{timestamp}POST/trade-api/v2/portfolio/orders");
    assert!(UnparsedPublicKey::new(&RSA_PSS_2048_8192_SHA256, credentials.public_key_der())
        .verify(message.as_bytes(), &signature)
        .is_ok());
}
