use std::time::Duration;

use kalshi_collector::fetcher::retry_formatter::{RetryContext, RetryErrorType};
use kalshi_collector::fetcher::FetcherError;

fn http(status: u16) -> FetcherError {
    FetcherError::HttpStatus {
        status,
        body: "upstream said no".to_string(),
    }
}

fn sample_context(error: &FetcherError) -> RetryContext {
    RetryContext::new(
        2,
        5,
        error,
        Duration::from_secs(4),
        "GET /trade-api/v2/markets",
    )
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let message = sample_context(&http(429)).format_retry();
    assert!(message.contains("attempt 3/5"));
    assert!(message.contains("rate limit exceeded"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.contains("GET /trade-api/v2/markets"));
}

#[test]
fn format_success_names_endpoint() {
    let message = sample_context(&http(503)).format_success();
    assert!(message.contains("Retry attempt 2/5 succeeded"));
    assert!(message.contains("/trade-api/v2/markets"));
}

#[test]
fn format_failure_lists_suggestions() {
    let output = sample_context(&http(502)).format_failure();
    assert!(output.contains("Request failed after 5 attempts"));
    assert!(output.contains("upstream said no"));
    assert!(output.contains("Exchange may be experiencing issues"));
    assert!(output.contains("--max-retries"));
}

#[test]
fn fatal_failures_do_not_suggest_more_retries() {
    let suggestions = sample_context(&http(401)).format_suggestions();
    assert!(suggestions.iter().any(|s| s.contains("key id")));
    assert!(!suggestions.iter().any(|s| s.contains("--max-retries")));
}

#[test]
fn classification_from_status() {
    assert_eq!(RetryErrorType::from_status(400), RetryErrorType::InvalidRequest);
    assert_eq!(RetryErrorType::from_status(401), RetryErrorType::AuthFailed(401));
    assert_eq!(RetryErrorType::from_status(403), RetryErrorType::AuthFailed(403));
    assert_eq!(RetryErrorType::from_status(404), RetryErrorType::ClientError(404));
    assert_eq!(RetryErrorType::from_status(429), RetryErrorType::RateLimit);
    assert_eq!(RetryErrorType::from_status(504), RetryErrorType::ServerError(504));
}

#[test]
fn exhausted_errors_classify_by_last_failure() {
    let error = FetcherError::RetriesExhausted {
        attempts: 3,
        last: Box::new(http(503)),
    };
    let kind = RetryErrorType::from_error(&error);
    assert_eq!(kind, RetryErrorType::ServerError(503));
    assert_eq!(kind.description(), "service unavailable");
}

#[test]
fn retryable_matches_transport_policy() {
    for status in [429, 500, 502, 503] {
        assert!(RetryErrorType::from_status(status).is_retryable(), "{status}");
        assert!(http(status).is_retryable(), "{status}");
    }
    for status in [400, 401, 403, 404, 422] {
        assert!(!RetryErrorType::from_status(status).is_retryable(), "{status}");
        assert!(!http(status).is_retryable(), "{status}");
    }
    assert!(!RetryErrorType::from_error(&FetcherError::Parse("eof".into())).is_retryable());
}
