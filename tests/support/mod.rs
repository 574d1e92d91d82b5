//! Shared test helpers: fixture credentials and clients pointed at mock servers

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kalshi_collector::auth::Credentials;
use kalshi_collector::downloader::RateLimitPolicy;
use kalshi_collector::fetcher::{ClientConfig, KalshiHttpClient, RetryPolicy};

pub const TEST_KEY_ID: &str = "test-key-id";

pub const TEST_KEY_PEM: &str = include_str!("../fixtures/test_rsa_key.pem");

pub fn credentials() -> Arc<Credentials> {
    Arc::new(Credentials::from_pem(TEST_KEY_ID, TEST_KEY_PEM).unwrap())
}

/// Client config for a mock server: generous ceiling, fast retries
pub fn config_for(base_url: &str) -> ClientConfig {
    ClientConfig::default()
        .with_http_base_url(base_url)
        .with_rate_limit(1_000, RateLimitPolicy::Adaptive)
        .with_retry(RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        })
}

pub fn client_for(base_url: &str) -> Arc<KalshiHttpClient> {
    Arc::new(KalshiHttpClient::new(config_for(base_url), credentials()).unwrap())
}
