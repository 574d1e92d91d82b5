//! Signed HTTP client for the trade API
//!
//! Every call passes through the same three steps: wait on the shared rate
//! limiter, sign `timestamp + METHOD + path`, send over the pooled client.
//! The single-shot methods surface the first failure. The retrying methods
//! retry network errors, 429 and 5xx on idempotent methods with exponential
//! backoff plus jitter; other 4xx are returned immediately.

use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::auth::{Credentials, Signer};
use crate::downloader::config::{
    calculate_backoff, CONNECT_TIMEOUT, DEFAULT_RETRIES, DEFAULT_WORKERS, READ_TIMEOUT,
    RETRY_BASE_MS,
};
use crate::downloader::rate_limit::{RateLimitConfig, RateLimitPolicy, RateLimiter};
use crate::fetcher::environment::{api_path, Environment};
use crate::fetcher::pagination::{normalize_cursor, Page};
use crate::fetcher::query::{EventsFilter, MarketsFilter, QueryParams, TradesFilter};
use crate::fetcher::retry_formatter::RetryContext;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;

/// Retry settings for the retrying request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Backoff base; attempt `n` waits `base * 2^n + jitter`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRIES,
            base_delay: Duration::from_millis(RETRY_BASE_MS),
        }
    }
}

/// Client construction settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Overrides the environment's REST base URL (test servers, proxies)
    pub http_base_url: Option<String>,
    /// Overrides the environment's WebSocket base URL
    pub ws_base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    /// Sizes the idle connection pool and caps batch concurrency
    pub workers: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            http_base_url: None,
            ws_base_url: None,
            rate_limit: RateLimitConfig::default(),
            workers: DEFAULT_WORKERS,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    pub fn with_http_base_url(mut self, url: impl Into<String>) -> Self {
        self.http_base_url = Some(url.into());
        self
    }

    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = Some(url.into());
        self
    }

    pub fn with_rate_limit(mut self, ceiling: u32, policy: RateLimitPolicy) -> Self {
        self.rate_limit = RateLimitConfig { ceiling, policy };
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// REST base URL after overrides, without a trailing slash
    pub fn resolved_http_base(&self) -> String {
        self.http_base_url
            .as_deref()
            .unwrap_or(self.environment.http_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// WebSocket base URL after overrides, without a trailing slash
    pub fn resolved_ws_base(&self) -> String {
        self.ws_base_url
            .as_deref()
            .unwrap_or(self.environment.ws_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

/// One request to issue: method, full path, query and optional JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Full path including the `/trade-api/v2` prefix
    pub path: String,
    pub query: QueryParams,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryParams::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Check if the method is safe to repeat
    pub fn is_idempotent(&self) -> bool {
        self.method == Method::GET || self.method == Method::DELETE
    }

    /// `METHOD path`, used in logs
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

fn to_query(params: &[(&str, String)]) -> QueryParams {
    params
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Signed, rate-limited client for the trade API
///
/// Built once and shared by `Arc`; all clones of the inner `reqwest::Client`
/// share one connection pool.
pub struct KalshiHttpClient {
    http: Client,
    signer: Signer,
    rate_limiter: Arc<RateLimiter>,
    config: ClientConfig,
    base_url: String,
}

impl KalshiHttpClient {
    /// Create a client from configuration and credentials
    ///
    /// # Errors
    /// Returns [`FetcherError::InvalidRequest`] for a zero rate ceiling and
    /// [`FetcherError::Network`] if the TLS backend cannot be initialized.
    pub fn new(config: ClientConfig, credentials: Arc<Credentials>) -> FetcherResult<Self> {
        let rate_limiter = RateLimiter::from_config(config.rate_limit)
            .map_err(|e| FetcherError::InvalidRequest(e.to_string()))?;

        let http = Client::builder()
            .pool_max_idle_per_host(config.workers.max(1))
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        let base_url = config.resolved_http_base();
        info!(
            environment = %config.environment,
            base_url = %base_url,
            rate_limit = config.rate_limit.ceiling,
            policy = ?config.rate_limit.policy,
            workers = config.workers,
            "HTTP client initialized"
        );

        Ok(Self {
            http,
            signer: Signer::new(credentials),
            rate_limiter: Arc::new(rate_limiter),
            config,
            base_url,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Signer shared with the streaming client
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Single signed GET
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> FetcherResult<Value> {
        self.execute(&RequestDescriptor::get(path).with_query(to_query(params)))
            .await
    }

    /// Single signed POST with a JSON body
    pub async fn post(&self, path: &str, body: Value) -> FetcherResult<Value> {
        self.execute(&RequestDescriptor::post(path, body)).await
    }

    /// Single signed DELETE
    pub async fn delete(&self, path: &str, params: &[(&str, String)]) -> FetcherResult<Value> {
        self.execute(&RequestDescriptor::delete(path).with_query(to_query(params)))
            .await
    }

    /// GET with up to `retries` total attempts
    pub async fn get_with_retry(
        &self,
        path: &str,
        params: &[(&str, String)],
        retries: u32,
    ) -> FetcherResult<Value> {
        let request = RequestDescriptor::get(path).with_query(to_query(params));
        self.execute_with_retry(&request, retries).await
    }

    /// Issue one request: rate limit, sign, send, decode
    ///
    /// # Errors
    /// Non-2xx responses become [`FetcherError::HttpStatus`] carrying the full
    /// body. An empty 2xx body decodes to `Value::Null`.
    pub async fn execute(&self, request: &RequestDescriptor) -> FetcherResult<Value> {
        self.rate_limiter.acquire().await;

        let headers = self.signer.sign(request.method.as_str(), &request.path)?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in headers.pairs() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, params = request.query.len(), "Sending request");

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        metrics::record_http_request(request.method.as_str(), status.as_u16(), started.elapsed());

        if !status.is_success() {
            return Err(FetcherError::HttpStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            FetcherError::Parse(format!("{}: {e}", request.endpoint()))
        })
    }

    /// Issue a request, retrying transient failures
    ///
    /// POST is never retried. Fatal failures return as-is on the first
    /// occurrence; a retryable failure that persists through every attempt
    /// returns [`FetcherError::RetriesExhausted`].
    pub async fn execute_with_retry(
        &self,
        request: &RequestDescriptor,
        retries: u32,
    ) -> FetcherResult<Value> {
        if !request.is_idempotent() {
            return self.execute(request).await;
        }

        let max_attempts = retries.max(1);
        let mut attempt = 0;
        let mut last_retry: Option<RetryContext> = None;

        loop {
            attempt += 1;
            let error = match self.execute(request).await {
                Ok(value) => {
                    if let Some(mut context) = last_retry {
                        context.attempt = attempt;
                        info!("{}", context.format_success());
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                let context =
                    RetryContext::new(attempt, max_attempts, &error, Duration::ZERO, request.endpoint());
                warn!("{}", context.format_failure());
                metrics::record_retries_exhausted();
                return Err(FetcherError::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(error),
                });
            }

            let backoff = calculate_backoff(attempt - 1, self.config.retry.base_delay);
            let context = RetryContext::new(attempt, max_attempts, &error, backoff, request.endpoint());
            warn!(error = %error, "{}", context.format_retry());
            metrics::record_retry(backoff);
            last_retry = Some(context);
            tokio::time::sleep(backoff).await;
        }
    }

    /// Account balance
    pub async fn get_balance(&self) -> FetcherResult<Value> {
        self.get(&api_path("/portfolio/balance"), &[]).await
    }

    /// Exchange trading status
    pub async fn get_exchange_status(&self) -> FetcherResult<Value> {
        self.get(&api_path("/exchange/status"), &[]).await
    }

    /// Single market by ticker; returns the full response (`{"market": {...}}`)
    pub async fn get_market(&self, ticker: &str) -> FetcherResult<Value> {
        self.get(&market_path(ticker)?, &[]).await
    }

    /// Trades matching the filter
    pub async fn get_trades(&self, filter: &TradesFilter) -> FetcherResult<Value> {
        let request = RequestDescriptor::get(api_path("/markets/trades")).with_query(filter.to_params());
        self.execute(&request).await
    }

    /// Events matching the filter, with the continuation token normalized under `cursor`
    pub async fn get_events(&self, filter: &EventsFilter) -> FetcherResult<Value> {
        let request = RequestDescriptor::get(api_path("/events")).with_query(filter.to_params());
        let mut response = self.execute(&request).await?;
        normalize_cursor(&mut response);
        Ok(response)
    }

    /// One page of markets
    pub async fn list_markets(&self, filter: &MarketsFilter) -> FetcherResult<Page> {
        let request = RequestDescriptor::get(api_path("/markets")).with_query(filter.to_params());
        let response = self.execute_with_retry(&request, self.config.retry.attempts).await?;
        Page::from_response(response, "markets")
    }
}

impl std::fmt::Debug for KalshiHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiHttpClient")
            .field("base_url", &self.base_url)
            .field("environment", &self.config.environment)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// `/trade-api/v2/markets/{ticker}`
///
/// # Errors
/// Rejects empty tickers and tickers containing `/` or `?`.
pub fn market_path(ticker: &str) -> FetcherResult<String> {
    if ticker.is_empty() || ticker.contains(['/', '?', '#']) {
        return Err(FetcherError::InvalidRequest(format!(
            "invalid market ticker '{ticker}'"
        )));
    }
    Ok(api_path(&format!("/markets/{ticker}")))
}
