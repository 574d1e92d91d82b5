//! Authenticated WebSocket streaming
//!
//! [`StreamClient`] keeps one long-lived subscription connection open:
//! it signs the upgrade request, runs the on-open hook (by default a
//! `ticker` channel subscription), fans incoming JSON messages out to the
//! registered handlers and reconnects with exponential backoff.
//!
//! The message-id counter and handler registry belong to the client and
//! survive reconnects. Subscriptions do not; the on-open hook re-issues them
//! for every fresh session.

pub mod client;
pub mod handler;
pub mod messages;

pub use client::{DefaultHooks, StreamClient, StreamHooks, StreamSession};
pub use handler::{Handler, HandlerError, HandlerId, HandlerRegistry, HandlerResult};

use std::time::Duration;
use tokio_tungstenite::tungstenite;

use crate::auth::SigningError;
use crate::downloader::config::{DISPATCH_QUEUE_CAPACITY, RECONNECT_CEILING, RECONNECT_FLOOR};
use crate::fetcher::environment::WS_PATH;
use crate::fetcher::ClientConfig;

/// Streaming errors; any of these ends the current session
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Header value rejected while building the upgrade request
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server stream ended without a close frame
    #[error("connection lost")]
    ConnectionLost,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
    Error,
}

/// Streaming settings
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Full WebSocket URL, e.g. `wss://.../trade-api/ws/v2`
    pub url: String,
    /// Channels the default on-open hook subscribes to
    pub channels: Vec<String>,
    /// Tickers for the default subscription; empty means all
    pub tickers: Vec<String>,
    pub auto_reconnect: bool,
    pub reconnect_floor: Duration,
    pub reconnect_ceiling: Duration,
    /// Messages buffered ahead of the handlers before new ones are dropped
    pub dispatch_capacity: usize,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channels: vec![messages::TICKER_CHANNEL.to_string()],
            tickers: Vec::new(),
            auto_reconnect: true,
            reconnect_floor: RECONNECT_FLOOR,
            reconnect_ceiling: RECONNECT_CEILING,
            dispatch_capacity: DISPATCH_QUEUE_CAPACITY,
        }
    }

    /// Streaming endpoint of the client's environment (or its override)
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self::new(format!("{}{}", config.resolved_ws_base(), WS_PATH))
    }

    pub fn with_tickers(mut self, tickers: Vec<String>) -> Self {
        self.tickers = tickers;
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_delays(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.reconnect_floor = floor;
        self.reconnect_ceiling = ceiling.max(floor);
        self
    }

    pub fn with_dispatch_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_capacity = capacity.max(1);
        self
    }
}

/// Reconnect delay: doubles on every failure up to a ceiling, resets on a
/// successful connect
///
/// After K consecutive failures [`current`](Self::current) is
/// `min(floor * 2^K, ceiling)`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            current: floor,
            failures: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed or ended session; returns the delay to sleep now
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Successful connect
    pub fn on_success(&mut self) {
        self.current = self.floor;
        self.failures = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(RECONNECT_FLOOR, RECONNECT_CEILING)
    }
}
