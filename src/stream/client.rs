//! WebSocket client with automatic reconnection

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn, Instrument};

use super::handler::{spawn_dispatcher, HandlerId, HandlerRegistry, HandlerResult};
use super::messages::{subscribe_command, unsubscribe_command, TICKER_CHANNEL};
use super::{ReconnectBackoff, StreamConfig, StreamError, StreamState};
use crate::auth::{Credentials, Signer};
use crate::metrics;
use crate::shutdown::SharedShutdown;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Write half of one live connection
///
/// Cheap to clone. Command ids come from the owning client's counter, so
/// they keep increasing across reconnects.
#[derive(Clone)]
pub struct StreamSession {
    sink: Arc<Mutex<WsSink>>,
    ids: Arc<AtomicU64>,
}

impl StreamSession {
    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::SeqCst)
    }

    async fn send(&self, message: Message) -> Result<(), StreamError> {
        self.sink.lock().await.send(message).await?;
        Ok(())
    }

    /// Send a JSON frame as text
    pub async fn send_json(&self, value: &Value) -> Result<(), StreamError> {
        self.send(Message::Text(serde_json::to_string(value)?)).await
    }

    /// Subscribe to `channels`; returns the command id
    pub async fn subscribe(
        &self,
        channels: &[String],
        tickers: Option<&[String]>,
    ) -> Result<u64, StreamError> {
        let id = self.next_id();
        self.send_json(&subscribe_command(id, channels, tickers))
            .await?;
        debug!(id, ?channels, "Subscribe sent");
        Ok(id)
    }

    /// Subscribe to ticker updates, for every market when `tickers` is `None`
    pub async fn subscribe_to_tickers(
        &self,
        tickers: Option<&[String]>,
    ) -> Result<u64, StreamError> {
        self.subscribe(&[TICKER_CHANNEL.to_string()], tickers).await
    }

    /// Cancel subscriptions by server-assigned id; returns the command id
    pub async fn unsubscribe(&self, sids: &[u64]) -> Result<u64, StreamError> {
        let id = self.next_id();
        self.send_json(&unsubscribe_command(id, sids)).await?;
        debug!(id, ?sids, "Unsubscribe sent");
        Ok(id)
    }

    pub async fn close(&self) -> Result<(), StreamError> {
        self.sink.lock().await.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("next_id", &self.ids.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Connection lifecycle callbacks
#[async_trait]
pub trait StreamHooks: Send + Sync {
    /// Runs after every successful connect
    ///
    /// The default subscribes the configured channels and tickers. An error
    /// ends the session and triggers a reconnect.
    async fn on_open(&self, session: &StreamSession, config: &StreamConfig) -> Result<(), StreamError> {
        let tickers = (!config.tickers.is_empty()).then_some(config.tickers.as_slice());
        session.subscribe(&config.channels, tickers).await?;
        Ok(())
    }

    async fn on_error(&self, error: &StreamError) {
        warn!(error = %error, "Stream error");
    }

    async fn on_close(&self, code: Option<u16>, reason: &str) {
        info!(?code, reason, "Stream closed by server");
    }
}

/// Hooks with the default behavior
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl StreamHooks for DefaultHooks {}

enum SessionEnd {
    Closed { code: Option<u16>, reason: String },
    Shutdown,
}

/// Long-lived subscription client
pub struct StreamClient {
    config: StreamConfig,
    signer: Signer,
    registry: Arc<HandlerRegistry>,
    ids: Arc<AtomicU64>,
    state: watch::Sender<StreamState>,
    hooks: Arc<dyn StreamHooks>,
    shutdown: Option<SharedShutdown>,
}

impl StreamClient {
    pub fn new(config: StreamConfig, credentials: Arc<Credentials>) -> Self {
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            config,
            signer: Signer::new(credentials),
            registry: Arc::new(HandlerRegistry::new()),
            ids: Arc::new(AtomicU64::new(1)),
            state,
            hooks: Arc::new(DefaultHooks),
            shutdown: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn StreamHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Stop the run loop when shutdown is requested.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Register a callback for every decoded message
    pub fn add_message_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.add(handler)
    }

    pub fn remove_message_handler(&self, id: HandlerId) -> bool {
        self.registry.remove(id)
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Id the next command will carry
    pub fn next_message_id(&self) -> u64 {
        self.ids.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: StreamState) {
        self.state.send_replace(state);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    async fn shutdown_signal(&self) {
        match &self.shutdown {
            Some(shutdown) => shutdown.wait_for_shutdown().await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Open one connection with a signed upgrade request
    async fn connect(&self) -> Result<(StreamSession, SplitStream<WsStream>), StreamError> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let headers = self.signer.sign("GET", request.uri().path())?;

        for (name, value) in headers.pairs() {
            let name: HeaderName = name
                .parse()
                .map_err(|e| StreamError::InvalidHeader(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::InvalidHeader(format!("{name}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (ws, _response) = connect_async(request).await?;
        let (sink, stream) = ws.split();
        let session = StreamSession {
            sink: Arc::new(Mutex::new(sink)),
            ids: Arc::clone(&self.ids),
        };
        Ok((session, stream))
    }

    /// Run until shutdown, or until the first disconnect when
    /// auto-reconnect is off
    ///
    /// # Errors
    /// With auto-reconnect off, the error that ended the only session.
    pub async fn run(&self) -> Result<(), StreamError> {
        let span = tracing::info_span!("stream", url = %self.config.url);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<(), StreamError> {
        let (tx, dispatcher) =
            spawn_dispatcher(Arc::clone(&self.registry), self.config.dispatch_capacity);
        let mut backoff =
            ReconnectBackoff::new(self.config.reconnect_floor, self.config.reconnect_ceiling);
        let mut outcome = Ok(());

        loop {
            if self.shutdown_requested() {
                break;
            }

            self.set_state(StreamState::Connecting);
            match self.session(&tx, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed { code, reason }) => {
                    self.set_state(StreamState::Closing);
                    self.hooks.on_close(code, &reason).await;
                }
                Err(e) => {
                    self.set_state(StreamState::Error);
                    self.hooks.on_error(&e).await;
                    if !self.config.auto_reconnect {
                        outcome = Err(e);
                    }
                }
            }
            self.set_state(StreamState::Disconnected);

            if !self.config.auto_reconnect {
                break;
            }

            let delay = backoff.record_failure();
            metrics::record_stream_reconnect();
            info!(
                delay_secs = delay.as_secs_f64(),
                attempt = backoff.failures(),
                "Reconnecting"
            );
            let resumed = match &self.shutdown {
                Some(shutdown) => shutdown.sleep(delay).await,
                None => {
                    tokio::time::sleep(delay).await;
                    true
                }
            };
            if !resumed {
                break;
            }
        }

        self.set_state(StreamState::Disconnected);
        drop(tx);
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "Dispatcher task failed");
        }
        info!("Stream stopped");
        outcome
    }

    /// One connection from connect to disconnect
    async fn session(
        &self,
        tx: &mpsc::Sender<Value>,
        backoff: &mut ReconnectBackoff,
    ) -> Result<SessionEnd, StreamError> {
        let (session, mut read) = self.connect().await?;
        backoff.on_success();
        self.set_state(StreamState::Open);
        info!("Stream connected");

        self.hooks.on_open(&session, &self.config).await?;

        loop {
            let frame = tokio::select! {
                frame = read.next() => frame,
                _ = self.shutdown_signal() => {
                    self.set_state(StreamState::Closing);
                    if let Err(e) = session.close().await {
                        debug!(error = %e, "Close on shutdown failed");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.forward(tx, text.as_bytes()),
                Some(Ok(Message::Binary(data))) => self.forward(tx, &data),
                Some(Ok(Message::Ping(payload))) => session.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Pong(_))) => debug!("Pong received"),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Ok(SessionEnd::Closed { code, reason });
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(StreamError::ConnectionLost),
            }
        }
    }

    fn forward(&self, tx: &mpsc::Sender<Value>, payload: &[u8]) {
        metrics::record_stream_message();
        match serde_json::from_slice::<Value>(payload) {
            Ok(message) => match tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    metrics::record_stream_message_dropped();
                    warn!(
                        capacity = self.config.dispatch_capacity,
                        "Dispatch queue full, message dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => warn!("Dispatcher gone, message dropped"),
            },
            Err(e) => warn!(error = %e, bytes = payload.len(), "Non-JSON message ignored"),
        }
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("handlers", &self.registry.len())
            .finish_non_exhaustive()
    }
}
