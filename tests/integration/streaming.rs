//! WebSocket client against a local server

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use kalshi_collector::shutdown::ShutdownCoordinator;
use kalshi_collector::stream::{
    StreamClient, StreamConfig, StreamError, StreamHooks, StreamSession, StreamState,
};

use crate::support::{credentials, TEST_KEY_ID};

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

struct Upgrade {
    socket: ServerSocket,
    path: String,
    headers: HeaderMap,
}

async fn accept(listener: &TcpListener) -> Upgrade {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut seen = None;
    let socket = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            seen = Some((request.uri().path().to_string(), request.headers().clone()));
            Ok(response)
        },
    )
    .await
    .unwrap();
    let (path, headers) = seen.unwrap();
    Upgrade {
        socket,
        path,
        headers,
    }
}

async fn next_json(socket: &mut ServerSocket) -> Value {
    loop {
        match timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

async fn local_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/trade-api/ws/v2", listener.local_addr().unwrap());
    (listener, url)
}

fn fast_config(url: &str) -> StreamConfig {
    StreamConfig::new(url).with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(50))
}

#[tokio::test]
async fn test_signed_upgrade_subscribe_and_dispatch() {
    let (listener, url) = local_server().await;
    let shutdown = ShutdownCoordinator::shared();
    let client = Arc::new(
        StreamClient::new(
            fast_config(&url).with_tickers(vec!["KXBTC-25".to_string()]),
            credentials(),
        )
        .with_shutdown(shutdown.clone()),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_message_handler(move |message| {
        let _ = tx.send(message.clone());
        Ok(())
    });

    let runner = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    let mut upgrade = accept(&listener).await;
    assert_eq!(upgrade.path, "/trade-api/ws/v2");
    assert_eq!(upgrade.headers["kalshi-access-key"], TEST_KEY_ID);
    assert!(upgrade.headers.contains_key("kalshi-access-signature"));
    let timestamp = upgrade.headers["kalshi-access-timestamp"].to_str().unwrap();
    assert!(timestamp.parse::<i64>().unwrap() > 0);

    let subscribe = next_json(&mut upgrade.socket).await;
    assert_eq!(subscribe["id"], 1);
    assert_eq!(subscribe["cmd"], "subscribe");
    assert_eq!(subscribe["params"]["channels"], json!(["ticker"]));
    assert_eq!(subscribe["params"]["tickers"], json!(["KXBTC-25"]));

    let update = json!({"type": "ticker", "sid": 1, "msg": {"market_ticker": "KXBTC-25", "yes_bid": 42}});
    upgrade
        .socket
        .send(Message::Text(update.to_string()))
        .await
        .unwrap();
    upgrade
        .socket
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();

    let received = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, update);
    assert_eq!(client.state(), StreamState::Open);

    shutdown.request_shutdown();
    let result = timeout(WAIT, runner).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(client.state(), StreamState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_resubscribes_with_next_id() {
    let (listener, url) = local_server().await;
    let shutdown = ShutdownCoordinator::shared();
    let client = Arc::new(StreamClient::new(fast_config(&url), credentials()).with_shutdown(shutdown.clone()));

    let runner = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    let mut first = accept(&listener).await;
    let subscribe = next_json(&mut first.socket).await;
    assert_eq!(subscribe["id"], 1);
    assert!(subscribe["params"].get("tickers").is_none());
    first.socket.close(None).await.unwrap();

    // a fresh session starts unsubscribed until the open hook runs again
    let mut second = accept(&listener).await;
    let subscribe = next_json(&mut second.socket).await;
    assert_eq!(subscribe["id"], 2);
    assert_eq!(subscribe["cmd"], "subscribe");
    assert_eq!(client.next_message_id(), 3);

    // dropped without a close frame
    drop(second);
    let mut third = accept(&listener).await;
    assert_eq!(next_json(&mut third.socket).await["id"], 3);

    shutdown.request_shutdown();
    assert!(timeout(WAIT, runner).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_no_reconnect_returns_connect_error() {
    let (listener, url) = local_server().await;
    drop(listener);

    let client = StreamClient::new(fast_config(&url).with_auto_reconnect(false), credentials());
    let result = timeout(WAIT, client.run()).await.unwrap();

    assert!(matches!(result, Err(StreamError::WebSocket(_))));
    assert_eq!(client.state(), StreamState::Disconnected);
}

#[tokio::test]
async fn test_no_reconnect_stops_after_server_close() {
    let (listener, url) = local_server().await;
    let client = Arc::new(StreamClient::new(fast_config(&url).with_auto_reconnect(false), credentials()));

    let runner = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    let mut upgrade = accept(&listener).await;
    next_json(&mut upgrade.socket).await;
    upgrade.socket.close(None).await.unwrap();

    assert!(timeout(WAIT, runner).await.unwrap().unwrap().is_ok());
}

#[derive(Default)]
struct CountingHooks {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

#[async_trait]
impl StreamHooks for CountingHooks {
    async fn on_open(&self, session: &StreamSession, _config: &StreamConfig) -> Result<(), StreamError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        session.subscribe_to_tickers(None).await?;
        session.unsubscribe(&[7]).await?;
        Ok(())
    }

    async fn on_close(&self, _code: Option<u16>, _reason: &str) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_custom_hooks_and_failing_handler() {
    let (listener, url) = local_server().await;
    let shutdown = ShutdownCoordinator::shared();
    let hooks = Arc::new(CountingHooks::default());
    let client = Arc::new(
        StreamClient::new(fast_config(&url), credentials())
            .with_hooks(hooks.clone())
            .with_shutdown(shutdown.clone()),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_message_handler(|_| Err(kalshi_collector::stream::HandlerError::new("boom")));
    client.add_message_handler(|_| panic!("handler panic"));
    client.add_message_handler(move |message| {
        let _ = tx.send(message["seq"].clone());
        Ok(())
    });

    let runner = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    let mut upgrade = accept(&listener).await;
    let subscribe = next_json(&mut upgrade.socket).await;
    assert_eq!(subscribe["params"]["channels"], json!(["ticker"]));
    let unsubscribe = next_json(&mut upgrade.socket).await;
    assert_eq!(unsubscribe["cmd"], "unsubscribe");
    assert_eq!(unsubscribe["params"]["sids"], json!([7]));
    assert_eq!(unsubscribe["id"], 2);

    for seq in 1..=3 {
        upgrade
            .socket
            .send(Message::Text(json!({"type": "ticker", "seq": seq}).to_string()))
            .await
            .unwrap();
    }
    for seq in 1..=3 {
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap().unwrap(), json!(seq));
    }

    upgrade.socket.close(None).await.unwrap();
    let _second = accept(&listener).await;
    assert_eq!(hooks.closes.load(Ordering::SeqCst), 1);

    shutdown.request_shutdown();
    assert!(timeout(WAIT, runner).await.unwrap().unwrap().is_ok());
    assert_eq!(hooks.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_slow_handler_drops_overflow_without_stalling_reads() {
    let (listener, url) = local_server().await;
    let hooks = Arc::new(CountingHooks::default());
    let client = Arc::new(
        StreamClient::new(
            fast_config(&url)
                .with_auto_reconnect(false)
                .with_dispatch_capacity(2),
            credentials(),
        )
        .with_hooks(hooks.clone()),
    );

    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        client.add_message_handler(move |message| {
            let seq = message["seq"].as_u64().unwrap_or(0);
            if seq == 1 {
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
            }
            seen.lock().unwrap().push(seq);
            Ok(())
        });
    }

    let runner = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.run().await }
    });

    let mut upgrade = accept(&listener).await;
    next_json(&mut upgrade.socket).await;
    next_json(&mut upgrade.socket).await;
    for seq in 1..=20 {
        upgrade
            .socket
            .send(Message::Text(json!({"type": "ticker", "seq": seq}).to_string()))
            .await
            .unwrap();
    }
    upgrade.socket.close(None).await.unwrap();

    // close reaches the hook while the first handler call is still blocked
    timeout(WAIT, async {
        while hooks.closes.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(seen.lock().unwrap().is_empty());

    release_tx.send(()).unwrap();
    assert!(timeout(WAIT, runner).await.unwrap().unwrap().is_ok());

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&1));
    assert!(seen.len() < 20, "expected overflow to be dropped, saw {seen:?}");
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}
