//! Outbound command frames

use serde_json::{json, Map, Value};

/// Market ticker update channel
pub const TICKER_CHANNEL: &str = "ticker";

/// `{"id": n, "cmd": "subscribe", "params": {"channels": [...], "tickers": [...]}}`
///
/// `tickers` is left out when `None` or empty, which subscribes to every market.
pub fn subscribe_command(id: u64, channels: &[String], tickers: Option<&[String]>) -> Value {
    let mut params = Map::new();
    params.insert("channels".to_string(), json!(channels));
    if let Some(tickers) = tickers.filter(|t| !t.is_empty()) {
        params.insert("tickers".to_string(), json!(tickers));
    }

    json!({
        "id": id,
        "cmd": "subscribe",
        "params": params,
    })
}

/// `{"id": n, "cmd": "unsubscribe", "params": {"sids": [...]}}`
pub fn unsubscribe_command(id: u64, sids: &[u64]) -> Value {
    json!({
        "id": id,
        "cmd": "unsubscribe",
        "params": { "sids": sids },
    })
}
