//! Bitstamp WebSocket feed
//!
//! Live trades channel for btcusd. The price field has shipped as both a
//! JSON number and a numeric string across schema revisions; both are
//! accepted.

use serde_json::Value;

use super::ExchangeFeed;
use crate::types::SourceName;

pub struct BitstampFeed;

impl ExchangeFeed for BitstampFeed {
    fn name(&self) -> SourceName {
        SourceName::Bitstamp
    }

    fn url(&self) -> &'static str {
        "wss://ws.bitstamp.net"
    }

    fn subscribe_frame(&self) -> String {
        serde_json::json!({
            "event": "bts:subscribe",
            "data": { "channel": "live_trades_btcusd" }
        })
        .to_string()
    }

    fn parse_price(&self, text: &str) -> Option<f64> {
        parse_trade(text)
    }
}

fn parse_trade(text: &str) -> Option<f64> {
    let msg: Value = serde_json::from_str(text).ok()?;
    if msg.get("event")?.as_str()? != "trade" {
        return None;
    }
    if msg.get("channel")?.as_str()? != "live_trades_btcusd" {
        return None;
    }
    let raw = msg.get("data")?.get("price")?;
    let price = raw
        .as_f64()
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))?;
    (price > 0.0).then_some(price)
}
