//! Coinbase Exchange WebSocket feed
//!
//! Ticker channel for BTC-USD on the public exchange feed.

use serde_json::Value;

use super::ExchangeFeed;
use crate::types::SourceName;

pub struct CoinbaseFeed;

impl ExchangeFeed for CoinbaseFeed {
    fn name(&self) -> SourceName {
        SourceName::Coinbase
    }

    fn url(&self) -> &'static str {
        "wss://ws-feed.exchange.coinbase.com"
    }

    fn subscribe_frame(&self) -> String {
        serde_json::json!({
            "type": "subscribe",
            "product_ids": ["BTC-USD"],
            "channels": ["ticker"]
        })
        .to_string()
    }

    fn parse_price(&self, text: &str) -> Option<f64> {
        parse_ticker(text)
    }
}

fn parse_ticker(text: &str) -> Option<f64> {
    let msg: Value = serde_json::from_str(text).ok()?;
    if msg.get("type")?.as_str()? != "ticker" {
        return None;
    }
    if msg.get("product_id")?.as_str()? != "BTC-USD" {
        return None;
    }
    let price: f64 = msg.get("price")?.as_str()?.parse().ok()?;
    (price > 0.0).then_some(price)
}
