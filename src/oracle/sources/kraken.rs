//! Kraken WebSocket feed
//!
//! Public ticker channel for XBT/USD. Ticker payloads arrive as array
//! messages; everything else on the socket (heartbeats, subscription
//! status) is an event object and is dropped.

use serde_json::Value;

use super::ExchangeFeed;
use crate::types::SourceName;

pub struct KrakenFeed;

impl ExchangeFeed for KrakenFeed {
    fn name(&self) -> SourceName {
        SourceName::Kraken
    }

    fn url(&self) -> &'static str {
        "wss://ws.kraken.com"
    }

    fn subscribe_frame(&self) -> String {
        serde_json::json!({
            "event": "subscribe",
            "pair": ["XBT/USD"],
            "subscription": { "name": "ticker" }
        })
        .to_string()
    }

    fn parse_price(&self, text: &str) -> Option<f64> {
        parse_ticker(text)
    }
}

/// Shape: `[channelID, {"c": ["<last>", ...], ...}, "ticker", "XBT/USD"]`.
/// The price is the last-trade close `c[0]`.
fn parse_ticker(text: &str) -> Option<f64> {
    let msg: Value = serde_json::from_str(text).ok()?;
    let arr = msg.as_array()?;
    if arr.get(2)?.as_str()? != "ticker" {
        return None;
    }
    let price: f64 = arr.get(1)?.get("c")?.get(0)?.as_str()?.parse().ok()?;
    (price > 0.0).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER: &str = r#"[340,{"a":["68001.10000",1,"1.000"],"b":["67999.90000",2,"2.000"],"c":["68000.50000","0.00500000"],"v":["100.1","2000.5"],"p":["67900.1","67800.2"],"t":[100,2000],"l":["67000.0","66000.0"],"h":["69000.0","69500.0"],"o":["67500.0","67400.0"]},"ticker","XBT/USD"]"#;

    #[test]
    fn parses_ticker_close_price() {
        assert_eq!(parse_ticker(TICKER), Some(68_000.5));
    }

    #[test]
    fn drops_heartbeats_and_status_events() {
        assert_eq!(parse_ticker(r#"{"event":"heartbeat"}"#), None);
        assert_eq!(
            parse_ticker(
                r#"{"event":"subscriptionStatus","status":"subscribed","pair":"XBT/USD","channelName":"ticker"}"#
            ),
            None
        );
    }

    #[test]
    fn drops_other_channels() {
        let spread = TICKER.replace(r#""ticker","XBT/USD""#, r#""spread","XBT/USD""#);
        assert_eq!(parse_ticker(&spread), None);
    }

    #[test]
    fn drops_non_positive_and_malformed() {
        let zero = TICKER.replace("68000.50000", "0.00000");
        assert_eq!(parse_ticker(&zero), None);
        assert_eq!(parse_ticker("not json"), None);
        assert_eq!(parse_ticker("[1,2]"), None);
    }
}
