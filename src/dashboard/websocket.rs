//! WebSocket broadcaster
//!
//! Rebroadcasts each `price:update` verbatim to connected dashboard
//! clients. Slow clients miss frames rather than exert backpressure.

use tokio::sync::broadcast;

use super::types::WsMessage;
use crate::types::PriceUpdate;

#[derive(Debug, Clone)]
pub struct DashboardBroadcaster {
    tx: broadcast::Sender<String>,
}

impl DashboardBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn broadcast_price(&self, update: &PriceUpdate) {
        if let Ok(json) = serde_json::to_string(&WsMessage::Price(update.clone())) {
            // No receivers is fine
            let _ = self.tx.send(json);
        }
    }
}

impl Default for DashboardBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, SourceName};

    #[tokio::test]
    async fn price_frame_has_the_wire_shape() {
        let broadcaster = DashboardBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast_price(&PriceUpdate {
            price: 68_000.0,
            timestamp: 42,
            sources: vec![SourceName::Kraken, SourceName::Bitstamp],
            twap_5m: 67_900.0,
            confidence: Confidence::Medium,
            circuit_breaker: false,
        });

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "price");
        assert_eq!(value["data"]["price"], 68_000.0);
        assert_eq!(value["data"]["confidence"], "MEDIUM");
    }
}
