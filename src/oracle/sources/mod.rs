//! Exchange feeds (Kraken, Coinbase, Bitstamp)
//!
//! Each feed keeps one streaming connection to its exchange and publishes
//! a tick per parsed message. Transport failures stay contained here: the
//! connection loop reconnects on a fixed cadence, and only parsed,
//! strictly positive prices ever leave this module.

mod bitstamp;
mod coinbase;
mod kraken;

pub use bitstamp::BitstampFeed;
pub use coinbase::CoinbaseFeed;
pub use kraken::KrakenFeed;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::bus::EventBus;
use crate::types::{SourceName, SourceTick};

/// Connection phase of a feed. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Disconnected,
    Connecting,
    Subscribed,
    Stopped,
}

impl FeedPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedPhase::Disconnected => "DISCONNECTED",
            FeedPhase::Connecting => "CONNECTING",
            FeedPhase::Subscribed => "SUBSCRIBED",
            FeedPhase::Stopped => "STOPPED",
        }
    }
}

/// Wire behavior of one exchange: where to connect, what to send, and how
/// to pull a BTC/USD price out of an inbound frame.
pub trait ExchangeFeed: Send + Sync + 'static {
    fn name(&self) -> SourceName;
    fn url(&self) -> &'static str;
    fn subscribe_frame(&self) -> String;
    /// Extract a strictly positive USD price, or None for everything else
    /// (heartbeats, acks, schema variants, malformed frames).
    fn parse_price(&self, text: &str) -> Option<f64>;
}

#[derive(Debug)]
pub struct FeedState {
    pub phase: FeedPhase,
    pub last_price: f64,
    pub last_tick_ms: i64,
}

/// Per-source health row for the dashboard.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceHealth {
    pub source: String,
    pub phase: String,
    pub last_price: f64,
    pub last_tick_ms: i64,
    pub tick_age_ms: i64,
    pub stale: bool,
}

/// Cloneable read-only view of one feed's state.
#[derive(Clone)]
pub struct SourceStateHandle {
    name: SourceName,
    state: Arc<RwLock<FeedState>>,
}

impl SourceStateHandle {
    pub fn name(&self) -> SourceName {
        self.name
    }

    pub fn snapshot(&self, staleness_ms: i64) -> SourceHealth {
        let now = chrono::Utc::now().timestamp_millis();
        let (phase, last_price, last_tick_ms) = match self.state.read() {
            Ok(s) => (s.phase, s.last_price, s.last_tick_ms),
            Err(_) => (FeedPhase::Disconnected, 0.0, 0),
        };
        let tick_age_ms = if last_tick_ms > 0 {
            now.saturating_sub(last_tick_ms)
        } else {
            i64::MAX
        };
        SourceHealth {
            source: self.name.to_string(),
            phase: phase.as_str().to_string(),
            last_price,
            last_tick_ms,
            tick_age_ms,
            stale: tick_age_ms >= staleness_ms,
        }
    }
}

/// Handle to a running feed task. The task owns its connection and
/// reconnect timer exclusively; `stop` guarantees no tick is published
/// afterwards.
pub struct SourceHandle {
    name: SourceName,
    state: Arc<RwLock<FeedState>>,
    task: Option<JoinHandle<()>>,
}

impl SourceHandle {
    pub fn spawn<F: ExchangeFeed>(
        feed: F,
        bus: Arc<EventBus>,
        reconnect_delay: Duration,
    ) -> Self {
        let name = feed.name();
        let state = Arc::new(RwLock::new(FeedState {
            phase: FeedPhase::Disconnected,
            last_price: 0.0,
            last_tick_ms: 0,
        }));
        let task_state = state.clone();
        let task = tokio::spawn(run_feed(feed, task_state, bus, reconnect_delay));
        Self {
            name,
            state,
            task: Some(task),
        }
    }

    pub fn name(&self) -> SourceName {
        self.name
    }

    pub fn phase(&self) -> FeedPhase {
        self.state.read().map(|s| s.phase).unwrap_or(FeedPhase::Disconnected)
    }

    pub fn last_price(&self) -> Option<f64> {
        self.state
            .read()
            .ok()
            .and_then(|s| (s.last_price > 0.0).then_some(s.last_price))
    }

    /// A feed that has never ticked is stale.
    pub fn is_stale(&self, max_age_ms: i64) -> bool {
        let last_tick_ms = self.state.read().map(|s| s.last_tick_ms).unwrap_or(0);
        last_tick_ms == 0
            || chrono::Utc::now().timestamp_millis() - last_tick_ms >= max_age_ms
    }

    pub fn state_handle(&self) -> SourceStateHandle {
        SourceStateHandle {
            name: self.name,
            state: self.state.clone(),
        }
    }

    /// Cancels any pending reconnect and detaches the connection. The
    /// phase flag flips under the state lock before the abort, and the
    /// publish path checks it under the same lock, so no tick can land
    /// after this returns.
    pub fn stop(&mut self) {
        if let Ok(mut s) = self.state.write() {
            s.phase = FeedPhase::Stopped;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_feed<F: ExchangeFeed>(
    feed: F,
    state: Arc<RwLock<FeedState>>,
    bus: Arc<EventBus>,
    reconnect_delay: Duration,
) {
    let name = feed.name();
    loop {
        set_phase(&state, FeedPhase::Connecting);
        tracing::info!(source = %name, url = %feed.url(), "connecting");

        match connect_async(feed.url()).await {
            Ok((ws_stream, _)) => {
                let (mut write, mut read) = ws_stream.split();
                match write.send(Message::Text(feed.subscribe_frame())).await {
                    Ok(()) => {
                        set_phase(&state, FeedPhase::Subscribed);
                        tracing::info!(source = %name, "subscribed");

                        while let Some(msg) = read.next().await {
                            match msg {
                                Ok(Message::Text(text)) => {
                                    // Malformed frames are dropped; they never
                                    // tear down the connection
                                    if let Some(price) = feed.parse_price(&text) {
                                        publish_tick(&state, &bus, name, price);
                                    }
                                }
                                Ok(Message::Ping(data)) => {
                                    let _ = write.send(Message::Pong(data)).await;
                                }
                                Ok(Message::Close(_)) => {
                                    tracing::warn!(source = %name, "connection closed by server");
                                    break;
                                }
                                Err(e) => {
                                    tracing::warn!(source = %name, error = %e, "websocket error");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(source = %name, error = %e, "subscribe failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "connection failed");
            }
        }

        set_phase(&state, FeedPhase::Disconnected);
        tracing::info!(
            source = %name,
            delay_secs = reconnect_delay.as_secs(),
            "reconnecting after delay"
        );
        tokio::time::sleep(reconnect_delay).await;
    }
}

fn set_phase(state: &Arc<RwLock<FeedState>>, phase: FeedPhase) {
    if let Ok(mut s) = state.write() {
        if s.phase != FeedPhase::Stopped {
            s.phase = phase;
        }
    }
}

fn publish_tick(
    state: &Arc<RwLock<FeedState>>,
    bus: &Arc<EventBus>,
    name: SourceName,
    price: f64,
) {
    let now = chrono::Utc::now().timestamp_millis();
    if let Ok(mut s) = state.write() {
        if s.phase == FeedPhase::Stopped {
            return;
        }
        s.last_price = price;
        s.last_tick_ms = now;
        bus.publish_source_tick(SourceTick {
            source: name,
            price,
            timestamp: now,
        });
    }
}
