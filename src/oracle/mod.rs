//! Oracle service
//!
//! Owns the three exchange feeds and the aggregator. An ingest task moves
//! bus ticks into the aggregator's freshness map; a poll task asks the
//! aggregator for a validated update on a fixed period and publishes it.

pub mod aggregator;
pub mod sources;

pub use aggregator::PriceAggregator;
pub use sources::SourceHealth;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::config::OracleConfig;
use crate::types::{PriceUpdate, SystemEventKind};
use sources::{BitstampFeed, CoinbaseFeed, KrakenFeed, SourceHandle, SourceStateHandle};

/// Cloneable read-only view of the feeds for the dashboard.
#[derive(Clone)]
pub struct OracleHealth {
    feeds: Vec<SourceStateHandle>,
    staleness_ms: i64,
}

impl OracleHealth {
    pub fn snapshot(&self) -> Vec<SourceHealth> {
        self.feeds
            .iter()
            .map(|f| f.snapshot(self.staleness_ms))
            .collect()
    }
}

pub struct OracleService {
    config: OracleConfig,
    bus: Arc<EventBus>,
    aggregator: Arc<Mutex<PriceAggregator>>,
    sources: Vec<SourceHandle>,
    last_update: Arc<RwLock<Option<PriceUpdate>>>,
    ingest_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl OracleService {
    pub fn new(config: OracleConfig, bus: Arc<EventBus>) -> Self {
        let aggregator = Arc::new(Mutex::new(PriceAggregator::from_config(&config)));
        Self {
            config,
            bus,
            aggregator,
            sources: Vec::new(),
            last_update: Arc::new(RwLock::new(None)),
            ingest_task: None,
            poll_task: None,
        }
    }

    /// Start the feeds and the periodic aggregation. Idempotent.
    pub fn start(&mut self) {
        if self.poll_task.is_some() {
            return;
        }

        let reconnect_delay = Duration::from_millis(self.config.reconnect_delay_ms);
        self.sources = vec![
            SourceHandle::spawn(KrakenFeed, self.bus.clone(), reconnect_delay),
            SourceHandle::spawn(CoinbaseFeed, self.bus.clone(), reconnect_delay),
            SourceHandle::spawn(BitstampFeed, self.bus.clone(), reconnect_delay),
        ];

        let aggregator = self.aggregator.clone();
        let mut ticks = self.bus.subscribe_source_ticks();
        self.ingest_task = Some(tokio::spawn(async move {
            loop {
                match ticks.recv().await {
                    Ok(tick) => {
                        aggregator
                            .lock()
                            .await
                            .ingest_tick(tick.source, tick.price, tick.timestamp);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "tick ingest lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        let aggregator = self.aggregator.clone();
        let bus = self.bus.clone();
        let last_update = self.last_update.clone();
        let min_sources = self.config.min_sources;
        let period = Duration::from_millis(self.config.price_poll_interval_ms);
        self.poll_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let update = aggregator.lock().await.compute_update();
                let Some(update) = update else { continue };

                *last_update.write().await = Some(update.clone());

                bus.publish_system_event(
                    SystemEventKind::PriceUpdate,
                    json!({
                        "price": update.price,
                        "sources": update.sources,
                        "confidence": update.confidence,
                    }),
                );
                if update.circuit_breaker {
                    bus.publish_system_event(
                        SystemEventKind::CircuitBreaker,
                        json!({ "price": update.price }),
                    );
                }
                if update.sources.len() < min_sources {
                    bus.publish_system_event(
                        SystemEventKind::SourceDegraded,
                        json!({
                            "active": update.sources.len(),
                            "min": min_sources,
                        }),
                    );
                }
                bus.publish_price_update(update);
            }
        }));

        tracing::info!(
            poll_ms = self.config.price_poll_interval_ms,
            sources = self.sources.len(),
            "oracle started"
        );
        self.bus.publish_log("oracle started");
    }

    /// Cancel the poll and ingest tasks, then stop every feed.
    pub fn stop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.ingest_task.take() {
            task.abort();
        }
        for source in &mut self.sources {
            source.stop();
        }
        tracing::info!("oracle stopped");
        self.bus.publish_log("oracle stopped");
    }

    pub async fn last_update(&self) -> Option<PriceUpdate> {
        self.last_update.read().await.clone()
    }

    pub fn health(&self) -> OracleHealth {
        OracleHealth {
            feeds: self.sources.iter().map(|s| s.state_handle()).collect(),
            staleness_ms: self.config.staleness_ms,
        }
    }
}

impl Drop for OracleService {
    fn drop(&mut self) {
        self.stop();
    }
}
