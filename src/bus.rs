//! In-process event bus
//!
//! Typed broadcast channels connecting the oracle, the alert engine, and
//! the dashboard, plus a bounded ring of recent system events. The bus is
//! injected wherever events flow so tests stay isolated.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::types::{PriceUpdate, SourceTick, SystemEvent, SystemEventKind};

const SYSTEM_EVENT_RING_CAPACITY: usize = 1000;
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct EventBus {
    price_tx: broadcast::Sender<PriceUpdate>,
    tick_tx: broadcast::Sender<SourceTick>,
    system_tx: broadcast::Sender<SystemEvent>,
    log_tx: broadcast::Sender<String>,
    recent_events: Mutex<VecDeque<SystemEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (price_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (tick_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (system_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (log_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            price_tx,
            tick_tx,
            system_tx,
            log_tx,
            recent_events: Mutex::new(VecDeque::with_capacity(SYSTEM_EVENT_RING_CAPACITY)),
        }
    }

    pub fn subscribe_price_updates(&self) -> broadcast::Receiver<PriceUpdate> {
        self.price_tx.subscribe()
    }

    pub fn subscribe_source_ticks(&self) -> broadcast::Receiver<SourceTick> {
        self.tick_tx.subscribe()
    }

    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_tx.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.log_tx.subscribe()
    }

    /// Publish an aggregated price. No receivers is fine.
    pub fn publish_price_update(&self, update: PriceUpdate) {
        let _ = self.price_tx.send(update);
    }

    pub fn publish_source_tick(&self, tick: SourceTick) {
        let _ = self.tick_tx.send(tick);
    }

    pub fn publish_log(&self, line: impl Into<String>) {
        let _ = self.log_tx.send(line.into());
    }

    /// Record a system event in the ring and fan it out.
    pub fn publish_system_event(&self, kind: SystemEventKind, payload: serde_json::Value) {
        let event = SystemEvent {
            kind,
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload,
        };
        if let Ok(mut ring) = self.recent_events.lock() {
            if ring.len() >= SYSTEM_EVENT_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        let _ = self.system_tx.send(event);
    }

    /// Recent system events, newest last, optionally filtered by kind.
    pub fn recent_system_events(&self, kind: Option<SystemEventKind>) -> Vec<SystemEvent> {
        match self.recent_events.lock() {
            Ok(ring) => ring
                .iter()
                .filter(|e| kind.map_or(true, |k| e.kind == k))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
