//! Alert engine
//!
//! Consumes the ordered `price:update` stream and performs edge-triggered
//! threshold detection: price alerts against the update price, LTV alerts
//! against each loan's derived loan-to-value. An alert fires at most once;
//! re-arming requires deleting and recreating it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::notify::Notifier;
use crate::store::LoanStore;
use crate::types::{AlertDirection, LtvAlert, PriceAlert, PriceUpdate, SystemEventKind};

pub struct AlertEngine {
    store: Arc<LoanStore>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<EventBus>,
    previous_price: f64,
    previous_ltv: HashMap<String, f64>,
}

impl AlertEngine {
    pub fn new(store: Arc<LoanStore>, notifier: Arc<dyn Notifier>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            notifier,
            bus,
            previous_price: 0.0,
            previous_ltv: HashMap::new(),
        }
    }

    /// Run the engine as the sole consumer of `price:update`. Each update
    /// is handled to completion, in publication order.
    pub fn spawn(mut self) -> JoinHandle<()> {
        let mut updates = self.bus.subscribe_price_updates();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => self.handle_update(&update).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "alert engine lagged behind price updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// One full sweep over both alert families for a single update.
    /// `previous_price` moves only after both sweeps.
    pub async fn handle_update(&mut self, update: &PriceUpdate) {
        self.sweep_price_alerts(update).await;
        self.sweep_ltv_alerts(update).await;
        self.refresh_ltv_baseline(update.price).await;
        self.previous_price = update.price;
    }

    async fn sweep_price_alerts(&self, update: &PriceUpdate) {
        let prev = self.previous_price;
        let curr = update.price;

        for alert in self.store.get_all_price_alerts().await {
            if alert.triggered {
                continue;
            }
            let crossed = match alert.direction {
                AlertDirection::Below => crossed_below(prev, curr, alert.threshold),
                AlertDirection::Above => crossed_above(prev, curr, alert.threshold),
            };
            if !crossed {
                continue;
            }
            let Some(loan) = self.store.get_loan(&alert.token).await else {
                continue;
            };

            // Mark before send: a lost notification must not re-arm
            let now = chrono::Utc::now().timestamp_millis();
            self.store.mark_price_alert_triggered(&alert.id, now).await;
            self.dispatch(loan.chat_id, price_alert_text(&alert, curr)).await;
            self.bus.publish_system_event(
                SystemEventKind::AlertTriggered,
                json!({
                    "type": "price",
                    "alert_id": alert.id,
                    "value": curr,
                    "threshold": alert.threshold,
                }),
            );
            tracing::info!(
                alert_id = %alert.id,
                threshold = alert.threshold,
                price = curr,
                "price alert triggered"
            );
        }
    }

    async fn sweep_ltv_alerts(&self, update: &PriceUpdate) {
        for alert in self.store.get_all_ltv_alerts().await {
            if alert.triggered {
                continue;
            }
            let Some(loan) = self.store.get_loan(&alert.token).await else {
                continue;
            };
            let collateral_value = loan.btc_collateral * update.price;
            if collateral_value <= 0.0 {
                continue;
            }
            let curr = loan.loan_amount_usd / collateral_value;
            let prev = self.previous_ltv.get(&alert.token).copied().unwrap_or(0.0);

            let crossed = match alert.direction {
                AlertDirection::Below => crossed_below(prev, curr, alert.threshold),
                AlertDirection::Above => crossed_above(prev, curr, alert.threshold),
            };
            if !crossed {
                continue;
            }

            let now = chrono::Utc::now().timestamp_millis();
            self.store.mark_ltv_alert_triggered(&alert.id, now).await;
            self.dispatch(loan.chat_id, ltv_alert_text(&alert, curr)).await;
            self.bus.publish_system_event(
                SystemEventKind::AlertTriggered,
                json!({
                    "type": "ltv",
                    "alert_id": alert.id,
                    "value": curr,
                    "threshold": alert.threshold,
                }),
            );
            tracing::info!(
                alert_id = %alert.id,
                threshold = alert.threshold,
                ltv = curr,
                "LTV alert triggered"
            );
        }
    }

    /// Refresh the LTV baseline for every loan, not only loans with
    /// alerts, so a newly created alert has a valid previous value on the
    /// next tick.
    async fn refresh_ltv_baseline(&mut self, price: f64) {
        for loan in self.store.get_all_loans().await {
            let collateral_value = loan.btc_collateral * price;
            if collateral_value > 0.0 {
                self.previous_ltv
                    .insert(loan.token.clone(), loan.loan_amount_usd / collateral_value);
            }
        }
    }

    async fn dispatch(&self, chat_id: i64, text: String) {
        if let Err(e) = self.notifier.notify(chat_id, &text).await {
            tracing::warn!(error = %e, chat_id, "notification delivery failed");
        }
    }
}

/// A downward crossing. The first observation (`prev == 0`) acts as a
/// fresh boundary.
pub fn crossed_below(prev: f64, curr: f64, threshold: f64) -> bool {
    (prev > 0.0 && prev >= threshold && curr < threshold)
        || (prev == 0.0 && curr < threshold)
}

/// An upward crossing, mirror of [`crossed_below`].
pub fn crossed_above(prev: f64, curr: f64, threshold: f64) -> bool {
    (prev > 0.0 && prev <= threshold && curr > threshold)
        || (prev == 0.0 && curr > threshold)
}

fn price_alert_text(alert: &PriceAlert, price: f64) -> String {
    match alert.direction {
        AlertDirection::Below => format!(
            "🔔 *BTC price alert*\nPrice fell below ${:.2}\nCurrent price: ${:.2}",
            alert.threshold, price
        ),
        AlertDirection::Above => format!(
            "🔔 *BTC price alert*\nPrice rose above ${:.2}\nCurrent price: ${:.2}",
            alert.threshold, price
        ),
    }
}

fn ltv_alert_text(alert: &LtvAlert, ltv: f64) -> String {
    match alert.direction {
        AlertDirection::Above => format!(
            "⚠️ *LTV alert*\nLTV rose above {:.1}%\nCurrent LTV: {:.1}%",
            alert.threshold * 100.0,
            ltv * 100.0
        ),
        AlertDirection::Below => format!(
            "✅ *LTV alert*\nLTV fell below {:.1}%\nCurrent LTV: {:.1}%",
            alert.threshold * 100.0,
            ltv * 100.0
        ),
    }
}
