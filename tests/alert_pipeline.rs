//! Alert engine scenarios driven through the public crate API.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use loanwatch::alerts::AlertEngine;
use loanwatch::bus::EventBus;
use loanwatch::notify::Notifier;
use loanwatch::store::{LoanStore, NewLoan};
use loanwatch::types::{
    AlertDirection, Confidence, PriceUpdate, SourceName, SystemEventKind,
};

struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn last_text(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _chat_id: i64, _text: &str) -> Result<()> {
        bail!("transport down")
    }
}

fn update(price: f64) -> PriceUpdate {
    PriceUpdate {
        price,
        timestamp: 1_700_000_000_000,
        sources: vec![SourceName::Kraken],
        twap_5m: price,
        confidence: Confidence::High,
        circuit_breaker: false,
    }
}

fn test_loan() -> NewLoan {
    NewLoan {
        loan_amount_usd: 50_000.0,
        btc_collateral: 1.0,
        margin_call_ltv: 0.75,
        liquidation_ltv: 0.90,
        chat_id: 7,
        interest_rate_pct: None,
        end_date: None,
        lender: None,
    }
}

fn engine_fixture(
    notifier: Arc<dyn Notifier>,
) -> (Arc<LoanStore>, Arc<EventBus>, AlertEngine) {
    let store = Arc::new(LoanStore::in_memory());
    let bus = Arc::new(EventBus::new());
    let engine = AlertEngine::new(store.clone(), notifier, bus.clone());
    (store, bus, engine)
}

#[tokio::test]
async fn price_crossing_below_fires_exactly_once() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    let alert = store
        .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
        .await
        .unwrap();

    engine.handle_update(&update(70_000.0)).await;
    engine.handle_update(&update(65_000.0)).await;
    assert_eq!(notifier.count(), 0);

    engine.handle_update(&update(58_000.0)).await;
    assert_eq!(notifier.count(), 1);
    assert!(notifier.last_text().unwrap().contains("58000.00"));

    engine.handle_update(&update(55_000.0)).await;
    assert_eq!(notifier.count(), 1);

    let alert = store.get_price_alert(&alert.id).await.unwrap();
    assert!(alert.triggered);
    assert!(alert.triggered_at.is_some());
}

#[tokio::test]
async fn above_alert_fires_while_triggered_one_stays_terminal() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    let below = store
        .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
        .await
        .unwrap();

    for price in [70_000.0, 65_000.0, 58_000.0, 55_000.0] {
        engine.handle_update(&update(price)).await;
    }
    assert_eq!(notifier.count(), 1);
    let below_after = store.get_price_alert(&below.id).await.unwrap();

    let above = store
        .create_price_alert(&loan.token, 80_000.0, AlertDirection::Above)
        .await
        .unwrap();
    engine.handle_update(&update(75_000.0)).await;
    assert_eq!(notifier.count(), 1);
    engine.handle_update(&update(82_000.0)).await;
    assert_eq!(notifier.count(), 2);

    let above = store.get_price_alert(&above.id).await.unwrap();
    assert!(above.triggered);
    // The earlier alert is untouched
    let below_final = store.get_price_alert(&below.id).await.unwrap();
    assert_eq!(below_final.triggered_at, below_after.triggered_at);
}

#[tokio::test]
async fn ltv_crossing_fires_once_on_the_crossing_tick() {
    let notifier = RecordingNotifier::new();
    let (store, bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    store
        .create_ltv_alert(&loan.token, 0.70, AlertDirection::Above)
        .await
        .unwrap();

    // LTVs: 0.50 -> 0.625 -> ~0.769
    engine.handle_update(&update(100_000.0)).await;
    assert_eq!(notifier.count(), 0);
    engine.handle_update(&update(80_000.0)).await;
    assert_eq!(notifier.count(), 0);
    engine.handle_update(&update(65_000.0)).await;
    assert_eq!(notifier.count(), 1);

    let events = bus.recent_system_events(Some(SystemEventKind::AlertTriggered));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["type"], "ltv");
    assert_eq!(events[0].payload["threshold"], 0.70);
}

#[tokio::test]
async fn alert_created_past_threshold_fires_on_first_update() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    store
        .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
        .await
        .unwrap();

    // The world is already past the threshold when the first update lands
    engine.handle_update(&update(55_000.0)).await;
    assert_eq!(notifier.count(), 1);
    engine.handle_update(&update(54_000.0)).await;
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn triggered_alert_never_refires() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    store
        .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
        .await
        .unwrap();

    for price in [70_000.0, 55_000.0, 70_000.0, 55_000.0, 70_000.0, 55_000.0] {
        engine.handle_update(&update(price)).await;
    }
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn notification_failure_leaves_alert_triggered() {
    let (store, _bus, mut engine) = engine_fixture(Arc::new(FailingNotifier));
    let loan = store.create_loan(test_loan()).await.unwrap();
    let alert = store
        .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
        .await
        .unwrap();

    engine.handle_update(&update(70_000.0)).await;
    engine.handle_update(&update(55_000.0)).await;

    let alert = store.get_price_alert(&alert.id).await.unwrap();
    assert!(alert.triggered);

    // Processing stays alive after the failure
    engine.handle_update(&update(54_000.0)).await;
}

#[tokio::test]
async fn ltv_baseline_covers_loans_without_alerts() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();

    // No alerts exist yet; the baseline is still refreshed (LTV 0.50)
    engine.handle_update(&update(100_000.0)).await;

    // With the baseline in place this alert is already past its threshold
    // and must NOT fire via the first-observation rule
    store
        .create_ltv_alert(&loan.token, 0.40, AlertDirection::Above)
        .await
        .unwrap();
    engine.handle_update(&update(100_000.0)).await;
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn zero_price_update_skips_ltv_evaluation() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    store
        .create_ltv_alert(&loan.token, 0.70, AlertDirection::Above)
        .await
        .unwrap();

    engine.handle_update(&update(0.0)).await;
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn notification_names_direction_threshold_and_observation() {
    let notifier = RecordingNotifier::new();
    let (store, _bus, mut engine) = engine_fixture(notifier.clone());
    let loan = store.create_loan(test_loan()).await.unwrap();
    store
        .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
        .await
        .unwrap();

    engine.handle_update(&update(70_000.0)).await;
    engine.handle_update(&update(58_000.0)).await;

    let text = notifier.last_text().unwrap();
    assert!(text.contains("below"));
    assert!(text.contains("60000.00"));
    assert!(text.contains("58000.00"));
    let (chat_id, _) = notifier.sent.lock().unwrap()[0].clone();
    assert_eq!(chat_id, loan.chat_id);
}
