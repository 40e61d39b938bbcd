//! Loan and alert state
//!
//! The state surface the alert engine reads from and writes back to.
//! Backed by in-memory maps with a JSON snapshot on disk; the pipeline
//! depends on neither ordering nor persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::types::{AlertDirection, Loan, LtvAlert, PriceAlert, PriceUpdate};

const SNAPSHOT_FILE: &str = "loans.json";

/// Parameters for registering a new loan.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLoan {
    pub loan_amount_usd: f64,
    pub btc_collateral: f64,
    pub margin_call_ltv: f64,
    pub liquidation_ltv: f64,
    pub chat_id: i64,
    #[serde(default)]
    pub interest_rate_pct: Option<f64>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lender: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    loans: HashMap<String, Loan>,
    price_alerts: HashMap<String, PriceAlert>,
    ltv_alerts: HashMap<String, LtvAlert>,
}

pub struct LoanStore {
    inner: RwLock<Snapshot>,
    last_price: RwLock<Option<PriceUpdate>>,
    path: Option<PathBuf>,
}

impl LoanStore {
    /// Volatile store; nothing touches disk. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Snapshot::default()),
            last_price: RwLock::new(None),
            path: None,
        }
    }

    /// Open the snapshot under `data_dir`, creating the directory if
    /// needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data dir {}", dir.display()))?;
        let path = dir.join(SNAPSHOT_FILE);
        let snapshot = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Snapshot::default()
        };
        tracing::info!(
            loans = snapshot.loans.len(),
            price_alerts = snapshot.price_alerts.len(),
            ltv_alerts = snapshot.ltv_alerts.len(),
            "loan store loaded"
        );
        Ok(Self {
            inner: RwLock::new(snapshot),
            last_price: RwLock::new(None),
            path: Some(path),
        })
    }

    pub async fn create_loan(&self, new: NewLoan) -> Result<Loan> {
        if new.loan_amount_usd <= 0.0 {
            bail!("loan amount must be positive");
        }
        if new.btc_collateral <= 0.0 {
            bail!("collateral must be positive");
        }
        if new.margin_call_ltv <= 0.0 || new.margin_call_ltv >= 1.0 {
            bail!("margin-call LTV must be in (0, 1)");
        }
        if new.liquidation_ltv <= 0.0 || new.liquidation_ltv >= 1.0 {
            bail!("liquidation LTV must be in (0, 1)");
        }
        if new.liquidation_ltv <= new.margin_call_ltv {
            bail!("liquidation LTV must exceed margin-call LTV");
        }

        let loan = Loan {
            token: generate_token(),
            loan_amount_usd: new.loan_amount_usd,
            btc_collateral: new.btc_collateral,
            margin_call_ltv: new.margin_call_ltv,
            liquidation_ltv: new.liquidation_ltv,
            chat_id: new.chat_id,
            interest_rate_pct: new.interest_rate_pct,
            end_date: new.end_date,
            lender: new.lender,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .loans
            .insert(loan.token.clone(), loan.clone());
        self.persist().await;
        Ok(loan)
    }

    pub async fn get_loan(&self, token: &str) -> Option<Loan> {
        self.inner.read().await.loans.get(token).cloned()
    }

    pub async fn get_all_loans(&self) -> Vec<Loan> {
        self.inner.read().await.loans.values().cloned().collect()
    }

    /// Removes the loan and every alert attached to it.
    pub async fn delete_loan(&self, token: &str) -> bool {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner.loans.remove(token).is_some();
            if removed {
                inner.price_alerts.retain(|_, a| a.token != token);
                inner.ltv_alerts.retain(|_, a| a.token != token);
            }
            removed
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn create_price_alert(
        &self,
        token: &str,
        threshold: f64,
        direction: AlertDirection,
    ) -> Result<PriceAlert> {
        if threshold <= 0.0 {
            bail!("alert threshold must be positive");
        }
        let alert = {
            let mut inner = self.inner.write().await;
            if !inner.loans.contains_key(token) {
                bail!("unknown loan token");
            }
            let alert = PriceAlert {
                id: generate_alert_id(),
                token: token.to_string(),
                threshold,
                direction,
                triggered: false,
                triggered_at: None,
            };
            inner.price_alerts.insert(alert.id.clone(), alert.clone());
            alert
        };
        self.persist().await;
        Ok(alert)
    }

    pub async fn create_ltv_alert(
        &self,
        token: &str,
        threshold: f64,
        direction: AlertDirection,
    ) -> Result<LtvAlert> {
        if threshold <= 0.0 {
            bail!("alert threshold must be positive");
        }
        let alert = {
            let mut inner = self.inner.write().await;
            if !inner.loans.contains_key(token) {
                bail!("unknown loan token");
            }
            let alert = LtvAlert {
                id: generate_alert_id(),
                token: token.to_string(),
                threshold,
                direction,
                triggered: false,
                triggered_at: None,
            };
            inner.ltv_alerts.insert(alert.id.clone(), alert.clone());
            alert
        };
        self.persist().await;
        Ok(alert)
    }

    pub async fn get_all_price_alerts(&self) -> Vec<PriceAlert> {
        self.inner.read().await.price_alerts.values().cloned().collect()
    }

    pub async fn get_all_ltv_alerts(&self) -> Vec<LtvAlert> {
        self.inner.read().await.ltv_alerts.values().cloned().collect()
    }

    pub async fn get_price_alert(&self, id: &str) -> Option<PriceAlert> {
        self.inner.read().await.price_alerts.get(id).cloned()
    }

    pub async fn get_ltv_alert(&self, id: &str) -> Option<LtvAlert> {
        self.inner.read().await.ltv_alerts.get(id).cloned()
    }

    pub async fn delete_price_alert(&self, id: &str) -> bool {
        let removed = self.inner.write().await.price_alerts.remove(id).is_some();
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn delete_ltv_alert(&self, id: &str) -> bool {
        let removed = self.inner.write().await.ltv_alerts.remove(id).is_some();
        if removed {
            self.persist().await;
        }
        removed
    }

    pub async fn mark_price_alert_triggered(&self, id: &str, at: i64) -> bool {
        let marked = {
            let mut inner = self.inner.write().await;
            match inner.price_alerts.get_mut(id) {
                Some(alert) => {
                    alert.triggered = true;
                    alert.triggered_at = Some(at);
                    true
                }
                None => false,
            }
        };
        if marked {
            self.persist().await;
        }
        marked
    }

    pub async fn mark_ltv_alert_triggered(&self, id: &str, at: i64) -> bool {
        let marked = {
            let mut inner = self.inner.write().await;
            match inner.ltv_alerts.get_mut(id) {
                Some(alert) => {
                    alert.triggered = true;
                    alert.triggered_at = Some(at);
                    true
                }
                None => false,
            }
        };
        if marked {
            self.persist().await;
        }
        marked
    }

    pub async fn set_last_price(&self, update: PriceUpdate) {
        *self.last_price.write().await = Some(update);
    }

    pub async fn get_last_price(&self) -> Option<PriceUpdate> {
        self.last_price.read().await.clone()
    }

    /// Write the snapshot to disk. No-op for in-memory stores.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let inner = self.inner.read().await;
        let json = serde_json::to_string_pretty(&*inner)
            .context("Failed to serialize loan snapshot")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            tracing::warn!(error = %e, "loan snapshot write failed");
        }
    }
}

/// 48 hex chars; possession of the token is the sole dashboard read
/// authority.
fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn generate_alert_id() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_loan() -> NewLoan {
        NewLoan {
            loan_amount_usd: 50_000.0,
            btc_collateral: 1.0,
            margin_call_ltv: 0.75,
            liquidation_ltv: 0.90,
            chat_id: 7,
            interest_rate_pct: Some(12.5),
            end_date: None,
            lender: Some("Acme Lending".to_string()),
        }
    }

    #[tokio::test]
    async fn creates_loan_with_48_hex_token() {
        let store = LoanStore::in_memory();
        let loan = store.create_loan(new_loan()).await.unwrap();
        assert_eq!(loan.token.len(), 48);
        assert!(loan.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.get_loan(&loan.token).await.is_some());
    }

    #[tokio::test]
    async fn rejects_invalid_loans() {
        let store = LoanStore::in_memory();

        let mut bad = new_loan();
        bad.loan_amount_usd = 0.0;
        assert!(store.create_loan(bad).await.is_err());

        let mut bad = new_loan();
        bad.margin_call_ltv = 1.2;
        assert!(store.create_loan(bad).await.is_err());

        // Inverted thresholds
        let mut bad = new_loan();
        bad.margin_call_ltv = 0.90;
        bad.liquidation_ltv = 0.75;
        assert!(store.create_loan(bad).await.is_err());
    }

    #[tokio::test]
    async fn rejects_alerts_for_unknown_loans_and_bad_thresholds() {
        let store = LoanStore::in_memory();
        assert!(store
            .create_price_alert("deadbeef", 60_000.0, AlertDirection::Below)
            .await
            .is_err());

        let loan = store.create_loan(new_loan()).await.unwrap();
        assert!(store
            .create_price_alert(&loan.token, 0.0, AlertDirection::Below)
            .await
            .is_err());
        assert!(store
            .create_ltv_alert(&loan.token, -0.5, AlertDirection::Above)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn deleting_a_loan_cascades_its_alerts() {
        let store = LoanStore::in_memory();
        let loan = store.create_loan(new_loan()).await.unwrap();
        store
            .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
            .await
            .unwrap();
        store
            .create_ltv_alert(&loan.token, 0.70, AlertDirection::Above)
            .await
            .unwrap();

        assert!(store.delete_loan(&loan.token).await);
        assert!(store.get_all_price_alerts().await.is_empty());
        assert!(store.get_all_ltv_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn marks_alert_triggered() {
        let store = LoanStore::in_memory();
        let loan = store.create_loan(new_loan()).await.unwrap();
        let alert = store
            .create_price_alert(&loan.token, 60_000.0, AlertDirection::Below)
            .await
            .unwrap();

        assert!(store.mark_price_alert_triggered(&alert.id, 1234).await);
        let alert = store.get_price_alert(&alert.id).await.unwrap();
        assert!(alert.triggered);
        assert_eq!(alert.triggered_at, Some(1234));
    }

    #[tokio::test]
    async fn snapshot_round_trips_across_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "loanwatch-store-test-{:016x}",
            rand::thread_rng().gen::<u64>()
        ));

        let token = {
            let store = LoanStore::open(&dir).unwrap();
            let loan = store.create_loan(new_loan()).await.unwrap();
            store
                .create_ltv_alert(&loan.token, 0.70, AlertDirection::Above)
                .await
                .unwrap();
            loan.token
        };

        let store = LoanStore::open(&dir).unwrap();
        let loan = store.get_loan(&token).await.unwrap();
        assert_eq!(loan.lender.as_deref(), Some("Acme Lending"));
        assert_eq!(store.get_all_ltv_alerts().await.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
