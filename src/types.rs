//! Core types used throughout loanwatch
//!
//! Defines the loan/alert data model and the price-pipeline wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange feed identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceName {
    Kraken,
    Coinbase,
    Bitstamp,
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceName::Kraken => write!(f, "Kraken"),
            SourceName::Coinbase => write!(f, "Coinbase"),
            SourceName::Bitstamp => write!(f, "Bitstamp"),
        }
    }
}

/// Normalized tick from one exchange feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTick {
    pub source: SourceName,
    /// BTC/USD, strictly positive
    pub price: f64,
    /// Milliseconds since epoch, local receive time
    pub timestamp: i64,
}

/// Confidence grade of an aggregated price, from source agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// Canonical output of the aggregator: one validated market price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Median across fresh sources, USD
    pub price: f64,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Sources that contributed; each name at most once
    pub sources: Vec<SourceName>,
    /// Time-weighted average over the trailing window
    pub twap_5m: f64,
    pub confidence: Confidence,
    /// True while the aggregator rejects the current excursion
    pub circuit_breaker: bool,
}

/// Direction of a threshold alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertDirection {
    Above,
    Below,
}

/// A BTC-collateralized loan under watch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    /// 48 hex chars; possession is the sole dashboard read authority
    pub token: String,
    pub loan_amount_usd: f64,
    pub btc_collateral: f64,
    /// Fraction in (0, 1), below `liquidation_ltv`
    pub margin_call_ltv: f64,
    /// Fraction in (0, 1)
    pub liquidation_ltv: f64,
    /// Opaque routing key for notifications
    pub chat_id: i64,
    #[serde(default)]
    pub interest_rate_pct: Option<f64>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lender: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Price-threshold alert. Once triggered it is terminal; re-arming
/// requires deletion and recreation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: String,
    pub token: String,
    /// USD, strictly positive
    pub threshold: f64,
    pub direction: AlertDirection,
    pub triggered: bool,
    /// Milliseconds since epoch
    pub triggered_at: Option<i64>,
}

/// LTV-threshold alert; threshold is a fraction (0.80 means 80 %)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtvAlert {
    pub id: String,
    pub token: String,
    pub threshold: f64,
    pub direction: AlertDirection,
    pub triggered: bool,
    pub triggered_at: Option<i64>,
}

/// Discrete LTV classification, presentation only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Green,
    Yellow,
    Orange,
    Red,
    Liquidation,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Green => write!(f, "GREEN"),
            RiskTier::Yellow => write!(f, "YELLOW"),
            RiskTier::Orange => write!(f, "ORANGE"),
            RiskTier::Red => write!(f, "RED"),
            RiskTier::Liquidation => write!(f, "LIQUIDATION"),
        }
    }
}

/// Kind of a system event on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemEventKind {
    PriceUpdate,
    CircuitBreaker,
    SourceDegraded,
    AlertTriggered,
}

/// System event record kept in the bus ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub kind: SystemEventKind,
    pub timestamp: i64,
    pub payload: serde_json::Value,
}
