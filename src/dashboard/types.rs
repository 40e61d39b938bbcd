//! Dashboard response types

use serde::Serialize;

use crate::types::{PriceUpdate, RiskTier};

/// Standard API envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Loan snapshot for `GET /api/loan/:token`
#[derive(Debug, Clone, Serialize)]
pub struct LoanStatusResponse {
    pub token: String,
    pub loan_amount_usd: f64,
    pub btc_collateral: f64,
    pub margin_call_ltv: f64,
    pub liquidation_ltv: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lender: Option<String>,
    pub margin_call_price: f64,
    pub liquidation_price: f64,
    /// Absent until the oracle has produced a price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub btc_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ltv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<RiskTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_updated_at: Option<i64>,
}

/// Frame pushed to `/ws` clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WsMessage {
    Price(PriceUpdate),
}
