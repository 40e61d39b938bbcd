//! LTV arithmetic and risk classification
//!
//! Presentation-layer helpers: the alert engine derives LTV inline, the
//! dashboard renders these.

use crate::types::{Loan, RiskTier};

/// `loan_amount / (collateral × price)`. None when the collateral value is
/// not strictly positive.
pub fn current_ltv(loan: &Loan, btc_price: f64) -> Option<f64> {
    let collateral_value = loan.btc_collateral * btc_price;
    (collateral_value > 0.0).then(|| loan.loan_amount_usd / collateral_value)
}

/// BTC price at which the loan reaches its margin-call LTV.
pub fn margin_call_price(loan: &Loan) -> f64 {
    loan.loan_amount_usd / (loan.btc_collateral * loan.margin_call_ltv)
}

/// BTC price at which the loan reaches its liquidation LTV.
pub fn liquidation_price(loan: &Loan) -> f64 {
    loan.loan_amount_usd / (loan.btc_collateral * loan.liquidation_ltv)
}

/// Tier boundaries scale with the loan's own thresholds.
pub fn risk_tier(loan: &Loan, ltv: f64) -> RiskTier {
    if ltv >= loan.liquidation_ltv {
        RiskTier::Liquidation
    } else if ltv >= loan.margin_call_ltv {
        RiskTier::Red
    } else if ltv >= loan.margin_call_ltv * 0.9 {
        RiskTier::Orange
    } else if ltv >= loan.margin_call_ltv * 0.75 {
        RiskTier::Yellow
    } else {
        RiskTier::Green
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn loan() -> Loan {
        Loan {
            token: "ab".repeat(24),
            loan_amount_usd: 50_000.0,
            btc_collateral: 1.0,
            margin_call_ltv: 0.75,
            liquidation_ltv: 0.90,
            chat_id: 7,
            interest_rate_pct: None,
            end_date: None,
            lender: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ltv_at_parity() {
        let loan = loan();
        let ltv = current_ltv(&loan, 100_000.0).unwrap();
        assert!((ltv - 0.5).abs() < 1e-12);
        assert!((margin_call_price(&loan) - 66_666.666_666).abs() < 1e-2);
        assert!((liquidation_price(&loan) - 55_555.555_555).abs() < 1e-2);

        let ltv = current_ltv(&loan, 50_000.0).unwrap();
        assert!((ltv - 1.0).abs() < 1e-12);
        assert_eq!(risk_tier(&loan, ltv), RiskTier::Liquidation);
    }

    #[test]
    fn tiers_scale_with_loan_thresholds() {
        let loan = loan();
        assert_eq!(risk_tier(&loan, 0.30), RiskTier::Green);
        assert_eq!(risk_tier(&loan, 0.60), RiskTier::Yellow); // >= 0.5625
        assert_eq!(risk_tier(&loan, 0.70), RiskTier::Orange); // >= 0.675
        assert_eq!(risk_tier(&loan, 0.80), RiskTier::Red);
        assert_eq!(risk_tier(&loan, 0.90), RiskTier::Liquidation);
    }

    #[test]
    fn zero_price_has_no_ltv() {
        assert!(current_ltv(&loan(), 0.0).is_none());
    }
}
