//! loanwatch library
//!
//! Real-time monitor for BTC-collateralized loans: a multi-exchange price
//! oracle, LTV tracking, and edge-triggered threshold alerts.

pub mod alerts;
pub mod bus;
pub mod config;
pub mod notify;
pub mod oracle;
pub mod risk;
pub mod store;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;
