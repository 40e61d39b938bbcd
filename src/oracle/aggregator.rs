//! Price aggregator
//!
//! Combines the freshest tick per exchange into a validated market price:
//! median combine, circuit breaker, time-weighted average, confidence
//! scoring. Pure module: it ingests ticks and computes on demand; the
//! oracle service owns the schedule.
//!
//! While the circuit breaker is tripped, every computed update appends a
//! sample priced at `last_known_good` rather than the rejected median, so
//! the TWAP stays anchored to the pre-anomaly price for the life of the
//! trip.

use std::collections::{HashMap, VecDeque};

use crate::config::OracleConfig;
use crate::types::{Confidence, PriceUpdate, SourceName, SourceTick};

/// Ticks older than this never contribute to an update.
pub const FRESHNESS_CUTOFF_MS: i64 = 30_000;

/// How long a circuit-breaker trip holds before re-evaluation.
const TRIP_WINDOW_MS: i64 = 60_000;

const MAX_SAMPLES: usize = 2000;

/// One retained aggregation sample; the TWAP input.
#[derive(Debug, Clone)]
pub struct PriceSample {
    pub price: f64,
    pub timestamp: i64,
    pub sources: Vec<SourceName>,
}

pub struct PriceAggregator {
    /// Freshest tick per source; only the latest value matters
    latest: HashMap<SourceName, SourceTick>,
    samples: VecDeque<PriceSample>,
    last_known_good: f64,
    tripped_at: Option<i64>,
    twap_window_ms: i64,
    circuit_breaker_pct: f64,
}

impl PriceAggregator {
    pub fn new(twap_window_seconds: u64, circuit_breaker_pct: f64) -> Self {
        Self {
            latest: HashMap::new(),
            samples: VecDeque::new(),
            last_known_good: 0.0,
            tripped_at: None,
            twap_window_ms: twap_window_seconds as i64 * 1000,
            circuit_breaker_pct,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(config.twap_window_seconds, config.circuit_breaker_pct)
    }

    /// Overwrite the per-source latest value.
    pub fn ingest_tick(&mut self, source: SourceName, price: f64, timestamp: i64) {
        self.latest.insert(
            source,
            SourceTick {
                source,
                price,
                timestamp,
            },
        );
    }

    pub fn last_known_good(&self) -> f64 {
        self.last_known_good
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn last_sample(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn compute_update(&mut self) -> Option<PriceUpdate> {
        self.compute_update_at(chrono::Utc::now().timestamp_millis())
    }

    /// Produce a validated update against an explicit clock, or None when
    /// no source is fresh.
    pub fn compute_update_at(&mut self, now: i64) -> Option<PriceUpdate> {
        let fresh: Vec<&SourceTick> = self
            .latest
            .values()
            .filter(|t| now - t.timestamp < FRESHNESS_CUTOFF_MS)
            .collect();
        if fresh.is_empty() {
            return None;
        }

        let mut sources: Vec<SourceName> = fresh.iter().map(|t| t.source).collect();
        sources.sort();
        let mut prices: Vec<f64> = fresh.iter().map(|t| t.price).collect();
        prices.sort_by(f64::total_cmp);
        let median = median_of_sorted(&prices);

        let mut circuit_breaker = false;
        let mut sample_price = median;
        if self.last_known_good > 0.0 {
            let delta = (median - self.last_known_good).abs() / self.last_known_good;
            if delta > self.circuit_breaker_pct / 100.0 {
                match self.tripped_at {
                    // An expired trip re-trips with a fresh window
                    Some(t) if now - t >= TRIP_WINDOW_MS => self.tripped_at = Some(now),
                    Some(_) => {}
                    None => self.tripped_at = Some(now),
                }
                circuit_breaker = true;
                sample_price = self.last_known_good;
            } else {
                self.tripped_at = None;
                self.last_known_good = median;
            }
        } else {
            self.last_known_good = median;
        }

        self.samples.push_back(PriceSample {
            price: sample_price,
            timestamp: now,
            sources: sources.clone(),
        });
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }

        let twap_5m = self.twap_at(now);
        let confidence = confidence_for(&prices);

        Some(PriceUpdate {
            price: median,
            timestamp: now,
            sources,
            twap_5m,
            confidence,
            circuit_breaker,
        })
    }

    /// Time-weighted average over `[now - window, now]`. Each sample is
    /// weighted by the interval until its successor, the last one until
    /// `now`.
    fn twap_at(&self, now: i64) -> f64 {
        let start = now - self.twap_window_ms;
        let window: Vec<&PriceSample> = self
            .samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= now)
            .collect();

        match window.len() {
            0 => self.last_known_good,
            1 => window[0].price,
            n => {
                let mut weighted = 0.0;
                let mut total: i64 = 0;
                for (i, sample) in window.iter().enumerate() {
                    let next_ts = if i + 1 < n { window[i + 1].timestamp } else { now };
                    let weight = next_ts - sample.timestamp;
                    weighted += sample.price * weight as f64;
                    total += weight;
                }
                if total > 0 {
                    weighted / total as f64
                } else {
                    window[n - 1].price
                }
            }
        }
    }
}

fn median_of_sorted(prices: &[f64]) -> f64 {
    let n = prices.len();
    if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    }
}

fn confidence_for(prices: &[f64]) -> Confidence {
    match prices.len() {
        1 => Confidence::Low,
        2 => Confidence::Medium,
        _ => {
            let min = prices[0];
            let max = prices[prices.len() - 1];
            let spread = (max - min) / min;
            if spread < 0.005 {
                Confidence::High
            } else if spread < 0.01 {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }
    }
}
