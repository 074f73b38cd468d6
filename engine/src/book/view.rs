//! The immutable, read-only projection handed to downstream consumers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::decimal::{Price, Qty};

/// A consistent snapshot of one symbol's book at a single logical instant.
/// Consumed once, never mutated; downstream stages receive this by value.
#[derive(Debug, Clone)]
pub struct BookView {
    pub symbol: String,
    /// Best-first, top-K per side (K = `EngineConfig::book_view_depth`).
    pub bids: Vec<(Price, Qty)>,
    pub asks: Vec<(Price, Qty)>,
    pub last_update_id: u64,
    pub captured_at: DateTime<Utc>,
}

impl BookView {
    pub fn best_bid(&self) -> Option<(Price, Qty)> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<(Price, Qty)> {
        self.asks.first().copied()
    }

    /// `(best_bid + best_ask) / 2`. `None` if either side is empty.
    pub fn mid(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.0 .0;
        let ask = self.best_ask()?.0 .0;
        Some((bid + ask) / dec!(2))
    }
}
