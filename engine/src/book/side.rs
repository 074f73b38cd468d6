//! One side of a price ladder.
//!
//! Backed by a `BTreeMap<Price, Qty>`, giving O(log n) insert/remove/lookup
//! and O(1) access to the best price via `first_key_value`/`last_key_value`.
//! `Decimal` implements `Ord` directly so, unlike an `f64`-keyed map, no
//! `OrderedFloat` wrapper is needed here.

use std::collections::BTreeMap;

use crate::decimal::{Price, Qty};

/// `Bid` sorts for descending access (best = highest price), `Ask` for
/// ascending access (best = lowest price). The underlying map is always
/// stored in natural ascending `Price` order; only the "best" and
/// "iterate in priority order" accessors differ by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

#[derive(Debug, Clone)]
pub struct BookSide {
    levels: BTreeMap<Price, Qty>,
    side: Side,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            levels: BTreeMap::new(),
            side,
        }
    }

    /// Apply one (price, qty) change. The venue sends absolute quantities,
    /// never deltas against the existing level — so this always overwrites.
    /// `qty == 0` deletes the level; deleting an absent key is a no-op.
    pub fn apply(&mut self, price: Price, qty: Qty) {
        if qty.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, qty);
        }
    }

    /// Replace all levels with a fresh snapshot. Zero-qty entries (should
    /// not occur in a snapshot, but tolerated) are skipped.
    pub fn load_snapshot(&mut self, levels: impl IntoIterator<Item = (Price, Qty)>) {
        self.levels.clear();
        for (price, qty) in levels {
            if !qty.is_zero() {
                self.levels.insert(price, qty);
            }
        }
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Best (top-of-book) price for this side, O(1).
    pub fn best(&self) -> Option<(Price, Qty)> {
        match self.side {
            Side::Ask => self.levels.iter().next().map(|(p, q)| (*p, *q)),
            Side::Bid => self.levels.iter().next_back().map(|(p, q)| (*p, *q)),
        }
    }

    /// Iterate the top `k` levels in price-priority order (best first).
    pub fn top(&self, k: usize) -> Vec<(Price, Qty)> {
        match self.side {
            Side::Ask => self.levels.iter().take(k).map(|(p, q)| (*p, *q)).collect(),
            Side::Bid => self
                .levels
                .iter()
                .rev()
                .take(k)
                .map(|(p, q)| (*p, *q))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn contains_price(&self, price: &Price) -> bool {
        self.levels.contains_key(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn p(v: &str) -> Price {
        Price(v.parse().unwrap())
    }
    fn q(v: &str) -> Qty {
        Qty(v.parse().unwrap())
    }

    #[test]
    fn ask_best_is_lowest_price() {
        let mut side = BookSide::new(Side::Ask);
        side.apply(p("105.0"), q("1"));
        side.apply(p("100.0"), q("2"));
        side.apply(p("110.0"), q("3"));
        assert_eq!(side.best(), Some((p("100.0"), q("2"))));
    }

    #[test]
    fn bid_best_is_highest_price() {
        let mut side = BookSide::new(Side::Bid);
        side.apply(p("95.0"), q("1"));
        side.apply(p("100.0"), q("2"));
        side.apply(p("90.0"), q("3"));
        assert_eq!(side.best(), Some((p("100.0"), q("2"))));
    }

    #[test]
    fn zero_qty_deletes_regardless_of_prior_state() {
        let mut side = BookSide::new(Side::Bid);
        side.apply(p("100.00"), q("2.5"));
        assert!(side.contains_price(&p("100.00")));

        side.apply(p("100.00"), Qty::ZERO);
        assert!(!side.contains_price(&p("100.00")));

        // Deleting an absent key is a no-op, not an error.
        side.apply(p("999.0"), Qty::ZERO);
        assert!(side.is_empty());
    }

    #[test]
    fn zero_qty_delete_recomputes_best() {
        let mut side = BookSide::new(Side::Bid);
        side.apply(p("100.00"), q("2.5"));
        side.apply(p("99.50"), q("1.0"));
        side.apply(p("100.00"), Qty::ZERO);
        assert_eq!(side.best(), Some((p("99.50"), q("1.0"))));
    }

    #[test]
    fn apply_absolute_not_additive() {
        let mut side = BookSide::new(Side::Ask);
        side.apply(p("100.0"), q("5.0"));
        side.apply(p("100.0"), q("3.0"));
        // The second update replaces, it does not add to, the first.
        assert_eq!(side.best(), Some((p("100.0"), q("3.0"))));
    }

    #[test]
    fn top_k_respects_priority_order() {
        let mut side = BookSide::new(Side::Bid);
        for px in ["98.0", "100.0", "99.0"] {
            side.apply(p(px), q("1"));
        }
        let top = side.top(2);
        assert_eq!(top, vec![(p("100.0"), q("1")), (p("99.0"), q("1"))]);
    }

    #[test]
    fn load_snapshot_replaces_and_skips_zero_qty() {
        let mut side = BookSide::new(Side::Ask);
        side.apply(p("1.0"), q("1"));
        side.load_snapshot([(p("200.0"), q("1")), (p("201.0"), Qty::ZERO)]);
        assert_eq!(side.len(), 1);
        assert_eq!(side.best(), Some((p("200.0"), q("1"))));
    }
}
