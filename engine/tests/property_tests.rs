//! Property-based tests for the invariants that hold across arbitrary
//! input sequences, not just the hand-picked scenarios in the unit tests.
//! Placed in `tests/` rather than inline, since each property here spans
//! more than one module.

use chrono::{DateTime, Utc};
use liquidity_engine::book::{Book, Delta, DeltaOutcome, Snapshot};
use liquidity_engine::decimal::{Price, Qty};
use liquidity_engine::metrics::slippage::{self, SlippageResult, SlippageSide};
use liquidity_engine::metrics::{compute_sample, MetricsSample};
use liquidity_engine::{BookView, EngineConfig};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn qty_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

fn level_strategy() -> impl Strategy<Value = (Price, Qty)> {
    (price_strategy(), qty_strategy()).prop_map(|(p, q)| (Price(p), Qty(q)))
}

fn levels_strategy(max_len: usize) -> impl Strategy<Value = Vec<(Price, Qty)>> {
    prop::collection::vec(level_strategy(), 0..max_len)
}

fn view_strategy() -> impl Strategy<Value = BookView> {
    (levels_strategy(10), levels_strategy(10)).prop_map(|(mut bids, mut asks)| {
        // Keep bids descending and asks ascending so a view built directly
        // from random levels still looks like a real `Book::view()` output.
        bids.sort_by(|a, b| b.0.cmp(&a.0));
        asks.sort_by(|a, b| a.0.cmp(&b.0));
        BookView {
            symbol: "BTC-PERP".to_string(),
            bids,
            asks,
            last_update_id: 1,
            captured_at: now(),
        }
    })
}

proptest! {
    /// Applying any sequence of well-formed, contiguous deltas on top of a
    /// snapshot never leaves the book crossed ("book consistency"
    /// invariant), as long as the fed levels never cross bid/ask.
    #[test]
    fn applied_deltas_never_cross_the_book(
        snapshot_bids in levels_strategy(5),
        snapshot_asks in levels_strategy(5),
        delta_count in 0usize..8,
    ) {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();

        // Keep the two sides from overlapping in price so the snapshot
        // itself starts uncrossed.
        let asks: Vec<_> = snapshot_asks
            .into_iter()
            .map(|(p, q)| (Price(p.0 + Decimal::new(10_000_000, 2)), q))
            .collect();

        let snapshot = Snapshot {
            last_update_id: 1,
            bids: snapshot_bids,
            asks,
        };
        book.apply_snapshot(snapshot, 3, 60_000, now());

        let mut last_id = book.last_update_id();
        for i in 0..delta_count {
            let first_id = last_id + 1;
            let last_id_new = first_id + (i as u64 % 3);
            let delta = Delta {
                first_id,
                last_id: last_id_new,
                bids: vec![],
                asks: vec![],
            };
            if book.apply_delta_live(delta) == DeltaOutcome::Applied {
                last_id = last_id_new;
            } else {
                break;
            }
        }

        prop_assert!(!book.is_crossed());
    }

    /// `last_update_id` never decreases across any sequence of deltas
    /// applied while `Live`, whether or not each one is accepted.
    #[test]
    fn sequence_cursor_is_monotone_over_arbitrary_deltas(
        steps in prop::collection::vec((0u64..5, 0u64..5), 0..20),
    ) {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        book.apply_snapshot(Snapshot { last_update_id: 100, bids: vec![], asks: vec![] }, 3, 60_000, now());

        let mut last = book.last_update_id();
        for (first_offset, span) in steps {
            if book.state() != liquidity_engine::BookState::Live {
                break;
            }
            let first_id = last.saturating_add(first_offset).max(last + 1);
            let last_id = first_id + span;
            let delta = Delta { first_id, last_id, bids: vec![], asks: vec![] };
            book.apply_delta_live(delta);
            prop_assert!(book.last_update_id() >= last);
            last = book.last_update_id();
        }
    }

    /// Applying a zero-qty level for any price that is currently present
    /// always removes it, regardless of which price was chosen.
    #[test]
    fn zero_qty_is_always_a_delete(price in price_strategy(), qty in qty_strategy()) {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        book.apply_snapshot(
            Snapshot { last_update_id: 1, bids: vec![(Price(price), Qty(qty))], asks: vec![] },
            3,
            60_000,
            now(),
        );
        let delta = Delta {
            first_id: 2,
            last_id: 2,
            bids: vec![(Price(price), Qty::ZERO)],
            asks: vec![],
        };
        book.apply_delta_live(delta);
        prop_assert!(!book.bids().contains_price(&Price(price)));
    }

    /// Imbalance is always within [-1, +1] for any two-sided view.
    #[test]
    fn imbalance_is_bounded(view in view_strategy()) {
        prop_assume!(!view.bids.is_empty() && !view.asks.is_empty());
        let sample = compute_sample(&view, &EngineConfig::default());
        if let Some(MetricsSample { imbalance, .. }) = sample {
            prop_assert!(imbalance >= Decimal::NEGATIVE_ONE && imbalance <= Decimal::ONE);
        }
    }

    /// A larger notional never yields a lower slippage, as long as both
    /// sizes remain fillable against the same book.
    #[test]
    fn slippage_bps_does_not_decrease_with_notional(
        levels in prop::collection::vec(level_strategy(), 3..8),
        small_notional in 1_000i64..50_000i64,
        extra_notional in 0i64..500_000i64,
    ) {
        let mut sorted = levels;
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let view = BookView {
            symbol: "BTC-PERP".to_string(),
            bids: vec![],
            asks: sorted,
            last_update_id: 1,
            captured_at: now(),
        };
        let mid = view.asks[0].0 .0;
        let small = Decimal::new(small_notional, 0);
        let large = small + Decimal::new(extra_notional, 0);

        let small_sample = slippage::estimate(&view, mid, small, SlippageSide::Buy);
        let large_sample = slippage::estimate(&view, mid, large, SlippageSide::Buy);

        if let (
            SlippageResult::Filled { slippage_bps: small_bps, .. },
            SlippageResult::Filled { slippage_bps: large_bps, .. },
        ) = (&small_sample.result, &large_sample.result)
        {
            prop_assert!(small_bps <= large_bps);
        }
    }

    /// Summing `price * qty` across a set of levels is unaffected by the
    /// order the terms are added in, the whole point of using `Decimal`
    /// instead of `f64` in the book/metrics layer.
    #[test]
    fn notional_sum_is_permutation_invariant(levels in prop::collection::vec(level_strategy(), 1..12)) {
        let forward: Decimal = levels.iter().map(|(p, q)| *p * *q).sum();
        let mut reversed = levels.clone();
        reversed.reverse();
        let backward: Decimal = reversed.iter().map(|(p, q)| *p * *q).sum();
        prop_assert_eq!(forward, backward);
    }

    /// A rolling window never holds more samples than its configured
    /// capacity, no matter how many values are pushed.
    #[test]
    fn rolling_window_never_exceeds_capacity(
        capacity in 1usize..50,
        values in prop::collection::vec(-1000.0f64..1000.0, 0..200),
    ) {
        let mut window = liquidity_engine::anomaly::window::RollingWindow::new(capacity);
        for v in values {
            window.push(v);
            prop_assert!(window.len() <= capacity);
        }
    }
}
