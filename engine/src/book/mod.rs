//! The order-book reconstruction engine.
//!
//! `Book` is the pure, synchronous state machine: feeding it deltas and
//! snapshots never performs I/O and never suspends -- apply-delta is a
//! pure in-memory transformation. The async task that calls out to a
//! `SnapshotFetcher` port and drains bounded channels lives in `engine.rs`.

pub mod delta;
pub mod engine;
pub mod side;
pub mod view;

use chrono::{DateTime, Utc};

pub use delta::{Delta, Snapshot};
pub use side::{BookSide, Side};
pub use view::BookView;

use crate::error::EngineError;

/// Lifecycle state of a per-symbol book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    Uninitialized,
    Syncing,
    Live,
    Stale,
}

/// Result of feeding one delta to a `Live` book.
#[derive(Debug, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Applied; the book remains `Live`.
    Applied,
    /// `delta.last_id <= last_update_id`; dropped, no state change.
    DroppedStale,
    /// `delta.first_id > last_update_id + 1`; the book transitioned to
    /// `Syncing` and a new snapshot must be requested.
    GapDetected,
}

/// Result of installing a snapshot while `Syncing`.
#[derive(Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// A bridge delta was found, buffered deltas replayed, now `Live`.
    Live,
    /// No bridge delta existed yet; still `Syncing`, caller should
    /// re-request a snapshot (attempt counted toward the `Stale` budget).
    NoBridgeYet,
    /// Resync attempts exhausted within the failure window; now `Stale`.
    Stale,
}

pub struct Book {
    pub symbol: String,
    pub exchange: String,
    bids: BookSide,
    asks: BookSide,
    last_update_id: u64,
    state: BookState,
    delta_buffer: Vec<Delta>,
    resync_attempts: u32,
    resync_window_start: Option<DateTime<Utc>>,
}

impl Book {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            last_update_id: 0,
            state: BookState::Uninitialized,
            delta_buffer: Vec::new(),
            resync_attempts: 0,
            resync_window_start: None,
        }
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// `Uninitialized -> Syncing` on stream start, or re-entry from any
    /// state on a `StreamReset` sentinel from the `FrameSource`.
    pub fn start_syncing(&mut self) {
        self.state = BookState::Syncing;
        self.delta_buffer.clear();
        self.resync_attempts = 0;
        self.resync_window_start = None;
    }

    /// Buffer a delta received while `Syncing` (snapshot not yet applied).
    /// Caller is responsible for only calling this when `state == Syncing`.
    pub fn buffer_delta(&mut self, delta: Delta) {
        self.delta_buffer.push(delta);
    }

    /// Apply a snapshot received while `Syncing`. See for the bridge
    /// protocol: deltas with `last_id <= S` are discarded, and at least one
    /// buffered delta must satisfy `first_id <= S+1 <= last_id` (the
    /// "bridge") before the snapshot can be installed.
    pub fn apply_snapshot(
        &mut self,
        snapshot: Snapshot,
        max_attempts: u32,
        failure_window_ms: i64,
        now: DateTime<Utc>,
    ) -> SnapshotOutcome {
        let s = snapshot.last_update_id;
        self.delta_buffer.retain(|d| d.last_id > s);

        let has_bridge = self
            .delta_buffer
            .iter()
            .any(|d| d.first_id <= s + 1 && s + 1 <= d.last_id);

        if !has_bridge {
            return self.record_resync_failure(max_attempts, failure_window_ms, now);
        }

        self.bids.load_snapshot(snapshot.bids);
        self.asks.load_snapshot(snapshot.asks);
        self.last_update_id = s;

        let mut buffered = std::mem::take(&mut self.delta_buffer);
        buffered.sort_by_key(|d| d.first_id);
        for delta in buffered {
            if delta.last_id > self.last_update_id {
                self.apply_levels(&delta);
                self.last_update_id = delta.last_id;
            }
        }

        self.state = BookState::Live;
        self.resync_attempts = 0;
        self.resync_window_start = None;
        SnapshotOutcome::Live
    }

    fn record_resync_failure(
        &mut self,
        max_attempts: u32,
        failure_window_ms: i64,
        now: DateTime<Utc>,
    ) -> SnapshotOutcome {
        let window_start = match self.resync_window_start {
            Some(start) if (now - start).num_milliseconds() <= failure_window_ms => start,
            _ => {
                self.resync_window_start = Some(now);
                self.resync_attempts = 0;
                now
            }
        };
        let _ = window_start;
        self.resync_attempts += 1;

        if self.resync_attempts >= max_attempts {
            self.state = BookState::Stale;
            SnapshotOutcome::Stale
        } else {
            SnapshotOutcome::NoBridgeYet
        }
    }

    /// Apply one delta to a `Live` book (three-way branch).
    pub fn apply_delta_live(&mut self, delta: Delta) -> DeltaOutcome {
        debug_assert_eq!(self.state, BookState::Live);

        if delta.last_id <= self.last_update_id {
            return DeltaOutcome::DroppedStale;
        }

        if delta.first_id > self.last_update_id + 1 {
            self.state = BookState::Syncing;
            self.delta_buffer.clear();
            return DeltaOutcome::GapDetected;
        }

        self.apply_levels(&delta);
        self.last_update_id = delta.last_id;
        DeltaOutcome::Applied
    }

    fn apply_levels(&mut self, delta: &Delta) {
        for &(price, qty) in &delta.bids {
            self.bids.apply(price, qty);
        }
        for &(price, qty) in &delta.asks {
            self.asks.apply(price, qty);
        }
    }

    /// Force `Stale` (e.g. a terminal transport error from the `FrameSource`).
    pub fn mark_stale(&mut self) {
        self.state = BookState::Stale;
    }

    /// `best_bid < best_ask` holds, or one side is empty (the invariant
    /// only binds once both sides have quotes).
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best(), self.asks.best()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        }
    }

    /// Produce a `BookView` snapshot. `None` outside `Live` state, since
    /// downstream consumers receive no views while `Syncing`/`Stale`.
    pub fn view(&self, depth: usize, now: DateTime<Utc>) -> Option<BookView> {
        if self.state != BookState::Live {
            return None;
        }
        Some(BookView {
            symbol: self.symbol.clone(),
            bids: self.bids.top(depth),
            asks: self.asks.top(depth),
            last_update_id: self.last_update_id,
            captured_at: now,
        })
    }

    /// Parse-stage check before a delta is even handed to the book.
    pub fn validate_delta(delta: &Delta) -> Result<(), EngineError> {
        if !delta.well_formed() {
            return Err(EngineError::MalformedFrame(format!(
                "first_id {} > last_id {}",
                delta.first_id, delta.last_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn delta(first_id: u64, last_id: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Delta {
        Delta {
            first_id,
            last_id,
            bids: bids
                .iter()
                .map(|(p, q)| {
                    (
                        crate::decimal::Price(p.parse().unwrap()),
                        crate::decimal::Qty(q.parse().unwrap()),
                    )
                })
                .collect(),
            asks: asks
                .iter()
                .map(|(p, q)| {
                    (
                        crate::decimal::Price(p.parse().unwrap()),
                        crate::decimal::Qty(q.parse().unwrap()),
                    )
                })
                .collect(),
        }
    }

    fn snapshot(last_update_id: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Snapshot {
        Snapshot {
            last_update_id,
            bids: bids
                .iter()
                .map(|(p, q)| {
                    (
                        crate::decimal::Price(p.parse().unwrap()),
                        crate::decimal::Qty(q.parse().unwrap()),
                    )
                })
                .collect(),
            asks: asks
                .iter()
                .map(|(p, q)| {
                    (
                        crate::decimal::Price(p.parse().unwrap()),
                        crate::decimal::Qty(q.parse().unwrap()),
                    )
                })
                .collect(),
        }
    }

    /// A sequence gap detected mid-stream triggers a resync that bridges
    /// back to live via a buffered delta once the new snapshot lands.
    #[test]
    fn gap_triggers_resync_then_bridges_back_to_live() {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        let snap = snapshot(100, &[("100.0", "1")], &[("101.0", "1")]);
        assert_eq!(book.apply_snapshot(snap, 3, 60_000, now()), SnapshotOutcome::Live);
        assert_eq!(book.last_update_id(), 100);

        // A delta with a gap: last_update_id=100, incoming first_id=105.
        let gap_delta = delta(105, 107, &[], &[]);
        assert_eq!(book.apply_delta_live(gap_delta), DeltaOutcome::GapDetected);
        assert_eq!(book.state(), BookState::Syncing);

        // Deltas arrive while syncing; buffer them.
        book.buffer_delta(delta(108, 112, &[("99.0", "2")], &[]));

        // New snapshot arrives with last_update_id=110, bridge delta 108..112 covers S+1=111.
        let snap2 = snapshot(110, &[("100.0", "1")], &[("101.0", "1")]);
        assert_eq!(
            book.apply_snapshot(snap2, 3, 60_000, now()),
            SnapshotOutcome::Live
        );
        assert_eq!(book.state(), BookState::Live);
        assert_eq!(book.last_update_id(), 112);
    }

    /// Zero-qty removal recomputes the best price on that side.
    #[test]
    fn zero_qty_removal_recomputes_best_bid() {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        let snap = snapshot(1, &[("100.00", "2.5"), ("99.0", "1.0")], &[("101.0", "1")]);
        book.apply_snapshot(snap, 3, 60_000, now());

        let d = delta(2, 2, &[("100.00", "0")], &[]);
        assert_eq!(book.apply_delta_live(d), DeltaOutcome::Applied);
        assert!(!book.bids().contains_price(&crate::decimal::Price(dec!(100.00))));
        assert_eq!(
            book.bids().best(),
            Some((
                crate::decimal::Price(dec!(99.0)),
                crate::decimal::Qty(dec!(1.0))
            ))
        );
    }

    #[test]
    fn stale_delta_is_dropped_without_state_change() {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        book.apply_snapshot(snapshot(100, &[], &[]), 3, 60_000, now());

        let d = delta(90, 100, &[], &[]);
        assert_eq!(book.apply_delta_live(d), DeltaOutcome::DroppedStale);
        assert_eq!(book.last_update_id(), 100);
        assert_eq!(book.state(), BookState::Live);
    }

    #[test]
    fn sequence_cursor_never_decreases_across_applied_deltas() {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        book.apply_snapshot(snapshot(10, &[], &[]), 3, 60_000, now());

        let mut last = book.last_update_id();
        for (first, last_id) in [(11, 12), (13, 15), (16, 16)] {
            book.apply_delta_live(delta(first, last_id, &[], &[]));
            assert!(book.last_update_id() >= last);
            last = book.last_update_id();
        }
    }

    #[test]
    fn persistent_gap_within_window_goes_stale_after_max_attempts() {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();

        // Snapshot S=100, but no buffered delta bridges S+1=101 -- every
        // attempt fails until the budget is exhausted.
        for attempt in 1..=3 {
            let outcome = book.apply_snapshot(snapshot(100, &[], &[]), 3, 60_000, now());
            if attempt < 3 {
                assert_eq!(outcome, SnapshotOutcome::NoBridgeYet);
            } else {
                assert_eq!(outcome, SnapshotOutcome::Stale);
            }
        }
        assert_eq!(book.state(), BookState::Stale);
    }

    #[test]
    fn view_is_none_outside_live_state() {
        let mut book = Book::new("binance", "BTC-PERP");
        assert!(book.view(50, now()).is_none());
        book.start_syncing();
        assert!(book.view(50, now()).is_none());
    }

    #[test]
    fn view_holds_top_k_and_cursor() {
        let mut book = Book::new("binance", "BTC-PERP");
        book.start_syncing();
        book.apply_snapshot(
            snapshot(5, &[("100.0", "1"), ("99.0", "2")], &[("101.0", "1")]),
            3,
            60_000,
            now(),
        );
        let view = book.view(1, now()).unwrap();
        assert_eq!(view.bids.len(), 1);
        assert_eq!(view.last_update_id, 5);
        assert!(!book.is_crossed());
    }
}
